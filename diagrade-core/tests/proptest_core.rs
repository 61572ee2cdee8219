//! Property-based tests for the matcher and metrics engine using proptest.

use proptest::prelude::*;

use diagrade_core::config::{CategoryWeights, GradingConfig};
use diagrade_core::matcher::ComponentMatcher;
use diagrade_core::metrics::{ComponentMetrics, DiagramMetrics};
use diagrade_core::types::{Actor, ComponentCategory, ComponentSet, RelationKind, Relationship, UseCase};

fn names() -> impl Strategy<Value = Vec<String>> {
    proptest::collection::vec("[a-z]{1,10}( [a-z]{1,8})?", 0..8)
}

fn component_set(
    actors: Vec<String>,
    use_cases: Vec<String>,
    relationships: Vec<(String, String, bool)>,
) -> ComponentSet {
    let mut set = ComponentSet::new("prop");
    for a in actors {
        set.push_actor(Actor::new(a));
    }
    for u in use_cases {
        set.push_use_case(UseCase::new(u));
    }
    for (s, t, include) in relationships {
        let kind = if include {
            RelationKind::Include
        } else {
            RelationKind::Association
        };
        set.push_relationship(Relationship::new(s, t, kind));
    }
    set
}

fn relationships() -> impl Strategy<Value = Vec<(String, String, bool)>> {
    proptest::collection::vec(("[a-z]{1,8}", "[a-z]{1,8}", any::<bool>()), 0..6)
}

// --- Matcher properties ---

proptest! {
    /// Every actual lands in exactly one of {matched, false_positives};
    /// every expected in exactly one of {matched, false_negatives}.
    #[test]
    fn matcher_partition_invariant(
        actual in names(),
        expected in names(),
        threshold in 0.5f64..1.0,
    ) {
        let matcher = ComponentMatcher::new(threshold);
        let result = matcher.match_names(
            ComponentCategory::Actor,
            actual.iter().map(|s| s.as_str()),
            expected.iter().map(|s| s.as_str()),
        );

        prop_assert_eq!(
            result.matched.len() + result.false_positives.len(),
            actual.len()
        );
        prop_assert_eq!(
            result.matched.len() + result.false_negatives.len(),
            expected.len()
        );
    }

    /// Matching the same inputs twice yields an identical result.
    #[test]
    fn matcher_is_deterministic(
        actors_a in names(),
        use_cases_a in names(),
        rels_a in relationships(),
        actors_e in names(),
        use_cases_e in names(),
        rels_e in relationships(),
    ) {
        let actual = component_set(actors_a, use_cases_a, rels_a);
        let expected = component_set(actors_e, use_cases_e, rels_e);
        let matcher = ComponentMatcher::new(0.85);

        let first = matcher.match_diagrams(&actual, &expected);
        let second = matcher.match_diagrams(&actual, &expected);
        prop_assert_eq!(first, second);
    }

    /// Matching a set against itself matches everything exactly.
    #[test]
    fn matcher_self_match_is_total(
        actors in names(),
        use_cases in names(),
        rels in relationships(),
    ) {
        let set = component_set(actors, use_cases, rels);
        let matcher = ComponentMatcher::new(0.9);
        let matches = matcher.match_diagrams(&set, &set);

        prop_assert_eq!(matches.total_matched(), set.len());
        for result in matches.results() {
            prop_assert!(result.false_positives.is_empty());
            prop_assert!(result.false_negatives.is_empty());
            prop_assert!(result.matched.iter().all(|p| p.exact));
        }
    }
}

// --- Metrics properties ---

proptest! {
    /// All derived ratios stay in [0, 1] and are never NaN.
    #[test]
    fn metrics_are_bounded(
        tp in 0usize..100,
        fp in 0usize..100,
        fn_ in 0usize..100,
    ) {
        let m = ComponentMetrics::from_counts(tp, fp, fn_);
        for value in [m.precision, m.recall, m.f1_score, m.accuracy] {
            prop_assert!(value.is_finite());
            prop_assert!((0.0..=1.0).contains(&value));
        }
    }

    /// The final score stays on the 0-10 scale for any matching outcome,
    /// and the grade letter is always derivable.
    #[test]
    fn final_score_is_bounded(
        actors in names(),
        use_cases in names(),
        actors_e in names(),
        use_cases_e in names(),
        actor_weight in 0.0f64..2.0,
        use_case_weight in 0.0f64..2.0,
    ) {
        let actual = component_set(actors, use_cases, Vec::new());
        let expected = component_set(actors_e, use_cases_e, Vec::new());
        let matches = ComponentMatcher::new(0.85).match_diagrams(&actual, &expected);

        let weights = CategoryWeights {
            actors: actor_weight,
            use_cases: use_case_weight,
            relationships: 0.2,
        };
        let metrics = DiagramMetrics::compute(&matches, &weights);

        let score = metrics.final_score();
        prop_assert!((0.0..=10.0).contains(&score));

        let letter = metrics.grade_letter(&GradingConfig::default());
        prop_assert!(['A', 'B', 'C', 'D', 'F'].contains(&letter));
    }
}
