//! Semantic component matching between an actual (student) and an expected
//! (reference) component set.
//!
//! Candidate equivalence per category:
//! - exact equality of folded names, or
//! - name-similarity ratio at or above the configured threshold, or
//! - for relationships, both endpoints matching under the actor/use-case
//!   alignment and an equal kind (implemented by rewriting actual endpoint
//!   names through the alignment before keying).
//!
//! The bipartite pairing is resolved greedily by descending score, each
//! actual and each expected consumed at most once. This is a deliberate
//! simplification over optimal assignment, traded for determinism and speed:
//! ties break exact-before-fuzzy, then lexicographically smaller expected
//! name, then lexicographically smaller actual name, so identical inputs
//! always produce identical output.

use crate::types::{normalize_name, ComponentCategory, ComponentSet, Relationship};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One matched actual/expected pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedPair {
    pub actual: String,
    pub expected: String,
    /// Similarity score in [0, 1]; 1.0 for exact folded-name equality.
    pub score: f64,
    /// Whether the pair matched on exact folded names.
    pub exact: bool,
}

/// Match outcome for one component category.
///
/// Partition invariant: every actual component lands in exactly one of
/// {matched, false_positives}; every expected component in exactly one of
/// {matched, false_negatives}.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub category: ComponentCategory,
    pub matched: Vec<MatchedPair>,
    pub false_positives: Vec<String>,
    pub false_negatives: Vec<String>,
}

impl MatchResult {
    /// Count of actual components covered by this result.
    pub fn actual_len(&self) -> usize {
        self.matched.len() + self.false_positives.len()
    }

    /// Count of expected components covered by this result.
    pub fn expected_len(&self) -> usize {
        self.matched.len() + self.false_negatives.len()
    }
}

/// Match results for all three categories of one diagram comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagramMatches {
    pub actors: MatchResult,
    pub use_cases: MatchResult,
    pub relationships: MatchResult,
}

impl DiagramMatches {
    /// Results in scoring order (actors, use cases, relationships).
    pub fn results(&self) -> [&MatchResult; 3] {
        [&self.actors, &self.use_cases, &self.relationships]
    }

    pub fn total_matched(&self) -> usize {
        self.results().iter().map(|r| r.matched.len()).sum()
    }
}

/// Handles semantic matching between expected and actual components.
pub struct ComponentMatcher {
    similarity_threshold: f64,
}

impl ComponentMatcher {
    pub fn new(similarity_threshold: f64) -> Self {
        Self {
            similarity_threshold,
        }
    }

    /// Match every category of `actual` against `expected`.
    ///
    /// Actor and use-case alignment runs first; the resulting name mapping
    /// feeds relationship matching so a relationship whose endpoints were
    /// fuzzily matched still keys identically to its expected counterpart.
    pub fn match_diagrams(&self, actual: &ComponentSet, expected: &ComponentSet) -> DiagramMatches {
        let actors = self.match_names(
            ComponentCategory::Actor,
            actual.actors.iter().map(|a| a.name.as_str()),
            expected.actors.iter().map(|a| a.name.as_str()),
        );
        let use_cases = self.match_names(
            ComponentCategory::UseCase,
            actual.use_cases.iter().map(|u| u.name.as_str()),
            expected.use_cases.iter().map(|u| u.name.as_str()),
        );

        let mut alignment: HashMap<String, String> = HashMap::new();
        for pair in actors.matched.iter().chain(use_cases.matched.iter()) {
            alignment.insert(normalize_name(&pair.actual), normalize_name(&pair.expected));
        }

        let relationships =
            self.match_relationships(&actual.relationships, &expected.relationships, &alignment);

        DiagramMatches {
            actors,
            use_cases,
            relationships,
        }
    }

    /// Match one name-keyed category.
    pub fn match_names<'a>(
        &self,
        category: ComponentCategory,
        actual: impl Iterator<Item = &'a str>,
        expected: impl Iterator<Item = &'a str>,
    ) -> MatchResult {
        let actual: Vec<String> = actual.map(|s| s.to_string()).collect();
        let expected: Vec<String> = expected.map(|s| s.to_string()).collect();
        let actual_keys: Vec<String> = actual.iter().map(|s| normalize_name(s)).collect();
        let expected_keys: Vec<String> = expected.iter().map(|s| normalize_name(s)).collect();
        self.resolve_greedy(category, &actual, &actual_keys, &expected, &expected_keys)
    }

    /// Match relationships, rewriting actual endpoints through the
    /// actor/use-case alignment before keying.
    fn match_relationships(
        &self,
        actual: &[Relationship],
        expected: &[Relationship],
        alignment: &HashMap<String, String>,
    ) -> MatchResult {
        let actual_display: Vec<String> = actual.iter().map(|r| r.key()).collect();
        let actual_keys: Vec<String> = actual
            .iter()
            .map(|r| Self::aligned_key(r, alignment))
            .collect();
        let expected_display: Vec<String> = expected.iter().map(|r| r.key()).collect();
        // Expected keys are already in reference vocabulary.
        let expected_keys = expected_display.clone();
        self.resolve_greedy(
            ComponentCategory::Relationship,
            &actual_display,
            &actual_keys,
            &expected_display,
            &expected_keys,
        )
    }

    fn aligned_key(rel: &Relationship, alignment: &HashMap<String, String>) -> String {
        let source = normalize_name(&rel.source);
        let target = normalize_name(&rel.target);
        let source = alignment.get(&source).unwrap_or(&source);
        let target = alignment.get(&target).unwrap_or(&target);
        format!("{}->{}:{}", source, target, rel.kind)
    }

    /// Greedy bipartite resolution over the candidate-pair set.
    fn resolve_greedy(
        &self,
        category: ComponentCategory,
        actual_display: &[String],
        actual_keys: &[String],
        expected_display: &[String],
        expected_keys: &[String],
    ) -> MatchResult {
        struct Candidate {
            actual_idx: usize,
            expected_idx: usize,
            score: f64,
            exact: bool,
        }

        let mut candidates: Vec<Candidate> = Vec::new();
        for (ai, a_key) in actual_keys.iter().enumerate() {
            for (ei, e_key) in expected_keys.iter().enumerate() {
                if a_key == e_key {
                    candidates.push(Candidate {
                        actual_idx: ai,
                        expected_idx: ei,
                        score: 1.0,
                        exact: true,
                    });
                    continue;
                }
                let score = name_similarity(a_key, e_key);
                if score >= self.similarity_threshold {
                    candidates.push(Candidate {
                        actual_idx: ai,
                        expected_idx: ei,
                        score,
                        exact: false,
                    });
                }
            }
        }

        // Exact before fuzzy; then descending score; then smaller expected
        // name; then smaller actual name. Total order => deterministic.
        candidates.sort_by(|a, b| {
            b.exact
                .cmp(&a.exact)
                .then_with(|| b.score.total_cmp(&a.score))
                .then_with(|| {
                    expected_keys[a.expected_idx].cmp(&expected_keys[b.expected_idx])
                })
                .then_with(|| actual_keys[a.actual_idx].cmp(&actual_keys[b.actual_idx]))
        });

        let mut actual_used = vec![false; actual_keys.len()];
        let mut expected_used = vec![false; expected_keys.len()];
        let mut matched = Vec::new();

        for cand in candidates {
            if actual_used[cand.actual_idx] || expected_used[cand.expected_idx] {
                continue;
            }
            actual_used[cand.actual_idx] = true;
            expected_used[cand.expected_idx] = true;
            matched.push(MatchedPair {
                actual: actual_display[cand.actual_idx].clone(),
                expected: expected_display[cand.expected_idx].clone(),
                score: cand.score,
                exact: cand.exact,
            });
        }

        let false_positives = actual_display
            .iter()
            .enumerate()
            .filter(|(i, _)| !actual_used[*i])
            .map(|(_, name)| name.clone())
            .collect();
        let false_negatives = expected_display
            .iter()
            .enumerate()
            .filter(|(i, _)| !expected_used[*i])
            .map(|(_, name)| name.clone())
            .collect();

        MatchResult {
            category,
            matched,
            false_positives,
            false_negatives,
        }
    }
}

/// Similarity ratio between two folded names in [0, 1].
///
/// Exact equality short-circuits to 1.0; otherwise the diff ratio of the
/// character sequences. The signal is intentionally pluggable via the
/// configured threshold rather than baked into callers.
pub fn name_similarity(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    similar::TextDiff::from_chars(a, b).ratio() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Actor, RelationKind, UseCase};
    use pretty_assertions::assert_eq;

    fn set_of(
        actors: &[&str],
        use_cases: &[&str],
        relationships: &[(&str, &str, RelationKind)],
    ) -> ComponentSet {
        let mut set = ComponentSet::new("test");
        for a in actors {
            set.push_actor(Actor::new(*a));
        }
        for u in use_cases {
            set.push_use_case(UseCase::new(*u));
        }
        for (s, t, k) in relationships {
            set.push_relationship(Relationship::new(*s, *t, *k));
        }
        set
    }

    fn matcher() -> ComponentMatcher {
        ComponentMatcher::new(0.85)
    }

    #[test]
    fn test_exact_match_all_categories() {
        let actual = set_of(
            &["User"],
            &["Login"],
            &[("User", "Login", RelationKind::Association)],
        );
        let expected = actual.clone();

        let matches = matcher().match_diagrams(&actual, &expected);
        assert_eq!(matches.total_matched(), 3);
        assert!(matches.actors.false_positives.is_empty());
        assert!(matches.relationships.false_negatives.is_empty());
        assert!(matches.actors.matched[0].exact);
    }

    #[test]
    fn test_case_and_punctuation_folding() {
        let actual = set_of(&["user"], &["log-in"], &[]);
        let expected = set_of(&["User"], &["Log In"], &[]);

        let matches = matcher().match_diagrams(&actual, &expected);
        assert_eq!(matches.actors.matched.len(), 1);
        assert!(matches.actors.matched[0].exact);
        assert_eq!(matches.use_cases.matched.len(), 1);
        assert!(matches.use_cases.matched[0].exact);
    }

    #[test]
    fn test_fuzzy_match_above_threshold() {
        let actual = set_of(&[], &["Manage Users"], &[]);
        let expected = set_of(&[], &["Manage User"], &[]);

        let matches = matcher().match_diagrams(&actual, &expected);
        assert_eq!(matches.use_cases.matched.len(), 1);
        assert!(!matches.use_cases.matched[0].exact);
        assert!(matches.use_cases.matched[0].score >= 0.85);
    }

    #[test]
    fn test_dissimilar_names_do_not_match() {
        let actual = set_of(&["Guest"], &[], &[]);
        let expected = set_of(&["Administrator"], &[], &[]);

        let matches = matcher().match_diagrams(&actual, &expected);
        assert!(matches.actors.matched.is_empty());
        assert_eq!(matches.actors.false_positives, vec!["Guest".to_string()]);
        assert_eq!(
            matches.actors.false_negatives,
            vec!["Administrator".to_string()]
        );
    }

    #[test]
    fn test_partition_invariant() {
        let actual = set_of(&["User", "Guest", "Operator"], &[], &[]);
        let expected = set_of(&["User", "Admin"], &[], &[]);

        let matches = matcher().match_diagrams(&actual, &expected);
        let r = &matches.actors;
        assert_eq!(r.matched.len() + r.false_positives.len(), 3);
        assert_eq!(r.matched.len() + r.false_negatives.len(), 2);
    }

    #[test]
    fn test_each_component_consumed_at_most_once() {
        // Two actuals both similar to one expected; only one may match.
        let actual = set_of(&["Manager", "Managers"], &[], &[]);
        let expected = set_of(&["Manager"], &[], &[]);

        let matches = matcher().match_diagrams(&actual, &expected);
        assert_eq!(matches.actors.matched.len(), 1);
        assert_eq!(matches.actors.false_positives.len(), 1);
        // Exact wins over fuzzy.
        assert_eq!(matches.actors.matched[0].actual, "Manager");
    }

    #[test]
    fn test_tie_break_prefers_smaller_expected_name() {
        // One actual equally similar to two expecteds; the smaller expected
        // name must win for reproducibility.
        let m = ComponentMatcher::new(0.5);
        let result = m.match_names(
            ComponentCategory::UseCase,
            ["list items"].into_iter(),
            ["list itemsa", "list itemsb"].into_iter(),
        );
        assert_eq!(result.matched.len(), 1);
        assert_eq!(result.matched[0].expected, "list itemsa");
    }

    #[test]
    fn test_relationship_matches_through_fuzzy_endpoint_alignment() {
        // "Customer" fuzz-matches "Customers"; the relationship keyed on the
        // aligned endpoint must then match exactly.
        let actual = set_of(
            &["Customers"],
            &["Book Ticket"],
            &[("Customers", "Book Ticket", RelationKind::Association)],
        );
        let expected = set_of(
            &["Customer"],
            &["Book Ticket"],
            &[("Customer", "Book Ticket", RelationKind::Association)],
        );

        let matches = matcher().match_diagrams(&actual, &expected);
        assert_eq!(matches.relationships.matched.len(), 1);
        assert!(matches.relationships.matched[0].exact);
    }

    #[test]
    fn test_relationship_kind_mismatch_does_not_match() {
        let actual = set_of(
            &["User"],
            &["Login", "Verify"],
            &[("Login", "Verify", RelationKind::Extend)],
        );
        let expected = set_of(
            &["User"],
            &["Login", "Verify"],
            &[("Login", "Verify", RelationKind::Include)],
        );

        let matches = matcher().match_diagrams(&actual, &expected);
        assert!(matches.relationships.matched.is_empty());
        assert_eq!(matches.relationships.false_positives.len(), 1);
        assert_eq!(matches.relationships.false_negatives.len(), 1);
    }

    #[test]
    fn test_matching_is_deterministic_and_idempotent() {
        let actual = set_of(
            &["User", "Admin", "Guest"],
            &["Login", "Logout", "Manage Users", "View Reports"],
            &[
                ("User", "Login", RelationKind::Association),
                ("Admin", "Manage Users", RelationKind::Association),
            ],
        );
        let expected = set_of(
            &["Users", "Administrator", "Guest"],
            &["Log In", "Log Out", "Manage User", "View Report"],
            &[
                ("Users", "Log In", RelationKind::Association),
                ("Administrator", "Manage User", RelationKind::Association),
            ],
        );

        let first = matcher().match_diagrams(&actual, &expected);
        for _ in 0..5 {
            let again = matcher().match_diagrams(&actual, &expected);
            assert_eq!(first, again);
        }
    }

    #[test]
    fn test_empty_actual_all_false_negatives() {
        let actual = ComponentSet::new("empty");
        let expected = set_of(&["User"], &["Login", "Logout"], &[]);

        let matches = matcher().match_diagrams(&actual, &expected);
        assert_eq!(matches.total_matched(), 0);
        assert_eq!(matches.actors.false_negatives.len(), 1);
        assert_eq!(matches.use_cases.false_negatives.len(), 2);
    }

    #[test]
    fn test_name_similarity_bounds() {
        assert_eq!(name_similarity("login", "login"), 1.0);
        assert_eq!(name_similarity("", "login"), 0.0);
        let s = name_similarity("login", "logout");
        assert!(s > 0.0 && s < 1.0);
    }
}
