//! Quantitative metrics over match results.
//!
//! Pure functions, no I/O. Every ratio is 0 when its denominator is 0 —
//! callers never see NaN. Overall metrics sum TP/FP/FN across categories
//! first and then apply the formulas, so categories with few components are
//! not over-weighted the way a mean of per-category scores would be.

use crate::config::{CategoryWeights, GradingConfig};
use crate::matcher::{DiagramMatches, MatchResult};
use crate::types::ComponentCategory;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Metrics for a single component category.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ComponentMetrics {
    pub true_positives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub accuracy: f64,
}

impl ComponentMetrics {
    /// Derive metrics from raw counts with zero-denominator protection.
    pub fn from_counts(tp: usize, fp: usize, fn_: usize) -> Self {
        let precision = ratio(tp, tp + fp);
        let recall = ratio(tp, tp + fn_);
        let f1_score = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        let accuracy = ratio(tp, tp + fp + fn_);

        Self {
            true_positives: tp,
            false_positives: fp,
            false_negatives: fn_,
            precision,
            recall,
            f1_score,
            accuracy,
        }
    }

    /// Derive metrics from a match result.
    pub fn from_match(result: &MatchResult) -> Self {
        Self::from_counts(
            result.matched.len(),
            result.false_positives.len(),
            result.false_negatives.len(),
        )
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Complete metrics for one diagram comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagramMetrics {
    /// Per-category metrics keyed by category tag.
    pub component_metrics: BTreeMap<ComponentCategory, ComponentMetrics>,
    /// Metrics over the summed TP/FP/FN of all categories.
    pub overall_metrics: ComponentMetrics,
    /// Weighted composite of per-category F1 scores, in [0, 1].
    pub similarity_score: f64,
    pub total_expected: usize,
    pub total_actual: usize,
    pub total_matched: usize,
}

impl DiagramMetrics {
    /// Compute all metrics for a diagram comparison.
    pub fn compute(matches: &DiagramMatches, weights: &CategoryWeights) -> Self {
        let mut component_metrics = BTreeMap::new();
        let mut total_tp = 0;
        let mut total_fp = 0;
        let mut total_fn = 0;
        let mut total_actual = 0;
        let mut total_expected = 0;

        for result in matches.results() {
            let metrics = ComponentMetrics::from_match(result);
            total_tp += metrics.true_positives;
            total_fp += metrics.false_positives;
            total_fn += metrics.false_negatives;
            total_actual += result.actual_len();
            total_expected += result.expected_len();
            component_metrics.insert(result.category, metrics);
        }

        let overall_metrics = ComponentMetrics::from_counts(total_tp, total_fp, total_fn);
        let similarity_score = weighted_similarity(&component_metrics, weights);

        Self {
            component_metrics,
            overall_metrics,
            similarity_score,
            total_expected,
            total_actual,
            total_matched: total_tp,
        }
    }

    /// Final score on the 0-10 scale: similarity × 10 clamped to [0, 10].
    pub fn final_score(&self) -> f64 {
        (self.similarity_score * 10.0).clamp(0.0, 10.0)
    }

    /// Letter grade for the final score under the given breakpoints.
    pub fn grade_letter(&self, grading: &GradingConfig) -> char {
        grading.letter_for(self.final_score())
    }
}

/// Weighted composite of per-category F1 scores, normalized by total weight.
fn weighted_similarity(
    component_metrics: &BTreeMap<ComponentCategory, ComponentMetrics>,
    weights: &CategoryWeights,
) -> f64 {
    let total = weights.total();
    if total <= 0.0 {
        return 0.0;
    }
    let f1_of = |category: ComponentCategory| {
        component_metrics
            .get(&category)
            .map(|m| m.f1_score)
            .unwrap_or(0.0)
    };
    (f1_of(ComponentCategory::Actor) * weights.actors
        + f1_of(ComponentCategory::UseCase) * weights.use_cases
        + f1_of(ComponentCategory::Relationship) * weights.relationships)
        / total
}
