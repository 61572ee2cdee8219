//! Pedagogical feedback generation.
//!
//! Turns match results and metrics into structured feedback via one model
//! call. The narrative text is model-generated and therefore
//! non-deterministic, but a deterministic coverage pass guarantees that
//! every non-empty false-positive/false-negative category surfaces at least
//! one item — a detected error is never silently dropped. Model failure is
//! non-fatal: the stage degrades to a templated summary built directly from
//! the metrics.

use crate::config::RetryConfig;
use crate::error::LlmError;
use crate::llm::{extract_json_payload, GenerationRequest, LlmProvider};
use crate::matcher::{DiagramMatches, MatchResult};
use crate::metrics::DiagramMetrics;
use crate::providers::with_retry;
use crate::telemetry::{logged_call, GenerationLog};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

/// Feedback item kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackKind {
    Error,
    Suggestion,
    Praise,
    Warning,
}

/// Severity of a feedback item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// A single piece of feedback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackItem {
    #[serde(rename = "type")]
    pub kind: FeedbackKind,
    /// Component category or error-category tag this item concerns.
    pub category: String,
    pub message: String,
    pub severity: Severity,
    pub actionable: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<String>,
}

/// Structured feedback for one scored submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailedFeedback {
    pub summary: String,
    pub strengths: Vec<String>,
    pub areas_for_improvement: Vec<String>,
    pub detailed_items: Vec<FeedbackItem>,
    pub confidence: f64,
}

/// Outcome of the feedback stage.
#[derive(Debug, Clone)]
pub struct FeedbackOutcome {
    pub feedback: DetailedFeedback,
    /// Whether the model-generated path succeeded (false = templated fallback).
    pub model_generated: bool,
    pub warnings: Vec<String>,
}

/// Wire shape the feedback prompt asks the model to produce.
#[derive(Debug, Deserialize)]
struct RawFeedback {
    #[serde(default)]
    feedback_items: Vec<FeedbackItem>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    strengths: Vec<String>,
    #[serde(default)]
    areas_for_improvement: Vec<String>,
    #[serde(default)]
    confidence: Option<f64>,
}

/// Generates structured feedback from match results and metrics.
pub struct FeedbackGenerator {
    provider: Arc<dyn LlmProvider>,
    retry: RetryConfig,
    temperature: f32,
    max_tokens: usize,
}

impl FeedbackGenerator {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        retry: RetryConfig,
        temperature: f32,
        max_tokens: usize,
    ) -> Self {
        Self {
            provider,
            retry,
            temperature,
            max_tokens,
        }
    }

    /// Generate feedback; never fails.
    pub async fn generate(
        &self,
        matches: &DiagramMatches,
        metrics: &DiagramMetrics,
        problem_description: &str,
        log: &GenerationLog,
    ) -> FeedbackOutcome {
        let prompt = feedback_prompt(matches, metrics, problem_description);

        let result = with_retry(&self.retry, |_| {
            let prompt = prompt.clone();
            async move {
                let request = GenerationRequest::new(prompt)
                    .with_temperature(self.temperature)
                    .with_max_tokens(self.max_tokens);
                logged_call(
                    self.provider.as_ref(),
                    log,
                    "feedback: generation",
                    request,
                    parse_feedback,
                )
                .await
            }
        })
        .await;

        match result {
            Ok(mut feedback) => {
                ensure_error_coverage(&mut feedback, matches);
                FeedbackOutcome {
                    feedback,
                    model_generated: true,
                    warnings: Vec::new(),
                }
            }
            Err(e) => {
                warn!(error = %e, "Feedback generation failed, using templated fallback");
                let mut feedback = fallback_feedback(metrics);
                ensure_error_coverage(&mut feedback, matches);
                FeedbackOutcome {
                    feedback,
                    model_generated: false,
                    warnings: vec![format!("feedback generation degraded to template: {e}")],
                }
            }
        }
    }
}

/// Build the degraded (non-model) feedback outcome for a stage-level
/// failure the generator itself never saw, e.g. a coordinator timeout.
pub fn degraded_outcome(
    matches: &DiagramMatches,
    metrics: &DiagramMetrics,
    reason: &str,
) -> FeedbackOutcome {
    let mut feedback = fallback_feedback(metrics);
    ensure_error_coverage(&mut feedback, matches);
    FeedbackOutcome {
        feedback,
        model_generated: false,
        warnings: vec![format!("feedback generation degraded to template: {reason}")],
    }
}

fn parse_feedback(text: &str) -> Result<DetailedFeedback, LlmError> {
    let value = extract_json_payload(text)?;
    let raw: RawFeedback = serde_json::from_value(value).map_err(|e| LlmError::ResponseParse {
        message: format!("feedback JSON does not match the expected schema: {e}"),
    })?;
    Ok(DetailedFeedback {
        summary: raw
            .summary
            .unwrap_or_else(|| "Feedback generated for your diagram.".to_string()),
        strengths: raw.strengths,
        areas_for_improvement: raw.areas_for_improvement,
        detailed_items: raw.feedback_items,
        confidence: raw.confidence.unwrap_or(0.7).clamp(0.0, 1.0),
    })
}

/// Guarantee one item per non-empty FN set (missing components, kind Error)
/// and per non-empty FP set (unexpected components, kind Warning).
fn ensure_error_coverage(feedback: &mut DetailedFeedback, matches: &DiagramMatches) {
    for result in matches.results() {
        if !result.false_negatives.is_empty() {
            let covered = feedback
                .detailed_items
                .iter()
                .any(|i| i.kind == FeedbackKind::Error && i.category == result.category.tag());
            if !covered {
                feedback.detailed_items.push(missing_item(result));
            }
        }
        if !result.false_positives.is_empty() {
            let covered = feedback
                .detailed_items
                .iter()
                .any(|i| i.kind == FeedbackKind::Warning && i.category == result.category.tag());
            if !covered {
                feedback.detailed_items.push(unexpected_item(result));
            }
        }
    }
}

fn missing_item(result: &MatchResult) -> FeedbackItem {
    FeedbackItem {
        kind: FeedbackKind::Error,
        category: result.category.tag().to_string(),
        message: format!(
            "Your diagram is missing {} expected {}(s): {}",
            result.false_negatives.len(),
            result.category,
            preview(&result.false_negatives),
        ),
        severity: Severity::High,
        actionable: true,
        examples: result.false_negatives.clone(),
    }
}

fn unexpected_item(result: &MatchResult) -> FeedbackItem {
    FeedbackItem {
        kind: FeedbackKind::Warning,
        category: result.category.tag().to_string(),
        message: format!(
            "Your diagram contains {} {}(s) with no counterpart in the expected solution: {}",
            result.false_positives.len(),
            result.category,
            preview(&result.false_positives),
        ),
        severity: Severity::Medium,
        actionable: true,
        examples: result.false_positives.clone(),
    }
}

fn preview(names: &[String]) -> String {
    const LIMIT: usize = 3;
    let shown: Vec<&str> = names.iter().take(LIMIT).map(|s| s.as_str()).collect();
    let mut text = shown.join(", ");
    if names.len() > LIMIT {
        text.push_str(&format!(" and {} more", names.len() - LIMIT));
    }
    text
}

/// Templated feedback built directly from metrics, for when the model path
/// is unavailable.
fn fallback_feedback(metrics: &DiagramMetrics) -> DetailedFeedback {
    let overall = metrics.overall_metrics;
    let mut strengths = Vec::new();
    let mut areas = Vec::new();

    for (category, m) in &metrics.component_metrics {
        if m.true_positives + m.false_positives + m.false_negatives == 0 {
            continue;
        }
        if m.f1_score >= 0.8 {
            strengths.push(format!(
                "Good coverage of {category}s ({} of {} expected matched)",
                m.true_positives,
                m.true_positives + m.false_negatives,
            ));
        } else {
            areas.push(format!(
                "Review the {category}s: {} missing, {} unexpected",
                m.false_negatives, m.false_positives,
            ));
        }
    }

    DetailedFeedback {
        summary: format!(
            "Automated feedback generation was unavailable; this summary is derived from the metrics. Your diagram matched {} of {} expected components (precision {:.2}, recall {:.2}), for a score of {:.1}/10.",
            metrics.total_matched,
            metrics.total_expected,
            overall.precision,
            overall.recall,
            metrics.final_score(),
        ),
        strengths,
        areas_for_improvement: areas,
        detailed_items: Vec::new(),
        confidence: 0.3,
    }
}

fn feedback_prompt(
    matches: &DiagramMatches,
    metrics: &DiagramMetrics,
    problem_description: &str,
) -> String {
    let overall = metrics.overall_metrics;
    let mut error_lines = String::new();
    for result in matches.results() {
        if !result.false_negatives.is_empty() {
            error_lines.push_str(&format!(
                "Missing {}s: {}\n",
                result.category,
                result.false_negatives.join(", ")
            ));
        }
        if !result.false_positives.is_empty() {
            error_lines.push_str(&format!(
                "Unexpected {}s: {}\n",
                result.category,
                result.false_positives.join(", ")
            ));
        }
    }
    if error_lines.is_empty() {
        error_lines.push_str("No discrepancies detected.\n");
    }

    format!(
        r#"You are a senior UML instructor giving FEEDBACK on a student's use-case diagram.

ASSIGNMENT:
{problem_description}

QUANTITATIVE RESULTS:
F1={:.3}, Precision={:.3}, Recall={:.3}, matched {} of {} expected components.

DISCREPANCIES:
{error_lines}
Write balanced, educational feedback: start from what is correct, explain each discrepancy and how to fix it, and keep the tone encouraging.

Respond with ONLY a JSON object in exactly this shape:
{{
  "feedback_items": [
    {{
      "type": "error|suggestion|praise|warning",
      "category": "actor|use_case|relationship|general",
      "message": "...",
      "severity": "low|medium|high",
      "actionable": true,
      "examples": ["..."]
    }}
  ],
  "summary": "...",
  "strengths": ["..."],
  "areas_for_improvement": ["..."],
  "confidence": 0.9
}}

Limit feedback_items to the most important 8 issues."#,
        overall.f1_score, overall.precision, overall.recall,
        metrics.total_matched, metrics.total_expected,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CategoryWeights;
    use crate::llm::MockLlmProvider;
    use crate::matcher::ComponentMatcher;
    use crate::types::ComponentSet;

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            max_retries: 1,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
            backoff_multiplier: 1.0,
            jitter: false,
        }
    }

    fn generator(provider: Arc<MockLlmProvider>) -> FeedbackGenerator {
        FeedbackGenerator::new(provider, fast_retry(), 0.3, 1024)
    }

    /// Matches with one missing use case and one unexpected actor.
    fn sample_matches() -> DiagramMatches {
        let mut actual = ComponentSet::new("actual");
        actual.push_actor(crate::types::Actor::new("User"));
        actual.push_actor(crate::types::Actor::new("Ghost"));
        actual.push_use_case(crate::types::UseCase::new("Login"));
        let mut expected = ComponentSet::new("expected");
        expected.push_actor(crate::types::Actor::new("User"));
        expected.push_use_case(crate::types::UseCase::new("Login"));
        expected.push_use_case(crate::types::UseCase::new("Logout"));
        ComponentMatcher::new(0.85).match_diagrams(&actual, &expected)
    }

    fn sample_metrics(matches: &DiagramMatches) -> DiagramMetrics {
        DiagramMetrics::compute(matches, &CategoryWeights::default())
    }

    const MODEL_FEEDBACK: &str = r#"{
        "feedback_items": [
            {"type": "praise", "category": "actor", "message": "User actor is correct", "severity": "low", "actionable": false}
        ],
        "summary": "Solid start.",
        "strengths": ["Correct main actor"],
        "areas_for_improvement": ["Add the logout flow"],
        "confidence": 0.9
    }"#;

    #[tokio::test]
    async fn test_model_feedback_parsed_and_coverage_added() {
        let provider = Arc::new(MockLlmProvider::with_response(MODEL_FEEDBACK));
        let matches = sample_matches();
        let metrics = sample_metrics(&matches);
        let log = GenerationLog::new();

        let outcome = generator(provider)
            .generate(&matches, &metrics, "Build a login system", &log)
            .await;

        assert!(outcome.model_generated);
        assert_eq!(outcome.feedback.summary, "Solid start.");
        // Coverage pass: missing use case (error) and unexpected actor
        // (warning) were not in the model items, so they were appended.
        assert!(outcome.feedback.detailed_items.iter().any(
            |i| i.kind == FeedbackKind::Error && i.category == "use_case"
        ));
        assert!(outcome.feedback.detailed_items.iter().any(
            |i| i.kind == FeedbackKind::Warning && i.category == "actor"
        ));
    }

    #[tokio::test]
    async fn test_coverage_not_duplicated_when_model_covers() {
        let covering = r#"{
            "feedback_items": [
                {"type": "error", "category": "use_case", "message": "Logout is missing", "severity": "high", "actionable": true},
                {"type": "warning", "category": "actor", "message": "Ghost is not needed", "severity": "medium", "actionable": true}
            ],
            "summary": "See items.",
            "strengths": [],
            "areas_for_improvement": [],
            "confidence": 0.8
        }"#;
        let provider = Arc::new(MockLlmProvider::with_response(covering));
        let matches = sample_matches();
        let metrics = sample_metrics(&matches);
        let log = GenerationLog::new();

        let outcome = generator(provider)
            .generate(&matches, &metrics, "desc", &log)
            .await;
        assert_eq!(outcome.feedback.detailed_items.len(), 2);
    }

    #[tokio::test]
    async fn test_model_failure_falls_back_to_template() {
        let provider = Arc::new(MockLlmProvider::new());
        provider.stub_error(
            "FEEDBACK",
            LlmError::Connection {
                message: "down".into(),
            },
        );
        let matches = sample_matches();
        let metrics = sample_metrics(&matches);
        let log = GenerationLog::new();

        let outcome = generator(provider)
            .generate(&matches, &metrics, "desc", &log)
            .await;

        assert!(!outcome.model_generated);
        assert_eq!(outcome.warnings.len(), 1);
        assert!(outcome.feedback.summary.contains("derived from the metrics"));
        // Detected errors still surface through the coverage pass.
        assert!(outcome
            .feedback
            .detailed_items
            .iter()
            .any(|i| i.kind == FeedbackKind::Error));
        // Every attempt is in the log.
        assert_eq!(log.snapshot().await.len(), 2);
    }

    #[tokio::test]
    async fn test_unparsable_feedback_retries_then_falls_back() {
        let provider = Arc::new(MockLlmProvider::with_response("not json at all"));
        let matches = sample_matches();
        let metrics = sample_metrics(&matches);
        let log = GenerationLog::new();

        let outcome = generator(provider)
            .generate(&matches, &metrics, "desc", &log)
            .await;
        assert!(!outcome.model_generated);
        assert_eq!(log.snapshot().await.len(), 2);
    }

    #[test]
    fn test_fallback_feedback_reflects_metrics() {
        let matches = sample_matches();
        let metrics = sample_metrics(&matches);
        let feedback = fallback_feedback(&metrics);

        assert!(feedback.summary.contains("matched 2 of 3"));
        assert!(!feedback.areas_for_improvement.is_empty() || !feedback.strengths.is_empty());
        assert!(feedback.confidence < 0.5);
    }

    #[test]
    fn test_ensure_error_coverage_on_clean_result() {
        let mut set = ComponentSet::new("s");
        set.push_actor(crate::types::Actor::new("User"));
        let matches = ComponentMatcher::new(0.85).match_diagrams(&set, &set);
        let mut feedback = fallback_feedback(&sample_metrics(&matches));
        feedback.detailed_items.clear();

        ensure_error_coverage(&mut feedback, &matches);
        assert!(feedback.detailed_items.is_empty());
    }

    #[test]
    fn test_preview_truncates() {
        let names: Vec<String> = (0..5).map(|i| format!("n{i}")).collect();
        let text = preview(&names);
        assert!(text.starts_with("n0, n1, n2"));
        assert!(text.contains("and 2 more"));
    }
}
