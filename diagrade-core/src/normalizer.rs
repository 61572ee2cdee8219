//! Convention normalization.
//!
//! Rewrites the student diagram's naming and labeling style to mirror the
//! reference diagram's conventions before comparison, so superficial naming
//! differences do not defeat matching. This stage is an accuracy
//! optimization, not a correctness requirement: every failure path returns
//! the original student source with a warning, and the pipeline proceeds.

use crate::config::PipelineConfig;
use crate::llm::{GenerationRequest, LlmProvider};
use crate::parser::UseCaseParser;
use crate::telemetry::{logged_generate, GenerationLog};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Outcome of the normalization stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizationOutcome {
    /// Source to use downstream: the rewrite if it passed validation,
    /// otherwise the original student source unchanged.
    pub normalized_source: String,
    /// Whether the rewrite was applied.
    pub applied: bool,
    pub warnings: Vec<String>,
}

/// Rewrites student naming style to match the reference's conventions.
pub struct ConventionNormalizer {
    provider: Arc<dyn LlmProvider>,
    parser: UseCaseParser,
    temperature: f32,
    max_tokens: usize,
}

impl ConventionNormalizer {
    pub fn new(provider: Arc<dyn LlmProvider>, config: &PipelineConfig) -> Self {
        Self {
            provider,
            parser: UseCaseParser::new(),
            temperature: config.normalization_temperature,
            max_tokens: 4096,
        }
    }

    /// Normalize the student source against the reference's conventions.
    ///
    /// Never fails: a model error, an empty rewrite, or a rewrite that
    /// changes the diagram's component structure all degrade to the
    /// original source.
    pub async fn normalize(
        &self,
        student_source: &str,
        reference_source: &str,
        log: &GenerationLog,
    ) -> NormalizationOutcome {
        let prompt = normalization_prompt(student_source, reference_source);
        let request = GenerationRequest::new(prompt)
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens);

        let response = match logged_generate(
            self.provider.as_ref(),
            log,
            "normalization: convention rewrite",
            request,
        )
        .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Normalization call failed, keeping original source");
                return Self::unchanged(
                    student_source,
                    format!("convention normalization skipped: {e}"),
                );
            }
        };

        let rewritten = strip_code_fences(&response.text);
        if rewritten.trim().is_empty() {
            return Self::unchanged(
                student_source,
                "convention normalization returned an empty rewrite".to_string(),
            );
        }

        // Semantic guard: the rewrite may change names only. A different
        // per-category component count means the model altered the diagram.
        let original = self.parser.parse(student_source, "original");
        let normalized = self.parser.parse(&rewritten, "normalized");
        if original.category_counts() != normalized.category_counts() {
            warn!(
                original = ?original.category_counts(),
                normalized = ?normalized.category_counts(),
                "Normalization changed component structure, keeping original source"
            );
            return Self::unchanged(
                student_source,
                "convention normalization altered diagram structure and was discarded".to_string(),
            );
        }

        info!("Convention normalization applied");
        NormalizationOutcome {
            normalized_source: rewritten,
            applied: true,
            warnings: Vec::new(),
        }
    }

    fn unchanged(student_source: &str, warning: String) -> NormalizationOutcome {
        NormalizationOutcome {
            normalized_source: student_source.to_string(),
            applied: false,
            warnings: vec![warning],
        }
    }
}

/// Strip a leading/trailing markdown code fence from model output.
fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };
    // Drop the info string ("plantuml", "uml", ...) on the opening fence.
    let rest = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    rest.trim_end()
        .strip_suffix("```")
        .unwrap_or(rest)
        .trim()
        .to_string()
}

fn normalization_prompt(student_source: &str, reference_source: &str) -> String {
    format!(
        r#"You are a UML style normalizer. Rewrite the STUDENT DIAGRAM so its naming and labeling conventions match the REFERENCE DIAGRAM, without changing what the diagram expresses.

REFERENCE DIAGRAM (convention ground truth):
{reference_source}

STUDENT DIAGRAM (to rewrite):
{student_source}

Rules:
- Keep every actor, use case, and relationship of the student diagram. Add nothing, remove nothing.
- Only adjust naming style: casing, spacing, wording variants, abbreviations, and label phrasing, to mirror the reference's conventions.
- Preserve the student's diagram syntax.

Respond with ONLY the rewritten diagram source, no commentary."#
    )
}
