//! LLM-based component extraction.
//!
//! Turns diagram source text and the free-text problem description into
//! structured [`ComponentSet`]s via model calls. The student set comes from
//! one call over the (normalized) student source; the expected set from one
//! combined call over the reference source plus the problem description.
//! Both are required: exhausting retries on either is fatal to the run.
//!
//! The model is asked for a fixed JSON shape; anything that does not decode
//! into it counts as a parse failure and is retried with backoff, leaving
//! one generation-log record per attempt.

use crate::config::RetryConfig;
use crate::error::{LlmError, PipelineError};
use crate::llm::{extract_json_payload, GenerationRequest, LlmProvider};
use crate::providers::with_retry;
use crate::telemetry::{logged_call, GenerationLog};
use crate::types::{Actor, ComponentSet, Relationship, RelationKind, UseCase};
use serde::Deserialize;
use tracing::info;

/// Wire shape the extraction prompt asks the model to produce.
#[derive(Debug, Deserialize)]
struct RawExtraction {
    #[serde(default)]
    actors: Vec<RawActor>,
    #[serde(default)]
    use_cases: Vec<RawUseCase>,
    #[serde(default)]
    relationships: Vec<RawRelationship>,
}

#[derive(Debug, Deserialize)]
struct RawActor {
    name: String,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawUseCase {
    name: String,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawRelationship {
    source: String,
    target: String,
    #[serde(default)]
    kind: Option<String>,
}

/// Extracts structured component sets via the LLM capability.
pub struct ComponentExtractor {
    provider: std::sync::Arc<dyn LlmProvider>,
    retry: RetryConfig,
    temperature: f32,
    max_tokens: usize,
}

impl ComponentExtractor {
    pub fn new(
        provider: std::sync::Arc<dyn LlmProvider>,
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

    /// Extract the actual component set from the student's diagram source.
    pub async fn extract_student(
        &self,
        source: &str,
        log: &GenerationLog,
    ) -> Result<ComponentSet, PipelineError> {
        let prompt = student_prompt(source);
        self.extract_with_retry("extraction: student diagram", "student diagram", prompt, log)
            .await
    }

    /// Extract the expected component set from the reference diagram source
    /// and the problem description in one combined call.
    pub async fn extract_expected(
        &self,
        reference_source: &str,
        problem_description: &str,
        log: &GenerationLog,
    ) -> Result<ComponentSet, PipelineError> {
        let prompt = expected_prompt(reference_source, problem_description);
        self.extract_with_retry(
            "extraction: reference and description",
            "reference description",
            prompt,
            log,
        )
        .await
    }

    async fn extract_with_retry(
        &self,
        step_name: &str,
        side: &str,
        prompt: String,
        log: &GenerationLog,
    ) -> Result<ComponentSet, PipelineError> {
        let set_name = side.to_string();
        let result = with_retry(&self.retry, |attempt| {
            let prompt = prompt.clone();
            let set_name = set_name.clone();
            async move {
                if attempt > 0 {
                    info!(step = step_name, attempt, "Re-attempting extraction");
                }
                let request = GenerationRequest::new(prompt)
                    .with_temperature(self.temperature)
                    .with_max_tokens(self.max_tokens);
                logged_call(self.provider.as_ref(), log, step_name, request, |text| {
                    parse_extraction(text, &set_name)
                })
                .await
            }
        })
        .await;

        result.map_err(|e| PipelineError::Extraction {
            side: side.to_string(),
            message: e.to_string(),
        })
    }
}

/// Decode model output into a component set, folding duplicates.
fn parse_extraction(text: &str, set_name: &str) -> Result<ComponentSet, LlmError> {
    let value = extract_json_payload(text)?;
    let raw: RawExtraction =
        serde_json::from_value(value).map_err(|e| LlmError::ResponseParse {
            message: format!("extraction JSON does not match the expected schema: {e}"),
        })?;

    let mut set = ComponentSet::new(set_name);
    for actor in raw.actors {
        set.push_actor(Actor {
            name: actor.name,
            description: actor.description,
            aliases: Vec::new(),
        });
    }
    for use_case in raw.use_cases {
        set.push_use_case(UseCase {
            name: use_case.name,
            description: use_case.description,
            aliases: Vec::new(),
        });
    }
    for rel in raw.relationships {
        let kind = rel
            .kind
            .as_deref()
            .map(RelationKind::parse)
            .unwrap_or_default();
        set.push_relationship(Relationship::new(rel.source, rel.target, kind));
    }
    Ok(set)
}

fn student_prompt(source: &str) -> String {
    format!(
        r#"You are a UML analysis engine. Extract every component from the STUDENT DIAGRAM SOURCE below.

STUDENT DIAGRAM SOURCE:
{source}

Identify:
- actors: entities outside the system that interact with it
- use_cases: units of functionality the system offers
- relationships: connections between the above, with kind one of association, include, extend, generalization

Respond with ONLY a JSON object in exactly this shape:
{{
  "actors": [{{"name": "...", "description": "..."}}],
  "use_cases": [{{"name": "...", "description": "..."}}],
  "relationships": [{{"source": "...", "target": "...", "kind": "association"}}]
}}

Use the component names exactly as written in the source. Do not invent components that are not present."#
    )
}

fn expected_prompt(reference_source: &str, problem_description: &str) -> String {
    format!(
        r#"You are a UML analysis engine. Determine the components a correct solution requires, using the REFERENCE DIAGRAM SOURCE as ground truth and the PROBLEM DESCRIPTION as context.

REFERENCE DIAGRAM SOURCE:
{reference_source}

PROBLEM DESCRIPTION:
{problem_description}

Identify the required:
- actors: entities outside the system that interact with it
- use_cases: units of functionality the system must offer
- relationships: connections between the above, with kind one of association, include, extend, generalization

Respond with ONLY a JSON object in exactly this shape:
{{
  "actors": [{{"name": "...", "description": "..."}}],
  "use_cases": [{{"name": "...", "description": "..."}}],
  "relationships": [{{"source": "...", "target": "...", "kind": "association"}}]
}}

Prefer the reference diagram's component names. Do not invent components required by neither the reference nor the description."#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmProvider;
    use std::sync::Arc;

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            max_retries: 2,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
            backoff_multiplier: 1.0,
            jitter: false,
        }
    }

    fn extractor(provider: Arc<MockLlmProvider>) -> ComponentExtractor {
        ComponentExtractor::new(provider, fast_retry(), 0.1, 1024)
    }

    const VALID_EXTRACTION: &str = r#"{
        "actors": [{"name": "User", "description": "end user"}],
        "use_cases": [{"name": "Login"}, {"name": "Logout"}],
        "relationships": [{"source": "User", "target": "Login", "kind": "association"}]
    }"#;

    #[tokio::test]
    async fn test_extract_student_parses_components() {
        let provider = Arc::new(MockLlmProvider::new());
        provider.stub("STUDENT DIAGRAM SOURCE", VALID_EXTRACTION);
        let log = GenerationLog::new();

        let set = extractor(provider)
            .extract_student("actor User\n(Login)", &log)
            .await
            .unwrap();

        assert_eq!(set.actors.len(), 1);
        assert_eq!(set.actors[0].description.as_deref(), Some("end user"));
        assert_eq!(set.use_cases.len(), 2);
        assert_eq!(set.relationships.len(), 1);
        assert_eq!(log.snapshot().await.len(), 1);
    }

    #[tokio::test]
    async fn test_extract_expected_uses_combined_prompt() {
        let provider = Arc::new(MockLlmProvider::new());
        provider.stub("REFERENCE DIAGRAM SOURCE", r#"{"actors": [], "use_cases": [], "relationships": []}"#);
        let log = GenerationLog::new();

        let set = extractor(provider)
            .extract_expected("actor User", "Users must log in.", &log)
            .await
            .unwrap();
        assert!(set.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_response_retries_then_succeeds() {
        let provider = Arc::new(MockLlmProvider::new());
        provider.stub("STUDENT DIAGRAM SOURCE", "sorry, I cannot do that");
        provider.stub("STUDENT DIAGRAM SOURCE", VALID_EXTRACTION);
        let log = GenerationLog::new();

        let set = extractor(provider)
            .extract_student("actor User", &log)
            .await
            .unwrap();
        assert_eq!(set.actors.len(), 1);

        // Both attempts logged; the first carries the parse error.
        let records = log.snapshot().await;
        assert_eq!(records.len(), 2);
        assert!(records[0].error.is_some());
        assert!(records[0].response.is_some());
        assert!(records[1].error.is_none());
    }

    #[tokio::test]
    async fn test_retry_exhaustion_is_fatal_with_full_log() {
        let provider = Arc::new(MockLlmProvider::new());
        provider.stub("STUDENT DIAGRAM SOURCE", "still not json");
        let log = GenerationLog::new();

        let err = extractor(provider)
            .extract_student("actor User", &log)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Extraction { .. }));

        // Initial attempt plus two retries, each with its own error.
        let records = log.snapshot().await;
        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r.error.is_some()));
    }

    #[tokio::test]
    async fn test_duplicate_components_fold() {
        let provider = Arc::new(MockLlmProvider::new());
        provider.stub(
            "STUDENT DIAGRAM SOURCE",
            r#"{"actors": [{"name": "User"}, {"name": "user"}], "use_cases": [], "relationships": []}"#,
        );
        let log = GenerationLog::new();

        let set = extractor(provider)
            .extract_student("actor User", &log)
            .await
            .unwrap();
        assert_eq!(set.actors.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_relation_kind_defaults_to_association() {
        let provider = Arc::new(MockLlmProvider::new());
        provider.stub(
            "STUDENT DIAGRAM SOURCE",
            r#"{"actors": [], "use_cases": [], "relationships": [{"source": "A", "target": "B", "kind": "talks-to"}]}"#,
        );
        let log = GenerationLog::new();

        let set = extractor(provider)
            .extract_student("actor A", &log)
            .await
            .unwrap();
        assert_eq!(set.relationships[0].kind, RelationKind::Association);
    }

    #[test]
    fn test_parse_extraction_accepts_fenced_json() {
        let text = format!("```json\n{VALID_EXTRACTION}\n```");
        let set = parse_extraction(&text, "s").unwrap();
        assert_eq!(set.use_cases.len(), 2);
    }

    #[test]
    fn test_parse_extraction_rejects_wrong_shape() {
        let err = parse_extraction(r#"{"actors": "not a list"}"#, "s").unwrap_err();
        assert!(matches!(err, LlmError::ResponseParse { .. }));
    }
}
