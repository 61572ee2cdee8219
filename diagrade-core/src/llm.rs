//! LLM capability seam.
//!
//! Defines the `LlmProvider` trait through which every pipeline stage that
//! needs a model call reaches the outside world. Swapping providers must not
//! alter pipeline logic, so the trait surface is intentionally narrow:
//! a prompt goes in, text comes out, errors are structured `LlmError`s.

use crate::error::LlmError;
use async_trait::async_trait;
use std::collections::VecDeque;

/// A single generation request.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: usize,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            temperature: 0.1,
            max_tokens: 2048,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// A single generation response.
#[derive(Debug, Clone)]
pub struct GenerationResponse {
    pub text: String,
    pub model: String,
}

/// Trait for LLM providers.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Perform a full (non-streaming) generation and return the response.
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, LlmError>;

    /// Return the model name.
    fn model_name(&self) -> &str;
}

/// Extract the outermost JSON object from model output.
///
/// Models frequently wrap JSON in prose or markdown fences; the first `{`
/// to the last `}` slice is decoded and everything around it ignored.
pub fn extract_json_payload(text: &str) -> Result<serde_json::Value, LlmError> {
    let start = text.find('{').ok_or_else(|| LlmError::ResponseParse {
        message: "no JSON object found in model response".to_string(),
    })?;
    let end = text.rfind('}').ok_or_else(|| LlmError::ResponseParse {
        message: "unterminated JSON object in model response".to_string(),
    })?;
    if end < start {
        return Err(LlmError::ResponseParse {
            message: "malformed JSON object in model response".to_string(),
        });
    }
    serde_json::from_str(&text[start..=end]).map_err(|e| LlmError::ResponseParse {
        message: format!("invalid JSON in model response: {e}"),
    })
}

/// A mock LLM provider for testing and development.
///
/// Responses can be routed by prompt content with [`stub`](Self::stub) /
/// [`stub_error`](Self::stub_error), which matters when the pipeline issues
/// concurrent calls: queue order alone would be racy, prompt routing is not.
/// Unrouted calls drain the default queue.
pub struct MockLlmProvider {
    model: String,
    rules: std::sync::Mutex<Vec<StubRule>>,
    default_queue: std::sync::Mutex<VecDeque<Result<String, LlmError>>>,
}

struct StubRule {
    pattern: String,
    responses: VecDeque<Result<String, LlmError>>,
}

impl MockLlmProvider {
    pub fn new() -> Self {
        Self {
            model: "mock-model".to_string(),
            rules: std::sync::Mutex::new(Vec::new()),
            default_queue: std::sync::Mutex::new(VecDeque::new()),
        }
    }

    /// Create a provider that always returns the given text.
    pub fn with_response(text: &str) -> Self {
        let provider = Self::new();
        for _ in 0..20 {
            provider.queue_response(text);
        }
        provider
    }

    /// Queue a response on the default (unrouted) queue.
    pub fn queue_response(&self, text: &str) {
        self.default_queue
            .lock()
            .unwrap()
            .push_back(Ok(text.to_string()));
    }

    /// Queue an error on the default (unrouted) queue.
    pub fn queue_error(&self, error: LlmError) {
        self.default_queue.lock().unwrap().push_back(Err(error));
    }

    /// Route prompts containing `pattern` to the given response. Repeated
    /// calls with the same pattern queue further responses on that rule.
    pub fn stub(&self, pattern: &str, text: &str) {
        self.push_rule(pattern, Ok(text.to_string()));
    }

    /// Route prompts containing `pattern` to the given error.
    pub fn stub_error(&self, pattern: &str, error: LlmError) {
        self.push_rule(pattern, Err(error));
    }

    fn push_rule(&self, pattern: &str, response: Result<String, LlmError>) {
        let mut rules = self.rules.lock().unwrap();
        if let Some(rule) = rules.iter_mut().find(|r| r.pattern == pattern) {
            rule.responses.push_back(response);
        } else {
            let mut responses = VecDeque::new();
            responses.push_back(response);
            rules.push(StubRule {
                pattern: pattern.to_string(),
                responses,
            });
        }
    }

    fn next_for(&self, prompt: &str) -> Option<Result<String, LlmError>> {
        let mut rules = self.rules.lock().unwrap();
        for rule in rules.iter_mut() {
            if prompt.contains(&rule.pattern) {
                // A drained rule keeps serving its last response so stages
                // with internal retries stay scriptable with one stub call.
                return match rule.responses.len() {
                    0 => None,
                    1 => rule.responses.front().cloned(),
                    _ => rule.responses.pop_front(),
                };
            }
        }
        None
    }
}

impl Default for MockLlmProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, LlmError> {
        let outcome = match self.next_for(&request.prompt) {
            Some(outcome) => outcome,
            None => self
                .default_queue
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| {
                    Err(LlmError::Connection {
                        message: "mock provider has no response for this prompt".to_string(),
                    })
                }),
        };
        outcome.map(|text| GenerationResponse {
            text,
            model: self.model.clone(),
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_default_queue_order() {
        let provider = MockLlmProvider::new();
        provider.queue_response("first");
        provider.queue_response("second");

        let r1 = provider.generate(GenerationRequest::new("x")).await.unwrap();
        let r2 = provider.generate(GenerationRequest::new("y")).await.unwrap();
        assert_eq!(r1.text, "first");
        assert_eq!(r2.text, "second");
    }

    #[tokio::test]
    async fn test_mock_routes_by_pattern() {
        let provider = MockLlmProvider::new();
        provider.stub("STUDENT", "{\"side\": \"student\"}");
        provider.stub("REFERENCE", "{\"side\": \"reference\"}");

        let r = provider
            .generate(GenerationRequest::new("extract from REFERENCE please"))
            .await
            .unwrap();
        assert_eq!(r.text, "{\"side\": \"reference\"}");

        let r = provider
            .generate(GenerationRequest::new("extract from STUDENT please"))
            .await
            .unwrap();
        assert_eq!(r.text, "{\"side\": \"student\"}");
    }

    #[tokio::test]
    async fn test_mock_repeats_last_stub_response() {
        let provider = MockLlmProvider::new();
        provider.stub("ping", "pong");

        for _ in 0..3 {
            let r = provider
                .generate(GenerationRequest::new("ping"))
                .await
                .unwrap();
            assert_eq!(r.text, "pong");
        }
    }

    #[tokio::test]
    async fn test_mock_errors() {
        let provider = MockLlmProvider::new();
        provider.stub_error(
            "boom",
            LlmError::RateLimited {
                retry_after_secs: 5,
            },
        );

        let err = provider
            .generate(GenerationRequest::new("boom"))
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::RateLimited { .. }));
    }

    #[tokio::test]
    async fn test_mock_exhausted_is_connection_error() {
        let provider = MockLlmProvider::new();
        let err = provider
            .generate(GenerationRequest::new("anything"))
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Connection { .. }));
    }

    #[test]
    fn test_extract_json_payload_plain() {
        let value = extract_json_payload("{\"a\": 1}").unwrap();
        assert_eq!(value["a"], 1);
    }

    #[test]
    fn test_extract_json_payload_fenced() {
        let text = "Here you go:\n```json\n{\"actors\": []}\n```\nDone.";
        let value = extract_json_payload(text).unwrap();
        assert!(value["actors"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_extract_json_payload_missing() {
        assert!(extract_json_payload("no json here").is_err());
    }
}
