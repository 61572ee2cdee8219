//! Google Gemini API provider implementation.
//!
//! Implements the `LlmProvider` trait against the Gemini `generateContent`
//! endpoint. Auth is via `?key=` query parameter; the response text is the
//! concatenation of the first candidate's content parts.

use crate::config::LlmConfig;
use crate::error::LlmError;
use crate::llm::{GenerationRequest, GenerationResponse, LlmProvider};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// The default Gemini API base URL.
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Google Gemini provider.
pub struct GeminiProvider {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout_secs: u64,
}

impl GeminiProvider {
    /// Create a new Gemini provider from configuration.
    ///
    /// Reads the API key from the environment variable specified in
    /// `config.api_key_env`. Returns `LlmError::AuthFailed` if it is not set.
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = super::resolve_api_key(config)?;
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::Connection {
                message: format!("Failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            base_url,
            api_key,
            model: config.model.clone(),
            timeout_secs: config.timeout_secs,
        })
    }

    fn endpoint_url(&self) -> String {
        format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        )
    }

    fn build_request_body(&self, request: &GenerationRequest) -> Value {
        serde_json::json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": request.prompt }],
            }],
            "generationConfig": {
                "temperature": request.temperature,
                "maxOutputTokens": request.max_tokens,
            },
        })
    }

    fn map_http_error(status: reqwest::StatusCode, body_text: &str) -> LlmError {
        match status.as_u16() {
            401 | 403 => LlmError::AuthFailed {
                provider: "Gemini".to_string(),
            },
            429 => LlmError::RateLimited {
                retry_after_secs: 30,
            },
            500..=599 => LlmError::Connection {
                message: format!("HTTP {status} from Gemini API: {body_text}"),
            },
            _ => LlmError::ApiRequest {
                message: format!("HTTP {status} from Gemini API: {body_text}"),
            },
        }
    }

    /// Extract the generated text from a Gemini response body.
    fn parse_response(response: &Value) -> Result<String, LlmError> {
        let parts = response["candidates"]
            .get(0)
            .and_then(|c| c["content"]["parts"].as_array())
            .ok_or_else(|| LlmError::ResponseParse {
                message: "Gemini response has no candidate content parts".to_string(),
            })?;

        let text: String = parts
            .iter()
            .filter_map(|p| p["text"].as_str())
            .collect::<Vec<_>>()
            .join("");

        if text.is_empty() {
            return Err(LlmError::ResponseParse {
                message: "Gemini response contained no text parts".to_string(),
            });
        }
        Ok(text)
    }
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, LlmError> {
        let body = self.build_request_body(&request);
        let url = self.endpoint_url();

        debug!(model = self.model.as_str(), "Sending Gemini generation request");

        let response = self
            .client
            .post(&url)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout {
                        timeout_secs: self.timeout_secs,
                    }
                } else {
                    LlmError::Connection {
                        message: format!("Request to Gemini API failed: {e}"),
                    }
                }
            })?;

        let status = response.status();
        let body_text = response.text().await.map_err(|e| LlmError::ResponseParse {
            message: format!("Failed to read response body: {e}"),
        })?;

        if !status.is_success() {
            return Err(Self::map_http_error(status, &body_text));
        }

        let response_json: Value =
            serde_json::from_str(&body_text).map_err(|e| LlmError::ResponseParse {
                message: format!("Invalid JSON in response: {e}"),
            })?;

        let text = Self::parse_response(&response_json)?;
        Ok(GenerationResponse {
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

    fn test_config() -> LlmConfig {
        LlmConfig {
            provider: "gemini".to_string(),
            model: "gemini-test".to_string(),
            api_key_env: "DIAGRADE_GEMINI_TEST_KEY".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_new_reads_key_from_env() {
        unsafe { std::env::set_var("DIAGRADE_GEMINI_TEST_KEY", "key-abc") };
        let provider = GeminiProvider::new(&test_config()).unwrap();
        assert_eq!(provider.model_name(), "gemini-test");
        assert_eq!(provider.base_url, DEFAULT_BASE_URL);
        assert!(provider.endpoint_url().contains("key=key-abc"));
        unsafe { std::env::remove_var("DIAGRADE_GEMINI_TEST_KEY") };
    }

    #[test]
    fn test_map_http_error() {
        assert!(matches!(
            GeminiProvider::map_http_error(reqwest::StatusCode::UNAUTHORIZED, ""),
            LlmError::AuthFailed { .. }
        ));
        assert!(matches!(
            GeminiProvider::map_http_error(reqwest::StatusCode::TOO_MANY_REQUESTS, ""),
            LlmError::RateLimited { .. }
        ));
        assert!(matches!(
            GeminiProvider::map_http_error(reqwest::StatusCode::INTERNAL_SERVER_ERROR, "boom"),
            LlmError::Connection { .. }
        ));
        assert!(matches!(
            GeminiProvider::map_http_error(reqwest::StatusCode::BAD_REQUEST, "bad"),
            LlmError::ApiRequest { .. }
        ));
    }

    #[test]
    fn test_parse_response_extracts_text() {
        let response = serde_json::json!({
            "candidates": [{
                "content": {
                    "parts": [
                        { "text": "Hello " },
                        { "text": "world" }
                    ]
                }
            }]
        });
        assert_eq!(GeminiProvider::parse_response(&response).unwrap(), "Hello world");
    }

    #[test]
    fn test_parse_response_empty_is_error() {
        let response = serde_json::json!({ "candidates": [] });
        assert!(matches!(
            GeminiProvider::parse_response(&response),
            Err(LlmError::ResponseParse { .. })
        ));
    }
}
