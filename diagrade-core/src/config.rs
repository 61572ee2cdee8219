//! Configuration system for Diagrade.
//!
//! Uses `figment` for layered configuration: defaults -> config file ->
//! environment. Configuration is loaded from
//! `~/.config/diagrade/config.toml` and/or `diagrade.toml` in the working
//! directory, then overridden by `DIAGRADE_`-prefixed environment variables
//! (e.g. `DIAGRADE_LLM__MODEL`, `DIAGRADE_MATCHING__SIMILARITY_THRESHOLD`).

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;

/// Top-level configuration for the scoring pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoringConfig {
    pub llm: LlmConfig,
    pub weights: CategoryWeights,
    pub grading: GradingConfig,
    pub matching: MatchingConfig,
    pub pipeline: PipelineConfig,
}

/// Configuration for the LLM provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider name: "gemini" or "openai" (any OpenAI-compatible endpoint).
    pub provider: String,
    /// Model identifier (e.g., "gemini-2.5-flash", "gpt-4.1-nano").
    pub model: String,
    /// Environment variable name containing the API key.
    pub api_key_env: String,
    /// Optional base URL override for the API endpoint.
    pub base_url: Option<String>,
    /// Maximum tokens to generate in a response.
    pub max_tokens: usize,
    /// Request timeout in seconds for a single model call.
    pub timeout_secs: u64,
    /// Provider rate-limit budget in requests per minute; batch scoring
    /// paces itself against this instead of busy-retrying into 429s.
    pub rate_limit_rpm: u32,
    /// Retry policy for transient call failures.
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "gemini".to_string(),
            model: "gemini-2.5-flash".to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
            base_url: None,
            max_tokens: 2048,
            timeout_secs: 60,
            rate_limit_rpm: 15,
            retry: RetryConfig::default(),
        }
    }
}

/// Retry policy with exponential backoff for transient LLM errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retries after the initial attempt.
    pub max_retries: u32,
    /// Initial backoff delay in milliseconds.
    pub initial_backoff_ms: u64,
    /// Maximum backoff delay in milliseconds.
    pub max_backoff_ms: u64,
    /// Multiplier applied to the backoff after each attempt.
    pub backoff_multiplier: f64,
    /// Whether to add random jitter to backoff delays.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 1000,
            max_backoff_ms: 32_000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Per-category weights for the composite similarity score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CategoryWeights {
    pub actors: f64,
    pub use_cases: f64,
    pub relationships: f64,
}

impl Default for CategoryWeights {
    fn default() -> Self {
        Self {
            actors: 0.3,
            use_cases: 0.5,
            relationships: 0.2,
        }
    }
}

impl CategoryWeights {
    /// Sum of all weights.
    pub fn total(&self) -> f64 {
        self.actors + self.use_cases + self.relationships
    }
}

/// A single grade breakpoint: scores at or above `min_score` earn `letter`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeBreakpoint {
    pub min_score: f64,
    pub letter: char,
}

/// Letter-grade configuration over the 0-10 final-score scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradingConfig {
    /// Breakpoints checked in descending `min_score` order.
    pub breakpoints: Vec<GradeBreakpoint>,
    /// Letter assigned when no breakpoint matches.
    pub fallback_letter: char,
}

impl Default for GradingConfig {
    fn default() -> Self {
        Self {
            breakpoints: vec![
                GradeBreakpoint {
                    min_score: 9.0,
                    letter: 'A',
                },
                GradeBreakpoint {
                    min_score: 8.0,
                    letter: 'B',
                },
                GradeBreakpoint {
                    min_score: 7.0,
                    letter: 'C',
                },
                GradeBreakpoint {
                    min_score: 6.0,
                    letter: 'D',
                },
            ],
            fallback_letter: 'F',
        }
    }
}

impl GradingConfig {
    /// Map a final score to its letter grade.
    pub fn letter_for(&self, score: f64) -> char {
        let mut sorted = self.breakpoints.clone();
        sorted.sort_by(|a, b| b.min_score.total_cmp(&a.min_score));
        for bp in &sorted {
            if score >= bp.min_score {
                return bp.letter;
            }
        }
        self.fallback_letter
    }
}

/// Configuration for the component matcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingConfig {
    /// Minimum name-similarity ratio for a fuzzy candidate pair.
    pub similarity_threshold: f64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.85,
        }
    }
}

/// Coordinator-level knobs: per-stage temperatures, timeouts, batch limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Sampling temperature for the convention-normalization call.
    pub normalization_temperature: f32,
    /// Sampling temperature for the extraction calls.
    pub extraction_temperature: f32,
    /// Sampling temperature for the feedback call.
    pub feedback_temperature: f32,
    /// Wall-clock budget per pipeline stage in seconds. A stage exceeding
    /// its budget is treated as a model failure for that stage.
    pub stage_timeout_secs: u64,
    /// Maximum number of submissions accepted in one batch request.
    pub max_batch_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            normalization_temperature: 0.1,
            extraction_temperature: 0.1,
            feedback_temperature: 0.3,
            stage_timeout_secs: 120,
            max_batch_size: 10,
        }
    }
}

impl ScoringConfig {
    /// Validate cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let w = &self.weights;
        if w.actors < 0.0 || w.use_cases < 0.0 || w.relationships < 0.0 {
            return Err(ConfigError::Invalid {
                message: "category weights must be non-negative".to_string(),
            });
        }
        if w.total() <= 0.0 {
            return Err(ConfigError::Invalid {
                message: "category weights must not all be zero".to_string(),
            });
        }
        let t = self.matching.similarity_threshold;
        if !(0.0..=1.0).contains(&t) {
            return Err(ConfigError::Invalid {
                message: format!("similarity_threshold must be in [0, 1], got {t}"),
            });
        }
        for temp in [
            self.pipeline.normalization_temperature,
            self.pipeline.extraction_temperature,
            self.pipeline.feedback_temperature,
        ] {
            if !(0.0..=2.0).contains(&temp) {
                return Err(ConfigError::Invalid {
                    message: format!("temperature must be in [0, 2], got {temp}"),
                });
            }
        }
        if self.pipeline.max_batch_size == 0 {
            return Err(ConfigError::Invalid {
                message: "max_batch_size must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Load configuration with the standard layering:
/// defaults -> user config file -> workspace `diagrade.toml` -> environment.
pub fn load_config(workspace: Option<&Path>) -> Result<ScoringConfig, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(ScoringConfig::default()));

    // User-level config
    if let Some(config_dir) = directories::ProjectDirs::from("dev", "diagrade", "diagrade") {
        let user_config = config_dir.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    // Workspace-level config
    if let Some(ws) = workspace {
        let ws_config = ws.join("diagrade.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // Environment variables (DIAGRADE_LLM__MODEL, DIAGRADE_WEIGHTS__ACTORS, ...)
    figment = figment.merge(Env::prefixed("DIAGRADE_").split("__"));

    let config: ScoringConfig = figment.extract().map_err(|e| ConfigError::ParseError {
        message: e.to_string(),
    })?;
    config.validate()?;
    Ok(config)
}
