//! Error types for the Diagrade scoring core.
//!
//! Uses `thiserror` for public API error types with structured error variants
//! covering LLM, pipeline, and configuration domains. Pipeline-boundary
//! behavior: fatal errors are folded into the returned `ScoringResult` as
//! data (`success: false` plus populated `errors`), never thrown across the
//! pipeline boundary.

/// Top-level error type for the Diagrade core library.
#[derive(Debug, thiserror::Error)]
pub enum DiagradeError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from LLM provider interactions.
///
/// Clone is derived so queued mock responses and retry bookkeeping can
/// re-serve an error value.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LlmError {
    #[error("API request failed: {message}")]
    ApiRequest { message: String },

    #[error("API response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Provider connection failed: {message}")]
    Connection { message: String },
}

/// Errors from the scoring pipeline stages.
///
/// `Validation` and `Extraction` are fatal to a run; `Normalization` and
/// `Feedback` are degradations the coordinator converts into warnings.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Invalid input: {message}")]
    Validation { message: String },

    #[error("Component extraction failed for {side}: {message}")]
    Extraction { side: String, message: String },

    #[error("Convention normalization failed: {message}")]
    Normalization { message: String },

    #[error("Feedback generation failed: {message}")]
    Feedback { message: String },

    #[error("Run was cancelled")]
    Cancelled,
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Environment variable not set: {var}")]
    EnvVarMissing { var: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

/// A type alias for results using the top-level `DiagradeError`.
pub type Result<T> = std::result::Result<T, DiagradeError>;
