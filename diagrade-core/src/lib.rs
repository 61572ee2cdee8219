//! # Diagrade Core
//!
//! Core library for the Diagrade automated diagram grader.
//! Scores a student-authored UML use-case diagram against a reference
//! diagram and a free-text problem description through a staged pipeline:
//! convention normalization, LLM component extraction, semantic matching,
//! metrics calculation, and feedback generation.

pub mod api;
pub mod config;
pub mod error;
pub mod extractor;
pub mod feedback;
pub mod llm;
pub mod matcher;
pub mod metrics;
pub mod normalizer;
pub mod parser;
pub mod pipeline;
pub mod providers;
pub mod telemetry;
pub mod types;

// Re-export commonly used types at the crate root.
pub use config::{CategoryWeights, GradingConfig, LlmConfig, RetryConfig, ScoringConfig};
pub use error::{DiagradeError, LlmError, PipelineError, Result};
pub use feedback::{DetailedFeedback, FeedbackItem, FeedbackKind, Severity};
pub use llm::{GenerationRequest, GenerationResponse, LlmProvider, MockLlmProvider};
pub use matcher::{ComponentMatcher, DiagramMatches, MatchResult, MatchedPair};
pub use metrics::{ComponentMetrics, DiagramMetrics};
pub use pipeline::{PipelinePhase, ScoringPipeline, ScoringRequest, ScoringResult};
pub use telemetry::{GenerationLog, GenerationRecord, LogsSummary};
pub use types::{
    Actor, ComponentCategory, ComponentSet, DiagramComponent, DiagramType, RelationKind,
    Relationship, UseCase,
};
