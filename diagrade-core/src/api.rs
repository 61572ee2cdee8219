//! Boundary payload types.
//!
//! The HTTP routing layer lives outside this crate; these are the payload
//! shapes it exchanges with the pipeline: the score-diagram request and
//! response, the batch forms, and the status / supported-diagrams / health
//! payloads. Keeping them here pins the wire contract to the core types.

use crate::config::ScoringConfig;
use crate::error::PipelineError;
use crate::feedback::DetailedFeedback;
use crate::metrics::DiagramMetrics;
use crate::normalizer::NormalizationOutcome;
use crate::pipeline::{ScoringRequest, ScoringResult};
use crate::telemetry::{GenerationRecord, LogsSummary};
use serde::Serialize;
use std::collections::BTreeMap;

/// Response payload for one scored diagram.
#[derive(Debug, Clone, Serialize)]
pub struct ScoreDiagramResponse {
    pub success: bool,
    pub diagram_type: String,
    pub final_score: f64,
    pub grade_letter: char,
    pub feedback_summary: String,
    pub processing_time: f64,
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detailed_feedback: Option<DetailedFeedback>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<DiagramMetrics>,
    pub phase_results: PhaseResults,
    pub ai_generation_logs: Vec<GenerationRecord>,
    pub logs_summary: LogsSummary,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

/// Per-phase reports plus the timing breakdown.
#[derive(Debug, Clone, Serialize)]
pub struct PhaseResults {
    pub phase_one: PhaseOneReport,
    pub phase_two: PhaseTwoReport,
    pub phase_three: PhaseThreeReport,
    pub phase_timings: BTreeMap<String, f64>,
}

/// Convention-normalization report.
#[derive(Debug, Clone, Serialize)]
pub struct PhaseOneReport {
    pub success: bool,
    pub normalization_applied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub normalized_source: Option<String>,
}

/// Extraction-and-metrics report.
#[derive(Debug, Clone, Serialize)]
pub struct PhaseTwoReport {
    pub success: bool,
    pub total_actual: usize,
    pub total_expected: usize,
    pub total_matched: usize,
}

/// Feedback-and-scoring report.
#[derive(Debug, Clone, Serialize)]
pub struct PhaseThreeReport {
    pub success: bool,
    pub model_generated: bool,
}

impl From<ScoringResult> for ScoreDiagramResponse {
    fn from(result: ScoringResult) -> Self {
        let phase_one = PhaseOneReport {
            success: result.normalization.is_some(),
            normalization_applied: result
                .normalization
                .as_ref()
                .is_some_and(|n| n.applied),
            normalized_source: result
                .normalization
                .as_ref()
                .filter(|n| n.applied)
                .map(|n: &NormalizationOutcome| n.normalized_source.clone()),
        };
        let phase_two = PhaseTwoReport {
            success: result.metrics.is_some(),
            total_actual: result.metrics.as_ref().map_or(0, |m| m.total_actual),
            total_expected: result.metrics.as_ref().map_or(0, |m| m.total_expected),
            total_matched: result.metrics.as_ref().map_or(0, |m| m.total_matched),
        };
        let phase_three = PhaseThreeReport {
            success: result.feedback.is_some(),
            model_generated: result.feedback_model_generated,
        };

        Self {
            success: result.success,
            diagram_type: result.diagram_type.tag().to_string(),
            final_score: result.final_score,
            grade_letter: result.grade_letter,
            feedback_summary: result.feedback_summary,
            processing_time: result.processing_time,
            confidence: result.confidence,
            detailed_feedback: result.feedback,
            metrics: result.metrics,
            phase_results: PhaseResults {
                phase_one,
                phase_two,
                phase_three,
                phase_timings: result.phase_timings,
            },
            ai_generation_logs: result.ai_generation_logs,
            logs_summary: result.logs_summary,
            warnings: result.warnings,
            errors: result.errors,
        }
    }
}

/// Capability description served at the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStatus {
    pub pipeline: String,
    pub phases: BTreeMap<String, PhaseDescription>,
    pub supported_diagrams: Vec<String>,
    pub llm_model: String,
    pub rate_limit: String,
    pub scoring_scale: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PhaseDescription {
    pub name: String,
    pub kind: String,
    pub description: String,
}

/// Build the status payload from configuration.
pub fn pipeline_status(config: &ScoringConfig) -> PipelineStatus {
    let mut phases = BTreeMap::new();
    phases.insert(
        "phase_1".to_string(),
        PhaseDescription {
            name: "Convention Normalization".to_string(),
            kind: "AI rewrite".to_string(),
            description: "Aligns student naming with the reference diagram's conventions"
                .to_string(),
        },
    );
    phases.insert(
        "phase_2".to_string(),
        PhaseDescription {
            name: "Extraction and Metrics".to_string(),
            kind: "AI extraction + code-based scoring".to_string(),
            description: "Extracts structured components and computes quantitative metrics"
                .to_string(),
        },
    );
    phases.insert(
        "phase_3".to_string(),
        PhaseDescription {
            name: "Feedback Generation and Scoring".to_string(),
            kind: "AI analysis".to_string(),
            description: "Generates educational feedback and the final score".to_string(),
        },
    );

    PipelineStatus {
        pipeline: "Automated Diagram Grading".to_string(),
        phases,
        supported_diagrams: vec!["use_case".to_string()],
        llm_model: config.llm.model.clone(),
        rate_limit: format!("{} RPM", config.llm.rate_limit_rpm),
        scoring_scale: "0-10 points with letter grades".to_string(),
    }
}

/// One supported diagram type, as served at the supported-diagrams endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct SupportedDiagram {
    #[serde(rename = "type")]
    pub type_tag: String,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SupportedDiagrams {
    pub supported_types: Vec<SupportedDiagram>,
    pub auto_detection: bool,
}

pub fn supported_diagrams() -> SupportedDiagrams {
    SupportedDiagrams {
        supported_types: vec![SupportedDiagram {
            type_tag: "use_case".to_string(),
            name: "Use Case Diagram".to_string(),
            description: "Shows actors, use cases, and their relationships".to_string(),
        }],
        auto_detection: true,
    }
}

/// Health payload.
#[derive(Debug, Clone, Serialize)]
pub struct Health {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Health check: unhealthy when the configured API-key variable is unset.
pub fn health_check(config: &ScoringConfig) -> Health {
    if std::env::var(&config.llm.api_key_env).is_err() {
        return Health {
            status: "unhealthy".to_string(),
            service: None,
            model: None,
            version: None,
            reason: Some(format!("{} not configured", config.llm.api_key_env)),
        };
    }
    Health {
        status: "healthy".to_string(),
        service: Some("Diagram Scoring".to_string()),
        model: Some(config.llm.model.clone()),
        version: Some(env!("CARGO_PKG_VERSION").to_string()),
        reason: None,
    }
}

/// Enforce the configured batch-size contract on a batch request body.
pub fn validate_batch(
    requests: &[ScoringRequest],
    config: &ScoringConfig,
) -> Result<(), PipelineError> {
    if requests.is_empty() {
        return Err(PipelineError::Validation {
            message: "no diagrams provided".to_string(),
        });
    }
    if requests.len() > config.pipeline.max_batch_size {
        return Err(PipelineError::Validation {
            message: format!(
                "batch size limited to {} diagrams",
                config.pipeline.max_batch_size
            ),
        });
    }
    Ok(())
}
