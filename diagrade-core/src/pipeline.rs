//! Pipeline coordinator.
//!
//! Sequences the scoring stages as a strict state machine:
//!
//! `Idle -> Normalizing -> Extracting -> Matching -> ScoringMetrics ->
//! GeneratingFeedback -> Done(success) | Done(failed)`
//!
//! `Matching` and `ScoringMetrics` are pure computation and never suspend or
//! fail. A fatal failure in `Extracting` jumps straight to `Done(failed)`
//! with all telemetry accumulated so far. Every stage transition records a
//! wall-clock timing keyed by phase name, and every model call lands in the
//! run's generation log. The caller always receives a well-formed
//! [`ScoringResult`]; failure is a data value, never a thrown fault.

use crate::config::{CategoryWeights, ScoringConfig};
use crate::error::PipelineError;
use crate::extractor::ComponentExtractor;
use crate::feedback::{degraded_outcome, DetailedFeedback, FeedbackGenerator, FeedbackOutcome};
use crate::llm::LlmProvider;
use crate::matcher::{ComponentMatcher, DiagramMatches};
use crate::metrics::DiagramMetrics;
use crate::normalizer::{ConventionNormalizer, NormalizationOutcome};
use crate::parser::UseCaseParser;
use crate::providers::create_provider;
use crate::telemetry::{GenerationLog, GenerationRecord, LogsSummary};
use crate::types::{ComponentSet, DiagramType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// One scoring request: the student's diagram, the reference solution, and
/// the assignment text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringRequest {
    pub student_diagram: String,
    pub reference_diagram: String,
    pub problem_description: String,
    /// Auto-detected from the student source when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagram_type: Option<DiagramType>,
    /// Per-request override of the configured category weights.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_weights: Option<CategoryWeights>,
}

/// Pipeline phases in transition order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelinePhase {
    Idle,
    Normalizing,
    Extracting,
    Matching,
    ScoringMetrics,
    GeneratingFeedback,
    Done,
}

impl PipelinePhase {
    pub fn name(&self) -> &'static str {
        match self {
            PipelinePhase::Idle => "idle",
            PipelinePhase::Normalizing => "normalizing",
            PipelinePhase::Extracting => "extracting",
            PipelinePhase::Matching => "matching",
            PipelinePhase::ScoringMetrics => "scoring_metrics",
            PipelinePhase::GeneratingFeedback => "generating_feedback",
            PipelinePhase::Done => "done",
        }
    }
}

/// Complete result of one scoring run.
#[derive(Debug, Clone, Serialize)]
pub struct ScoringResult {
    pub success: bool,
    pub diagram_type: DiagramType,
    /// Final score on the 0-10 scale.
    pub final_score: f64,
    pub grade_letter: char,
    pub feedback_summary: String,
    /// Total wall-clock seconds for the run.
    pub processing_time: f64,
    /// Aggregated confidence in [0, 1] over the phase outcomes.
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<DetailedFeedback>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<DiagramMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matches: Option<DiagramMatches>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub normalization: Option<NormalizationOutcome>,
    /// Whether feedback came from the model (false = templated fallback).
    pub feedback_model_generated: bool,
    /// Wall-clock seconds per phase, keyed by phase name.
    pub phase_timings: BTreeMap<String, f64>,
    /// Every model call of the run, in completion order.
    pub ai_generation_logs: Vec<GenerationRecord>,
    pub logs_summary: LogsSummary,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

/// How a stage future ended without producing its value.
enum StageInterrupt {
    TimedOut,
    Cancelled,
}

/// The scoring pipeline coordinator.
pub struct ScoringPipeline {
    provider: Arc<dyn LlmProvider>,
    config: ScoringConfig,
}

impl ScoringPipeline {
    /// Build a pipeline over an injected provider (tests, custom backends).
    pub fn new(provider: Arc<dyn LlmProvider>, config: ScoringConfig) -> Self {
        Self { provider, config }
    }

    /// Build a pipeline with the provider selected by configuration.
    pub fn from_config(config: ScoringConfig) -> crate::error::Result<Self> {
        let provider = create_provider(&config.llm)?;
        Ok(Self::new(provider, config))
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    /// Score one submission. Never panics and never returns an error across
    /// the boundary: failures come back as `success: false` with `errors`
    /// populated and partial telemetry retained.
    pub async fn score(&self, request: ScoringRequest) -> ScoringResult {
        self.score_with_cancellation(request, CancellationToken::new())
            .await
    }

    /// Score one submission under a caller-supplied cancellation token.
    /// Cancellation aborts in-flight model calls and unwinds to a failed
    /// result that retains the partial generation log.
    pub async fn score_with_cancellation(
        &self,
        request: ScoringRequest,
        cancel: CancellationToken,
    ) -> ScoringResult {
        let started = Instant::now();
        let log = GenerationLog::new();
        let mut run = RunState::new(started, log.clone());

        info!("Starting diagram scoring pipeline");

        // Input validation happens before any model call.
        if let Err(e) = validate_request(&request) {
            error!(error = %e, "Request validation failed");
            run.errors.push(e.to_string());
            return run.failed(self, DiagramType::UseCase).await;
        }

        let diagram_type = request
            .diagram_type
            .unwrap_or_else(|| UseCaseParser::detect_diagram_type(&request.student_diagram));
        if !diagram_type.is_scorable() {
            run.errors.push(
                PipelineError::Validation {
                    message: format!(
                        "diagram type '{}' is not supported for scoring",
                        diagram_type.tag()
                    ),
                }
                .to_string(),
            );
            return run.failed(self, diagram_type).await;
        }

        let stage_timeout = Duration::from_secs(self.config.pipeline.stage_timeout_secs);

        // --- Normalizing (non-fatal) ---
        run.enter(PipelinePhase::Normalizing);
        let normalizer = ConventionNormalizer::new(self.provider.clone(), &self.config.pipeline);
        let normalization = match run_stage(
            stage_timeout,
            &cancel,
            normalizer.normalize(&request.student_diagram, &request.reference_diagram, &log),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(StageInterrupt::TimedOut) => NormalizationOutcome {
                normalized_source: request.student_diagram.clone(),
                applied: false,
                warnings: vec![format!(
                    "convention normalization timed out after {}s",
                    stage_timeout.as_secs()
                )],
            },
            Err(StageInterrupt::Cancelled) => {
                run.errors.push(PipelineError::Cancelled.to_string());
                return run.failed(self, diagram_type).await;
            }
        };
        run.warnings.extend(normalization.warnings.clone());
        let normalized_source = normalization.normalized_source.clone();
        run.normalization = Some(normalization);

        // --- Extracting (fatal on failure) ---
        run.enter(PipelinePhase::Extracting);
        let extractor = ComponentExtractor::new(
            self.provider.clone(),
            self.config.llm.retry.clone(),
            self.config.pipeline.extraction_temperature,
            self.config.llm.max_tokens,
        );
        let extraction = run_stage(stage_timeout, &cancel, async {
            // Independent sides run concurrently; both are required.
            tokio::join!(
                extractor.extract_student(&normalized_source, &log),
                extractor.extract_expected(
                    &request.reference_diagram,
                    &request.problem_description,
                    &log
                ),
            )
        })
        .await;

        let (actual, expected): (ComponentSet, ComponentSet) = match extraction {
            Ok((Ok(actual), Ok(expected))) => (actual, expected),
            Ok((student, reference)) => {
                for err in [student.err(), reference.err()].into_iter().flatten() {
                    error!(error = %err, "Extraction failed");
                    run.errors.push(err.to_string());
                }
                return run.failed(self, diagram_type).await;
            }
            Err(StageInterrupt::TimedOut) => {
                run.errors.push(
                    PipelineError::Extraction {
                        side: "student and reference".to_string(),
                        message: format!("stage timed out after {}s", stage_timeout.as_secs()),
                    }
                    .to_string(),
                );
                return run.failed(self, diagram_type).await;
            }
            Err(StageInterrupt::Cancelled) => {
                run.errors.push(PipelineError::Cancelled.to_string());
                return run.failed(self, diagram_type).await;
            }
        };

        // --- Matching (pure, never suspends, never fails) ---
        run.enter(PipelinePhase::Matching);
        let matcher = ComponentMatcher::new(self.config.matching.similarity_threshold);
        let matches = matcher.match_diagrams(&actual, &expected);

        // --- ScoringMetrics (pure) ---
        run.enter(PipelinePhase::ScoringMetrics);
        let weights = request.custom_weights.unwrap_or(self.config.weights);
        let metrics = DiagramMetrics::compute(&matches, &weights);
        let final_score = metrics.final_score();
        let grade_letter = metrics.grade_letter(&self.config.grading);

        // --- GeneratingFeedback (non-fatal) ---
        run.enter(PipelinePhase::GeneratingFeedback);
        let generator = FeedbackGenerator::new(
            self.provider.clone(),
            self.config.llm.retry.clone(),
            self.config.pipeline.feedback_temperature,
            self.config.llm.max_tokens,
        );
        let feedback_outcome: FeedbackOutcome = match run_stage(
            stage_timeout,
            &cancel,
            generator.generate(&matches, &metrics, &request.problem_description, &log),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(StageInterrupt::TimedOut) => degraded_outcome(
                &matches,
                &metrics,
                &format!("stage timed out after {}s", stage_timeout.as_secs()),
            ),
            Err(StageInterrupt::Cancelled) => {
                run.errors.push(PipelineError::Cancelled.to_string());
                return run.failed(self, diagram_type).await;
            }
        };
        run.warnings.extend(feedback_outcome.warnings.clone());

        // --- Done(success) ---
        run.enter(PipelinePhase::Done);
        let confidence = overall_confidence(
            run.normalization.as_ref().is_some_and(|n| n.applied),
            feedback_outcome.model_generated,
            feedback_outcome.feedback.confidence,
        );

        info!(
            final_score,
            grade = %grade_letter,
            processing_time = started.elapsed().as_secs_f64(),
            "Pipeline completed"
        );

        let phase_timings = run.finish_timings();
        ScoringResult {
            success: true,
            diagram_type,
            final_score,
            grade_letter,
            feedback_summary: feedback_outcome.feedback.summary.clone(),
            processing_time: started.elapsed().as_secs_f64(),
            confidence,
            feedback: Some(feedback_outcome.feedback),
            metrics: Some(metrics),
            matches: Some(matches),
            normalization: run.normalization,
            feedback_model_generated: feedback_outcome.model_generated,
            phase_timings,
            ai_generation_logs: log.snapshot().await,
            logs_summary: log.summary().await,
            warnings: run.warnings,
            errors: run.errors,
        }
    }

    /// Score a batch of submissions independently, pacing requests against
    /// the configured rate-limit budget. One element's failure never aborts
    /// the others.
    pub async fn score_batch(&self, requests: Vec<ScoringRequest>) -> Vec<ScoringResult> {
        let delay = Duration::from_secs_f64(60.0 / self.config.llm.rate_limit_rpm.max(1) as f64);
        let mut results = Vec::with_capacity(requests.len());
        for (i, request) in requests.into_iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(delay).await;
            }
            results.push(self.score(request).await);
        }
        results
    }
}

/// Mutable bookkeeping for one run.
struct RunState {
    started: Instant,
    log: GenerationLog,
    phase: PipelinePhase,
    phase_entered: Instant,
    timings: BTreeMap<String, f64>,
    normalization: Option<NormalizationOutcome>,
    warnings: Vec<String>,
    errors: Vec<String>,
}

impl RunState {
    fn new(started: Instant, log: GenerationLog) -> Self {
        Self {
            started,
            log,
            phase: PipelinePhase::Idle,
            phase_entered: started,
            timings: BTreeMap::new(),
            normalization: None,
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Transition to the next phase, closing out the previous timing entry.
    fn enter(&mut self, next: PipelinePhase) {
        self.close_current();
        self.phase = next;
        self.phase_entered = Instant::now();
    }

    fn close_current(&mut self) {
        if self.phase != PipelinePhase::Idle && self.phase != PipelinePhase::Done {
            self.timings.insert(
                self.phase.name().to_string(),
                self.phase_entered.elapsed().as_secs_f64(),
            );
        }
    }

    fn finish_timings(&mut self) -> BTreeMap<String, f64> {
        self.close_current();
        std::mem::take(&mut self.timings)
    }

    /// Assemble a `Done(failed)` result, retaining partial telemetry.
    async fn failed(mut self, pipeline: &ScoringPipeline, diagram_type: DiagramType) -> ScoringResult {
        self.enter(PipelinePhase::Done);
        let grading = &pipeline.config.grading;
        ScoringResult {
            success: false,
            diagram_type,
            final_score: 0.0,
            grade_letter: grading.letter_for(0.0),
            feedback_summary:
                "Pipeline processing failed. Please check your diagram and try again.".to_string(),
            processing_time: self.started.elapsed().as_secs_f64(),
            confidence: 0.0,
            feedback: None,
            metrics: None,
            matches: None,
            normalization: self.normalization,
            feedback_model_generated: false,
            phase_timings: std::mem::take(&mut self.timings),
            ai_generation_logs: self.log.snapshot().await,
            logs_summary: self.log.summary().await,
            warnings: self.warnings,
            errors: self.errors,
        }
    }
}

/// Race a stage future against its timeout and the run's cancellation token.
async fn run_stage<T>(
    timeout: Duration,
    cancel: &CancellationToken,
    stage: impl std::future::Future<Output = T>,
) -> Result<T, StageInterrupt> {
    tokio::select! {
        // Cancellation wins over an already-ready stage result.
        biased;
        _ = cancel.cancelled() => Err(StageInterrupt::Cancelled),
        outcome = tokio::time::timeout(timeout, stage) => {
            outcome.map_err(|_| StageInterrupt::TimedOut)
        }
    }
}

/// Reject malformed input before any model call is attempted.
fn validate_request(request: &ScoringRequest) -> Result<(), PipelineError> {
    if request.student_diagram.trim().is_empty() {
        return Err(PipelineError::Validation {
            message: "student diagram source cannot be empty".to_string(),
        });
    }
    if request.reference_diagram.trim().is_empty() {
        return Err(PipelineError::Validation {
            message: "reference diagram source cannot be empty".to_string(),
        });
    }
    if request.problem_description.trim().is_empty() {
        return Err(PipelineError::Validation {
            message: "problem description cannot be empty".to_string(),
        });
    }
    Ok(())
}

/// Aggregate phase confidences: normalization, the code-based middle phases
/// (fixed high), and feedback.
fn overall_confidence(
    normalization_applied: bool,
    feedback_model_generated: bool,
    feedback_confidence: f64,
) -> f64 {
    let normalization = if normalization_applied { 0.9 } else { 0.5 };
    let code_based = 0.9;
    let feedback = if feedback_model_generated {
        feedback_confidence
    } else {
        0.3
    };
    ((normalization + code_based + feedback) / 3.0).clamp(0.0, 1.0)
}
