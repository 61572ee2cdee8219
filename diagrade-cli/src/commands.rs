//! Subcommand handlers.

use anyhow::Context;
use diagrade_core::api::{self, ScoreDiagramResponse};
use diagrade_core::config::ScoringConfig;
use diagrade_core::pipeline::{ScoringPipeline, ScoringRequest};
use diagrade_core::types::DiagramType;
use diagrade_core::CategoryWeights;
use std::path::Path;
use tracing::info;

pub struct ScoreArgs {
    pub student: std::path::PathBuf,
    pub reference: std::path::PathBuf,
    pub problem: std::path::PathBuf,
    pub diagram_type: Option<String>,
    pub actor_weight: Option<f64>,
    pub use_case_weight: Option<f64>,
    pub relationship_weight: Option<f64>,
}

/// Score one submission and print the response payload as JSON.
pub async fn score(config: ScoringConfig, args: ScoreArgs) -> anyhow::Result<()> {
    let student_diagram = read_input(&args.student)?;
    let reference_diagram = read_input(&args.reference)?;
    let problem_description = read_input(&args.problem)?;

    let diagram_type = args
        .diagram_type
        .as_deref()
        .map(parse_diagram_type)
        .transpose()?;

    let custom_weights = build_weights(
        &config,
        args.actor_weight,
        args.use_case_weight,
        args.relationship_weight,
    );

    let request = ScoringRequest {
        student_diagram,
        reference_diagram,
        problem_description,
        diagram_type,
        custom_weights,
    };

    let pipeline = ScoringPipeline::from_config(config)?;
    info!(model = pipeline.model_name(), "Scoring submission");
    let result = pipeline.score(request).await;
    let failed = !result.success;

    let response = ScoreDiagramResponse::from(result);
    println!("{}", serde_json::to_string_pretty(&response)?);

    if failed {
        anyhow::bail!("scoring pipeline reported failure");
    }
    Ok(())
}

/// Score a JSON manifest of requests, printing a JSON array of responses.
pub async fn batch(config: ScoringConfig, manifest: &Path) -> anyhow::Result<()> {
    let body = read_input(manifest)?;
    let requests: Vec<ScoringRequest> =
        serde_json::from_str(&body).context("manifest must be a JSON array of score requests")?;

    api::validate_batch(&requests, &config)?;

    let pipeline = ScoringPipeline::from_config(config)?;
    info!(count = requests.len(), "Scoring batch");
    let results = pipeline.score_batch(requests).await;

    let responses: Vec<ScoreDiagramResponse> =
        results.into_iter().map(ScoreDiagramResponse::from).collect();
    println!("{}", serde_json::to_string_pretty(&responses)?);
    Ok(())
}

/// Print the pipeline capability description.
pub fn status(config: &ScoringConfig) -> anyhow::Result<()> {
    let payload = api::pipeline_status(config);
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

/// Print the health payload; non-zero exit when unhealthy.
pub fn health(config: &ScoringConfig) -> anyhow::Result<()> {
    let payload = api::health_check(config);
    let healthy = payload.status == "healthy";
    println!("{}", serde_json::to_string_pretty(&payload)?);
    if !healthy {
        anyhow::bail!("service is unhealthy");
    }
    Ok(())
}

fn read_input(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn parse_diagram_type(tag: &str) -> anyhow::Result<DiagramType> {
    match tag {
        "use_case" => Ok(DiagramType::UseCase),
        "class" => Ok(DiagramType::Class),
        "sequence" => Ok(DiagramType::Sequence),
        other => anyhow::bail!("unknown diagram type '{other}' (expected use_case, class, or sequence)"),
    }
}

fn build_weights(
    config: &ScoringConfig,
    actors: Option<f64>,
    use_cases: Option<f64>,
    relationships: Option<f64>,
) -> Option<CategoryWeights> {
    if actors.is_none() && use_cases.is_none() && relationships.is_none() {
        return None;
    }
    Some(CategoryWeights {
        actors: actors.unwrap_or(config.weights.actors),
        use_cases: use_cases.unwrap_or(config.weights.use_cases),
        relationships: relationships.unwrap_or(config.weights.relationships),
    })
}
