//! Per-run model-call telemetry.
//!
//! Every model call in a pipeline run — including failed attempts — becomes
//! one immutable [`GenerationRecord`]. The log is a value scoped to a single
//! run and threaded through the stage calls, never ambient global state, so
//! concurrent batch runs stay isolated. Records are appended at call
//! completion; iteration order is therefore completion order, which holds
//! even when the extractor issues calls concurrently.

use crate::error::LlmError;
use crate::llm::{GenerationRequest, GenerationResponse, LlmProvider};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

/// One record per model call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRecord {
    /// Call start time.
    pub timestamp: DateTime<Utc>,
    /// Pipeline step that issued the call, e.g. "extraction: student diagram".
    pub step_name: String,
    pub prompt: String,
    /// Model output; `None` when the call failed.
    pub response: Option<String>,
    /// Wall-clock seconds spent in the call.
    pub processing_time: f64,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Summary statistics over a run's generation log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogsSummary {
    pub total_calls: usize,
    pub total_time: f64,
    pub average_time: f64,
    pub error_count: usize,
}

/// Run-scoped handle to the generation log.
///
/// Cheap to clone; all clones append to the same run's record list.
#[derive(Clone, Default)]
pub struct GenerationLog {
    records: Arc<Mutex<Vec<GenerationRecord>>>,
}

impl GenerationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a completed-call record.
    pub async fn record(&self, record: GenerationRecord) {
        self.records.lock().await.push(record);
    }

    /// Snapshot of all records in completion order.
    pub async fn snapshot(&self) -> Vec<GenerationRecord> {
        self.records.lock().await.clone()
    }

    pub async fn summary(&self) -> LogsSummary {
        let records = self.records.lock().await;
        let total_calls = records.len();
        let total_time: f64 = records.iter().map(|r| r.processing_time).sum();
        let error_count = records.iter().filter(|r| r.error.is_some()).count();
        LogsSummary {
            total_calls,
            total_time,
            average_time: if total_calls > 0 {
                total_time / total_calls as f64
            } else {
                0.0
            },
            error_count,
        }
    }
}

/// Issue one model call, decode its output, and record the outcome.
///
/// This is a single attempt: retry loops wrap this so every attempt leaves
/// its own record. A response that arrives but fails `parse` is recorded
/// with both the raw response text and the parse error, so the log shows
/// exactly why an attempt was retried.
pub async fn logged_call<T>(
    provider: &dyn LlmProvider,
    log: &GenerationLog,
    step_name: &str,
    request: GenerationRequest,
    parse: impl FnOnce(&str) -> Result<T, LlmError>,
) -> Result<T, LlmError> {
    let started_at = Utc::now();
    let timer = Instant::now();
    let (response_text, outcome) = match provider.generate(request.clone()).await {
        Ok(response) => {
            let parsed = parse(&response.text);
            (Some(response.text), parsed)
        }
        Err(e) => (None, Err(e)),
    };
    let processing_time = timer.elapsed().as_secs_f64();

    let record = GenerationRecord {
        timestamp: started_at,
        step_name: step_name.to_string(),
        prompt: request.prompt,
        response: response_text,
        processing_time,
        model: provider.model_name().to_string(),
        temperature: Some(request.temperature),
        error: outcome.as_ref().err().map(|e| e.to_string()),
    };
    log.record(record).await;

    outcome
}

/// Issue one model call and record its outcome, success or failure.
pub async fn logged_generate(
    provider: &dyn LlmProvider,
    log: &GenerationLog,
    step_name: &str,
    request: GenerationRequest,
) -> Result<GenerationResponse, LlmError> {
    let started_at = Utc::now();
    let timer = Instant::now();
    let outcome = provider.generate(request.clone()).await;
    let processing_time = timer.elapsed().as_secs_f64();

    let record = GenerationRecord {
        timestamp: started_at,
        step_name: step_name.to_string(),
        prompt: request.prompt,
        response: outcome.as_ref().ok().map(|r| r.text.clone()),
        processing_time,
        model: provider.model_name().to_string(),
        temperature: Some(request.temperature),
        error: outcome.as_ref().err().map(|e| e.to_string()),
    };
    log.record(record).await;

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmProvider;

    #[tokio::test]
    async fn test_logged_generate_records_success() {
        let provider = MockLlmProvider::with_response("ok");
        let log = GenerationLog::new();

        let response = logged_generate(
            &provider,
            &log,
            "test step",
            GenerationRequest::new("hello").with_temperature(0.2),
        )
        .await
        .unwrap();
        assert_eq!(response.text, "ok");

        let records = log.snapshot().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].step_name, "test step");
        assert_eq!(records[0].prompt, "hello");
        assert_eq!(records[0].response.as_deref(), Some("ok"));
        assert_eq!(records[0].temperature, Some(0.2));
        assert!(records[0].error.is_none());
    }

    #[tokio::test]
    async fn test_logged_generate_records_failure() {
        let provider = MockLlmProvider::new();
        provider.queue_error(LlmError::Timeout { timeout_secs: 5 });
        let log = GenerationLog::new();

        let result = logged_generate(&provider, &log, "step", GenerationRequest::new("x")).await;
        assert!(result.is_err());

        let records = log.snapshot().await;
        assert_eq!(records.len(), 1);
        assert!(records[0].response.is_none());
        assert!(records[0].error.as_deref().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_summary() {
        let provider = MockLlmProvider::new();
        provider.queue_response("a");
        provider.queue_error(LlmError::Connection {
            message: "down".into(),
        });
        provider.queue_response("b");
        let log = GenerationLog::new();

        for i in 0..3 {
            let _ = logged_generate(
                &provider,
                &log,
                &format!("step {i}"),
                GenerationRequest::new("p"),
            )
            .await;
        }

        let summary = log.summary().await;
        assert_eq!(summary.total_calls, 3);
        assert_eq!(summary.error_count, 1);
        assert!(summary.average_time >= 0.0);
    }

    #[tokio::test]
    async fn test_clones_share_one_log() {
        let log = GenerationLog::new();
        let clone = log.clone();
        clone
            .record(GenerationRecord {
                timestamp: Utc::now(),
                step_name: "s".into(),
                prompt: "p".into(),
                response: None,
                processing_time: 0.0,
                model: "m".into(),
                temperature: None,
                error: None,
            })
            .await;
        assert_eq!(log.snapshot().await.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_summary() {
        let summary = GenerationLog::new().summary().await;
        assert_eq!(summary.total_calls, 0);
        assert_eq!(summary.average_time, 0.0);
    }
}
