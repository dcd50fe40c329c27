//! Summarize subsystem — the request path behind `POST /summarize`
//!
//! - Rejects empty / whitespace-only text before any work is done
//! - Calls the shared summarization backend (deterministic decoding)
//! - Measures wall-clock time of the backend call
//! - Appends a log entry; a failed insert is logged and never fails the request

use std::time::{Duration, Instant};

use synopsis_core::{
    LogStore, NewLogEntry, SummarizationBackend, SummarizeParams, SummarizerError, SynopsisError,
};

/// Result of a successful summarization.
#[derive(Debug, Clone)]
pub struct SummaryOutcome {
    pub summary: String,
    pub input_length: i64,
    pub execution_time: f64,
    /// Id of the stored log entry, `None` when the insert failed.
    pub log_id: Option<i64>,
}

/// `timeout` bounds how long the request waits, not the backend work: an
/// abandoned ONNX call finishes on its blocking thread and keeps the model
/// lock until then.
pub async fn summarize_and_log(
    text: String,
    max_length: u32,
    min_length: u32,
    backend: &dyn SummarizationBackend,
    store: &dyn LogStore,
    timeout: Option<Duration>,
) -> Result<SummaryOutcome, SynopsisError> {
    if text.trim().is_empty() {
        return Err(SynopsisError::Validation("Text cannot be empty".to_string()));
    }

    let input_length = text.chars().count() as i64;
    let params = SummarizeParams {
        text,
        max_length,
        min_length,
        deterministic: true,
    };

    let start = Instant::now();
    let result = match timeout {
        Some(limit) => match tokio::time::timeout(limit, backend.summarize(&params)).await {
            Ok(r) => r,
            Err(_) => Err(SummarizerError::Timeout(limit)),
        },
        None => backend.summarize(&params).await,
    };
    let execution_time = start.elapsed().as_secs_f64();

    let summary = match result {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(
                backend = backend.name(),
                input_length,
                error = %e,
                "Summarization failed"
            );
            return Err(e.into());
        }
    };

    let entry = NewLogEntry {
        input_length,
        execution_time,
        summary: summary.clone(),
        input_text: params.text,
    };

    let log_id = match store.insert(&entry).await {
        Ok(id) => Some(id),
        Err(e) => {
            tracing::error!(error = %e, "Failed to store summarization log; returning summary anyway");
            None
        }
    };

    tracing::info!(
        backend = backend.name(),
        input_length,
        execution_time,
        log_id,
        "Summarized text"
    );

    Ok(SummaryOutcome {
        summary,
        input_length,
        execution_time,
        log_id,
    })
}
