//! Summarization backends for synopsis
//!
//! Provides a `SummarizationBackend` trait with implementations for:
//! - **ONNX** — local seq2seq inference of a BART-family checkpoint
//! - **HTTP** — a Hugging Face Inference-API compatible endpoint
//!
//! A backend is created once at startup and shared read-only by every request.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::config::SummarizerConfig;

// ============================================================================
// SummarizationBackend trait
// ============================================================================

/// Inputs of a single summarization call.
#[derive(Debug, Clone, PartialEq)]
pub struct SummarizeParams {
    pub text: String,
    pub max_length: u32,
    pub min_length: u32,
    /// Greedy (non-sampled) decoding when true.
    pub deterministic: bool,
}

/// Abstraction over summarization providers.
#[async_trait]
pub trait SummarizationBackend: Send + Sync {
    /// Produce one summary for `params.text`, bounded by the length limits.
    async fn summarize(&self, params: &SummarizeParams) -> Result<String, SummarizerError>;

    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Model identifier reported by health checks.
    fn model(&self) -> &str;
}

// ============================================================================
// Error types
// ============================================================================

#[derive(Error, Debug)]
pub enum SummarizerError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Missing summary in response")]
    MissingSummary,

    #[error("Model not found at {path} — run scripts/export-onnx-model.sh to fetch it")]
    ModelNotFound { path: String },

    #[error("ONNX inference error: {0}")]
    OnnxInference(String),

    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    #[error("Unsupported request: {0}")]
    Unsupported(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Unknown summarizer backend '{0}'")]
    UnknownBackend(String),
}

// ============================================================================
// Config types
// ============================================================================

/// HTTP inference client configuration
#[derive(Debug, Clone)]
pub struct HttpSummarizerConfig {
    pub api_url: String,
    pub model: String,
    pub api_token: Option<String>,
    /// Per-request deadline; `None` leaves the client without one.
    pub timeout: Option<Duration>,
}

impl HttpSummarizerConfig {
    pub fn new(api_url: String, model: String) -> Self {
        let api_token = std::env::var("HF_API_TOKEN").ok().filter(|t| !t.is_empty());
        Self {
            api_url,
            model,
            api_token,
            timeout: None,
        }
    }
}

/// ONNX backend configuration
#[derive(Debug, Clone)]
pub struct OnnxConfig {
    pub model: String,
    pub encoder_path: PathBuf,
    pub decoder_path: PathBuf,
    pub tokenizer_path: PathBuf,
    pub max_input_tokens: usize,
    pub no_repeat_ngram_size: usize,
    pub special_tokens: SpecialTokens,
}

/// Special token ids of the BART vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecialTokens {
    pub bos: u32,
    pub pad: u32,
    pub eos: u32,
    pub decoder_start: u32,
}

impl Default for SpecialTokens {
    fn default() -> Self {
        Self {
            bos: 0,
            pad: 1,
            eos: 2,
            decoder_start: 2,
        }
    }
}

/// Configuration union for the backend factory.
pub enum BackendConfig {
    Onnx(OnnxConfig),
    Http(HttpSummarizerConfig),
}

impl BackendConfig {
    /// Select a backend from `[summarizer] backend`.
    pub fn from_settings(settings: &SummarizerConfig) -> Result<Self, SummarizerError> {
        match settings.backend.as_str() {
            "onnx" => {
                let (encoder_path, decoder_path, tokenizer_path) =
                    crate::onnx_summarizer::resolve_model_paths(
                        &settings.model_dir,
                        &settings.model,
                    );
                Ok(BackendConfig::Onnx(OnnxConfig {
                    model: settings.model.clone(),
                    encoder_path,
                    decoder_path,
                    tokenizer_path,
                    max_input_tokens: settings.max_input_tokens,
                    no_repeat_ngram_size: settings.no_repeat_ngram_size,
                    special_tokens: SpecialTokens::default(),
                }))
            }
            "http" => {
                let mut cfg =
                    HttpSummarizerConfig::new(settings.api_url.clone(), settings.model.clone());
                cfg.timeout = settings.timeout_seconds.map(Duration::from_secs);
                Ok(BackendConfig::Http(cfg))
            }
            other => Err(SummarizerError::UnknownBackend(other.to_string())),
        }
    }
}

/// Create the appropriate backend from configuration.
pub fn create_backend(
    config: BackendConfig,
) -> Result<Box<dyn SummarizationBackend>, SummarizerError> {
    match config {
        BackendConfig::Onnx(c) => Ok(Box::new(crate::onnx_summarizer::OnnxSummarizer::new(c)?)),
        BackendConfig::Http(c) => Ok(Box::new(HttpSummarizerClient::new(c)?)),
    }
}

// ============================================================================
// Inference API structs (private)
// ============================================================================

#[derive(Debug, Serialize)]
struct InferenceRequest<'a> {
    inputs: &'a str,
    parameters: InferenceParameters,
    options: InferenceOptions,
}

#[derive(Debug, Serialize)]
struct InferenceParameters {
    max_length: u32,
    min_length: u32,
    do_sample: bool,
}

#[derive(Debug, Serialize)]
struct InferenceOptions {
    wait_for_model: bool,
}

#[derive(Debug, Deserialize)]
struct InferenceOutput {
    summary_text: String,
}

#[derive(Debug, Deserialize)]
struct InferenceErrorResponse {
    error: Option<String>,
}

// ============================================================================
// HttpSummarizerClient
// ============================================================================

/// Calls a hosted summarization model over HTTP. Each call is attempted once.
#[derive(Debug, Clone)]
pub struct HttpSummarizerClient {
    client: Client,
    config: HttpSummarizerConfig,
}

impl HttpSummarizerClient {
    pub fn new(config: HttpSummarizerConfig) -> Result<Self, SummarizerError> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;
        Ok(Self { client, config })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}",
            self.config.api_url.trim_end_matches('/'),
            self.config.model
        )
    }
}

#[async_trait]
impl SummarizationBackend for HttpSummarizerClient {
    async fn summarize(&self, params: &SummarizeParams) -> Result<String, SummarizerError> {
        let request = InferenceRequest {
            inputs: &params.text,
            parameters: InferenceParameters {
                max_length: params.max_length,
                min_length: params.min_length,
                do_sample: !params.deterministic,
            },
            options: InferenceOptions {
                wait_for_model: true,
            },
        };

        let mut builder = self.client.post(self.endpoint()).json(&request);
        if let Some(token) = &self.config.api_token {
            builder = builder.bearer_auth(token);
        }
        let response = builder.send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<InferenceErrorResponse>(&error_body)
                .ok()
                .and_then(|e| e.error)
                .unwrap_or(error_body);

            tracing::error!(code = status.as_u16(), message = %message, "Inference API error");

            return Err(SummarizerError::Api {
                code: status.as_u16(),
                message,
            });
        }

        let outputs: Vec<InferenceOutput> = response.json().await?;
        outputs
            .into_iter()
            .next()
            .map(|o| o.summary_text)
            .ok_or(SummarizerError::MissingSummary)
    }

    fn name(&self) -> &str {
        "http"
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}

// ============================================================================
// TESTS
// ============================================================================
