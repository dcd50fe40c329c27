pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod onnx_summarizer;
pub mod store;
pub mod summarizer;

pub use config::SynopsisConfig;
pub use error::SynopsisError;
pub use models::{HistoryEntry, LogEntry, NewLogEntry};
pub use onnx_summarizer::OnnxSummarizer;
pub use store::{LogStore, SqliteLogStore, StoreError};
pub use summarizer::{
    create_backend, BackendConfig, HttpSummarizerClient, HttpSummarizerConfig, OnnxConfig,
    SpecialTokens, SummarizationBackend, SummarizeParams, SummarizerError,
};
