use thiserror::Error;

use crate::store::StoreError;
use crate::summarizer::SummarizerError;

#[derive(Error, Debug)]
pub enum SynopsisError {
    #[error("{0}")]
    Validation(String),

    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },

    #[error("Summarization failed: {0}")]
    Summarizer(#[from] SummarizerError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
