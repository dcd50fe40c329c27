use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One row of the `logs` table.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct LogEntry {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub input_length: i64,
    pub execution_time: f64,
    pub summary: String,
    pub input_text: String,
}

/// Caller-supplied columns; `id` and `timestamp` are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewLogEntry {
    pub input_length: i64,
    pub execution_time: f64,
    pub summary: String,
    pub input_text: String,
}

/// Public history view. `input_text` is deliberately not exposed.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct HistoryEntry {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub input_length: i64,
    pub execution_time: f64,
    pub summary: String,
}

impl From<LogEntry> for HistoryEntry {
    fn from(e: LogEntry) -> Self {
        Self {
            id: e.id,
            timestamp: e.timestamp,
            input_length: e.input_length,
            execution_time: e.execution_time,
            summary: e.summary,
        }
    }
}
