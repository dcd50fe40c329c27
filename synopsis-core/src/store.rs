//! Persistence store for request logs.
//!
//! The `logs` table is append-only: this module exposes inserts and reads,
//! never updates or deletes.

use async_trait::async_trait;
use sqlx::SqlitePool;
use thiserror::Error;

use crate::models::{HistoryEntry, LogEntry, NewLogEntry};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    /// The pool is closed or no connection could be acquired.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut => {
                StoreError::Unavailable(err.to_string())
            }
            other => StoreError::Database(other),
        }
    }
}

/// Minimal persistence interface used by the request handlers.
#[async_trait]
pub trait LogStore: Send + Sync {
    /// Append one entry and return its store-assigned id.
    async fn insert(&self, entry: &NewLogEntry) -> Result<i64, StoreError>;

    /// Most recent entries, newest first, at most `limit` of them.
    async fn list_recent(&self, limit: u32) -> Result<Vec<HistoryEntry>, StoreError>;

    /// Backend version string, used by health checks.
    async fn health(&self) -> Result<String, StoreError>;
}

/// `LogStore` backed by a SQLite connection pool.
#[derive(Debug, Clone)]
pub struct SqliteLogStore {
    pool: SqlitePool,
}

impl SqliteLogStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Full row including `input_text`, for auditing.
    pub async fn find(&self, id: i64) -> Result<Option<LogEntry>, StoreError> {
        let row = sqlx::query_as::<_, LogEntry>(
            "SELECT id, timestamp, input_length, execution_time, summary, input_text
             FROM logs WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }
}

#[async_trait]
impl LogStore for SqliteLogStore {
    async fn insert(&self, entry: &NewLogEntry) -> Result<i64, StoreError> {
        let result = sqlx::query(
            "INSERT INTO logs (input_length, execution_time, summary, input_text)
             VALUES (?, ?, ?, ?)",
        )
        .bind(entry.input_length)
        .bind(entry.execution_time)
        .bind(&entry.summary)
        .bind(&entry.input_text)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        tracing::debug!(id, input_length = entry.input_length, "Stored summarization log");
        Ok(id)
    }

    async fn list_recent(&self, limit: u32) -> Result<Vec<HistoryEntry>, StoreError> {
        let rows = sqlx::query_as::<_, HistoryEntry>(
            "SELECT id, timestamp, input_length, execution_time, summary
             FROM logs ORDER BY id DESC LIMIT ?",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn health(&self) -> Result<String, StoreError> {
        Ok(crate::db::health_check(&self.pool).await?)
    }
}
