use crate::config::DatabaseConfig;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;

/// Open the SQLite pool described by `config`, creating the database file
/// (and its parent directory) if needed.
///
/// In-memory databases are pinned to one connection: each SQLite connection
/// to `:memory:` is a separate database.
pub async fn create_pool(config: &DatabaseConfig) -> Result<SqlitePool, sqlx::Error> {
    let url = expand_sqlite_url(&config.url);
    let in_memory = is_memory_url(&url);
    if !in_memory {
        ensure_parent_dir(&url);
    }

    let options = SqliteConnectOptions::from_str(&url)?.create_if_missing(true);
    let pool_options = if in_memory {
        // the database lives exactly as long as its only connection
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(config.max_connections.max(1))
    };

    pool_options.connect_with(options).await
}

/// Create the `logs` table if absent.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
            input_length INTEGER NOT NULL,
            execution_time REAL NOT NULL,
            summary TEXT NOT NULL,
            input_text TEXT NOT NULL
        )"#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn health_check(pool: &SqlitePool) -> Result<String, sqlx::Error> {
    let row: (String,) = sqlx::query_as("SELECT sqlite_version()")
        .fetch_one(pool)
        .await?;
    Ok(row.0)
}

/// Expand `~` and environment variables in the path part of a sqlite URL.
pub fn expand_sqlite_url(url: &str) -> String {
    let Some(path) = url.strip_prefix("sqlite://") else {
        return url.to_string();
    };
    match shellexpand::full(path) {
        Ok(expanded) => format!("sqlite://{expanded}"),
        Err(_) => url.to_string(),
    }
}

fn is_memory_url(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}

fn ensure_parent_dir(url: &str) {
    let path_part = url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:");
    let path_only = path_part.split('?').next().unwrap_or_default();
    if path_only.is_empty() {
        return;
    }
    if let Some(parent) = Path::new(path_only).parent() {
        if !parent.as_os_str().is_empty() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::warn!(path = %parent.display(), error = %e, "Could not create database directory");
            }
        }
    }
}
