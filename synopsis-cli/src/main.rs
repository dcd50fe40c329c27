//! synopsis-cli — command-line client for the synopsis summarization service
//!
//! # Subcommands
//! - `summarize [TEXT] [--file PATH] [--max-length N] [--min-length N] [--json]`
//! - `history [-n <limit>] [--json]` — recent requests, newest first
//! - `status`                        — show server health
//!
//! Text is read from stdin when neither TEXT nor `--file` is given.

use std::io::Read;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

const DEFAULT_SERVER: &str = "http://127.0.0.1:8000";
const DEFAULT_HISTORY_LIMIT: u32 = 10;
const PREVIEW_CHARS: usize = 80;

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(
    name = "synopsis-cli",
    version,
    about = "Summarize text with a synopsis server and browse its history"
)]
struct Cli {
    /// synopsis HTTP server URL (overrides SYNOPSIS_HTTP_URL env var)
    #[arg(long, env = "SYNOPSIS_HTTP_URL", default_value = DEFAULT_SERVER)]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Summarize a piece of text
    Summarize {
        /// Text to summarize (stdin when omitted)
        text: Option<String>,

        /// Read the text from a file instead
        #[arg(short, long, conflicts_with = "text")]
        file: Option<PathBuf>,

        /// Upper bound on summary length, in tokens (10-200)
        #[arg(long, default_value_t = 60)]
        max_length: u32,

        /// Lower bound on summary length, in tokens (5-100)
        #[arg(long, default_value_t = 10)]
        min_length: u32,

        /// Print the raw JSON response
        #[arg(long)]
        json: bool,
    },

    /// List recent summarization requests
    History {
        /// Maximum number of entries to show
        #[arg(short = 'n', long, default_value_t = DEFAULT_HISTORY_LIMIT)]
        limit: u32,

        /// Print the raw JSON array
        #[arg(long)]
        json: bool,
    },

    /// Show synopsis server status
    Status,
}

// ============================================================================
// API Response Types
// ============================================================================

/// Response body of POST /summarize
#[derive(Debug, Deserialize, Serialize)]
pub struct SummaryResponse {
    pub summary: String,
    pub input_length: i64,
    pub execution_time: f64,
}

/// One entry of GET /history
#[derive(Debug, Deserialize, Serialize)]
pub struct HistoryItem {
    pub id: i64,
    pub timestamp: String,
    pub input_length: i64,
    pub execution_time: f64,
    pub summary: String,
}

// ============================================================================
// Formatting
// ============================================================================

/// Single-line preview of a summary, capped at `max` characters.
pub fn preview(text: &str, max: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max {
        return flat;
    }
    let mut cut: String = flat.chars().take(max.saturating_sub(1)).collect();
    cut.push('…');
    cut
}

/// `#id  timestamp  chars  seconds  preview`
pub fn format_history_line(item: &HistoryItem) -> String {
    // drop fractional seconds for display
    let timestamp = item
        .timestamp
        .split_once('.')
        .map(|(head, _)| format!("{head}Z"))
        .unwrap_or_else(|| item.timestamp.clone());
    format!(
        "#{:<5} {}  {:>6} chars  {:>6.2}s  {}",
        item.id,
        timestamp,
        item.input_length,
        item.execution_time,
        preview(&item.summary, PREVIEW_CHARS)
    )
}

pub fn format_summary(resp: &SummaryResponse) -> String {
    format!(
        "{}\n\n({} chars in, {:.2}s)",
        resp.summary.trim(),
        resp.input_length,
        resp.execution_time
    )
}

/// Pull the `error` field out of an API error body, falling back to the raw text.
pub fn api_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .or_else(|| v.get("detail"))
                .and_then(|e| e.as_str().map(str::to_string))
        })
        .unwrap_or_else(|| body.trim().to_string())
}

// ============================================================================
// HTTP Client Calls
// ============================================================================

fn client(timeout_secs: u64) -> anyhow::Result<reqwest::blocking::Client> {
    Ok(reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()?)
}

fn read_input(text: Option<String>, file: Option<PathBuf>) -> anyhow::Result<String> {
    if let Some(text) = text {
        return Ok(text);
    }
    if let Some(path) = file {
        return std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()));
    }
    let mut buf = String::new();
    std::io::stdin()
        .read_to_string(&mut buf)
        .context("failed to read stdin")?;
    Ok(buf)
}

fn do_summarize(
    server: &str,
    text: String,
    max_length: u32,
    min_length: u32,
    json_output: bool,
) -> anyhow::Result<()> {
    // model inference on CPU can be slow for long inputs
    let client = client(300)?;
    let url = format!("{}/summarize", server);
    let body = serde_json::json!({
        "text": text,
        "max_length": max_length,
        "min_length": min_length,
    });

    let resp = match client.post(&url).json(&body).send() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("synopsis-cli: connection failed to {}: {}", url, e);
            std::process::exit(1);
        }
    };

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().unwrap_or_default();
        eprintln!(
            "synopsis-cli: server returned {}: {}",
            status,
            api_error_message(&body)
        );
        std::process::exit(1);
    }

    let summary: SummaryResponse = resp.json().context("failed to parse summary response")?;
    if json_output {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("{}", format_summary(&summary));
    }
    Ok(())
}

fn do_history(server: &str, limit: u32, json_output: bool) -> anyhow::Result<()> {
    let client = client(30)?;
    let url = format!("{}/history", server);

    let resp = match client.get(&url).query(&[("limit", limit)]).send() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("synopsis-cli: connection failed to {}: {}", url, e);
            std::process::exit(1);
        }
    };

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().unwrap_or_default();
        eprintln!(
            "synopsis-cli: server returned {}: {}",
            status,
            api_error_message(&body)
        );
        std::process::exit(1);
    }

    let items: Vec<HistoryItem> = resp.json().context("failed to parse history response")?;
    if json_output {
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else if items.is_empty() {
        eprintln!("No summaries logged yet");
    } else {
        for item in &items {
            println!("{}", format_history_line(item));
        }
    }
    Ok(())
}

/// Show the server status by calling GET /health.
fn do_status(server: &str) -> anyhow::Result<()> {
    let client = client(10)?;
    let url = format!("{}/health", server);

    match client.get(&url).send() {
        Ok(r) if r.status().is_success() => {
            let body: serde_json::Value = r.json().unwrap_or_default();
            println!("synopsis server: {}", body["status"].as_str().unwrap_or("unknown"));
            println!("Version:         {}", body["version"].as_str().unwrap_or("?"));
            println!("SQLite:          {}", body["sqlite"].as_str().unwrap_or("?"));
            println!("Backend:         {}", body["backend"].as_str().unwrap_or("?"));
            println!("Model:           {}", body["model"].as_str().unwrap_or("?"));
        }
        Ok(r) => {
            eprintln!("synopsis-cli: server unhealthy (HTTP {})", r.status());
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("synopsis-cli: cannot reach {}: {}", url, e);
            std::process::exit(1);
        }
    }

    Ok(())
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    let cli = Cli::parse();
    let server = cli.server.trim_end_matches('/').to_string();

    let result = match cli.command {
        Commands::Summarize {
            text,
            file,
            max_length,
            min_length,
            json,
        } => read_input(text, file)
            .and_then(|text| do_summarize(&server, text, max_length, min_length, json)),
        Commands::History { limit, json } => do_history(&server, limit, json),
        Commands::Status => do_status(&server),
    };

    if let Err(e) = result {
        eprintln!("synopsis-cli: {:#}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================
