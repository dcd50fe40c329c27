use std::sync::Arc;

use clap::Parser;
use synopsis_core::{
    create_backend, db, BackendConfig, LogStore, SqliteLogStore, SummarizationBackend,
    SynopsisConfig,
};
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};

use synopsis_server::http::{self, HttpState};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "synopsis.toml")]
    config: String,

    /// Check the database and summarization model, then exit
    #[arg(long)]
    health: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (dev convenience — production uses real env vars)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Load config
    let config = match SynopsisConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    // Init logging
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.service.log_level)),
        )
        .init();

    // Connect to DB
    let pool = match db::create_pool(&config.database).await {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to open database {}: {}", config.database.url, e);
            std::process::exit(1);
        }
    };
    db::run_migrations(&pool).await?;
    let store = SqliteLogStore::new(pool);

    // Load the summarization model once; every request shares it
    tracing::info!(
        backend = %config.summarizer.backend,
        model = %config.summarizer.model,
        "Loading summarization model... (this may take a moment)"
    );
    let backend: Arc<dyn SummarizationBackend> =
        match BackendConfig::from_settings(&config.summarizer).and_then(create_backend) {
            Ok(b) => Arc::from(b),
            Err(e) => {
                eprintln!("Failed to load summarization backend: {}", e);
                std::process::exit(1);
            }
        };
    tracing::info!(backend = backend.name(), "Model loaded successfully");

    if args.health {
        match store.health().await {
            Ok(v) => println!("✅ SQLite connected: {}", v),
            Err(e) => {
                println!("❌ SQLite check failed: {}", e);
                std::process::exit(1);
            }
        }
        println!("✅ Summarization backend ready: {} ({})", backend.name(), backend.model());
        println!("✅ synopsis health check passed");
        return Ok(());
    }

    let (tx, rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    let state = Arc::new(HttpState {
        store: Arc::new(store),
        backend,
        config,
    });

    http::start_http_server(state, rx).await?;
    drop(tx);

    Ok(())
}
