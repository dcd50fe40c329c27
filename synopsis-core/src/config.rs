use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Checkpoint used by both backends unless configured otherwise.
pub const DEFAULT_MODEL: &str = "sshleifer/distilbart-cnn-12-6";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SynopsisConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub summarizer: SummarizerConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub history: HistoryConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServiceConfig {
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://summaries.db".to_string(),
            max_connections: 5,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SummarizerConfig {
    /// `onnx` (local inference) or `http` (hosted inference API).
    pub backend: String,
    pub model: String,
    /// Directory holding `encoder_model.onnx`, `decoder_model.onnx` and
    /// `tokenizer.json`. Empty means the per-user default location.
    pub model_dir: String,
    pub api_url: String,
    /// Upper bound on a single summarization call. `None` waits indefinitely.
    ///
    /// An expired call only stops the request from waiting. Local ONNX
    /// inference keeps running on its blocking thread and holds the model
    /// lock until it finishes, so requests behind it still queue for that time.
    pub timeout_seconds: Option<u64>,
    pub max_input_tokens: usize,
    pub no_repeat_ngram_size: usize,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            backend: "onnx".to_string(),
            model: DEFAULT_MODEL.to_string(),
            model_dir: String::new(),
            api_url: "https://api-inference.huggingface.co".to_string(),
            timeout_seconds: None,
            max_input_tokens: 1024,
            no_repeat_ngram_size: 3,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
    pub cors: CorsConfig,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors: CorsConfig::default(),
        }
    }
}

/// Cross-origin policy. `"*"` in `allowed_origins` admits every origin.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allow_credentials: bool,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["*".to_string()],
            allow_credentials: true,
        }
    }
}

impl CorsConfig {
    pub fn allows_any_origin(&self) -> bool {
        self.allowed_origins.iter().any(|o| o == "*")
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HistoryConfig {
    pub default_limit: u32,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { default_limit: 50 }
    }
}

impl SynopsisConfig {
    /// Load `path` (optional) layered with `SYNOPSIS__*` environment variables.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        Self::load_with_env(path, environment())
    }

    fn load_with_env(path: &str, env: Environment) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(env)
            .build()?;
        s.try_deserialize()
    }
}

/// `SYNOPSIS__HTTP__PORT=9000` style overrides; CORS origins are comma-separated.
fn environment() -> Environment {
    Environment::with_prefix("SYNOPSIS")
        .prefix_separator("__")
        .separator("__")
        .list_separator(",")
        .with_list_parse_key("http.cors.allowed_origins")
        .try_parsing(true)
}
