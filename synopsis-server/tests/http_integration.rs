//! HTTP integration tests for the synopsis REST API
//!
//! Each test builds the full router over an in-memory SQLite store and a stub
//! summarization backend, then dispatches requests with `oneshot`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::json;
use synopsis_core::config::{CorsConfig, DatabaseConfig};
use synopsis_core::{
    db, LogStore, NewLogEntry, SqliteLogStore, SummarizationBackend, SummarizeParams,
    SummarizerError, SynopsisConfig,
};
use synopsis_server::http::{build_router, HttpState};
use tower::ServiceExt;

const ARTICLE: &str = "The city council approved the new transit plan on Tuesday. \
    The plan adds three bus lines and extends light rail service to the airport. \
    Construction is expected to begin next spring.";

// ===========================================================================
// Test doubles and helpers
// ===========================================================================

/// Returns the first sentence of the input; optionally fails every call.
struct FirstSentence {
    calls: AtomicUsize,
    fail: bool,
}

impl FirstSentence {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail: false,
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail: true,
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SummarizationBackend for FirstSentence {
    async fn summarize(&self, params: &SummarizeParams) -> Result<String, SummarizerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(SummarizerError::OnnxInference("model crashed".to_string()));
        }
        let sentence = params.text.split_inclusive('.').next().unwrap_or_default();
        Ok(sentence.trim().to_string())
    }

    fn name(&self) -> &str {
        "first-sentence"
    }

    fn model(&self) -> &str {
        "stub"
    }
}

async fn memory_store() -> SqliteLogStore {
    let pool = db::create_pool(&DatabaseConfig {
        url: "sqlite::memory:".to_string(),
        max_connections: 1,
    })
    .await
    .expect("connect memory sqlite");
    db::run_migrations(&pool).await.expect("migrate");
    SqliteLogStore::new(pool)
}

fn make_app(
    store: SqliteLogStore,
    backend: Arc<FirstSentence>,
    config: SynopsisConfig,
) -> Router {
    build_router(Arc::new(HttpState {
        store: Arc::new(store),
        backend,
        config,
    }))
}

fn summarize_request(body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/summarize")
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, serde_json::Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

// ===========================================================================
// POST /summarize
// ===========================================================================

#[tokio::test]
async fn test_summarize_returns_summary_and_timing() {
    let backend = FirstSentence::new();
    let app = make_app(memory_store().await, backend.clone(), SynopsisConfig::default());

    let (status, body) = send(
        &app,
        summarize_request(json!({ "text": ARTICLE, "max_length": 60, "min_length": 10 })),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "body: {body}");
    assert_eq!(
        body["summary"],
        "The city council approved the new transit plan on Tuesday."
    );
    assert_eq!(body["input_length"], ARTICLE.chars().count() as u64);
    assert!(body["execution_time"].as_f64().unwrap() >= 0.0);
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn test_summarize_uses_default_bounds() {
    let app = make_app(memory_store().await, FirstSentence::new(), SynopsisConfig::default());

    let (status, body) = send(&app, summarize_request(json!({ "text": "Short note." }))).await;
    assert_eq!(status, StatusCode::OK, "body: {body}");
    assert_eq!(body["input_length"], 11);
}

#[tokio::test]
async fn test_empty_text_rejected_without_insert() {
    let backend = FirstSentence::new();
    let app = make_app(memory_store().await, backend.clone(), SynopsisConfig::default());

    for text in ["", "   ", "\n\t  \n"] {
        let (status, body) = send(&app, summarize_request(json!({ "text": text }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "text {text:?}");
        assert_eq!(body["status"], "error");
        assert_eq!(body["error"], "Text cannot be empty");
    }

    assert_eq!(backend.calls(), 0);
    let (status, history) = send(&app, get_request("/history")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_out_of_range_bounds_rejected_before_backend() {
    let backend = FirstSentence::new();
    let app = make_app(memory_store().await, backend.clone(), SynopsisConfig::default());

    for (max_length, min_length) in [(9, 10), (201, 10), (60, 4), (60, 101), (0, 0)] {
        let (status, body) = send(
            &app,
            summarize_request(json!({
                "text": ARTICLE,
                "max_length": max_length,
                "min_length": min_length,
            })),
        )
        .await;
        assert_eq!(
            status,
            StatusCode::UNPROCESSABLE_ENTITY,
            "bounds ({max_length}, {min_length})"
        );
        assert!(body["error"].as_str().unwrap().contains("must be between"));
    }

    assert_eq!(backend.calls(), 0, "backend must not be invoked on bad bounds");
}

#[tokio::test]
async fn test_bounds_checked_before_empty_text() {
    let app = make_app(memory_store().await, FirstSentence::new(), SynopsisConfig::default());

    let (status, _) = send(
        &app,
        summarize_request(json!({ "text": "", "max_length": 500 })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_missing_text_field_is_unprocessable_json() {
    let backend = FirstSentence::new();
    let app = make_app(memory_store().await, backend.clone(), SynopsisConfig::default());

    let (status, body) = send(&app, summarize_request(json!({ "max_length": 60 }))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["status"], "error", "body: {body}");
    assert!(body["error"].as_str().unwrap().contains("text"));
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn test_malformed_bodies_use_error_json() {
    let app = make_app(memory_store().await, FirstSentence::new(), SynopsisConfig::default());

    // wrong type for a bound
    let (status, body) = send(
        &app,
        summarize_request(json!({ "text": ARTICLE, "max_length": "long" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["status"], "error");

    // not JSON at all
    let req = Request::builder()
        .method("POST")
        .uri("/summarize")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");

    // missing content type
    let req = Request::builder()
        .method("POST")
        .uri("/summarize")
        .body(Body::from(json!({ "text": ARTICLE }).to_string()))
        .unwrap();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(body["status"], "error");
}

#[tokio::test]
async fn test_backend_failure_is_server_error_without_insert() {
    let app = make_app(memory_store().await, FirstSentence::failing(), SynopsisConfig::default());

    let (status, body) = send(&app, summarize_request(json!({ "text": ARTICLE }))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["status"], "error");
    assert!(body["error"].as_str().unwrap().contains("model crashed"));

    let (_, history) = send(&app, get_request("/history")).await;
    assert!(history.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_summarize_succeeds_when_store_unreachable() {
    let store = memory_store().await;
    let pool = store.pool().clone();
    let app = make_app(store, FirstSentence::new(), SynopsisConfig::default());

    pool.close().await;

    let (status, body) = send(&app, summarize_request(json!({ "text": ARTICLE }))).await;
    assert_eq!(status, StatusCode::OK, "write failure must not fail the response");
    assert_eq!(
        body["summary"],
        "The city council approved the new transit plan on Tuesday."
    );
    assert_eq!(body["input_length"], ARTICLE.chars().count() as u64);

    // reads, unlike the write path, surface the failure
    let (status, body) = send(&app, get_request("/history")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["status"], "error");
}

// ===========================================================================
// GET /history
// ===========================================================================

#[tokio::test]
async fn test_history_after_n_calls_is_newest_first() {
    let app = make_app(memory_store().await, FirstSentence::new(), SynopsisConfig::default());

    let n = 4;
    for i in 0..n {
        let text = format!("Request number {i}. Trailing sentence.");
        let (status, _) = send(&app, summarize_request(json!({ "text": text }))).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = send(&app, get_request(&format!("/history?limit={n}"))).await;
    assert_eq!(status, StatusCode::OK);
    let entries = body.as_array().unwrap();
    assert_eq!(entries.len(), n);

    let ids: Vec<i64> = entries.iter().map(|e| e["id"].as_i64().unwrap()).collect();
    assert!(ids.windows(2).all(|w| w[0] > w[1]), "ids not descending: {ids:?}");
    // newest entry belongs to the last call
    assert_eq!(entries[0]["summary"], format!("Request number {}.", n - 1));
    assert_eq!(entries[n - 1]["summary"], "Request number 0.");
}

#[tokio::test]
async fn test_history_limit_two_after_five_inserts() {
    let app = make_app(memory_store().await, FirstSentence::new(), SynopsisConfig::default());

    for i in 1..=5 {
        let text = format!("Entry {i}.");
        send(&app, summarize_request(json!({ "text": text }))).await;
    }

    let (status, body) = send(&app, get_request("/history?limit=2")).await;
    assert_eq!(status, StatusCode::OK);
    let entries = body.as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["summary"], "Entry 5.");
    assert_eq!(entries[1]["summary"], "Entry 4.");
}

#[tokio::test]
async fn test_history_entry_shape_omits_input_text() {
    let app = make_app(memory_store().await, FirstSentence::new(), SynopsisConfig::default());
    send(&app, summarize_request(json!({ "text": ARTICLE }))).await;

    let (_, body) = send(&app, get_request("/history")).await;
    let entry = &body.as_array().unwrap()[0];
    let obj = entry.as_object().unwrap();

    let mut keys: Vec<&str> = obj.keys().map(String::as_str).collect();
    keys.sort_unstable();
    assert_eq!(
        keys,
        vec!["execution_time", "id", "input_length", "summary", "timestamp"]
    );
    let ts = entry["timestamp"].as_str().unwrap();
    assert!(
        chrono::DateTime::parse_from_rfc3339(ts).is_ok(),
        "timestamp should be RFC 3339: {ts}"
    );
}

#[tokio::test]
async fn test_history_default_limit_is_fifty() {
    let store = memory_store().await;
    for i in 0..55 {
        store
            .insert(&NewLogEntry {
                input_length: 1,
                execution_time: 0.01,
                summary: format!("s{i}"),
                input_text: "x".to_string(),
            })
            .await
            .unwrap();
    }
    let app = make_app(store, FirstSentence::new(), SynopsisConfig::default());

    let (status, body) = send(&app, get_request("/history")).await;
    assert_eq!(status, StatusCode::OK);
    let entries = body.as_array().unwrap();
    assert_eq!(entries.len(), 50);
    assert_eq!(entries[0]["summary"], "s54");
}

#[tokio::test]
async fn test_history_default_limit_follows_config() {
    let store = memory_store().await;
    for i in 0..5 {
        store
            .insert(&NewLogEntry {
                input_length: 1,
                execution_time: 0.01,
                summary: format!("s{i}"),
                input_text: "x".to_string(),
            })
            .await
            .unwrap();
    }
    let mut config = SynopsisConfig::default();
    config.history.default_limit = 3;
    let app = make_app(store, FirstSentence::new(), config);

    let (_, body) = send(&app, get_request("/history")).await;
    assert_eq!(body.as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_history_rejects_invalid_limit_with_error_json() {
    let app = make_app(memory_store().await, FirstSentence::new(), SynopsisConfig::default());

    for uri in ["/history?limit=abc", "/history?limit=-1"] {
        let (status, body) = send(&app, get_request(uri)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "uri {uri}");
        assert_eq!(body["status"], "error", "uri {uri}: {body}");
        assert!(body["error"].is_string());
    }
}

// ===========================================================================
// Concurrency
// ===========================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_each_logged_once() {
    let store = memory_store().await;
    let app = make_app(store, FirstSentence::new(), SynopsisConfig::default());

    let requests = (0..8).map(|i| {
        let app = app.clone();
        async move {
            let text = format!("Concurrent request {i}. More text follows.");
            send(&app, summarize_request(json!({ "text": text }))).await
        }
    });
    let results = futures::future::join_all(requests).await;
    assert!(results.iter().all(|(status, _)| *status == StatusCode::OK));

    let (_, body) = send(&app, get_request("/history?limit=100")).await;
    let entries = body.as_array().unwrap();
    assert_eq!(entries.len(), 8);

    let mut ids: Vec<i64> = entries.iter().map(|e| e["id"].as_i64().unwrap()).collect();
    ids.dedup();
    assert_eq!(ids.len(), 8, "ids must be unique");
}

// ===========================================================================
// Health / version
// ===========================================================================

#[tokio::test]
async fn test_health_reports_store_and_backend() {
    let app = make_app(memory_store().await, FirstSentence::new(), SynopsisConfig::default());

    let (status, body) = send(&app, get_request("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert!(body["sqlite"].is_string());
    assert_eq!(body["backend"], "first-sentence");
    assert_eq!(body["model"], "stub");
}

#[tokio::test]
async fn test_health_unavailable_when_store_closed() {
    let store = memory_store().await;
    let pool = store.pool().clone();
    let app = make_app(store, FirstSentence::new(), SynopsisConfig::default());
    pool.close().await;

    let (status, body) = send(&app, get_request("/health")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "unhealthy");
}

#[tokio::test]
async fn test_version_endpoint() {
    let app = make_app(memory_store().await, FirstSentence::new(), SynopsisConfig::default());

    let (status, body) = send(&app, get_request("/version")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["service"], "synopsis");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

// ===========================================================================
// CORS
// ===========================================================================

fn preflight(origin: &str) -> Request<Body> {
    Request::builder()
        .method("OPTIONS")
        .uri("/summarize")
        .header(header::ORIGIN, origin)
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type")
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_open_cors_mirrors_origin_with_credentials() {
    let app = make_app(memory_store().await, FirstSentence::new(), SynopsisConfig::default());

    let resp = app
        .clone()
        .oneshot(preflight("http://frontend.example:3000"))
        .await
        .unwrap();
    assert!(resp.status().is_success());
    let headers = resp.headers();
    assert_eq!(
        headers[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "http://frontend.example:3000"
    );
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
    assert!(headers
        .get(header::ACCESS_CONTROL_ALLOW_METHODS)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("POST")));
}

#[tokio::test]
async fn test_explicit_cors_origin_list() {
    let mut config = SynopsisConfig::default();
    config.http.cors = CorsConfig {
        allowed_origins: vec!["http://localhost:3000".to_string()],
        allow_credentials: true,
    };
    let app = make_app(memory_store().await, FirstSentence::new(), config);

    let resp = app.clone().oneshot(preflight("http://localhost:3000")).await.unwrap();
    assert_eq!(
        resp.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "http://localhost:3000"
    );

    let resp = app.clone().oneshot(preflight("http://evil.example")).await.unwrap();
    assert!(resp
        .headers()
        .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
        .is_none());
}

// ===========================================================================
// Timeout
// ===========================================================================

struct Sleepy;

#[async_trait]
impl SummarizationBackend for Sleepy {
    async fn summarize(&self, _params: &SummarizeParams) -> Result<String, SummarizerError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok("too late".to_string())
    }

    fn name(&self) -> &str {
        "sleepy"
    }

    fn model(&self) -> &str {
        "stub"
    }
}

#[tokio::test]
async fn test_configured_timeout_returns_server_error() {
    let mut config = SynopsisConfig::default();
    config.summarizer.timeout_seconds = Some(1);
    let app = build_router(Arc::new(HttpState {
        store: Arc::new(memory_store().await),
        backend: Arc::new(Sleepy),
        config,
    }));

    let (status, body) = send(&app, summarize_request(json!({ "text": ARTICLE }))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("Timeout"));
}
