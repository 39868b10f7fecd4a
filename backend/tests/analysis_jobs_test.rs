//! Router-level tests for the analysis job lifecycle.
//!
//! The app runs against `InMemoryAnalysisStore` and scripted engines; the
//! Postgres pool is connected lazily and never used by these routes.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use sqlx::postgres::PgPoolOptions;
use tokio::sync::Notify;
use tower::ServiceExt;

use stockdash_backend::app::create_app;
use stockdash_backend::config::AppConfig;
use stockdash_backend::external::analysis_engine::{AnalysisEngine, EngineError};
use stockdash_backend::state::AppState;
use stockdash_backend::store::InMemoryAnalysisStore;

struct StaticEngine(Value);

#[async_trait]
impl AnalysisEngine for StaticEngine {
    async fn analyze_batch(&self, _tickers: &[String], _period: &str) -> Result<Value, EngineError> {
        Ok(self.0.clone())
    }
}

struct TimeoutEngine;

#[async_trait]
impl AnalysisEngine for TimeoutEngine {
    async fn analyze_batch(&self, _tickers: &[String], _period: &str) -> Result<Value, EngineError> {
        Err(EngineError::Timeout(300))
    }
}

/// Holds the engine call open until the test releases it.
struct GatedEngine {
    gate: Arc<Notify>,
    body: Value,
}

#[async_trait]
impl AnalysisEngine for GatedEngine {
    async fn analyze_batch(&self, _tickers: &[String], _period: &str) -> Result<Value, EngineError> {
        self.gate.notified().await;
        Ok(self.body.clone())
    }
}

fn test_config() -> AppConfig {
    AppConfig::from_lookup(|name| match name {
        "DATABASE_URL" => Some("postgres://localhost/stockdash_test".to_string()),
        _ => None,
    })
    .unwrap()
}

fn build_app(store: Arc<InMemoryAnalysisStore>, engine: Arc<dyn AnalysisEngine>) -> Router {
    let config = test_config();
    let pool = PgPoolOptions::new()
        .connect_lazy(&config.database_url)
        .unwrap();
    create_app(AppState::new(pool, store, engine, config))
}

fn seeded_store() -> Arc<InMemoryAnalysisStore> {
    let store = Arc::new(InMemoryAnalysisStore::new());
    store.add_stock("AAA", "Alpha Industries");
    store.add_stock("BBB", "Beta Holdings");
    store
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

async fn trigger(app: &Router, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri("/api/analysis/trigger")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

async fn job_status(app: &Router, job_id: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .uri(format!("/api/analysis/job/{}", job_id))
        .body(Body::empty())
        .unwrap();
    send(app, request).await
}

/// Polls the status endpoint until the job reaches a terminal state.
async fn wait_for_terminal(app: &Router, job_id: &str) -> Value {
    for _ in 0..200 {
        let (status, body) = job_status(app, job_id).await;
        assert_eq!(status, StatusCode::OK);
        if body["status"] == "completed" || body["status"] == "failed" {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {} never finished", job_id);
}

#[tokio::test]
async fn both_valid_tickers_complete() {
    let store = seeded_store();
    let engine = StaticEngine(json!({
        "AAA": {"signal": "BUY", "composite_score": 72.0, "confidence": 0.8},
        "BBB": {"signal": "SELL", "score": 31.0, "confidence": 0.6}
    }));
    let app = build_app(store.clone(), Arc::new(engine));

    let (status, body) = trigger(&app, json!({"stockIds": [1, 2]})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["status"], "processing");
    assert_eq!(body["analysisCount"], 2);
    assert_eq!(body["tickers"], json!(["AAA", "BBB"]));

    let job_id = body["jobId"].as_str().unwrap().to_string();
    let job = wait_for_terminal(&app, &job_id).await;

    assert_eq!(job["status"], "completed");
    assert_eq!(job["totalCount"], 2);
    assert_eq!(job["processedCount"], 2);
    assert_eq!(job["successCount"], 2);
    assert_eq!(job["failedCount"], 0);
    assert!(job["completedAt"].is_string());
    assert!(job.get("errorMessage").is_none());

    assert_eq!(store.results_for(1).len(), 1);
    assert_eq!(store.results_for(2).len(), 1);
    assert_eq!(store.job_count(), 1);
}

#[tokio::test]
async fn repeated_reads_of_finished_job_are_identical() {
    let store = seeded_store();
    let app = build_app(store, Arc::new(StaticEngine(json!({"AAA": {"signal": "HOLD"}}))));

    let (_, body) = trigger(&app, json!({"stockIds": [1]})).await;
    let job_id = body["jobId"].as_str().unwrap().to_string();
    let first = wait_for_terminal(&app, &job_id).await;

    for _ in 0..3 {
        let (status, again) = job_status(&app, &job_id).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(again, first);
    }
}

#[tokio::test]
async fn engine_timeout_fails_job_without_counting() {
    let store = seeded_store();
    let app = build_app(store.clone(), Arc::new(TimeoutEngine));

    let (status, body) = trigger(&app, json!({"stockIds": [1, 2]})).await;
    assert_eq!(status, StatusCode::OK);

    let job = wait_for_terminal(&app, body["jobId"].as_str().unwrap()).await;
    assert_eq!(job["status"], "failed");
    assert!(!job["errorMessage"].as_str().unwrap().is_empty());
    assert_eq!(job["processedCount"], 0);
    assert_eq!(job["successCount"], 0);
    assert!(job["completedAt"].is_string());
    assert!(store.results_for(1).is_empty());
}

#[tokio::test]
async fn list_item_without_ticker_is_skipped() {
    let store = seeded_store();
    let engine = StaticEngine(json!([
        {"ticker": "AAA", "signal": "BUY", "score": 65},
        {"signal": "SELL", "score": 20}
    ]));
    let app = build_app(store.clone(), Arc::new(engine));

    let (_, body) = trigger(&app, json!({"stockIds": [1, 2]})).await;
    let job = wait_for_terminal(&app, body["jobId"].as_str().unwrap()).await;

    assert_eq!(job["status"], "completed");
    assert_eq!(job["successCount"], 1);
    assert_eq!(job["processedCount"], 2);
    assert_eq!(job["failedCount"], 1);
    assert_eq!(store.results_for(1).len(), 1);
    assert!(store.results_for(2).is_empty());
}

#[tokio::test]
async fn failing_ticker_does_not_affect_siblings() {
    let store = seeded_store();
    // BBB's payload cannot be stored, AAA's can
    let engine = StaticEngine(json!({
        "AAA": {"signal": "BUY"},
        "BBB": "not an object"
    }));
    let app = build_app(store.clone(), Arc::new(engine));

    let (_, body) = trigger(&app, json!({"stockIds": [1, 2]})).await;
    let job = wait_for_terminal(&app, body["jobId"].as_str().unwrap()).await;

    assert_eq!(job["status"], "completed");
    assert_eq!(job["successCount"], 1);
    assert_eq!(job["failedCount"], 1);
    assert_eq!(store.results_for(1).len(), 1);
}

#[tokio::test]
async fn trigger_responds_before_engine_finishes() {
    let store = seeded_store();
    let gate = Arc::new(Notify::new());
    let engine = GatedEngine {
        gate: gate.clone(),
        body: json!({"AAA": {"signal": "BUY"}}),
    };
    let app = build_app(store.clone(), Arc::new(engine));

    let (status, body) = trigger(&app, json!({"stockIds": [1]})).await;
    assert_eq!(status, StatusCode::OK);
    let job_id = body["jobId"].as_str().unwrap().to_string();

    let (_, pending) = job_status(&app, &job_id).await;
    assert!(pending["status"] == "pending" || pending["status"] == "processing");
    assert!(pending.get("completedAt").is_none());
    assert!(store.results_for(1).is_empty());

    gate.notify_one();
    let job = wait_for_terminal(&app, &job_id).await;
    assert_eq!(job["status"], "completed");
    assert_eq!(store.results_for(1).len(), 1);
}

#[tokio::test]
async fn unknown_and_malformed_job_ids_are_404() {
    let app = build_app(seeded_store(), Arc::new(TimeoutEngine));

    let (status, body) = job_status(&app, &uuid::Uuid::new_v4().to_string()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["status"], 404);

    let (status, _) = job_status(&app, "unknown-id").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn trigger_rejects_bad_input() {
    let store = seeded_store();
    let app = build_app(store.clone(), Arc::new(TimeoutEngine));

    for bad in [json!({}), json!({"stockIds": []}), json!({"stockIds": ["a", "b"]})] {
        let (status, body) = trigger(&app, bad).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["status"], 400);
        assert!(body["timestamp"].is_string());
    }

    let (status, _) = trigger(&app, json!({"stockIds": [99, 100]})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(store.job_count(), 0);
}

#[tokio::test]
async fn save_endpoint_validates_and_persists() {
    let store = seeded_store();
    let app = build_app(store.clone(), Arc::new(TimeoutEngine));

    let save = |body: Value| {
        Request::builder()
            .method("POST")
            .uri("/api/analysis/save")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    };

    let (status, _) = send(&app, save(json!({"analysis": {"signal": "BUY"}}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, save(json!({"ticker": "AAA"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, save(json!({"ticker": "ZZZ", "analysis": {}}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(
        &app,
        save(json!({"ticker": "AAA", "analysis": {"signal": "sell", "score": "42.5", "rsi": 28.1}})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["signal"], "SELL");
    assert_eq!(body["score"], 42.5);
    assert_eq!(body["indicators"]["rsi_14"], 28.1);
    assert_eq!(store.results_for(1).len(), 1);
}

#[tokio::test]
async fn unknown_symbol_at_save_time_does_not_affect_siblings() {
    let store = seeded_store();
    let gate = Arc::new(Notify::new());
    let engine = GatedEngine {
        gate: gate.clone(),
        body: json!({
            "AAA": {"signal": "BUY", "score": 70},
            "BBB": {"signal": "SELL", "score": 25}
        }),
    };
    let app = build_app(store.clone(), Arc::new(engine));

    let (status, body) = trigger(&app, json!({"stockIds": [1, 2]})).await;
    assert_eq!(status, StatusCode::OK);
    let job_id = body["jobId"].as_str().unwrap().to_string();

    // BBB disappears while the engine is still working
    store.remove_stock("BBB");
    gate.notify_one();

    let job = wait_for_terminal(&app, &job_id).await;
    assert_eq!(job["status"], "completed");
    assert_eq!(job["processedCount"], 2);
    assert_eq!(job["successCount"], 1);
    assert_eq!(job["failedCount"], 1);
    assert_eq!(store.results_for(1).len(), 1);
    assert!(store.results_for(2).is_empty());
}

#[tokio::test]
async fn history_of_unknown_stock_is_404() {
    let app = build_app(seeded_store(), Arc::new(TimeoutEngine));

    let request = Request::builder()
        .uri("/api/analysis/999/history")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["status"], 404);

    let request = Request::builder()
        .uri("/api/analysis/1/history")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pagination"]["total"], 0);
}
