//! Health, fallback, security headers and rate limiting at the router level.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use tower::ServiceExt;

use stockdash_backend::app::create_app;
use stockdash_backend::config::AppConfig;
use stockdash_backend::external::analysis_engine::{AnalysisEngine, EngineError};
use stockdash_backend::state::AppState;
use stockdash_backend::store::InMemoryAnalysisStore;

struct UnusedEngine;

#[async_trait]
impl AnalysisEngine for UnusedEngine {
    async fn analyze_batch(&self, _tickers: &[String], _period: &str) -> Result<Value, EngineError> {
        Err(EngineError::Network("not reachable in tests".into()))
    }
}

fn app_with(vars: &[(&str, &str)]) -> axum::Router {
    let config = AppConfig::from_lookup(|name| {
        if name == "DATABASE_URL" {
            return Some("postgres://localhost/stockdash_test".to_string());
        }
        vars.iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.to_string())
    })
    .unwrap();
    let pool = PgPoolOptions::new()
        .connect_lazy(&config.database_url)
        .unwrap();
    let store = Arc::new(InMemoryAnalysisStore::new());
    create_app(AppState::new(pool, store, Arc::new(UnusedEngine), config))
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn health_reports_ok_with_security_headers() {
    let response = app_with(&[]).oneshot(get("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-content-type-options"], "nosniff");
    assert_eq!(response.headers()["x-frame-options"], "DENY");

    let body = json_body(response).await;
    assert_eq!(body["status"], "ok");
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn api_root_describes_service() {
    let response = app_with(&[]).oneshot(get("/api")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn unknown_routes_get_json_404() {
    for uri in ["/nope", "/api/nope/deeper"] {
        let response = app_with(&[]).oneshot(get(uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = json_body(response).await;
        assert_eq!(body["error"]["status"], 404);
    }
}

#[tokio::test]
async fn non_numeric_stock_id_is_400() {
    let response = app_with(&[])
        .oneshot(get("/api/analysis/abc/history"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn trigger_has_its_own_rate_limit() {
    let app = app_with(&[("ANALYSIS_RATE_LIMIT_MAX_REQUESTS", "2")]);
    let trigger = || {
        Request::builder()
            .method("POST")
            .uri("/api/analysis/trigger")
            .header("content-type", "application/json")
            .header("x-forwarded-for", "198.51.100.4")
            .body(Body::from(r#"{"stockIds": []}"#))
            .unwrap()
    };

    for _ in 0..2 {
        let response = app.clone().oneshot(trigger()).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    let response = app.clone().oneshot(trigger()).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key("retry-after"));

    // the general API budget is separate
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/analysis/job/unknown")
                .header("x-forwarded-for", "198.51.100.4")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
