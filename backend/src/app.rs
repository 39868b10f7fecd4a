use axum::extract::DefaultBodyLimit;
use axum::http::Uri;
use axum::{middleware, Router};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::errors::AppError;
use crate::routes::{analysis, health, portfolios, stocks};
use crate::state::AppState;

const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

pub fn create_app(state: AppState) -> Router {
    let api = Router::<AppState>::new()
        .nest("/analysis", analysis::router(&state))
        .nest("/stocks", stocks::router())
        .nest("/portfolio", portfolios::router())
        .layer(middleware::from_fn_with_state(
            state.rate_limiter.clone(),
            crate::middleware::rate_limit,
        ));

    Router::<AppState>::new()
        .merge(health::router())
        .nest("/api", api)
        .fallback(not_found)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(crate::middleware::cors_layer(&state.config))
                .layer(middleware::from_fn(crate::middleware::security_headers))
                .layer(DefaultBodyLimit::max(MAX_BODY_BYTES)),
        )
        .with_state(state)
}

async fn not_found(uri: Uri) -> AppError {
    AppError::NotFound(format!("No route for {}", uri.path()))
}
