use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{middleware, Json, Router};
use http::StatusCode;
use tracing::{error, info};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{
    AnalysisHistory, AnalysisInput, AnalysisJobStatus, AnalysisResultView, HistoryParams,
    SaveAnalysisRequest, TriggerAnalysisRequest, TriggerAnalysisResponse,
};
use crate::routes::{parse_id, ValidJson};
use crate::services::{analysis_job_service, analysis_service, analysis_trigger_service};
use crate::state::AppState;

pub fn router(state: &AppState) -> Router<AppState> {
    // Triggering calls the remote engine, so it has its own tighter budget
    let trigger = Router::new()
        .route("/trigger", post(trigger_analysis))
        .route_layer(middleware::from_fn_with_state(
            state.analysis_rate_limiter.clone(),
            crate::middleware::rate_limit,
        ));

    Router::new()
        .merge(trigger)
        .route("/job/:job_id", get(job_status))
        .route("/save", post(save_analysis))
        .route("/:stock_id", get(latest_analysis).put(upsert_analysis))
        .route("/:stock_id/history", get(analysis_history))
}

pub async fn trigger_analysis(
    State(state): State<AppState>,
    ValidJson(request): ValidJson<TriggerAnalysisRequest>,
) -> Result<Json<TriggerAnalysisResponse>, AppError> {
    info!("POST /api/analysis/trigger - Triggering analysis");
    let (response, _handle) = analysis_trigger_service::trigger_analysis(
        state.store.as_ref(),
        &state.job_runner,
        request,
    )
    .await?;
    Ok(Json(response))
}

pub async fn job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<AnalysisJobStatus>, AppError> {
    info!("GET /api/analysis/job/{} - Fetching job status", job_id);
    let not_found = || AppError::NotFound(format!("Job {} not found", job_id));

    let id = Uuid::parse_str(&job_id).map_err(|_| not_found())?;
    let job = analysis_job_service::get_status(state.store.as_ref(), id)
        .await?
        .ok_or_else(not_found)?;
    Ok(Json(job.into()))
}

pub async fn save_analysis(
    State(state): State<AppState>,
    ValidJson(request): ValidJson<SaveAnalysisRequest>,
) -> Result<(StatusCode, Json<AnalysisResultView>), AppError> {
    let ticker = request
        .ticker
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::Validation("ticker is required".to_string()))?;
    let payload = request
        .analysis
        .filter(|a| !a.is_null())
        .ok_or_else(|| AppError::Validation("analysis is required".to_string()))?;

    info!("POST /api/analysis/save - Saving analysis for {}", ticker);
    let saved = analysis_service::save_from_engine(state.store.as_ref(), &ticker, &payload)
        .await
        .map_err(|e| {
            error!("Failed to save analysis for {}: {}", ticker, e);
            e
        })?;
    Ok((StatusCode::CREATED, Json(saved.into())))
}

pub async fn upsert_analysis(
    State(state): State<AppState>,
    Path(stock_id): Path<String>,
    ValidJson(input): ValidJson<AnalysisInput>,
) -> Result<Json<AnalysisResultView>, AppError> {
    let stock_id = parse_id(&stock_id, "Stock ID")?;
    info!("PUT /api/analysis/{} - Recording daily analysis", stock_id);
    let saved = analysis_service::upsert_daily(state.store.as_ref(), stock_id, input).await?;
    Ok(Json(saved.into()))
}

pub async fn latest_analysis(
    State(state): State<AppState>,
    Path(stock_id): Path<String>,
) -> Result<Json<AnalysisResultView>, AppError> {
    let stock_id = parse_id(&stock_id, "Stock ID")?;
    info!("GET /api/analysis/{} - Fetching latest analysis", stock_id);
    let latest = analysis_service::latest(state.store.as_ref(), stock_id).await?;
    Ok(Json(latest.into()))
}

pub async fn analysis_history(
    State(state): State<AppState>,
    Path(stock_id): Path<String>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<AnalysisHistory>, AppError> {
    let stock_id = parse_id(&stock_id, "Stock ID")?;
    info!("GET /api/analysis/{}/history - Fetching analysis history", stock_id);
    let history = analysis_service::history(state.store.as_ref(), stock_id, &params).await?;
    Ok(Json(history))
}
