use axum::extract::{Path, Query, State};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use http::StatusCode;
use tracing::{error, info};

use crate::errors::AppError;
use crate::models::{
    CreatePortfolio, CreatePortfolioEntry, DeletedPortfolioEntry, PageParams, Paginated,
    Portfolio, PortfolioEntryView, PortfolioView, UpdatePortfolioEntry,
};
use crate::routes::{parse_id, ValidJson};
use crate::services::portfolio_service;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_portfolios).post(create_portfolio))
        .route("/:portfolio_id/entries", post(create_entry))
        .route("/entries/:entry_id", put(update_entry).delete(delete_entry))
}

pub async fn list_portfolios(
    State(state): State<AppState>,
    Query(params): Query<PageParams>,
) -> Result<Json<Paginated<PortfolioView>>, AppError> {
    info!("GET /api/portfolio - Listing portfolios");
    let page = portfolio_service::list(&state.pool, &params).await?;
    Ok(Json(page))
}

pub async fn create_portfolio(
    State(state): State<AppState>,
    ValidJson(input): ValidJson<CreatePortfolio>,
) -> Result<(StatusCode, Json<Portfolio>), AppError> {
    info!("POST /api/portfolio - Creating portfolio");
    let portfolio = portfolio_service::create(&state.pool, input).await?;
    Ok((StatusCode::CREATED, Json(portfolio)))
}

pub async fn create_entry(
    State(state): State<AppState>,
    Path(portfolio_id): Path<String>,
    ValidJson(input): ValidJson<CreatePortfolioEntry>,
) -> Result<(StatusCode, Json<PortfolioEntryView>), AppError> {
    let portfolio_id = parse_id(&portfolio_id, "Portfolio ID")?;
    info!("POST /api/portfolio/{}/entries - Adding entry", portfolio_id);
    let entry = portfolio_service::add_entry(&state.pool, portfolio_id, input)
        .await
        .map_err(|e| {
            error!("Failed to add entry to portfolio {}: {}", portfolio_id, e);
            e
        })?;
    Ok((StatusCode::CREATED, Json(entry)))
}

pub async fn update_entry(
    State(state): State<AppState>,
    Path(entry_id): Path<String>,
    ValidJson(input): ValidJson<UpdatePortfolioEntry>,
) -> Result<Json<PortfolioEntryView>, AppError> {
    let entry_id = parse_id(&entry_id, "Entry ID")?;
    info!("PUT /api/portfolio/entries/{} - Updating entry", entry_id);
    let entry = portfolio_service::update_entry(&state.pool, entry_id, input).await?;
    Ok(Json(entry))
}

pub async fn delete_entry(
    State(state): State<AppState>,
    Path(entry_id): Path<String>,
) -> Result<Json<DeletedPortfolioEntry>, AppError> {
    let entry_id = parse_id(&entry_id, "Entry ID")?;
    info!("DELETE /api/portfolio/entries/{} - Deleting entry", entry_id);
    let deleted = portfolio_service::delete_entry(&state.pool, entry_id).await?;
    Ok(Json(deleted))
}
