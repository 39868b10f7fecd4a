use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use http::StatusCode;
use tracing::{error, info};

use crate::errors::AppError;
use crate::models::{
    BatchCreateResult, BatchCreateStocks, CreateStock, DeletedStock, Paginated, Stock,
    StockDetail, StockQuery, StockSummary, UpdateStock,
};
use crate::routes::{parse_id, ValidJson};
use crate::services::stock_service;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_stocks).post(create_stock))
        .route("/batch", post(batch_create_stocks))
        .route("/:id", get(get_stock).put(update_stock).delete(delete_stock))
}

pub async fn list_stocks(
    State(state): State<AppState>,
    Query(query): Query<StockQuery>,
) -> Result<Json<Paginated<StockSummary>>, AppError> {
    info!("GET /api/stocks - Listing stocks");
    let page = stock_service::list(&state.pool, &query).await?;
    Ok(Json(page))
}

pub async fn get_stock(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<StockDetail>, AppError> {
    let id = parse_id(&id, "Stock ID")?;
    info!("GET /api/stocks/{} - Fetching stock", id);
    let detail = stock_service::detail(&state.pool, id).await?;
    Ok(Json(detail))
}

pub async fn create_stock(
    State(state): State<AppState>,
    ValidJson(input): ValidJson<CreateStock>,
) -> Result<(StatusCode, Json<Stock>), AppError> {
    info!("POST /api/stocks - Creating stock");
    let stock = stock_service::create(&state.pool, input).await.map_err(|e| {
        error!("Failed to create stock: {}", e);
        e
    })?;
    Ok((StatusCode::CREATED, Json(stock)))
}

pub async fn update_stock(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ValidJson(input): ValidJson<UpdateStock>,
) -> Result<Json<Stock>, AppError> {
    let id = parse_id(&id, "Stock ID")?;
    info!("PUT /api/stocks/{} - Updating stock", id);
    let stock = stock_service::update(&state.pool, id, input).await?;
    Ok(Json(stock))
}

pub async fn delete_stock(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeletedStock>, AppError> {
    let id = parse_id(&id, "Stock ID")?;
    info!("DELETE /api/stocks/{} - Deleting stock", id);
    let deleted = stock_service::delete(&state.pool, id).await.map_err(|e| {
        error!("Failed to delete stock {}: {}", id, e);
        e
    })?;
    Ok(Json(deleted))
}

pub async fn batch_create_stocks(
    State(state): State<AppState>,
    ValidJson(input): ValidJson<BatchCreateStocks>,
) -> Result<(StatusCode, Json<BatchCreateResult>), AppError> {
    info!("POST /api/stocks/batch - Creating {} stock(s)", input.stocks.len());
    let result = stock_service::batch_create(&state.pool, input).await?;
    Ok((StatusCode::CREATED, Json(result)))
}
