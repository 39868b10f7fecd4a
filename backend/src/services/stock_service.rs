use sqlx::PgPool;
use tracing::{info, warn};

use crate::db::{analysis_queries, stock_queries};
use crate::errors::{map_unique_violation, AppError};
use crate::models::{
    AnalysisBrief, AnalysisResult, BatchCreateResult, BatchCreateStocks, CreateStock,
    DeletedStock, NewStock, PageRequest, Paginated, Pagination, Stock, StockChanges, StockDetail,
    StockFilter, StockQuery, StockSummary, UpdateStock, MARKETS,
};

const DEFAULT_PAGE_SIZE: i64 = 20;
const DETAIL_ANALYSIS_LIMIT: i64 = 10;
const DETAIL_INDICATOR_LIMIT: i64 = 30;

fn check_length(field: &str, value: &str, max: usize) -> Result<(), AppError> {
    let len = value.chars().count();
    if len == 0 || len > max {
        return Err(AppError::Validation(format!(
            "{} must be between 1 and {} characters",
            field, max
        )));
    }
    Ok(())
}

fn check_market(market: &str) -> Result<(), AppError> {
    if !MARKETS.contains(&market) {
        return Err(AppError::Validation(format!(
            "market must be one of: {}",
            MARKETS.join(", ")
        )));
    }
    Ok(())
}

fn clean_sector(sector: Option<String>) -> Result<Option<String>, AppError> {
    let sector = sector
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());
    if let Some(s) = &sector {
        if s.chars().count() > 255 {
            return Err(AppError::Validation(
                "sector must be at most 255 characters".to_string(),
            ));
        }
    }
    Ok(sector)
}

pub fn validate_new(input: CreateStock) -> Result<NewStock, AppError> {
    let symbol = input.symbol.unwrap_or_default().trim().to_string();
    check_length("symbol", &symbol, 10)?;
    let name = input.name.unwrap_or_default().trim().to_string();
    check_length("name", &name, 255)?;

    let market = input
        .market
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| "TSE".to_string());
    check_market(&market)?;

    Ok(NewStock {
        symbol,
        name,
        sector: clean_sector(input.sector)?,
        market,
    })
}

pub fn validate_changes(input: UpdateStock) -> Result<StockChanges, AppError> {
    let mut changes = StockChanges::default();

    if let Some(name) = input.name {
        let name = name.trim().to_string();
        check_length("name", &name, 255)?;
        changes.name = Some(name);
    }
    if let Some(sector) = input.sector {
        changes.sector = Some(clean_sector(sector)?);
    }
    if let Some(market) = input.market {
        let market = market.trim().to_string();
        check_market(&market)?;
        changes.market = Some(market);
    }

    if changes == StockChanges::default() {
        return Err(AppError::Validation("No fields to update".to_string()));
    }
    Ok(changes)
}

pub async fn list(pool: &PgPool, query: &StockQuery) -> Result<Paginated<StockSummary>, AppError> {
    let filter = StockFilter::from_query(query);
    let page = PageRequest::new(query.page.as_deref(), query.limit.as_deref(), DEFAULT_PAGE_SIZE);

    let (rows, total) = tokio::try_join!(
        stock_queries::fetch_page(pool, &filter, page.limit, page.offset()),
        stock_queries::count(pool, &filter),
    )?;

    Ok(Paginated {
        data: rows.into_iter().map(StockSummary::from).collect(),
        pagination: Pagination::new(total, page),
    })
}

pub async fn detail(pool: &PgPool, id: i32) -> Result<StockDetail, AppError> {
    let stock = stock_queries::fetch_one(pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Stock {} not found", id)))?;

    let (analyses, technical_indicators, portfolio_entries) = tokio::try_join!(
        analysis_queries::history(pool, id, DETAIL_ANALYSIS_LIMIT, 0),
        stock_queries::fetch_indicators(pool, id, DETAIL_INDICATOR_LIMIT),
        stock_queries::count_portfolio_entries(pool, id),
    )?;

    let analysis_results = analyses
        .into_iter()
        .map(AnalysisResult::from)
        .map(|r| AnalysisBrief::from(&r))
        .collect();

    Ok(StockDetail {
        id: stock.id,
        symbol: stock.symbol,
        name: stock.name,
        sector: stock.sector,
        market: stock.market,
        analysis_results,
        technical_indicators,
        portfolio_entries,
        created_at: stock.created_at,
        updated_at: stock.updated_at,
    })
}

pub async fn create(pool: &PgPool, input: CreateStock) -> Result<Stock, AppError> {
    let new_stock = validate_new(input)?;
    let conflict = || format!("Stock symbol {} is already registered", new_stock.symbol);

    if stock_queries::fetch_by_symbol(pool, &new_stock.symbol).await?.is_some() {
        return Err(AppError::Conflict(conflict()));
    }

    let stock = stock_queries::insert(pool, &new_stock)
        .await
        .map_err(|e| map_unique_violation(e, conflict()))?;
    info!("Created stock {} ({})", stock.symbol, stock.id);
    Ok(stock)
}

pub async fn update(pool: &PgPool, id: i32, input: UpdateStock) -> Result<Stock, AppError> {
    let changes = validate_changes(input)?;
    let stock = stock_queries::update(pool, id, &changes)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Stock {} not found", id)))?;
    info!("Updated stock {} ({})", stock.symbol, stock.id);
    Ok(stock)
}

pub async fn delete(pool: &PgPool, id: i32) -> Result<DeletedStock, AppError> {
    let stock = stock_queries::delete_cascade(pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Stock {} not found", id)))?;
    info!("Deleted stock {} ({}) and its dependent rows", stock.symbol, stock.id);
    Ok(DeletedStock {
        id: stock.id,
        message: format!("Stock {} deleted", stock.symbol),
        symbol: stock.symbol,
    })
}

/// Creates each valid, not-yet-registered stock. Invalid rows, duplicates
/// and per-row failures are logged and counted as skipped.
pub async fn batch_create(pool: &PgPool, input: BatchCreateStocks) -> Result<BatchCreateResult, AppError> {
    let total = input.stocks.len();
    let mut data = Vec::new();

    for raw in input.stocks {
        let new_stock = match validate_new(raw) {
            Ok(s) => s,
            Err(e) => {
                warn!("Skipping invalid stock in batch: {}", e);
                continue;
            }
        };

        match stock_queries::fetch_by_symbol(pool, &new_stock.symbol).await {
            Ok(Some(_)) => {
                warn!("Stock {} already exists, skipping", new_stock.symbol);
                continue;
            }
            Ok(None) => {}
            Err(e) => {
                warn!("Lookup for {} failed, skipping: {}", new_stock.symbol, e);
                continue;
            }
        }

        match stock_queries::insert(pool, &new_stock).await {
            Ok(stock) => data.push(stock),
            Err(e) => warn!("Failed to create stock {}: {}", new_stock.symbol, e),
        }
    }

    info!("Batch created {} of {} stock(s)", data.len(), total);
    Ok(BatchCreateResult {
        created: data.len(),
        total,
        skipped: total - data.len(),
        data,
    })
}
