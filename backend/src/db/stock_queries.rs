use sqlx::PgPool;

use crate::models::{NewStock, Stock, StockChanges, StockFilter, StockListRow, TechnicalIndicator};

const STOCK_COLUMNS: &str = "id, symbol, name, sector, market, created_at, updated_at";

pub async fn count(pool: &PgPool, filter: &StockFilter) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*)
         FROM stocks
         WHERE ($1::TEXT IS NULL OR symbol ILIKE $1 OR name ILIKE $1)
           AND ($2::TEXT IS NULL OR sector = $2)
           AND ($3::TEXT IS NULL OR market = $3)",
    )
    .bind(filter.search_pattern())
    .bind(filter.sector.as_deref())
    .bind(filter.market.as_deref())
    .fetch_one(pool)
    .await
}

pub async fn fetch_page(
    pool: &PgPool,
    filter: &StockFilter,
    limit: i64,
    offset: i64,
) -> Result<Vec<StockListRow>, sqlx::Error> {
    sqlx::query_as::<_, StockListRow>(
        "SELECT s.id, s.symbol, s.name, s.sector, s.market, s.created_at, s.updated_at,
                a.signal AS latest_signal,
                a.score AS latest_score,
                a.confidence AS latest_confidence,
                a.analysis_date AS latest_date
         FROM stocks s
         LEFT JOIN LATERAL (
             SELECT signal, score, confidence, analysis_date
             FROM analysis_results
             WHERE stock_id = s.id
             ORDER BY analysis_date DESC
             LIMIT 1
         ) a ON TRUE
         WHERE ($1::TEXT IS NULL OR s.symbol ILIKE $1 OR s.name ILIKE $1)
           AND ($2::TEXT IS NULL OR s.sector = $2)
           AND ($3::TEXT IS NULL OR s.market = $3)
         ORDER BY s.created_at DESC, s.id DESC
         LIMIT $4 OFFSET $5",
    )
    .bind(filter.search_pattern())
    .bind(filter.sector.as_deref())
    .bind(filter.market.as_deref())
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
}

pub async fn fetch_one(pool: &PgPool, id: i32) -> Result<Option<Stock>, sqlx::Error> {
    sqlx::query_as::<_, Stock>(&format!("SELECT {STOCK_COLUMNS} FROM stocks WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn fetch_by_ids(pool: &PgPool, ids: &[i32]) -> Result<Vec<Stock>, sqlx::Error> {
    sqlx::query_as::<_, Stock>(&format!(
        "SELECT {STOCK_COLUMNS} FROM stocks WHERE id = ANY($1) ORDER BY id"
    ))
    .bind(ids.to_vec())
    .fetch_all(pool)
    .await
}

pub async fn fetch_by_symbol(pool: &PgPool, symbol: &str) -> Result<Option<Stock>, sqlx::Error> {
    sqlx::query_as::<_, Stock>(&format!("SELECT {STOCK_COLUMNS} FROM stocks WHERE symbol = $1"))
        .bind(symbol)
        .fetch_optional(pool)
        .await
}

pub async fn insert(pool: &PgPool, stock: &NewStock) -> Result<Stock, sqlx::Error> {
    sqlx::query_as::<_, Stock>(&format!(
        "INSERT INTO stocks (symbol, name, sector, market)
         VALUES ($1, $2, $3, $4)
         RETURNING {STOCK_COLUMNS}"
    ))
    .bind(&stock.symbol)
    .bind(&stock.name)
    .bind(stock.sector.as_deref())
    .bind(&stock.market)
    .fetch_one(pool)
    .await
}

pub async fn update(
    pool: &PgPool,
    id: i32,
    changes: &StockChanges,
) -> Result<Option<Stock>, sqlx::Error> {
    sqlx::query_as::<_, Stock>(&format!(
        "UPDATE stocks
         SET name = COALESCE($2, name),
             sector = CASE WHEN $3 THEN $4 ELSE sector END,
             market = COALESCE($5, market),
             updated_at = NOW()
         WHERE id = $1
         RETURNING {STOCK_COLUMNS}"
    ))
    .bind(id)
    .bind(changes.name.as_deref())
    .bind(changes.sector.is_some())
    .bind(changes.sector.clone().flatten())
    .bind(changes.market.as_deref())
    .fetch_optional(pool)
    .await
}

/// Deletes a stock and everything that references it in one transaction.
/// Returns the deleted row, or `None` if the stock did not exist.
pub async fn delete_cascade(pool: &PgPool, id: i32) -> Result<Option<Stock>, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let stock = sqlx::query_as::<_, Stock>(&format!(
        "SELECT {STOCK_COLUMNS} FROM stocks WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(stock) = stock else {
        tx.rollback().await?;
        return Ok(None);
    };

    for table in ["analysis_results", "technical_indicators", "portfolio_entries"] {
        sqlx::query(&format!("DELETE FROM {table} WHERE stock_id = $1"))
            .bind(id)
            .execute(&mut *tx)
            .await?;
    }
    sqlx::query("DELETE FROM stocks WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(Some(stock))
}

pub async fn fetch_indicators(
    pool: &PgPool,
    stock_id: i32,
    limit: i64,
) -> Result<Vec<TechnicalIndicator>, sqlx::Error> {
    sqlx::query_as::<_, TechnicalIndicator>(
        "SELECT id, stock_id, date, ma_5, ma_20, ma_50, rsi_14, macd, macd_signal,
                created_at, updated_at
         FROM technical_indicators
         WHERE stock_id = $1
         ORDER BY date DESC
         LIMIT $2",
    )
    .bind(stock_id)
    .bind(limit)
    .fetch_all(pool)
    .await
}

pub async fn count_portfolio_entries(pool: &PgPool, stock_id: i32) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM portfolio_entries WHERE stock_id = $1")
        .bind(stock_id)
        .fetch_one(pool)
        .await
}
