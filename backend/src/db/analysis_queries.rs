use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::models::{AnalysisResultRow, NewAnalysisResult};

const RESULT_COLUMNS: &str = "id, stock_id, signal, score, confidence, reason,
    ma_5, ma_20, ma_50, rsi_14, macd, macd_signal,
    current_price, analysis_date, created_at, updated_at";

pub async fn insert(
    pool: &PgPool,
    result: &NewAnalysisResult,
) -> Result<AnalysisResultRow, sqlx::Error> {
    sqlx::query_as::<_, AnalysisResultRow>(&format!(
        "INSERT INTO analysis_results
            (stock_id, signal, score, confidence, reason,
             ma_5, ma_20, ma_50, rsi_14, macd, macd_signal,
             current_price, analysis_date)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
         RETURNING {RESULT_COLUMNS}"
    ))
    .bind(result.stock_id)
    .bind(result.signal.as_str())
    .bind(result.score)
    .bind(result.confidence)
    .bind(result.reason.as_deref())
    .bind(result.indicators.ma_5)
    .bind(result.indicators.ma_20)
    .bind(result.indicators.ma_50)
    .bind(result.indicators.rsi_14)
    .bind(result.indicators.macd)
    .bind(result.indicators.macd_signal)
    .bind(result.current_price)
    .bind(result.analysis_date)
    .fetch_one(pool)
    .await
}

/// Overwrites the scored values of an existing row; `analysis_date` is kept.
pub async fn update(
    pool: &PgPool,
    id: i32,
    result: &NewAnalysisResult,
) -> Result<AnalysisResultRow, sqlx::Error> {
    sqlx::query_as::<_, AnalysisResultRow>(&format!(
        "UPDATE analysis_results
         SET signal = $2, score = $3, confidence = $4, reason = $5,
             ma_5 = $6, ma_20 = $7, ma_50 = $8, rsi_14 = $9, macd = $10, macd_signal = $11,
             current_price = $12, updated_at = NOW()
         WHERE id = $1
         RETURNING {RESULT_COLUMNS}"
    ))
    .bind(id)
    .bind(result.signal.as_str())
    .bind(result.score)
    .bind(result.confidence)
    .bind(result.reason.as_deref())
    .bind(result.indicators.ma_5)
    .bind(result.indicators.ma_20)
    .bind(result.indicators.ma_50)
    .bind(result.indicators.rsi_14)
    .bind(result.indicators.macd)
    .bind(result.indicators.macd_signal)
    .bind(result.current_price)
    .fetch_one(pool)
    .await
}

pub async fn find_between(
    pool: &PgPool,
    stock_id: i32,
    from: DateTime<Utc>,
    until: DateTime<Utc>,
) -> Result<Option<AnalysisResultRow>, sqlx::Error> {
    sqlx::query_as::<_, AnalysisResultRow>(&format!(
        "SELECT {RESULT_COLUMNS}
         FROM analysis_results
         WHERE stock_id = $1 AND analysis_date >= $2 AND analysis_date < $3
         ORDER BY analysis_date DESC
         LIMIT 1"
    ))
    .bind(stock_id)
    .bind(from)
    .bind(until)
    .fetch_optional(pool)
    .await
}

pub async fn latest(pool: &PgPool, stock_id: i32) -> Result<Option<AnalysisResultRow>, sqlx::Error> {
    sqlx::query_as::<_, AnalysisResultRow>(&format!(
        "SELECT {RESULT_COLUMNS}
         FROM analysis_results
         WHERE stock_id = $1
         ORDER BY analysis_date DESC, id DESC
         LIMIT 1"
    ))
    .bind(stock_id)
    .fetch_optional(pool)
    .await
}

pub async fn history(
    pool: &PgPool,
    stock_id: i32,
    limit: i64,
    offset: i64,
) -> Result<Vec<AnalysisResultRow>, sqlx::Error> {
    sqlx::query_as::<_, AnalysisResultRow>(&format!(
        "SELECT {RESULT_COLUMNS}
         FROM analysis_results
         WHERE stock_id = $1
         ORDER BY analysis_date DESC, id DESC
         LIMIT $2 OFFSET $3"
    ))
    .bind(stock_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
}

pub async fn count_for_stock(pool: &PgPool, stock_id: i32) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM analysis_results WHERE stock_id = $1")
        .bind(stock_id)
        .fetch_one(pool)
        .await
}
