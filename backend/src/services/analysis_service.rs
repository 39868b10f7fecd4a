use chrono::{DateTime, Duration, Utc};
use serde_json::{Map, Value};
use tracing::info;

use crate::errors::AppError;
use crate::models::{
    AnalysisHistory, AnalysisInput, AnalysisResult, AnalysisResultView, HistoryPagination,
    HistoryParams, IndicatorSnapshot, NewAnalysisResult, Signal,
};
use crate::store::AnalysisStore;

const DEFAULT_SCORE: f64 = 50.0;
const DEFAULT_CONFIDENCE: f64 = 0.5;

/// Maps one engine payload onto a result row for `stock_id`.
///
/// Missing or unreadable fields fall back to neutral values; score and
/// confidence are clamped into `0..=100` and `0..=1`.
pub fn parse_engine_payload(
    stock_id: i32,
    payload: &Value,
    analysis_date: DateTime<Utc>,
) -> Result<NewAnalysisResult, AppError> {
    let fields = payload
        .as_object()
        .ok_or_else(|| AppError::Validation("analysis must be a JSON object".to_string()))?;

    let signal = fields
        .get("signal")
        .and_then(Value::as_str)
        .and_then(Signal::parse_lenient)
        .unwrap_or(Signal::Hold);

    let score = number(fields, &["composite_score", "score"])
        .unwrap_or(DEFAULT_SCORE)
        .clamp(0.0, 100.0);
    let confidence = number(fields, &["confidence"])
        .unwrap_or(DEFAULT_CONFIDENCE)
        .clamp(0.0, 1.0);
    let current_price = number(fields, &["current_price"]).unwrap_or(0.0);

    let reason = fields
        .get("reason")
        .and_then(Value::as_str)
        .map(str::to_string);

    Ok(NewAnalysisResult {
        stock_id,
        signal,
        score,
        confidence,
        reason,
        indicators: IndicatorSnapshot {
            ma_5: number(fields, &["ma_5"]),
            ma_20: number(fields, &["ma_20"]),
            ma_50: number(fields, &["ma_50"]),
            rsi_14: number(fields, &["rsi", "rsi_14"]),
            macd: number(fields, &["macd"]),
            macd_signal: number(fields, &["signal_line", "macd_signal"]),
        },
        current_price,
        analysis_date,
    })
}

// First key holding a finite number or numeric string.
fn number(fields: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|key| match fields.get(*key)? {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    })
}

/// Stores an engine result for `ticker`. Always inserts a new row dated now.
pub async fn save_from_engine(
    store: &dyn AnalysisStore,
    ticker: &str,
    payload: &Value,
) -> Result<AnalysisResult, AppError> {
    let stock = store
        .find_stock_by_symbol(ticker)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Stock {} not found", ticker)))?;

    let new_result = parse_engine_payload(stock.id, payload, Utc::now())?;
    let saved = store.insert_result(&new_result).await?;

    info!(
        "Saved analysis for {} (signal {}, score {:.1})",
        ticker, saved.signal, saved.score
    );
    Ok(saved)
}

fn validate_input(input: &AnalysisInput) -> Result<(), AppError> {
    if !(0.0..=100.0).contains(&input.score) {
        return Err(AppError::Validation("score must be between 0 and 100".to_string()));
    }
    if !(0.0..=1.0).contains(&input.confidence) {
        return Err(AppError::Validation("confidence must be between 0 and 1".to_string()));
    }
    if input.current_price < 0.0 {
        return Err(AppError::Validation("current_price must not be negative".to_string()));
    }
    Ok(())
}

async fn ensure_stock(store: &dyn AnalysisStore, stock_id: i32) -> Result<(), AppError> {
    if store.find_stocks_by_ids(&[stock_id]).await?.is_empty() {
        return Err(AppError::NotFound(format!("Stock {} not found", stock_id)));
    }
    Ok(())
}

/// Writes today's analysis for a stock, replacing an earlier one from the same UTC day.
pub async fn upsert_daily(
    store: &dyn AnalysisStore,
    stock_id: i32,
    input: AnalysisInput,
) -> Result<AnalysisResult, AppError> {
    validate_input(&input)?;
    ensure_stock(store, stock_id).await?;

    let now = Utc::now();
    let day_start = now
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|d| d.and_utc())
        .unwrap_or(now);
    let day_end = day_start + Duration::days(1);

    let new_result = NewAnalysisResult {
        stock_id,
        signal: input.signal,
        score: input.score,
        confidence: input.confidence,
        reason: input.reason,
        indicators: input.indicators,
        current_price: input.current_price,
        analysis_date: now,
    };

    match store.find_result_between(stock_id, day_start, day_end).await? {
        Some(existing) => {
            info!("Updating today's analysis {} for stock {}", existing.id, stock_id);
            store.update_result(existing.id, &new_result).await
        }
        None => {
            info!("Recording first analysis of the day for stock {}", stock_id);
            store.insert_result(&new_result).await
        }
    }
}

pub async fn latest(store: &dyn AnalysisStore, stock_id: i32) -> Result<AnalysisResult, AppError> {
    ensure_stock(store, stock_id).await?;
    store
        .latest_result(stock_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No analysis found for stock {}", stock_id)))
}

pub async fn history(
    store: &dyn AnalysisStore,
    stock_id: i32,
    params: &HistoryParams,
) -> Result<AnalysisHistory, AppError> {
    ensure_stock(store, stock_id).await?;
    let (limit, offset) = params.resolve();
    let (rows, total) = store.result_history(stock_id, limit, offset).await?;

    let data: Vec<AnalysisResultView> = rows.into_iter().map(Into::into).collect();
    Ok(AnalysisHistory {
        pagination: HistoryPagination {
            total,
            limit,
            offset,
            returned: data.len(),
        },
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryAnalysisStore;
    use serde_json::json;

    #[test]
    fn test_payload_defaults_are_neutral() {
        let parsed = parse_engine_payload(7, &json!({}), Utc::now()).unwrap();
        assert_eq!(parsed.signal, Signal::Hold);
        assert_eq!(parsed.score, 50.0);
        assert_eq!(parsed.confidence, 0.5);
        assert_eq!(parsed.current_price, 0.0);
        assert_eq!(parsed.indicators, IndicatorSnapshot::default());
    }

    #[test]
    fn test_payload_aliases_strings_and_clamping() {
        let parsed = parse_engine_payload(
            7,
            &json!({
                "signal": "buy",
                "composite_score": "140",
                "score": 10,
                "confidence": -0.3,
                "rsi": 55.5,
                "signal_line": "1.25",
                "current_price": "101.5",
                "reason": "Golden cross"
            }),
            Utc::now(),
        )
        .unwrap();

        assert_eq!(parsed.signal, Signal::Buy);
        assert_eq!(parsed.score, 100.0);
        assert_eq!(parsed.confidence, 0.0);
        assert_eq!(parsed.indicators.rsi_14, Some(55.5));
        assert_eq!(parsed.indicators.macd_signal, Some(1.25));
        assert_eq!(parsed.current_price, 101.5);
        assert_eq!(parsed.reason.as_deref(), Some("Golden cross"));
    }

    #[test]
    fn test_unknown_signal_becomes_hold() {
        let parsed = parse_engine_payload(1, &json!({"signal": "STRONG_BUY"}), Utc::now()).unwrap();
        assert_eq!(parsed.signal, Signal::Hold);
    }

    #[test]
    fn test_non_object_payload_is_rejected() {
        let err = parse_engine_payload(1, &json!([1, 2]), Utc::now()).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_save_from_engine_always_inserts() {
        let store = InMemoryAnalysisStore::new();
        let stock = store.add_stock("AAA", "Alpha");

        save_from_engine(&store, "AAA", &json!({"signal": "BUY"})).await.unwrap();
        save_from_engine(&store, "AAA", &json!({"signal": "SELL"})).await.unwrap();

        assert_eq!(store.results_for(stock.id).len(), 2);
    }

    #[tokio::test]
    async fn test_save_from_engine_unknown_ticker() {
        let store = InMemoryAnalysisStore::new();
        let err = save_from_engine(&store, "ZZZ", &json!({})).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    fn input(score: f64) -> AnalysisInput {
        AnalysisInput {
            signal: Signal::Buy,
            score,
            confidence: 0.7,
            reason: None,
            indicators: IndicatorSnapshot::default(),
            current_price: 10.0,
        }
    }

    #[tokio::test]
    async fn test_upsert_daily_keeps_one_row_per_day() {
        let store = InMemoryAnalysisStore::new();
        let stock = store.add_stock("AAA", "Alpha");

        let first = upsert_daily(&store, stock.id, input(60.0)).await.unwrap();
        let second = upsert_daily(&store, stock.id, input(75.0)).await.unwrap();

        assert_eq!(first.id, second.id);
        let rows = store.results_for(stock.id);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].score, 75.0);
    }

    #[tokio::test]
    async fn test_upsert_daily_validates_ranges_and_stock() {
        let store = InMemoryAnalysisStore::new();
        let stock = store.add_stock("AAA", "Alpha");

        let err = upsert_daily(&store, stock.id, input(101.0)).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = upsert_daily(&store, 999, input(50.0)).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_latest_and_history() {
        let store = InMemoryAnalysisStore::new();
        let stock = store.add_stock("AAA", "Alpha");
        assert!(matches!(
            latest(&store, stock.id).await.unwrap_err(),
            AppError::NotFound(_)
        ));

        for signal in ["BUY", "SELL", "HOLD"] {
            save_from_engine(&store, "AAA", &json!({ "signal": signal })).await.unwrap();
        }

        let params = HistoryParams { limit: Some("2".into()), offset: None };
        let page = history(&store, stock.id, &params).await.unwrap();
        assert_eq!(page.pagination.total, 3);
        assert_eq!(page.pagination.returned, 2);
        assert_eq!(page.data.len(), 2);

        let newest = latest(&store, stock.id).await.unwrap();
        assert_eq!(newest.id, page.data[0].id);
    }

    #[tokio::test]
    async fn test_history_for_unknown_stock_is_not_found() {
        let store = InMemoryAnalysisStore::new();
        let err = history(&store, 999, &HistoryParams::default()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
