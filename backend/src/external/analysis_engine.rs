use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("network error: {0}")]
    Network(String),

    #[error("analysis engine timed out after {0}s")]
    Timeout(u64),

    #[error("analysis engine returned HTTP {status}: {body}")]
    BadStatus { status: u16, body: String },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("unexpected response shape: {0}")]
    UnexpectedShape(String),
}

/// Remote service that scores a batch of tickers in one call.
#[async_trait]
pub trait AnalysisEngine: Send + Sync {
    /// Returns the raw response body; see [`normalize_batch_response`].
    async fn analyze_batch(&self, tickers: &[String], period: &str) -> Result<Value, EngineError>;
}

/// Turns an engine response into `ticker -> payload`.
///
/// An object is taken as-is. An array is keyed by each item's `ticker`
/// string; items without one are skipped. Anything else is an error.
pub fn normalize_batch_response(body: Value) -> Result<BTreeMap<String, Value>, EngineError> {
    match body {
        Value::Object(map) => Ok(map.into_iter().collect()),
        Value::Array(items) => {
            let mut out = BTreeMap::new();
            for (idx, item) in items.into_iter().enumerate() {
                match item.get("ticker").and_then(Value::as_str) {
                    Some(ticker) => {
                        out.insert(ticker.to_string(), item.clone());
                    }
                    None => warn!("Skipping engine result #{} without a ticker", idx),
                }
            }
            Ok(out)
        }
        other => Err(EngineError::UnexpectedShape(format!(
            "expected an object or array, got {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
