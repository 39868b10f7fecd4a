use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Signal {
    #[serde(alias = "buy")]
    Buy,
    #[serde(alias = "sell")]
    Sell,
    #[serde(alias = "hold")]
    Hold,
}

impl Signal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::Buy => "BUY",
            Signal::Sell => "SELL",
            Signal::Hold => "HOLD",
        }
    }

    /// Case-insensitive parse, `None` for anything that is not a known signal.
    pub fn parse_lenient(raw: &str) -> Option<Signal> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "BUY" => Some(Signal::Buy),
            "SELL" => Some(Signal::Sell),
            "HOLD" => Some(Signal::Hold),
            _ => None,
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Signal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Signal::parse_lenient(s).ok_or_else(|| format!("unknown signal: {}", s))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub ma_5: Option<f64>,
    pub ma_20: Option<f64>,
    pub ma_50: Option<f64>,
    pub rsi_14: Option<f64>,
    pub macd: Option<f64>,
    pub macd_signal: Option<f64>,
}

// One scored analysis of a stock, as stored.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisResult {
    pub id: i32,
    pub stock_id: i32,
    pub signal: Signal,
    pub score: f64,
    pub confidence: f64,
    pub reason: Option<String>,
    pub indicators: IndicatorSnapshot,
    pub current_price: f64,
    pub analysis_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct AnalysisResultRow {
    pub id: i32,
    pub stock_id: i32,
    pub signal: String,
    pub score: f64,
    pub confidence: f64,
    pub reason: Option<String>,
    pub ma_5: Option<f64>,
    pub ma_20: Option<f64>,
    pub ma_50: Option<f64>,
    pub rsi_14: Option<f64>,
    pub macd: Option<f64>,
    pub macd_signal: Option<f64>,
    pub current_price: f64,
    pub analysis_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<AnalysisResultRow> for AnalysisResult {
    fn from(row: AnalysisResultRow) -> Self {
        Self {
            id: row.id,
            stock_id: row.stock_id,
            signal: Signal::parse_lenient(&row.signal).unwrap_or(Signal::Hold),
            score: row.score,
            confidence: row.confidence,
            reason: row.reason,
            indicators: IndicatorSnapshot {
                ma_5: row.ma_5,
                ma_20: row.ma_20,
                ma_50: row.ma_50,
                rsi_14: row.rsi_14,
                macd: row.macd,
                macd_signal: row.macd_signal,
            },
            current_price: row.current_price,
            analysis_date: row.analysis_date,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

// Values to write for an analysis row; id and audit timestamps come from storage.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAnalysisResult {
    pub stock_id: i32,
    pub signal: Signal,
    pub score: f64,
    pub confidence: f64,
    pub reason: Option<String>,
    pub indicators: IndicatorSnapshot,
    pub current_price: f64,
    pub analysis_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResultView {
    pub id: i32,
    pub stock_id: i32,
    pub signal: Signal,
    pub score: f64,
    pub confidence: f64,
    pub reason: Option<String>,
    pub indicators: IndicatorSnapshot,
    pub current_price: f64,
    pub analysis_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<AnalysisResult> for AnalysisResultView {
    fn from(r: AnalysisResult) -> Self {
        Self {
            id: r.id,
            stock_id: r.stock_id,
            signal: r.signal,
            score: r.score,
            confidence: r.confidence,
            reason: r.reason,
            indicators: r.indicators,
            current_price: r.current_price,
            analysis_date: r.analysis_date,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

/// Body of `POST /api/analysis/save`. Both fields are required; presence is
/// checked by the handler so a missing one is a 400 rather than a 422.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SaveAnalysisRequest {
    pub ticker: Option<String>,
    pub analysis: Option<serde_json::Value>,
}

/// Internally computed analysis, written with the one-row-per-day rule.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisInput {
    pub signal: Signal,
    pub score: f64,
    pub confidence: f64,
    pub reason: Option<String>,
    #[serde(flatten)]
    pub indicators: IndicatorSnapshot,
    pub current_price: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HistoryPagination {
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
    pub returned: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisHistory {
    pub data: Vec<AnalysisResultView>,
    pub pagination: HistoryPagination,
}
