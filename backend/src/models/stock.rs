use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::{deserialize_some, AnalysisResult, Signal};

pub const MARKETS: [&str; 3] = ["TSE", "NASDAQ", "NYSE"];

// A listed security that can be analyzed and held in portfolios.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Stock {
    pub id: i32,
    pub symbol: String,
    pub name: String,
    pub sector: Option<String>,
    pub market: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct TechnicalIndicator {
    pub id: i32,
    pub stock_id: i32,
    pub date: NaiveDate,
    pub ma_5: Option<f64>,
    pub ma_20: Option<f64>,
    pub ma_50: Option<f64>,
    pub rsi_14: Option<f64>,
    pub macd: Option<f64>,
    pub macd_signal: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StockQuery {
    pub search: Option<String>,
    pub sector: Option<String>,
    pub market: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StockFilter {
    pub search: Option<String>,
    pub sector: Option<String>,
    pub market: Option<String>,
}

impl StockFilter {
    pub fn from_query(query: &StockQuery) -> Self {
        let clean = |v: &Option<String>| {
            v.as_ref()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        };
        Self {
            search: clean(&query.search),
            sector: clean(&query.sector),
            market: clean(&query.market),
        }
    }

    /// `ILIKE` pattern for the free-text search, with wildcards escaped.
    pub fn search_pattern(&self) -> Option<String> {
        self.search.as_ref().map(|s| {
            let escaped = s
                .replace('\\', "\\\\")
                .replace('%', "\\%")
                .replace('_', "\\_");
            format!("%{}%", escaped)
        })
    }
}

// Stock row joined with its most recent analysis, if any.
#[derive(Debug, Clone, FromRow)]
pub struct StockListRow {
    pub id: i32,
    pub symbol: String,
    pub name: String,
    pub sector: Option<String>,
    pub market: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub latest_signal: Option<String>,
    pub latest_score: Option<f64>,
    pub latest_confidence: Option<f64>,
    pub latest_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LatestAnalysisSummary {
    pub signal: Signal,
    pub score: f64,
    pub confidence: f64,
    pub date: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockSummary {
    pub id: i32,
    pub symbol: String,
    pub name: String,
    pub sector: Option<String>,
    pub market: String,
    pub latest_analysis: Option<LatestAnalysisSummary>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<StockListRow> for StockSummary {
    fn from(row: StockListRow) -> Self {
        let latest_analysis = match (row.latest_signal, row.latest_date) {
            (Some(signal), Some(date)) => Some(LatestAnalysisSummary {
                signal: Signal::parse_lenient(&signal).unwrap_or(Signal::Hold),
                score: row.latest_score.unwrap_or_default(),
                confidence: row.latest_confidence.unwrap_or_default(),
                date,
            }),
            _ => None,
        };
        Self {
            id: row.id,
            symbol: row.symbol,
            name: row.name,
            sector: row.sector,
            market: row.market,
            latest_analysis,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisBrief {
    pub id: i32,
    pub date: DateTime<Utc>,
    pub signal: Signal,
    pub score: f64,
    pub confidence: f64,
    pub ma5: Option<f64>,
    pub ma20: Option<f64>,
    pub ma50: Option<f64>,
    pub rsi: Option<f64>,
    pub macd: Option<f64>,
}

impl From<&AnalysisResult> for AnalysisBrief {
    fn from(r: &AnalysisResult) -> Self {
        Self {
            id: r.id,
            date: r.analysis_date,
            signal: r.signal,
            score: r.score,
            confidence: r.confidence,
            ma5: r.indicators.ma_5,
            ma20: r.indicators.ma_20,
            ma50: r.indicators.ma_50,
            rsi: r.indicators.rsi_14,
            macd: r.indicators.macd,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockDetail {
    pub id: i32,
    pub symbol: String,
    pub name: String,
    pub sector: Option<String>,
    pub market: String,
    pub analysis_results: Vec<AnalysisBrief>,
    pub technical_indicators: Vec<TechnicalIndicator>,
    pub portfolio_entries: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateStock {
    pub symbol: Option<String>,
    pub name: Option<String>,
    pub sector: Option<String>,
    pub market: Option<String>,
}

// Validated input for a new stock row.
#[derive(Debug, Clone, PartialEq)]
pub struct NewStock {
    pub symbol: String,
    pub name: String,
    pub sector: Option<String>,
    pub market: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateStock {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub sector: Option<Option<String>>,
    pub market: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StockChanges {
    pub name: Option<String>,
    pub sector: Option<Option<String>>,
    pub market: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchCreateStocks {
    #[serde(default)]
    pub stocks: Vec<CreateStock>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchCreateResult {
    pub created: usize,
    pub total: usize,
    pub skipped: usize,
    pub data: Vec<Stock>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeletedStock {
    pub id: i32,
    pub symbol: String,
    pub message: String,
}
