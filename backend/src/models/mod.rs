mod analysis;
mod analysis_job;
mod pagination;
mod portfolio;
mod stock;

pub use analysis::{
    AnalysisHistory, AnalysisInput, AnalysisResult, AnalysisResultRow, AnalysisResultView,
    HistoryPagination, IndicatorSnapshot, NewAnalysisResult, SaveAnalysisRequest, Signal,
};
pub use analysis_job::{
    AnalysisJob, AnalysisJobRow, AnalysisJobStatus, JobStatus, JobUpdate, TriggerAnalysisRequest,
    TriggerAnalysisResponse, UpdateOutcome,
};
pub use pagination::{HistoryParams, PageParams, PageRequest, Paginated, Pagination};
pub use portfolio::{
    CreatePortfolio, CreatePortfolioEntry, DeletedPortfolioEntry, EntryChanges, NewPortfolioEntry,
    Portfolio, PortfolioEntryRow, PortfolioEntryView, PortfolioPerformance, PortfolioView,
    UpdatePortfolioEntry,
};
pub use stock::{
    AnalysisBrief, BatchCreateResult, BatchCreateStocks, CreateStock, DeletedStock,
    LatestAnalysisSummary, NewStock, Stock, StockChanges, StockDetail, StockFilter, StockListRow,
    StockQuery, StockSummary, TechnicalIndicator, UpdateStock, MARKETS,
};

use serde::{Deserialize, Deserializer};

/// Distinguishes an absent field (`None`) from an explicit `null` (`Some(None)`).
pub(crate) fn deserialize_some<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

/// A number that clients sometimes send as a numeric string.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum LenientNumber {
    Number(f64),
    Text(String),
}

impl LenientNumber {
    pub fn value(&self) -> Option<f64> {
        match self {
            LenientNumber::Number(n) if n.is_finite() => Some(*n),
            LenientNumber::Number(_) => None,
            LenientNumber::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lenient_number_accepts_numeric_strings() {
        assert_eq!(LenientNumber::Number(3.5).value(), Some(3.5));
        assert_eq!(LenientNumber::Text(" 12 ".into()).value(), Some(12.0));
        assert_eq!(LenientNumber::Text("abc".into()).value(), None);
    }
}
