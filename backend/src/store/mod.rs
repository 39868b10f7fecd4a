//! Storage seam for the analysis-job flow.
//!
//! The trigger, job runner and result persistence only talk to storage through
//! [`AnalysisStore`]. Production wires [`PgAnalysisStore`]; tests and local
//! experiments can use [`InMemoryAnalysisStore`].

mod memory;
mod postgres;

pub use memory::InMemoryAnalysisStore;
pub use postgres::PgAnalysisStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{AnalysisJob, AnalysisResult, JobUpdate, NewAnalysisResult, Stock, UpdateOutcome};

#[async_trait]
pub trait AnalysisStore: Send + Sync {
    async fn insert_job(&self, job: &AnalysisJob) -> Result<(), AppError>;

    /// Applies `update` unless the job is unknown or already terminal.
    async fn update_job(&self, job_id: Uuid, update: &JobUpdate) -> Result<UpdateOutcome, AppError>;

    async fn fetch_job(&self, job_id: Uuid) -> Result<Option<AnalysisJob>, AppError>;

    /// Fails every pending/processing job started before `started_before`.
    async fn fail_stale_jobs(
        &self,
        started_before: DateTime<Utc>,
        message: &str,
    ) -> Result<u64, AppError>;

    async fn find_stocks_by_ids(&self, ids: &[i32]) -> Result<Vec<Stock>, AppError>;

    async fn find_stock_by_symbol(&self, symbol: &str) -> Result<Option<Stock>, AppError>;

    async fn insert_result(&self, result: &NewAnalysisResult) -> Result<AnalysisResult, AppError>;

    async fn update_result(
        &self,
        id: i32,
        result: &NewAnalysisResult,
    ) -> Result<AnalysisResult, AppError>;

    /// Most recent result for the stock with `from <= analysis_date < until`.
    async fn find_result_between(
        &self,
        stock_id: i32,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Option<AnalysisResult>, AppError>;

    async fn latest_result(&self, stock_id: i32) -> Result<Option<AnalysisResult>, AppError>;

    /// A page of results, newest first, plus the total count for the stock.
    async fn result_history(
        &self,
        stock_id: i32,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<AnalysisResult>, i64), AppError>;
}
