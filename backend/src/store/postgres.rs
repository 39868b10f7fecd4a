use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::AnalysisStore;
use crate::db::{analysis_job_queries, analysis_queries, stock_queries};
use crate::errors::AppError;
use crate::models::{
    AnalysisJob, AnalysisJobRow, AnalysisResult, JobUpdate, NewAnalysisResult, Stock, UpdateOutcome,
};

#[derive(Clone)]
pub struct PgAnalysisStore {
    pool: PgPool,
}

impl PgAnalysisStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn into_job(row: AnalysisJobRow) -> Result<AnalysisJob, AppError> {
    AnalysisJob::try_from(row).map_err(AppError::Internal)
}

#[async_trait]
impl AnalysisStore for PgAnalysisStore {
    async fn insert_job(&self, job: &AnalysisJob) -> Result<(), AppError> {
        analysis_job_queries::insert(&self.pool, job).await?;
        Ok(())
    }

    async fn update_job(&self, job_id: Uuid, update: &JobUpdate) -> Result<UpdateOutcome, AppError> {
        if analysis_job_queries::apply_update(&self.pool, job_id, update)
            .await?
            .is_some()
        {
            return Ok(UpdateOutcome::Applied);
        }

        match analysis_job_queries::fetch(&self.pool, job_id).await? {
            None => Ok(UpdateOutcome::NotFound),
            Some(row) => Ok(UpdateOutcome::AlreadyTerminal(into_job(row)?.status)),
        }
    }

    async fn fetch_job(&self, job_id: Uuid) -> Result<Option<AnalysisJob>, AppError> {
        analysis_job_queries::fetch(&self.pool, job_id)
            .await?
            .map(into_job)
            .transpose()
    }

    async fn fail_stale_jobs(
        &self,
        started_before: DateTime<Utc>,
        message: &str,
    ) -> Result<u64, AppError> {
        Ok(analysis_job_queries::fail_stale(&self.pool, started_before, message).await?)
    }

    async fn find_stocks_by_ids(&self, ids: &[i32]) -> Result<Vec<Stock>, AppError> {
        Ok(stock_queries::fetch_by_ids(&self.pool, ids).await?)
    }

    async fn find_stock_by_symbol(&self, symbol: &str) -> Result<Option<Stock>, AppError> {
        Ok(stock_queries::fetch_by_symbol(&self.pool, symbol).await?)
    }

    async fn insert_result(&self, result: &NewAnalysisResult) -> Result<AnalysisResult, AppError> {
        Ok(analysis_queries::insert(&self.pool, result).await?.into())
    }

    async fn update_result(
        &self,
        id: i32,
        result: &NewAnalysisResult,
    ) -> Result<AnalysisResult, AppError> {
        Ok(analysis_queries::update(&self.pool, id, result).await?.into())
    }

    async fn find_result_between(
        &self,
        stock_id: i32,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Option<AnalysisResult>, AppError> {
        Ok(analysis_queries::find_between(&self.pool, stock_id, from, until)
            .await?
            .map(Into::into))
    }

    async fn latest_result(&self, stock_id: i32) -> Result<Option<AnalysisResult>, AppError> {
        Ok(analysis_queries::latest(&self.pool, stock_id).await?.map(Into::into))
    }

    async fn result_history(
        &self,
        stock_id: i32,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<AnalysisResult>, i64), AppError> {
        let (rows, total) = tokio::try_join!(
            analysis_queries::history(&self.pool, stock_id, limit, offset),
            analysis_queries::count_for_stock(&self.pool, stock_id),
        )?;
        Ok((rows.into_iter().map(Into::into).collect(), total))
    }
}
