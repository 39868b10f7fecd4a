use std::sync::atomic::{AtomicI32, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use uuid::Uuid;

use super::AnalysisStore;
use crate::errors::AppError;
use crate::models::{
    AnalysisJob, AnalysisResult, JobUpdate, NewAnalysisResult, Stock, UpdateOutcome,
};

/// Non-persistent [`AnalysisStore`] with the same transition rules as the
/// Postgres implementation.
#[derive(Default)]
pub struct InMemoryAnalysisStore {
    stocks: RwLock<Vec<Stock>>,
    jobs: DashMap<Uuid, AnalysisJob>,
    results: RwLock<Vec<AnalysisResult>>,
    next_stock_id: AtomicI32,
    next_result_id: AtomicI32,
}

impl InMemoryAnalysisStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_stock(&self, symbol: &str, name: &str) -> Stock {
        let now = Utc::now();
        let stock = Stock {
            id: self.next_stock_id.fetch_add(1, Ordering::SeqCst) + 1,
            symbol: symbol.to_string(),
            name: name.to_string(),
            sector: None,
            market: "TSE".to_string(),
            created_at: now,
            updated_at: now,
        };
        self.stocks.write().push(stock.clone());
        stock
    }

    pub fn remove_stock(&self, symbol: &str) {
        self.stocks.write().retain(|s| s.symbol != symbol);
    }

    pub fn results_for(&self, stock_id: i32) -> Vec<AnalysisResult> {
        self.results
            .read()
            .iter()
            .filter(|r| r.stock_id == stock_id)
            .cloned()
            .collect()
    }

    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }
}

fn newest_first(results: &mut [AnalysisResult]) {
    results.sort_by(|a, b| b.analysis_date.cmp(&a.analysis_date).then(b.id.cmp(&a.id)));
}

#[async_trait]
impl AnalysisStore for InMemoryAnalysisStore {
    async fn insert_job(&self, job: &AnalysisJob) -> Result<(), AppError> {
        if self.jobs.contains_key(&job.job_id) {
            return Err(AppError::Conflict(format!("job {} already exists", job.job_id)));
        }
        self.jobs.insert(job.job_id, job.clone());
        Ok(())
    }

    async fn update_job(&self, job_id: Uuid, update: &JobUpdate) -> Result<UpdateOutcome, AppError> {
        let Some(mut job) = self.jobs.get_mut(&job_id) else {
            return Ok(UpdateOutcome::NotFound);
        };
        if job.status.is_terminal() {
            return Ok(UpdateOutcome::AlreadyTerminal(job.status));
        }
        job.apply(update, Utc::now());
        Ok(UpdateOutcome::Applied)
    }

    async fn fetch_job(&self, job_id: Uuid) -> Result<Option<AnalysisJob>, AppError> {
        Ok(self.jobs.get(&job_id).map(|job| job.clone()))
    }

    async fn fail_stale_jobs(
        &self,
        started_before: DateTime<Utc>,
        message: &str,
    ) -> Result<u64, AppError> {
        let now = Utc::now();
        let mut failed = 0;
        for mut job in self.jobs.iter_mut() {
            if !job.status.is_terminal() && job.started_at < started_before {
                job.apply(&JobUpdate::failed(message), now);
                failed += 1;
            }
        }
        Ok(failed)
    }

    async fn find_stocks_by_ids(&self, ids: &[i32]) -> Result<Vec<Stock>, AppError> {
        let mut found: Vec<Stock> = self
            .stocks
            .read()
            .iter()
            .filter(|s| ids.contains(&s.id))
            .cloned()
            .collect();
        found.sort_by_key(|s| s.id);
        Ok(found)
    }

    async fn find_stock_by_symbol(&self, symbol: &str) -> Result<Option<Stock>, AppError> {
        Ok(self.stocks.read().iter().find(|s| s.symbol == symbol).cloned())
    }

    async fn insert_result(&self, result: &NewAnalysisResult) -> Result<AnalysisResult, AppError> {
        let now = Utc::now();
        let stored = AnalysisResult {
            id: self.next_result_id.fetch_add(1, Ordering::SeqCst) + 1,
            stock_id: result.stock_id,
            signal: result.signal,
            score: result.score,
            confidence: result.confidence,
            reason: result.reason.clone(),
            indicators: result.indicators.clone(),
            current_price: result.current_price,
            analysis_date: result.analysis_date,
            created_at: now,
            updated_at: now,
        };
        self.results.write().push(stored.clone());
        Ok(stored)
    }

    async fn update_result(
        &self,
        id: i32,
        result: &NewAnalysisResult,
    ) -> Result<AnalysisResult, AppError> {
        let mut results = self.results.write();
        let existing = results
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| AppError::NotFound(format!("analysis result {} not found", id)))?;

        existing.signal = result.signal;
        existing.score = result.score;
        existing.confidence = result.confidence;
        existing.reason = result.reason.clone();
        existing.indicators = result.indicators.clone();
        existing.current_price = result.current_price;
        existing.updated_at = Utc::now();
        Ok(existing.clone())
    }

    async fn find_result_between(
        &self,
        stock_id: i32,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Option<AnalysisResult>, AppError> {
        let mut matching: Vec<AnalysisResult> = self
            .results_for(stock_id)
            .into_iter()
            .filter(|r| r.analysis_date >= from && r.analysis_date < until)
            .collect();
        newest_first(&mut matching);
        Ok(matching.into_iter().next())
    }

    async fn latest_result(&self, stock_id: i32) -> Result<Option<AnalysisResult>, AppError> {
        let mut results = self.results_for(stock_id);
        newest_first(&mut results);
        Ok(results.into_iter().next())
    }

    async fn result_history(
        &self,
        stock_id: i32,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<AnalysisResult>, i64), AppError> {
        let mut results = self.results_for(stock_id);
        newest_first(&mut results);
        let total = results.len() as i64;
        let page = results
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect();
        Ok((page, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::JobStatus;

    #[tokio::test]
    async fn test_terminal_jobs_reject_further_updates() {
        let store = InMemoryAnalysisStore::new();
        let job = AnalysisJob::new(vec![1], vec!["AAA".into()]);
        store.insert_job(&job).await.unwrap();

        let outcome = store.update_job(job.job_id, &JobUpdate::completed(1, 1, 0)).await.unwrap();
        assert_eq!(outcome, UpdateOutcome::Applied);

        let outcome = store.update_job(job.job_id, &JobUpdate::failed("late")).await.unwrap();
        assert_eq!(outcome, UpdateOutcome::AlreadyTerminal(JobStatus::Completed));

        let stored = store.fetch_job(job.job_id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Completed);
        assert!(stored.error_message.is_none());
    }

    #[tokio::test]
    async fn test_unknown_job_update_reports_not_found() {
        let store = InMemoryAnalysisStore::new();
        let outcome = store
            .update_job(Uuid::new_v4(), &JobUpdate::status(JobStatus::Processing))
            .await
            .unwrap();
        assert_eq!(outcome, UpdateOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_stale_sweep_only_touches_running_jobs() {
        let store = InMemoryAnalysisStore::new();
        let running = AnalysisJob::new(vec![1], vec!["AAA".into()]);
        let done = AnalysisJob::new(vec![2], vec!["BBB".into()]);
        store.insert_job(&running).await.unwrap();
        store.insert_job(&done).await.unwrap();
        store.update_job(done.job_id, &JobUpdate::completed(1, 1, 0)).await.unwrap();

        let cutoff = Utc::now() + chrono::Duration::seconds(1);
        let failed = store.fail_stale_jobs(cutoff, "timed out").await.unwrap();

        assert_eq!(failed, 1);
        let running = store.fetch_job(running.job_id).await.unwrap().unwrap();
        assert_eq!(running.status, JobStatus::Failed);
        let done = store.fetch_job(done.job_id).await.unwrap().unwrap();
        assert_eq!(done.status, JobStatus::Completed);
    }
}
