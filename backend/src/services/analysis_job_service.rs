use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{AnalysisJob, JobUpdate, UpdateOutcome};
use crate::store::AnalysisStore;

pub const MAX_RUNTIME_EXCEEDED: &str = "Job exceeded maximum runtime and was marked as failed";

/// Persists a new `pending` job for the given stocks.
pub async fn create_job(
    store: &dyn AnalysisStore,
    stock_ids: Vec<i32>,
    tickers: Vec<String>,
) -> Result<AnalysisJob, AppError> {
    let job = AnalysisJob::new(stock_ids, tickers);
    store.insert_job(&job).await?;
    info!("Created analysis job {} for {} stock(s)", job.job_id, job.total_count);
    Ok(job)
}

/// Moves a job to a new status. Unknown jobs are `NotFound`, jobs that
/// already finished are `Conflict`.
pub async fn update_status(
    store: &dyn AnalysisStore,
    job_id: Uuid,
    update: &JobUpdate,
) -> Result<(), AppError> {
    match store.update_job(job_id, update).await? {
        UpdateOutcome::Applied => {
            info!("Analysis job {} -> {}", job_id, update.status);
            Ok(())
        }
        UpdateOutcome::NotFound => Err(AppError::NotFound(format!("Job {} not found", job_id))),
        UpdateOutcome::AlreadyTerminal(current) => Err(AppError::Conflict(format!(
            "Job {} is already {}, ignoring transition to {}",
            job_id, current, update.status
        ))),
    }
}

pub async fn get_status(
    store: &dyn AnalysisStore,
    job_id: Uuid,
) -> Result<Option<AnalysisJob>, AppError> {
    store.fetch_job(job_id).await
}

/// Fails jobs that have been pending or processing for longer than `max_runtime`.
pub async fn sweep_stale_jobs(
    store: &dyn AnalysisStore,
    max_runtime: Duration,
) -> Result<u64, AppError> {
    let max_runtime = chrono::Duration::from_std(max_runtime)
        .map_err(|e| AppError::Internal(format!("invalid max runtime: {}", e)))?;
    let cutoff = Utc::now() - max_runtime;

    let failed = store.fail_stale_jobs(cutoff, MAX_RUNTIME_EXCEEDED).await?;
    if failed > 0 {
        warn!("Marked {} stale analysis job(s) as failed", failed);
    }
    Ok(failed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::JobStatus;
    use crate::store::InMemoryAnalysisStore;

    #[tokio::test]
    async fn test_create_job_persists_pending_record() {
        let store = InMemoryAnalysisStore::new();
        let job = create_job(&store, vec![1, 2], vec!["AAA".into(), "BBB".into()])
            .await
            .unwrap();

        let stored = get_status(&store, job.job_id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Pending);
        assert_eq!(stored.total_count, 2);
        assert_eq!(stored.tickers, vec!["AAA", "BBB"]);
    }

    #[tokio::test]
    async fn test_update_status_rejects_unknown_and_finished_jobs() {
        let store = InMemoryAnalysisStore::new();
        let err = update_status(&store, Uuid::new_v4(), &JobUpdate::status(JobStatus::Processing))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let job = create_job(&store, vec![1], vec!["AAA".into()]).await.unwrap();
        update_status(&store, job.job_id, &JobUpdate::failed("engine down"))
            .await
            .unwrap();
        let err = update_status(&store, job.job_id, &JobUpdate::completed(1, 1, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_get_status_of_unknown_job_is_none() {
        let store = InMemoryAnalysisStore::new();
        assert!(get_status(&store, Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sweep_leaves_recent_jobs_alone() {
        let store = InMemoryAnalysisStore::new();
        let job = create_job(&store, vec![1], vec!["AAA".into()]).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        let failed = sweep_stale_jobs(&store, Duration::from_secs(60)).await.unwrap();
        assert_eq!(failed, 0);

        let failed = sweep_stale_jobs(&store, Duration::ZERO).await.unwrap();
        assert_eq!(failed, 1);
        let stored = get_status(&store, job.job_id).await.unwrap().unwrap();
        assert_eq!(stored.error_message.as_deref(), Some(MAX_RUNTIME_EXCEEDED));
    }
}
