use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use crate::errors::AppError;
use crate::services::analysis_job_service;
use crate::services::rate_limiter::RateLimiter;
use crate::store::AnalysisStore;

// Context passed to job functions
#[derive(Clone)]
pub struct JobContext {
    pub store: Arc<dyn AnalysisStore>,
    pub rate_limiters: Vec<Arc<RateLimiter>>,
    pub job_max_runtime: Option<Duration>,
}

#[derive(Debug)]
pub struct JobResult {
    pub items_processed: u64,
}

/// Background maintenance: stale analysis jobs and rate-limit windows.
pub struct JobSchedulerService {
    scheduler: JobScheduler,
    context: JobContext,
}

impl JobSchedulerService {
    pub async fn new(context: JobContext) -> Result<Self, AppError> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to create scheduler: {}", e)))?;

        Ok(Self { scheduler, context })
    }

    pub async fn start(&mut self) -> Result<(), AppError> {
        info!("🚀 Starting maintenance scheduler...");

        // format: sec min hour day month weekday
        if self.context.job_max_runtime.is_some() {
            self.schedule_job(
                "0 */5 * * * *",
                "sweep_stale_analysis_jobs",
                "Every 5 minutes",
                sweep_stale_analysis_jobs,
            )
            .await?;
        } else {
            info!("Stale analysis job sweep disabled");
        }

        self.schedule_job(
            "30 */5 * * * *",
            "cleanup_rate_limits",
            "Every 5 minutes",
            cleanup_rate_limits,
        )
        .await?;

        self.scheduler
            .start()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to start scheduler: {}", e)))?;

        info!("✅ Maintenance scheduler started");
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<(), AppError> {
        info!("🛑 Stopping maintenance scheduler...");
        self.scheduler
            .shutdown()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to stop scheduler: {}", e)))?;
        info!("✅ Maintenance scheduler stopped");
        Ok(())
    }

    async fn schedule_job<F, Fut>(
        &mut self,
        schedule: &str,
        job_name: &'static str,
        description: &str,
        job_fn: F,
    ) -> Result<(), AppError>
    where
        F: Fn(JobContext) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<JobResult, AppError>> + Send + 'static,
    {
        let context = self.context.clone();
        let job_fn = Arc::new(job_fn);

        let job = Job::new_async(schedule, move |_uuid, _l| {
            let context = context.clone();
            let job_fn = job_fn.clone();
            Box::pin(async move {
                run_tracked(job_name, context, job_fn).await;
            })
        })
        .map_err(|e| AppError::Internal(format!("Failed to create job {}: {}", job_name, e)))?;

        self.scheduler
            .add(job)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to add job {}: {}", job_name, e)))?;

        info!("📅 Scheduled: {} - {} [cron: {}]", job_name, description, schedule);
        Ok(())
    }
}

async fn run_tracked<F, Fut>(job_name: &str, context: JobContext, job_fn: Arc<F>)
where
    F: Fn(JobContext) -> Fut,
    Fut: std::future::Future<Output = Result<JobResult, AppError>>,
{
    let started_at = Utc::now();
    let result = job_fn(context).await;
    let duration_ms = (Utc::now() - started_at).num_milliseconds();

    match result {
        Ok(job_result) => info!(
            "✅ Job completed: {} (processed: {}, duration: {}ms)",
            job_name, job_result.items_processed, duration_ms
        ),
        Err(e) => error!("❌ Job failed: {} - {}", job_name, e),
    }
}

pub async fn sweep_stale_analysis_jobs(context: JobContext) -> Result<JobResult, AppError> {
    let Some(max_runtime) = context.job_max_runtime else {
        return Ok(JobResult { items_processed: 0 });
    };
    let failed = analysis_job_service::sweep_stale_jobs(context.store.as_ref(), max_runtime).await?;
    Ok(JobResult { items_processed: failed })
}

pub async fn cleanup_rate_limits(context: JobContext) -> Result<JobResult, AppError> {
    let removed = context
        .rate_limiters
        .iter()
        .map(|limiter| limiter.cleanup_expired() as u64)
        .sum();
    Ok(JobResult { items_processed: removed })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RateLimitSettings;
    use crate::models::{AnalysisJob, JobStatus};
    use crate::store::InMemoryAnalysisStore;

    fn context(store: Arc<InMemoryAnalysisStore>, max_runtime: Option<Duration>) -> JobContext {
        JobContext {
            store,
            rate_limiters: vec![Arc::new(RateLimiter::new(RateLimitSettings {
                window: Duration::from_secs(60),
                max_requests: 10,
            }))],
            job_max_runtime: max_runtime,
        }
    }

    #[tokio::test]
    async fn test_sweep_is_noop_when_disabled() {
        let store = Arc::new(InMemoryAnalysisStore::new());
        let job = AnalysisJob::new(vec![1], vec!["AAA".into()]);
        store.insert_job(&job).await.unwrap();

        let result = sweep_stale_analysis_jobs(context(store.clone(), None)).await.unwrap();
        assert_eq!(result.items_processed, 0);
        let stored = store.fetch_job(job.job_id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn test_sweep_fails_overdue_jobs() {
        let store = Arc::new(InMemoryAnalysisStore::new());
        let job = AnalysisJob::new(vec![1], vec!["AAA".into()]);
        store.insert_job(&job).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        let result = sweep_stale_analysis_jobs(context(store.clone(), Some(Duration::ZERO)))
            .await
            .unwrap();
        assert_eq!(result.items_processed, 1);
        let stored = store.fetch_job(job.job_id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
    }
}
