use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::external::analysis_engine::{normalize_batch_response, AnalysisEngine, EngineError};
use crate::models::{
    AnalysisJob, JobStatus, JobUpdate, TriggerAnalysisRequest, TriggerAnalysisResponse,
};
use crate::services::{analysis_job_service, analysis_service};
use crate::store::AnalysisStore;

#[derive(Debug, Error)]
enum JobRunError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Storage(#[from] AppError),
}

/// Runs analysis jobs in the background, one detached task per job.
///
/// Each job runs inside an inner task watched by a supervisor. Whether the
/// inner task returns an error or panics, the job ends with exactly one
/// `failed` transition.
#[derive(Clone)]
pub struct AnalysisJobRunner {
    store: Arc<dyn AnalysisStore>,
    engine: Arc<dyn AnalysisEngine>,
    period: String,
}

impl AnalysisJobRunner {
    pub fn new(
        store: Arc<dyn AnalysisStore>,
        engine: Arc<dyn AnalysisEngine>,
        period: impl Into<String>,
    ) -> Self {
        Self {
            store,
            engine,
            period: period.into(),
        }
    }

    pub fn spawn(&self, job: AnalysisJob) -> JoinHandle<()> {
        let runner = self.clone();
        tokio::spawn(async move {
            let job_id = job.job_id;
            let worker = runner.clone();
            let inner = tokio::spawn(async move { worker.execute(&job).await });

            let failure = match inner.await {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e.to_string()),
                Err(join_err) if join_err.is_panic() => {
                    Some("Analysis task panicked".to_string())
                }
                Err(_) => Some("Analysis task was cancelled".to_string()),
            };

            if let Some(message) = failure {
                error!("Analysis job {} failed: {}", job_id, message);
                runner.mark_failed(job_id, message).await;
            }
        })
    }

    async fn execute(&self, job: &AnalysisJob) -> Result<(), JobRunError> {
        let store = self.store.as_ref();
        analysis_job_service::update_status(
            store,
            job.job_id,
            &JobUpdate::status(JobStatus::Processing),
        )
        .await?;

        let body = self.engine.analyze_batch(&job.tickers, &self.period).await?;
        let mut results = normalize_batch_response(body)?;

        let requested: HashSet<&str> = job.tickers.iter().map(String::as_str).collect();
        results.retain(|ticker, _| {
            let known = requested.contains(ticker.as_str());
            if !known {
                warn!(
                    "Job {}: ignoring engine result for unrequested ticker {}",
                    job.job_id, ticker
                );
            }
            known
        });

        let saves = results.iter().map(|(ticker, payload)| async move {
            let outcome = analysis_service::save_from_engine(store, ticker, payload).await;
            if let Err(e) = &outcome {
                warn!("Job {}: failed to save analysis for {}: {}", job.job_id, ticker, e);
            }
            outcome.is_ok()
        });
        let succeeded = join_all(saves).await.into_iter().filter(|ok| *ok).count() as i32;

        let total = job.total_count;
        analysis_job_service::update_status(
            store,
            job.job_id,
            &JobUpdate::completed(total, succeeded, total - succeeded),
        )
        .await?;

        info!(
            "Analysis job {} completed: {}/{} succeeded",
            job.job_id, succeeded, total
        );
        Ok(())
    }

    async fn mark_failed(&self, job_id: Uuid, message: String) {
        let update = JobUpdate::failed(message);
        match analysis_job_service::update_status(self.store.as_ref(), job_id, &update).await {
            Ok(()) => {}
            Err(AppError::Conflict(msg)) => warn!("{}", msg),
            Err(e) => error!("Could not mark analysis job {} as failed: {}", job_id, e),
        }
    }
}

/// Validates the request, resolves the stocks, records the job and hands it
/// to the runner. Returns without waiting for the engine.
pub async fn trigger_analysis(
    store: &dyn AnalysisStore,
    runner: &AnalysisJobRunner,
    request: TriggerAnalysisRequest,
) -> Result<(TriggerAnalysisResponse, JoinHandle<()>), AppError> {
    let stock_ids = request
        .stock_ids
        .filter(|ids| !ids.is_empty())
        .ok_or_else(|| AppError::Validation("stockIds must be a non-empty array".to_string()))?;

    let stocks = store.find_stocks_by_ids(&stock_ids).await?;
    if stocks.is_empty() {
        return Err(AppError::NotFound("No stocks found for the given IDs".to_string()));
    }

    let (ids, tickers): (Vec<i32>, Vec<String>) =
        stocks.into_iter().map(|s| (s.id, s.symbol)).unzip();

    let job = analysis_job_service::create_job(store, ids, tickers.clone()).await?;
    let job_id = job.job_id;
    let handle = runner.spawn(job);

    info!("Triggered analysis job {} for {:?}", job_id, tickers);
    Ok((
        TriggerAnalysisResponse {
            success: true,
            message: format!("Analysis started for {} stock(s)", tickers.len()),
            analysis_count: tickers.len(),
            tickers,
            status: JobStatus::Processing,
            job_id,
        },
        handle,
    ))
}
