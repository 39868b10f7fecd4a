use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{AnalysisJob, AnalysisJobRow, JobUpdate};

const JOB_COLUMNS: &str = "job_id, status, stock_ids, tickers, total_count,
    processed_count, success_count, failed_count, error_message,
    started_at, completed_at, updated_at";

pub async fn insert(pool: &PgPool, job: &AnalysisJob) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO analysis_jobs
            (job_id, status, stock_ids, tickers, total_count,
             processed_count, success_count, failed_count, started_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
    )
    .bind(job.job_id)
    .bind(job.status.as_str())
    .bind(&job.stock_ids)
    .bind(&job.tickers)
    .bind(job.total_count)
    .bind(job.processed_count)
    .bind(job.success_count)
    .bind(job.failed_count)
    .bind(job.started_at)
    .bind(job.updated_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn fetch(pool: &PgPool, job_id: Uuid) -> Result<Option<AnalysisJobRow>, sqlx::Error> {
    sqlx::query_as::<_, AnalysisJobRow>(&format!(
        "SELECT {JOB_COLUMNS} FROM analysis_jobs WHERE job_id = $1"
    ))
    .bind(job_id)
    .fetch_optional(pool)
    .await
}

/// Applies a transition to a job that is not yet terminal. Counters only move
/// forward and `completed_at` is stamped on the first terminal status.
/// Returns `None` when no non-terminal job with that id exists.
pub async fn apply_update(
    pool: &PgPool,
    job_id: Uuid,
    update: &JobUpdate,
) -> Result<Option<AnalysisJobRow>, sqlx::Error> {
    sqlx::query_as::<_, AnalysisJobRow>(&format!(
        "UPDATE analysis_jobs
         SET status = $2,
             processed_count = GREATEST(processed_count, COALESCE($3, processed_count)),
             success_count = GREATEST(success_count, COALESCE($4, success_count)),
             failed_count = GREATEST(failed_count, COALESCE($5, failed_count)),
             error_message = COALESCE($6, error_message),
             completed_at = CASE
                 WHEN $2 IN ('completed', 'failed') THEN COALESCE(completed_at, NOW())
                 ELSE completed_at
             END,
             updated_at = NOW()
         WHERE job_id = $1 AND status NOT IN ('completed', 'failed')
         RETURNING {JOB_COLUMNS}"
    ))
    .bind(job_id)
    .bind(update.status.as_str())
    .bind(update.processed_count)
    .bind(update.success_count)
    .bind(update.failed_count)
    .bind(update.error_message.as_deref())
    .fetch_optional(pool)
    .await
}

pub async fn fail_stale(
    pool: &PgPool,
    started_before: DateTime<Utc>,
    message: &str,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE analysis_jobs
         SET status = 'failed',
             error_message = $2,
             completed_at = COALESCE(completed_at, NOW()),
             updated_at = NOW()
         WHERE status IN ('pending', 'processing') AND started_at < $1",
    )
    .bind(started_before)
    .bind(message)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}
