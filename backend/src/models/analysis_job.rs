use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status: {}", other)),
        }
    }
}

// A batch analysis request and its progress. Mutated only by the task that runs it.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisJob {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub stock_ids: Vec<i32>,
    pub tickers: Vec<String>,
    pub total_count: i32,
    pub processed_count: i32,
    pub success_count: i32,
    pub failed_count: i32,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl AnalysisJob {
    pub fn new(stock_ids: Vec<i32>, tickers: Vec<String>) -> Self {
        let now = Utc::now();
        Self {
            job_id: Uuid::new_v4(),
            status: JobStatus::Pending,
            total_count: stock_ids.len() as i32,
            stock_ids,
            tickers,
            processed_count: 0,
            success_count: 0,
            failed_count: 0,
            error_message: None,
            started_at: now,
            completed_at: None,
            updated_at: now,
        }
    }

    /// Applies `update` in place. Counters never decrease and `completed_at`
    /// is stamped on the first terminal transition only. Callers must reject
    /// updates to a job that is already terminal.
    pub fn apply(&mut self, update: &JobUpdate, now: DateTime<Utc>) {
        self.status = update.status;
        if let Some(n) = update.processed_count {
            self.processed_count = self.processed_count.max(n);
        }
        if let Some(n) = update.success_count {
            self.success_count = self.success_count.max(n);
        }
        if let Some(n) = update.failed_count {
            self.failed_count = self.failed_count.max(n);
        }
        if let Some(msg) = &update.error_message {
            self.error_message = Some(msg.clone());
        }
        if update.status.is_terminal() && self.completed_at.is_none() {
            self.completed_at = Some(now);
        }
        self.updated_at = now;
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct AnalysisJobRow {
    pub job_id: Uuid,
    pub status: String,
    pub stock_ids: Vec<i32>,
    pub tickers: Vec<String>,
    pub total_count: i32,
    pub processed_count: i32,
    pub success_count: i32,
    pub failed_count: i32,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<AnalysisJobRow> for AnalysisJob {
    type Error = String;

    fn try_from(row: AnalysisJobRow) -> Result<Self, Self::Error> {
        Ok(Self {
            job_id: row.job_id,
            status: row.status.parse()?,
            stock_ids: row.stock_ids,
            tickers: row.tickers,
            total_count: row.total_count,
            processed_count: row.processed_count,
            success_count: row.success_count,
            failed_count: row.failed_count,
            error_message: row.error_message,
            started_at: row.started_at,
            completed_at: row.completed_at,
            updated_at: row.updated_at,
        })
    }
}

/// A status transition plus whichever counters change with it.
#[derive(Debug, Clone, PartialEq)]
pub struct JobUpdate {
    pub status: JobStatus,
    pub processed_count: Option<i32>,
    pub success_count: Option<i32>,
    pub failed_count: Option<i32>,
    pub error_message: Option<String>,
}

impl JobUpdate {
    pub fn status(status: JobStatus) -> Self {
        Self {
            status,
            processed_count: None,
            success_count: None,
            failed_count: None,
            error_message: None,
        }
    }

    pub fn completed(processed: i32, succeeded: i32, failed: i32) -> Self {
        Self {
            processed_count: Some(processed),
            success_count: Some(succeeded),
            failed_count: Some(failed),
            ..Self::status(JobStatus::Completed)
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            error_message: Some(message.into()),
            ..Self::status(JobStatus::Failed)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Applied,
    NotFound,
    AlreadyTerminal(JobStatus),
}

/// What the status endpoint returns for a job.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisJobStatus {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub total_count: i32,
    pub processed_count: i32,
    pub success_count: i32,
    pub failed_count: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<AnalysisJob> for AnalysisJobStatus {
    fn from(job: AnalysisJob) -> Self {
        Self {
            job_id: job.job_id,
            status: job.status,
            total_count: job.total_count,
            processed_count: job.processed_count,
            success_count: job.success_count,
            failed_count: job.failed_count,
            error_message: job.error_message,
            started_at: job.started_at,
            completed_at: job.completed_at,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TriggerAnalysisRequest {
    #[serde(rename = "stockIds")]
    pub stock_ids: Option<Vec<i32>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerAnalysisResponse {
    pub success: bool,
    pub message: String,
    pub analysis_count: usize,
    pub tickers: Vec<String>,
    pub status: JobStatus,
    pub job_id: Uuid,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn job() -> AnalysisJob {
        AnalysisJob::new(vec![1, 2], vec!["AAA".into(), "BBB".into()])
    }

    #[test]
    fn test_new_job_is_pending_with_zeroed_counters() {
        let job = job();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.total_count, 2);
        assert_eq!(job.processed_count + job.success_count + job.failed_count, 0);
        assert!(job.completed_at.is_none());
    }

    #[test]
    fn test_completed_at_is_stamped_once() {
        let mut job = job();
        let first = Utc::now();
        job.apply(&JobUpdate::completed(2, 2, 0), first);
        assert_eq!(job.completed_at, Some(first));

        job.apply(&JobUpdate::completed(2, 2, 0), first + Duration::seconds(10));
        assert_eq!(job.completed_at, Some(first));
    }

    #[test]
    fn test_counters_never_decrease() {
        let mut job = job();
        let now = Utc::now();
        job.apply(&JobUpdate::completed(2, 1, 1), now);
        job.apply(&JobUpdate::completed(0, 0, 0), now);
        assert_eq!((job.processed_count, job.success_count, job.failed_count), (2, 1, 1));
    }

    #[test]
    fn test_failed_update_keeps_counters() {
        let mut job = job();
        job.apply(&JobUpdate::status(JobStatus::Processing), Utc::now());
        job.apply(&JobUpdate::failed("engine timed out"), Utc::now());

        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.processed_count, 0);
        assert_eq!(job.error_message.as_deref(), Some("engine timed out"));
        assert!(job.completed_at.is_some());
    }

    #[test]
    fn test_status_view_omits_empty_optionals() {
        let value = serde_json::to_value(AnalysisJobStatus::from(job())).unwrap();
        assert_eq!(value["status"], "pending");
        assert_eq!(value["totalCount"], 2);
        assert!(value.get("errorMessage").is_none());
        assert!(value.get("completedAt").is_none());
    }
}
