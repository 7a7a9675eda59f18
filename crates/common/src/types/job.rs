use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{JobId, PublisherId};

/// Processing job lifecycle states.
///
/// `Failed` is only ever set with retries exhausted; a retryable failure
/// puts the job back to `Queued`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
    Cancelled,
    Skipped,
}

impl JobStatus {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Skipped => "skipped",
        }
    }

    /// Terminal states never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Cancelled | Self::Skipped
        )
    }

    /// Non-terminal states: the URL is considered "in flight".
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Queued | Self::Processing)
    }
}

pub fn parse_job_status(s: &str) -> JobStatus {
    match s {
        "queued" => JobStatus::Queued,
        "processing" => JobStatus::Processing,
        "completed" => JobStatus::Completed,
        "failed" => JobStatus::Failed,
        "cancelled" => JobStatus::Cancelled,
        "skipped" => JobStatus::Skipped,
        other => {
            tracing::warn!(status = other, "Unknown job status, defaulting to Queued");
            JobStatus::Queued
        }
    }
}

/// Failure classification for jobs and metric labels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    /// Network, HTTP status, content too small, extraction failure.
    Crawl,
    /// Generation/embedding call errors, unparseable LLM output, refusals.
    Llm,
    /// Store errors during persistence.
    Db,
    /// Inconsistent input (publisher missing, URL not whitelisted).
    Validation,
    Unknown,
}

impl ErrorType {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            Self::Crawl => "crawl",
            Self::Llm => "llm",
            Self::Db => "db",
            Self::Validation => "validation",
            Self::Unknown => "unknown",
        }
    }
}

pub fn parse_error_type(s: &str) -> ErrorType {
    match s {
        "crawl" => ErrorType::Crawl,
        "llm" => ErrorType::Llm,
        "db" => ErrorType::Db,
        "validation" => ErrorType::Validation,
        _ => ErrorType::Unknown,
    }
}

/// A processing job. The jobs table doubles as the work queue; only the
/// queue manager mutates these records, and they are never deleted.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Job {
    pub job_id: JobId,
    /// Normalized blog URL (the deduplication key).
    pub blog_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher_id: Option<PublisherId>,
    /// Publisher config snapshot taken at enqueue time, or `{}`.
    #[serde(default)]
    pub config: Value,
    pub status: JobStatus,
    pub failure_count: i32,
    pub max_retries: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<ErrorType>,
    /// Owning worker while leased; set iff status is Processing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heartbeat_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    /// Opaque outcome summary set on completion or skip.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    pub reprocessed_count: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        for status in [
            JobStatus::Queued,
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::Failed,
            JobStatus::Cancelled,
            JobStatus::Skipped,
        ] {
            assert_eq!(parse_job_status(status.as_db_str()), status);
        }
    }

    #[test]
    fn test_terminal_and_active_partition() {
        for status in [
            JobStatus::Queued,
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::Failed,
            JobStatus::Cancelled,
            JobStatus::Skipped,
        ] {
            assert_ne!(status.is_terminal(), status.is_active());
        }
    }

    #[test]
    fn test_error_type_roundtrip() {
        for et in [
            ErrorType::Crawl,
            ErrorType::Llm,
            ErrorType::Db,
            ErrorType::Validation,
            ErrorType::Unknown,
        ] {
            assert_eq!(parse_error_type(et.as_db_str()), et);
        }
    }
}
