//! Queue & lease manager over the `processing_jobs` table.
//!
//! The jobs table *is* the queue: claiming, heartbeats, retries, and
//! dead-lettering are all row updates guarded by the database. Two
//! primitives carry the concurrency story — a partial unique index keeps at
//! most one non-terminal job per URL, and `FOR UPDATE SKIP LOCKED` hands
//! each queued job to exactly one worker.
//!
//! Only this module mutates job state.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

use askpage_common::ids::{JobId, PublisherId};
use askpage_common::types::{parse_error_type, parse_job_status, ErrorType, Job, JobStatus};

use sqlx::PgPool;

/// Client for the job queue.
#[derive(Clone)]
pub struct JobQueue {
    pool: PgPool,
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Queue query error: {0}")]
    Query(String),

    #[error("Job not found: {0}")]
    NotFound(JobId),

    #[error("Invalid job state: {0}")]
    InvalidState(String),
}

impl From<QueueError> for askpage_common::AskpageError {
    fn from(e: QueueError) -> Self {
        match e {
            QueueError::NotFound(id) => {
                askpage_common::AskpageError::NotFound(format!("Job {}", id))
            }
            QueueError::InvalidState(m) => askpage_common::AskpageError::Validation(m),
            other => askpage_common::AskpageError::Postgres(other.to_string()),
        }
    }
}

/// Outcome of a `fail` transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOutcome {
    /// Requeued for another attempt.
    Requeued { failure_count: i32 },
    /// Retries exhausted; the job is dead-lettered.
    DeadLettered { failure_count: i32 },
}

/// A job forcibly taken back from a dead worker.
#[derive(Debug, Clone)]
pub struct ReclaimedJob {
    pub job_id: JobId,
    pub publisher_id: Option<PublisherId>,
    pub status: JobStatus,
}

impl JobQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Verify the connection is alive.
    pub async fn health_check(&self) -> Result<(), QueueError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| QueueError::Query(e.to_string()))?;
        Ok(())
    }

    /// Find-or-create the job for a URL. Returns `(job, is_new)`.
    ///
    /// Race-safe: the insert targets the partial unique index, so of N
    /// concurrent callers exactly one inserts; the rest read the winner.
    pub async fn create_job(
        &self,
        blog_url: &str,
        publisher_id: Option<PublisherId>,
        config: &Value,
    ) -> Result<(Job, bool), QueueError> {
        // The loop closes the window where a competing non-terminal job
        // reaches a terminal state between our insert attempt and re-read.
        for _ in 0..3 {
            let job_id = JobId::new();
            let inserted = sqlx::query(
                r#"
                INSERT INTO processing_jobs (job_id, blog_url, publisher_id, config, status,
                                             reprocessed_count)
                VALUES ($1, $2, $3, $4, 'queued',
                        (SELECT COUNT(*) FROM processing_jobs WHERE blog_url = $2))
                ON CONFLICT (blog_url) WHERE status IN ('queued', 'processing') DO NOTHING
                "#,
            )
            .bind(job_id.0)
            .bind(blog_url)
            .bind(publisher_id.map(|p| p.0))
            .bind(config)
            .execute(&self.pool)
            .await
            .map_err(|e| QueueError::Query(e.to_string()))?;

            if inserted.rows_affected() == 1 {
                let job = self.get_job(job_id).await?;
                metrics::counter!("queue.jobs.created").increment(1);
                return Ok((job, true));
            }

            if let Some(existing) = self.find_active_job(blog_url).await? {
                return Ok((existing, false));
            }
        }

        Err(QueueError::Query(format!(
            "create_job lost repeated races for {}",
            blog_url
        )))
    }

    /// Retrieve a job by ID.
    pub async fn get_job(&self, job_id: JobId) -> Result<Job, QueueError> {
        sqlx::query_as::<_, JobRow>(&select_jobs("WHERE job_id = $1"))
            .bind(job_id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| QueueError::Query(e.to_string()))?
            .map(Into::into)
            .ok_or(QueueError::NotFound(job_id))
    }

    /// The non-terminal job for a URL, if any.
    pub async fn find_active_job(&self, blog_url: &str) -> Result<Option<Job>, QueueError> {
        let row = sqlx::query_as::<_, JobRow>(&select_jobs(
            "WHERE blog_url = $1 AND status IN ('queued', 'processing')",
        ))
        .bind(blog_url)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| QueueError::Query(e.to_string()))?;

        Ok(row.map(Into::into))
    }

    /// The most recent job for a URL regardless of state.
    pub async fn find_latest_job(&self, blog_url: &str) -> Result<Option<Job>, QueueError> {
        let row = sqlx::query_as::<_, JobRow>(&select_jobs(
            "WHERE blog_url = $1 ORDER BY created_at DESC LIMIT 1",
        ))
        .bind(blog_url)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| QueueError::Query(e.to_string()))?;

        Ok(row.map(Into::into))
    }

    /// Atomically claim the oldest queued job for `worker_id`.
    ///
    /// `FOR UPDATE SKIP LOCKED` guarantees that under contention at most one
    /// worker succeeds per row. Returns None when the queue is empty.
    pub async fn claim_next(&self, worker_id: &str) -> Result<Option<Job>, QueueError> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            r#"
            UPDATE processing_jobs
            SET status = 'processing',
                worker_id = $1,
                started_at = now(),
                heartbeat_at = now(),
                updated_at = now()
            WHERE job_id = (
                SELECT job_id FROM processing_jobs
                WHERE status = 'queued'
                ORDER BY created_at
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING {}
            "#,
            JOB_COLUMNS
        ))
        .bind(worker_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| QueueError::Query(e.to_string()))?;

        if let Some(ref r) = row {
            tracing::debug!(job_id = %r.job_id, worker_id, "Claimed job");
            metrics::counter!("queue.jobs.claimed").increment(1);
        }

        Ok(row.map(Into::into))
    }

    /// Refresh the lease. A no-op unless the caller still owns the job.
    /// Returns whether the lease was refreshed.
    pub async fn heartbeat(&self, job_id: JobId, worker_id: &str) -> Result<bool, QueueError> {
        let updated = sqlx::query(
            r#"
            UPDATE processing_jobs
            SET heartbeat_at = now(), updated_at = now()
            WHERE job_id = $1 AND worker_id = $2 AND status = 'processing'
            "#,
        )
        .bind(job_id.0)
        .bind(worker_id)
        .execute(&self.pool)
        .await
        .map_err(|e| QueueError::Query(e.to_string()))?;

        Ok(updated.rows_affected() == 1)
    }

    /// Terminal transition to `completed`.
    pub async fn complete(&self, job_id: JobId, result: &Value) -> Result<(), QueueError> {
        let updated = sqlx::query(
            r#"
            UPDATE processing_jobs
            SET status = 'completed',
                result = $2,
                completed_at = now(),
                worker_id = NULL,
                updated_at = now()
            WHERE job_id = $1 AND status = 'processing'
            "#,
        )
        .bind(job_id.0)
        .bind(result)
        .execute(&self.pool)
        .await
        .map_err(|e| QueueError::Query(e.to_string()))?;

        if updated.rows_affected() == 0 {
            return Err(QueueError::InvalidState(format!(
                "job {} is not processing",
                job_id
            )));
        }

        metrics::counter!("queue.jobs.completed").increment(1);
        Ok(())
    }

    /// Record a failure. Requeues until `max_retries` is reached, then
    /// dead-letters the job terminally.
    pub async fn fail(
        &self,
        job_id: JobId,
        error_type: ErrorType,
        error_message: &str,
    ) -> Result<FailOutcome, QueueError> {
        let row: Option<(String, i32)> = sqlx::query_as(
            r#"
            UPDATE processing_jobs
            SET failure_count = failure_count + 1,
                status = CASE WHEN failure_count + 1 >= max_retries
                              THEN 'failed' ELSE 'queued' END,
                last_error = $2,
                error_type = $3,
                worker_id = NULL,
                started_at = NULL,
                heartbeat_at = NULL,
                completed_at = CASE WHEN failure_count + 1 >= max_retries
                                    THEN now() ELSE NULL END,
                updated_at = now()
            WHERE job_id = $1 AND status = 'processing'
            RETURNING status, failure_count
            "#,
        )
        .bind(job_id.0)
        .bind(error_message)
        .bind(error_type.as_db_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| QueueError::Query(e.to_string()))?;

        let (status, failure_count) = row.ok_or_else(|| {
            QueueError::InvalidState(format!("job {} is not processing", job_id))
        })?;

        metrics::counter!("queue.jobs.failures", "error_type" => error_type.as_db_str())
            .increment(1);

        if status == "failed" {
            metrics::counter!("queue.jobs.dead_lettered").increment(1);
            Ok(FailOutcome::DeadLettered { failure_count })
        } else {
            Ok(FailOutcome::Requeued { failure_count })
        }
    }

    /// Terminal transition to `skipped` (threshold not met).
    pub async fn skip(&self, job_id: JobId, reason: &str) -> Result<(), QueueError> {
        let updated = sqlx::query(
            r#"
            UPDATE processing_jobs
            SET status = 'skipped',
                result = jsonb_build_object('reason', $2::text),
                completed_at = now(),
                worker_id = NULL,
                updated_at = now()
            WHERE job_id = $1 AND status = 'processing'
            "#,
        )
        .bind(job_id.0)
        .bind(reason)
        .execute(&self.pool)
        .await
        .map_err(|e| QueueError::Query(e.to_string()))?;

        if updated.rows_affected() == 0 {
            return Err(QueueError::InvalidState(format!(
                "job {} is not processing",
                job_id
            )));
        }

        metrics::counter!("queue.jobs.skipped").increment(1);
        Ok(())
    }

    /// Cancel a job. Only succeeds while it is still queued; a claimed job
    /// completes or fails naturally.
    pub async fn cancel(&self, job_id: JobId) -> Result<Job, QueueError> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            r#"
            UPDATE processing_jobs
            SET status = 'cancelled', completed_at = now(), updated_at = now()
            WHERE job_id = $1 AND status = 'queued'
            RETURNING {}
            "#,
            JOB_COLUMNS
        ))
        .bind(job_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| QueueError::Query(e.to_string()))?;

        match row {
            Some(r) => Ok(r.into()),
            None => {
                // Distinguish "gone" from "not cancellable".
                let job = self.get_job(job_id).await?;
                Err(QueueError::InvalidState(format!(
                    "job {} is {} and cannot be cancelled",
                    job_id,
                    job.status.as_db_str()
                )))
            }
        }
    }

    /// Recover jobs whose worker stopped heartbeating. Each stale lease is
    /// transitioned as one failure ("lease lost") and either requeued or
    /// dead-lettered by the usual retry rule.
    pub async fn reclaim_stale(
        &self,
        now: DateTime<Utc>,
        stale_after: Duration,
    ) -> Result<Vec<ReclaimedJob>, QueueError> {
        let cutoff = now - chrono::Duration::from_std(stale_after).unwrap_or_default();

        let rows: Vec<(Uuid, Option<Uuid>, String)> = sqlx::query_as(
            r#"
            UPDATE processing_jobs
            SET failure_count = failure_count + 1,
                status = CASE WHEN failure_count + 1 >= max_retries
                              THEN 'failed' ELSE 'queued' END,
                last_error = 'lease lost',
                error_type = 'unknown',
                worker_id = NULL,
                started_at = NULL,
                heartbeat_at = NULL,
                completed_at = CASE WHEN failure_count + 1 >= max_retries
                                    THEN now() ELSE NULL END,
                updated_at = now()
            WHERE status = 'processing' AND heartbeat_at < $1
            RETURNING job_id, publisher_id, status
            "#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| QueueError::Query(e.to_string()))?;

        let reclaimed: Vec<ReclaimedJob> = rows
            .into_iter()
            .map(|(job_id, publisher_id, status)| ReclaimedJob {
                job_id: JobId::from_uuid(job_id),
                publisher_id: publisher_id.map(PublisherId::from_uuid),
                status: parse_job_status(&status),
            })
            .collect();

        if !reclaimed.is_empty() {
            tracing::warn!(count = reclaimed.len(), "Reclaimed stale job leases");
            metrics::counter!("queue.jobs.reclaimed").increment(reclaimed.len() as u64);
        }

        Ok(reclaimed)
    }

    /// Job counts grouped by status, in one aggregation.
    pub async fn stats(&self) -> Result<HashMap<String, i64>, QueueError> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM processing_jobs GROUP BY status")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| QueueError::Query(e.to_string()))?;

        Ok(rows.into_iter().collect())
    }

    /// Completed jobs for a publisher since `since`. Used for the daily
    /// limit; failed jobs deliberately do not count.
    pub async fn count_completed_since(
        &self,
        publisher_id: PublisherId,
        since: DateTime<Utc>,
    ) -> Result<i64, QueueError> {
        let row: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*)
            FROM processing_jobs
            WHERE publisher_id = $1
              AND status = 'completed'
              AND completed_at >= $2
            "#,
        )
        .bind(publisher_id.0)
        .bind(since)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| QueueError::Query(e.to_string()))?;

        Ok(row.0)
    }
}

const JOB_COLUMNS: &str = "job_id, blog_url, publisher_id, config, status, failure_count, \
                           max_retries, last_error, error_type, worker_id, heartbeat_at, \
                           created_at, started_at, completed_at, updated_at, result, \
                           reprocessed_count";

fn select_jobs(suffix: &str) -> String {
    format!("SELECT {} FROM processing_jobs {}", JOB_COLUMNS, suffix)
}

/// Internal row type for sqlx deserialization.
#[derive(sqlx::FromRow)]
struct JobRow {
    job_id: Uuid,
    blog_url: String,
    publisher_id: Option<Uuid>,
    config: Value,
    status: String,
    failure_count: i32,
    max_retries: i32,
    last_error: Option<String>,
    error_type: Option<String>,
    worker_id: Option<String>,
    heartbeat_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
    result: Option<Value>,
    reprocessed_count: i32,
}

impl From<JobRow> for Job {
    fn from(row: JobRow) -> Self {
        Self {
            job_id: JobId::from_uuid(row.job_id),
            blog_url: row.blog_url,
            publisher_id: row.publisher_id.map(PublisherId::from_uuid),
            config: row.config,
            status: parse_job_status(&row.status),
            failure_count: row.failure_count,
            max_retries: row.max_retries,
            last_error: row.last_error,
            error_type: row.error_type.as_deref().map(parse_error_type),
            worker_id: row.worker_id,
            heartbeat_at: row.heartbeat_at,
            created_at: row.created_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            updated_at: row.updated_at,
            result: row.result,
            reprocessed_count: row.reprocessed_count,
        }
    }
}
