//! Worker pool: claims jobs from the queue and drives them through the
//! orchestrator.
//!
//! Workers poll in parallel; `claim_next` atomicity bounds them to one owner
//! per job. Each worker processes one job at a time with an independent
//! heartbeat task keeping the lease alive, and opportunistically reclaims
//! leases abandoned by dead workers.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use askpage_common::types::{Job, JobStatus};

use crate::orchestrator::Orchestrator;
use crate::queue::{FailOutcome, JobQueue};
use crate::store::PublisherStore;

/// Configuration for the worker pool.
pub struct WorkerPoolConfig {
    pub pool_size: u32,
    pub poll_interval: Duration,
    /// A processing job with a heartbeat older than this is reclaimed.
    pub stale_lease: Duration,
}

/// Pool of worker tasks that consume jobs from the queue.
pub struct WorkerPool {
    workers: Vec<JoinHandle<()>>,
    shutdown_tx: watch::Sender<bool>,
}

impl WorkerPool {
    /// Start `pool_size` workers.
    pub fn start(
        config: WorkerPoolConfig,
        orchestrator: Arc<Orchestrator>,
        queue: JobQueue,
        store: PublisherStore,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let run_id = uuid::Uuid::new_v4().simple().to_string();
        let mut workers = Vec::with_capacity(config.pool_size as usize);

        for i in 0..config.pool_size {
            let worker_id = format!("worker-{}-{}", &run_id[..8], i);
            let worker = worker_loop(
                worker_id,
                shutdown_rx.clone(),
                Arc::clone(&orchestrator),
                queue.clone(),
                store.clone(),
                config.poll_interval,
                config.stale_lease,
            );
            workers.push(tokio::spawn(worker));
        }

        tracing::info!(pool_size = config.pool_size, "Worker pool started");

        Self {
            workers,
            shutdown_tx,
        }
    }

    /// Signal all workers to shut down gracefully.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        tracing::info!("Worker pool shutdown signaled");
    }

    /// Wait for all workers to finish.
    pub async fn join(self) {
        for handle in self.workers {
            let _ = handle.await;
        }
    }
}

/// Main loop for a single worker.
async fn worker_loop(
    worker_id: String,
    shutdown_rx: watch::Receiver<bool>,
    orchestrator: Arc<Orchestrator>,
    queue: JobQueue,
    store: PublisherStore,
    poll_interval: Duration,
    stale_lease: Duration,
) {
    tracing::info!(worker_id = %worker_id, "Worker started");

    // Stale leases are scanned once per lease duration per worker.
    let reclaim_interval = stale_lease;
    let mut last_reclaim = std::time::Instant::now();

    loop {
        if *shutdown_rx.borrow() {
            tracing::info!(worker_id = %worker_id, "Worker shutting down");
            break;
        }

        if last_reclaim.elapsed() >= reclaim_interval {
            reclaim_stale_leases(&queue, &store, stale_lease).await;
            last_reclaim = std::time::Instant::now();
        }

        let job = match queue.claim_next(&worker_id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                tokio::time::sleep(poll_interval).await;
                continue;
            }
            Err(e) => {
                tracing::error!(worker_id = %worker_id, error = %e, "Failed to claim job");
                tokio::time::sleep(poll_interval).await;
                continue;
            }
        };

        process_one(&worker_id, &orchestrator, &queue, &store, stale_lease, job).await;
    }
}

/// Run one claimed job to a settled state. The worker loop itself never
/// crashes on job errors.
async fn process_one(
    worker_id: &str,
    orchestrator: &Orchestrator,
    queue: &JobQueue,
    store: &PublisherStore,
    stale_lease: Duration,
    job: Job,
) {
    tracing::info!(
        worker_id,
        job_id = %job.job_id,
        blog_url = %job.blog_url,
        attempt = job.failure_count + 1,
        "Processing job"
    );

    metrics::gauge!("worker.pool.active").increment(1.0);
    let start = std::time::Instant::now();

    // Heartbeat on an independent task; refresh at a third of the lease.
    let heartbeat_interval = Duration::from_secs((stale_lease.as_secs() / 3).max(1));
    let (hb_cancel_tx, hb_cancel_rx) = tokio::sync::oneshot::channel::<()>();
    let hb_handle = tokio::spawn(heartbeat_task(
        queue.clone(),
        job.job_id,
        worker_id.to_string(),
        heartbeat_interval,
        hb_cancel_rx,
    ));

    let outcome = orchestrator.process_job(&job).await;

    let _ = hb_cancel_tx.send(());
    let _ = hb_handle.await;

    match outcome {
        Ok(result) => {
            tracing::info!(
                worker_id,
                job_id = %job.job_id,
                outcome = ?result,
                elapsed_s = start.elapsed().as_secs_f64(),
                "Job settled"
            );
        }
        Err(e) => {
            tracing::warn!(
                worker_id,
                job_id = %job.job_id,
                error_type = e.error_type.as_db_str(),
                error = %e.message,
                "Job failed"
            );

            match queue.fail(job.job_id, e.error_type, &e.message).await {
                Ok(FailOutcome::Requeued { failure_count }) => {
                    tracing::info!(job_id = %job.job_id, failure_count, "Job requeued");
                }
                Ok(FailOutcome::DeadLettered { failure_count }) => {
                    tracing::error!(job_id = %job.job_id, failure_count, "Job dead-lettered");
                    // Retries exhausted: the enqueue-time reservation is
                    // released without counting as processed.
                    if let Some(publisher_id) = job.publisher_id {
                        if let Err(release_err) =
                            store.release_blog_slot(publisher_id, false).await
                        {
                            tracing::error!(
                                job_id = %job.job_id,
                                publisher_id = %publisher_id,
                                error = %release_err,
                                "Failed to release slot for dead-lettered job"
                            );
                        }
                    }
                }
                Err(fail_err) => {
                    // Lease may have been reclaimed from under us.
                    tracing::error!(
                        job_id = %job.job_id,
                        error = %fail_err,
                        "Failed to record job failure"
                    );
                }
            }
        }
    }

    metrics::gauge!("worker.pool.active").decrement(1.0);
}

/// Reclaim jobs from dead workers; release slots for jobs the reclaim
/// dead-lettered.
async fn reclaim_stale_leases(queue: &JobQueue, store: &PublisherStore, stale_lease: Duration) {
    match queue.reclaim_stale(Utc::now(), stale_lease).await {
        Ok(reclaimed) => {
            for job in reclaimed {
                if job.status == JobStatus::Failed {
                    if let Some(publisher_id) = job.publisher_id {
                        if let Err(e) = store.release_blog_slot(publisher_id, false).await {
                            tracing::error!(
                                job_id = %job.job_id,
                                publisher_id = %publisher_id,
                                error = %e,
                                "Failed to release slot for reclaimed job"
                            );
                        }
                    }
                }
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "Stale lease reclaim failed");
        }
    }
}

/// Independent heartbeat task — runs until cancelled or ownership is lost.
async fn heartbeat_task(
    queue: JobQueue,
    job_id: askpage_common::ids::JobId,
    worker_id: String,
    interval: Duration,
    cancel: tokio::sync::oneshot::Receiver<()>,
) {
    let mut cancel = cancel;

    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {
                match queue.heartbeat(job_id, &worker_id).await {
                    Ok(true) => {}
                    Ok(false) => {
                        tracing::warn!(
                            job_id = %job_id,
                            worker_id = %worker_id,
                            "Lease no longer owned, stopping heartbeat"
                        );
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(job_id = %job_id, error = %e, "Failed to refresh heartbeat");
                    }
                }
            }
            _ = &mut cancel => {
                break;
            }
        }
    }
}
