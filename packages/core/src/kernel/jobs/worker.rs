//! Queue worker service.
//!
//! A worker polls one queue: promotes due delayed jobs, runs scheduler
//! ticks, claims up to `concurrency` jobs, and executes them through a
//! [`JobHandler`]. Handler success completes the job; a handler error feeds
//! the queue's retry policy. On shutdown the worker stops claiming and
//! drains in-flight handlers to completion.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::queue::{FailOutcome, Queue};
use super::JobRecord;

/// Configuration for a queue worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Number of jobs executed concurrently.
    pub concurrency: usize,
    /// Sleep between polls when the queue is empty.
    pub poll_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            poll_interval: Duration::from_millis(500),
        }
    }
}

impl WorkerConfig {
    pub fn with_concurrency(concurrency: usize) -> Self {
        Self {
            concurrency,
            ..Default::default()
        }
    }
}

/// A claimed job handed to a handler, with progress reporting.
pub struct ActiveJob {
    pub record: JobRecord,
    queue: Queue,
}

impl ActiveJob {
    pub fn id(&self) -> &str {
        &self.record.id
    }

    /// Deserialize the job payload.
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.record.data.clone())
            .map_err(|e| anyhow::anyhow!("invalid payload for job {}: {e}", self.record.id))
    }

    /// Whether this execution is the job's last attempt.
    pub fn is_final_attempt(&self) -> bool {
        self.record.is_final_attempt()
    }

    /// Report handler progress (0..=100). Best-effort.
    pub async fn progress(&self, pct: u8) {
        if let Err(e) = self.queue.update_progress(&self.record.id, pct).await {
            warn!(job_id = %self.record.id, error = %e, "failed to update progress");
        }
    }
}

/// Handler for jobs of one queue.
///
/// Returning `Ok(value)` completes the job with `value` as its return value.
/// Returning `Err` triggers retry-or-terminal per the queue policy; the
/// error message becomes the stored `failed_reason` and should carry the
/// `"{kind}: {message}"` wire format.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn run(&self, job: &ActiveJob) -> Result<Value>;

    /// Called once per terminal failure, after the queue recorded it.
    async fn on_terminal_failure(&self, _job: &ActiveJob, _reason: &str) {}
}

/// Long-running worker for a single queue.
pub struct Worker {
    queue: Queue,
    handler: Arc<dyn JobHandler>,
    config: WorkerConfig,
}

impl Worker {
    pub fn new(queue: Queue, handler: Arc<dyn JobHandler>, config: WorkerConfig) -> Self {
        Self {
            queue,
            handler,
            config,
        }
    }

    /// Run until `shutdown` fires, then drain in-flight jobs.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            queue = %self.queue.name(),
            concurrency = self.config.concurrency,
            "worker starting"
        );

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            if let Err(e) = self.queue.promote_due().await {
                error!(queue = %self.queue.name(), error = %e, "failed to promote delayed jobs");
            }
            if let Err(e) = self.queue.run_due_schedulers().await {
                error!(queue = %self.queue.name(), error = %e, "failed to run schedulers");
            }

            let mut batch = Vec::new();
            for _ in 0..self.config.concurrency {
                match self.queue.claim_next().await {
                    Ok(Some(record)) => batch.push(record),
                    Ok(None) => break,
                    Err(e) => {
                        error!(queue = %self.queue.name(), error = %e, "failed to claim job");
                        break;
                    }
                }
            }

            if batch.is_empty() {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(self.config.poll_interval) => {}
                }
                continue;
            }

            debug!(queue = %self.queue.name(), count = batch.len(), "claimed jobs");

            // In-flight jobs always run to completion, even across shutdown.
            let mut handles = Vec::with_capacity(batch.len());
            for record in batch {
                handles.push(self.process_job(record));
            }
            futures::future::join_all(handles).await;
        }

        info!(queue = %self.queue.name(), "worker stopped");
    }

    async fn process_job(&self, record: JobRecord) {
        let job_id = record.id.clone();
        let job_name = record.name.clone();
        let job = ActiveJob {
            record,
            queue: self.queue.clone(),
        };

        match self.handler.run(&job).await {
            Ok(value) => {
                debug!(queue = %self.queue.name(), job_id = %job_id, job_name = %job_name, "job succeeded");
                let mut record = job.record.clone();
                if let Err(e) = self.queue.complete_job(&mut record, value).await {
                    error!(job_id = %job_id, error = %e, "failed to mark job complete");
                }
            }
            Err(e) => {
                let reason = format!("{e:#}");
                warn!(
                    queue = %self.queue.name(),
                    job_id = %job_id,
                    job_name = %job_name,
                    error = %reason,
                    "job failed"
                );
                let mut record = job.record.clone();
                match self.queue.fail_job(&mut record, &reason).await {
                    Ok(FailOutcome::Terminal) => {
                        self.handler.on_terminal_failure(&job, &reason).await;
                    }
                    Ok(FailOutcome::Retry { .. }) => {}
                    Err(e) => {
                        error!(job_id = %job_id, error = %e, "failed to mark job failed");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::jobs::job::{JobOptions, JobState, QueueOptions, Retention};
    use crate::kernel::store::MemoryStore;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyHandler {
        calls: AtomicU32,
        fail_first: u32,
    }

    #[async_trait]
    impl JobHandler for FlakyHandler {
        async fn run(&self, _job: &ActiveJob) -> Result<Value> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.fail_first {
                anyhow::bail!("timeout: attempt {call} failed");
            }
            Ok(json!({"ok": call}))
        }
    }

    fn test_queue(attempts: u32) -> Queue {
        Queue::new(
            "worker-test",
            Arc::new(MemoryStore::new()),
            QueueOptions {
                attempts,
                backoff_base: Duration::from_millis(5),
                remove_on_complete: Retention::KEEP_ALL,
                remove_on_fail: Retention::KEEP_ALL,
            },
        )
    }

    #[tokio::test]
    async fn worker_retries_then_completes() {
        let queue = test_queue(3);
        queue
            .add("work", json!({}), JobOptions::with_id("j"))
            .await
            .unwrap();

        let handler = Arc::new(FlakyHandler {
            calls: AtomicU32::new(0),
            fail_first: 2,
        });
        let worker = Worker::new(
            queue.clone(),
            handler.clone(),
            WorkerConfig {
                concurrency: 1,
                poll_interval: Duration::from_millis(5),
            },
        );

        let shutdown = CancellationToken::new();
        let run = tokio::spawn(worker.run(shutdown.clone()));

        // Wait for the job to finish (two failures with backoff, then success).
        for _ in 0..200 {
            if queue.get_state("j").await.unwrap() == Some(JobState::Complete) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        shutdown.cancel();
        run.await.unwrap();

        let job = queue.get_job("j").await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Complete);
        assert_eq!(job.attempts_made, 3);
        assert_eq!(job.return_value.unwrap()["ok"], 3);
    }

    #[tokio::test]
    async fn worker_marks_terminal_after_budget() {
        let queue = test_queue(2);
        queue
            .add("work", json!({}), JobOptions::with_id("j"))
            .await
            .unwrap();

        let handler = Arc::new(FlakyHandler {
            calls: AtomicU32::new(0),
            fail_first: 99,
        });
        let worker = Worker::new(
            queue.clone(),
            handler,
            WorkerConfig {
                concurrency: 1,
                poll_interval: Duration::from_millis(5),
            },
        );

        let shutdown = CancellationToken::new();
        let run = tokio::spawn(worker.run(shutdown.clone()));

        for _ in 0..200 {
            if queue.get_state("j").await.unwrap() == Some(JobState::Failed) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        shutdown.cancel();
        run.await.unwrap();

        let job = queue.get_job("j").await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.attempts_made, 2);
        assert!(job.failed_reason.unwrap().starts_with("timeout:"));
    }
}
