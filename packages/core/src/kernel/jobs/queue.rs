//! Store-backed named job queue.
//!
//! Layout per queue `{q}`:
//! - `queue:{q}:job:{id}` — serialized [`JobRecord`]
//! - `queue:{q}:wait` — FIFO of queued job ids
//! - `queue:{q}:delayed` — zset of job ids scored by due time (ms)
//! - `queue:{q}:completed` / `queue:{q}:failed` — terminal ids scored by
//!   finish time, pruned per the queue's retention policy
//! - `queue:{q}:schedulers` — hash of scheduler id → [`SchedulerSpec`]
//! - `queue:{q}:scheduler-due` — zset of scheduler ids scored by next tick

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::job::{
    new_job_id, JobOptions, JobPriority, JobRecord, JobState, QueueOptions, Retention,
};
use super::scheduler::SchedulerSpec;
use crate::kernel::store::Store;

/// Outcome of marking a job failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOutcome {
    /// Re-queued with backoff; `delay_ms` until the next attempt.
    Retry { delay_ms: i64 },
    /// Retry budget exhausted; the failure is terminal.
    Terminal,
}

/// A named durable queue over a [`Store`].
#[derive(Clone)]
pub struct Queue {
    name: String,
    store: Arc<dyn Store>,
    opts: QueueOptions,
}

impl Queue {
    pub fn new(name: impl Into<String>, store: Arc<dyn Store>, opts: QueueOptions) -> Self {
        Self {
            name: name.into(),
            store,
            opts,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> &QueueOptions {
        &self.opts
    }

    fn job_key(&self, id: &str) -> String {
        format!("queue:{}:job:{}", self.name, id)
    }

    fn wait_key(&self) -> String {
        format!("queue:{}:wait", self.name)
    }

    fn delayed_key(&self) -> String {
        format!("queue:{}:delayed", self.name)
    }

    fn completed_key(&self) -> String {
        format!("queue:{}:completed", self.name)
    }

    fn failed_key(&self) -> String {
        format!("queue:{}:failed", self.name)
    }

    fn schedulers_key(&self) -> String {
        format!("queue:{}:schedulers", self.name)
    }

    fn scheduler_due_key(&self) -> String {
        format!("queue:{}:scheduler-due", self.name)
    }

    // ------------------------------------------------------------------
    // Records
    // ------------------------------------------------------------------

    pub(crate) async fn save_record(&self, record: &JobRecord) -> Result<()> {
        let json = serde_json::to_string(record).context("failed to serialize job record")?;
        self.store.set(&self.job_key(&record.id), &json).await
    }

    pub async fn get_job(&self, id: &str) -> Result<Option<JobRecord>> {
        match self.store.get(&self.job_key(id)).await? {
            Some(json) => {
                let record = serde_json::from_str(&json)
                    .with_context(|| format!("corrupt job record {id}"))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    pub async fn get_state(&self, id: &str) -> Result<Option<JobState>> {
        Ok(self.get_job(id).await?.map(|j| j.state))
    }

    /// Add a job. Returns the job id.
    ///
    /// When `opts.job_id` names an existing non-terminal job the call is a
    /// dedup no-op; an existing terminal record is replaced (this is how
    /// reruns resubmit work under the same deterministic id).
    pub async fn add(&self, name: &str, data: Value, opts: JobOptions) -> Result<String> {
        let id = opts.job_id.clone().unwrap_or_else(new_job_id);

        if let Some(existing) = self.get_job(&id).await? {
            if !existing.state.is_terminal() {
                debug!(queue = %self.name, job_id = %id, "duplicate add ignored");
                return Ok(id);
            }
            // Replacing a terminal record: drop it from the terminal zsets.
            self.store.zrem(&self.completed_key(), &id).await?;
            self.store.zrem(&self.failed_key(), &id).await?;
        }

        let record = JobRecord::new(id.clone(), name, data, self.opts.attempts);
        self.save_record(&record).await?;

        match opts.delay {
            Some(delay) => {
                let due = Utc::now().timestamp_millis() + delay.as_millis() as i64;
                self.store.zadd(&self.delayed_key(), &id, due as f64).await?;
            }
            None => match opts.priority {
                JobPriority::High => self.store.lpush(&self.wait_key(), &id).await?,
                JobPriority::Normal => self.store.rpush(&self.wait_key(), &id).await?,
            },
        }

        debug!(queue = %self.name, job_id = %id, job_name = %name, "job added");
        Ok(id)
    }

    pub async fn remove(&self, id: &str) -> Result<()> {
        self.store.lrem(&self.wait_key(), id).await?;
        self.store.zrem(&self.delayed_key(), id).await?;
        self.store.zrem(&self.completed_key(), id).await?;
        self.store.zrem(&self.failed_key(), id).await?;
        self.store.del(&self.job_key(id)).await?;
        Ok(())
    }

    pub async fn get_completed(&self) -> Result<Vec<JobRecord>> {
        self.terminal_records(&self.completed_key()).await
    }

    pub async fn get_failed(&self) -> Result<Vec<JobRecord>> {
        self.terminal_records(&self.failed_key()).await
    }

    async fn terminal_records(&self, key: &str) -> Result<Vec<JobRecord>> {
        let ids = self.store.zrange(key, 0, -1).await?;
        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(record) = self.get_job(&id).await? {
                records.push(record);
            }
        }
        Ok(records)
    }

    pub async fn update_progress(&self, id: &str, progress: u8) -> Result<()> {
        if let Some(mut record) = self.get_job(id).await? {
            record.progress = progress.min(100);
            self.save_record(&record).await?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Worker-side lifecycle
    // ------------------------------------------------------------------

    /// Move delayed jobs whose due time has passed into the wait list.
    pub async fn promote_due(&self) -> Result<usize> {
        let now = Utc::now().timestamp_millis() as f64;
        let due = self.store.zrange_by_score(&self.delayed_key(), now, 64).await?;
        let count = due.len();
        for id in due {
            self.store.zrem(&self.delayed_key(), &id).await?;
            self.store.rpush(&self.wait_key(), &id).await?;
        }
        Ok(count)
    }

    /// Pop the next waiting job and mark it processing.
    pub async fn claim_next(&self) -> Result<Option<JobRecord>> {
        loop {
            let Some(id) = self.store.lpop(&self.wait_key()).await? else {
                return Ok(None);
            };
            let Some(mut record) = self.get_job(&id).await? else {
                // Record pruned while waiting; skip the orphaned id.
                warn!(queue = %self.name, job_id = %id, "waiting job has no record, skipping");
                continue;
            };
            record.state = JobState::Processing;
            record.attempts_made += 1;
            record.failed_reason = None;
            self.save_record(&record).await?;
            return Ok(Some(record));
        }
    }

    pub async fn complete_job(&self, record: &mut JobRecord, return_value: Value) -> Result<()> {
        record.state = JobState::Complete;
        record.progress = 100;
        record.return_value = Some(return_value);
        record.finished_on = Some(Utc::now());
        self.save_record(record).await?;

        let score = record.finished_on.unwrap().timestamp_millis() as f64;
        self.store.zadd(&self.completed_key(), &record.id, score).await?;
        self.prune(&self.completed_key(), self.opts.remove_on_complete)
            .await?;
        Ok(())
    }

    /// Record a failure; re-queues with backoff while attempts remain.
    pub async fn fail_job(&self, record: &mut JobRecord, reason: &str) -> Result<FailOutcome> {
        record.failed_reason = Some(reason.to_string());

        if record.attempts_made < record.max_attempts {
            let delay = self.opts.backoff_delay(record.attempts_made);
            let due = Utc::now().timestamp_millis() + delay.as_millis() as i64;
            record.state = JobState::Queued;
            self.save_record(record).await?;
            self.store
                .zadd(&self.delayed_key(), &record.id, due as f64)
                .await?;
            info!(
                queue = %self.name,
                job_id = %record.id,
                attempt = record.attempts_made,
                max_attempts = record.max_attempts,
                delay_ms = delay.as_millis() as i64,
                "job failed, retry scheduled"
            );
            return Ok(FailOutcome::Retry {
                delay_ms: delay.as_millis() as i64,
            });
        }

        record.state = JobState::Failed;
        record.finished_on = Some(Utc::now());
        self.save_record(record).await?;
        let score = record.finished_on.unwrap().timestamp_millis() as f64;
        self.store.zadd(&self.failed_key(), &record.id, score).await?;
        self.prune(&self.failed_key(), self.opts.remove_on_fail).await?;
        Ok(FailOutcome::Terminal)
    }

    async fn prune(&self, key: &str, retention: Retention) -> Result<()> {
        if let Some(max_age) = retention.max_age {
            let cutoff = (Utc::now().timestamp_millis() - max_age.as_millis() as i64) as f64;
            let expired = self.store.zrange_by_score(key, cutoff, 256).await?;
            for id in expired {
                self.store.zrem(key, &id).await?;
                self.store.del(&self.job_key(&id)).await?;
            }
        }
        if let Some(max_count) = retention.max_count {
            let count = self.store.zcard(key).await?;
            if count > max_count {
                let excess = (count - max_count) as isize;
                let oldest = self.store.zrange(key, 0, excess - 1).await?;
                for id in oldest {
                    self.store.zrem(key, &id).await?;
                    self.store.del(&self.job_key(&id)).await?;
                }
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Schedulers
    // ------------------------------------------------------------------

    /// Create or replace a recurring job producer.
    pub async fn upsert_scheduler(&self, id: &str, spec: SchedulerSpec) -> Result<()> {
        let next = spec.next_tick(Utc::now());
        let json = serde_json::to_string(&spec)?;
        self.store.hset(&self.schedulers_key(), id, &json).await?;
        self.store
            .zadd(&self.scheduler_due_key(), id, next.timestamp_millis() as f64)
            .await?;
        info!(
            queue = %self.name,
            scheduler = %id,
            every_ms = spec.every_ms,
            next_tick = %next,
            "scheduler upserted"
        );
        Ok(())
    }

    pub async fn remove_scheduler(&self, id: &str) -> Result<()> {
        self.store.hdel(&self.schedulers_key(), id).await?;
        self.store.zrem(&self.scheduler_due_key(), id).await?;
        Ok(())
    }

    /// Enqueue jobs for every scheduler whose tick has arrived.
    ///
    /// Produced job ids are `{scheduler_id}:{tick_ms}`, so a tick enqueued
    /// twice (e.g. around a crash) dedupes to a single job.
    pub async fn run_due_schedulers(&self) -> Result<usize> {
        let now = Utc::now();
        let due = self
            .store
            .zrange_by_score(&self.scheduler_due_key(), now.timestamp_millis() as f64, 32)
            .await?;

        let mut produced = 0;
        for id in due {
            let Some(json) = self.store.hget(&self.schedulers_key(), &id).await? else {
                self.store.zrem(&self.scheduler_due_key(), &id).await?;
                continue;
            };
            let spec: SchedulerSpec = serde_json::from_str(&json)
                .with_context(|| format!("corrupt scheduler spec {id}"))?;

            let tick_ms = self
                .store
                .zscore(&self.scheduler_due_key(), &id)
                .await?
                .unwrap_or(now.timestamp_millis() as f64) as i64;

            self.add(
                &spec.job_name,
                spec.template.clone(),
                JobOptions::with_id(format!("{id}:{tick_ms}")),
            )
            .await?;
            produced += 1;

            let next = spec.next_tick(now);
            self.store
                .zadd(&self.scheduler_due_key(), &id, next.timestamp_millis() as f64)
                .await?;
        }
        Ok(produced)
    }

    /// Number of jobs waiting (not delayed, not in flight).
    pub async fn waiting_count(&self) -> Result<usize> {
        self.store.llen(&self.wait_key()).await
    }
}
