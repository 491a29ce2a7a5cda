//! Job model and per-queue policy records.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Lifecycle state of a job record.
///
/// `queued → processing → {complete | failed}`; a retryable failure moves the
/// job back to `queued` (via the delayed set) until attempts are exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    #[default]
    Queued,
    Processing,
    Complete,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Complete | JobState::Failed)
    }
}

/// Priority of a job within its queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobPriority {
    High,
    #[default]
    Normal,
}

/// A single queue record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: String,

    /// Command type within the queue (e.g. "convert-url").
    pub name: String,

    /// Serialized command payload.
    pub data: Value,

    pub state: JobState,

    /// 0..=100, reported by the handler.
    pub progress: u8,

    /// Number of executions started so far (1-based while processing).
    pub attempts_made: u32,
    pub max_attempts: u32,

    /// Wire-format `"{kind}: {message}"` reason of the last failure.
    pub failed_reason: Option<String>,

    /// Handler return value, present once complete.
    pub return_value: Option<Value>,

    pub timestamp: DateTime<Utc>,
    pub finished_on: Option<DateTime<Utc>>,
}

impl JobRecord {
    pub fn new(id: String, name: &str, data: Value, max_attempts: u32) -> Self {
        Self {
            id,
            name: name.to_string(),
            data,
            state: JobState::Queued,
            progress: 0,
            attempts_made: 0,
            max_attempts,
            failed_reason: None,
            return_value: None,
            timestamp: Utc::now(),
            finished_on: None,
        }
    }

    /// Whether the current (in-flight) attempt is the last one.
    pub fn is_final_attempt(&self) -> bool {
        self.attempts_made >= self.max_attempts
    }
}

/// Options for a single `add` call.
#[derive(Debug, Clone, Default)]
pub struct JobOptions {
    /// Deterministic id doubling as a dedup key. Adding an id that already
    /// exists in a non-terminal state is a no-op.
    pub job_id: Option<String>,
    pub delay: Option<Duration>,
    pub priority: JobPriority,
}

impl JobOptions {
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            job_id: Some(id.into()),
            ..Default::default()
        }
    }
}

pub(crate) fn new_job_id() -> String {
    Uuid::new_v4().to_string()
}

/// Retention of terminal records: prune beyond `max_count` entries or past
/// `max_age`, whichever applies. Both `None` keeps records forever.
#[derive(Debug, Clone, Copy, Default)]
pub struct Retention {
    pub max_count: Option<usize>,
    pub max_age: Option<Duration>,
}

impl Retention {
    pub const KEEP_ALL: Retention = Retention {
        max_count: None,
        max_age: None,
    };

    pub fn count(max_count: usize) -> Self {
        Self {
            max_count: Some(max_count),
            max_age: None,
        }
    }

    pub fn count_and_age(max_count: usize, max_age: Duration) -> Self {
        Self {
            max_count: Some(max_count),
            max_age: Some(max_age),
        }
    }
}

/// Per-queue defaults: retry budget, backoff, retention.
#[derive(Debug, Clone)]
pub struct QueueOptions {
    /// Total attempts (1..=5).
    pub attempts: u32,
    /// Base delay for exponential backoff: `base * 2^(attempts_made - 1)`.
    pub backoff_base: Duration,
    pub remove_on_complete: Retention,
    pub remove_on_fail: Retention,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff_base: Duration::from_secs(5),
            remove_on_complete: Retention::count_and_age(100, Duration::from_secs(24 * 3600)),
            remove_on_fail: Retention::KEEP_ALL,
        }
    }
}

impl QueueOptions {
    /// Delay before the next attempt after `attempts_made` executions.
    pub fn backoff_delay(&self, attempts_made: u32) -> Duration {
        let exp = attempts_made.saturating_sub(1).min(16);
        self.backoff_base.saturating_mul(1u32 << exp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_per_attempt() {
        let opts = QueueOptions {
            backoff_base: Duration::from_secs(60),
            ..Default::default()
        };
        assert_eq!(opts.backoff_delay(1), Duration::from_secs(60));
        assert_eq!(opts.backoff_delay(2), Duration::from_secs(120));
        assert_eq!(opts.backoff_delay(3), Duration::from_secs(240));
        assert_eq!(opts.backoff_delay(4), Duration::from_secs(480));
        assert_eq!(opts.backoff_delay(5), Duration::from_secs(960));
    }

    #[test]
    fn final_attempt_detection() {
        let mut job = JobRecord::new("j1".into(), "test", serde_json::json!({}), 3);
        assert!(!job.is_final_attempt());
        job.attempts_made = 3;
        assert!(job.is_final_attempt());
    }

    #[test]
    fn terminal_states() {
        assert!(JobState::Complete.is_terminal());
        assert!(JobState::Failed.is_terminal());
        assert!(!JobState::Queued.is_terminal());
        assert!(!JobState::Processing.is_terminal());
    }

    #[test]
    fn record_serializes_snake_case_state() {
        let job = JobRecord::new("j1".into(), "test", serde_json::json!({"a": 1}), 1);
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["state"], "queued");
    }
}
