//! In-process event bus.
//!
//! Every pipeline stage publishes a [`CoreEvent`]; external collaborators
//! (notifier, dashboards) subscribe at startup. Delivery is best-effort and
//! at-most-once: a slow subscriber lags, a panicking subscriber only kills
//! its own task.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 1024;

/// Structured events emitted by the core pipelines.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CoreEvent {
    FeedPolled {
        source: String,
        new_items: usize,
        not_modified: bool,
    },
    ConversionStarted {
        job_id: String,
        url: String,
    },
    ConversionProgress {
        job_id: String,
        url: String,
        progress: u8,
    },
    ConversionCompleted {
        job_id: String,
        url: String,
        pdf_path: String,
        pdf_size: u64,
        quality_score: Option<i32>,
        quality_reasoning: Option<String>,
        duration_ms: u64,
    },
    /// Emitted once, when the retry budget is exhausted.
    ConversionFailed {
        job_id: String,
        url: String,
        failure_reason: String,
        attempts_made: u32,
        max_attempts: u32,
    },
    MediaSaved {
        job_id: String,
        url: String,
        path: String,
        media_type: String,
        bytes: u64,
    },
    MediaFailed {
        job_id: String,
        url: String,
        failure_reason: String,
    },
    PodcastStage {
        job_id: String,
        url: String,
        stage: String,
    },
    PodcastCompleted {
        job_id: String,
        url: String,
        pdf_path: String,
        audio_path: String,
        duration_ms: u64,
    },
    PodcastFailed {
        job_id: String,
        url: String,
        failure_reason: String,
    },
}

impl CoreEvent {
    /// Timestamped envelope for subscribers that persist events.
    pub fn envelope(self) -> EventEnvelope {
        EventEnvelope {
            at: Utc::now(),
            event: self,
        }
    }
}

/// An event plus the time it was emitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub at: DateTime<Utc>,
    pub event: CoreEvent,
}

/// Broadcast bus for [`CoreEvent`]s.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EventEnvelope>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all subscribers (fire-and-forget).
    ///
    /// Returns the number of receivers that got the event; zero when nobody
    /// is subscribed, which is not an error.
    pub fn emit(&self, event: CoreEvent) -> usize {
        self.sender.send(event.envelope()).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}
