//! Job infrastructure: durable named queues with retry, backoff, scheduled
//! and recurring jobs, bounded retention of terminal records, and workers.
//!
//! # Architecture
//!
//! ```text
//! caller.add(name, payload, opts)
//!     │
//!     └─► Queue ─► Store (wait list / delayed zset / job records)
//!
//! Worker (per queue, concurrency N)
//!     │
//!     ├─► promote due delayed jobs, run scheduler ticks
//!     ├─► claim jobs from the wait list
//!     ├─► JobHandler::run(ActiveJob)
//!     └─► complete / retry-with-backoff / terminal failure
//! ```
//!
//! Domain pipelines (conversion, media, podcast, feed polling) each own a
//! queue and a handler; this module only provides the substrate.

pub mod failure;
mod job;
mod queue;
mod scheduler;
mod worker;

pub use failure::{classify, FailureKind};
pub use job::{JobOptions, JobPriority, JobRecord, JobState, QueueOptions, Retention};
pub use queue::{FailOutcome, Queue};
pub use scheduler::SchedulerSpec;
pub use worker::{ActiveJob, JobHandler, Worker, WorkerConfig};
