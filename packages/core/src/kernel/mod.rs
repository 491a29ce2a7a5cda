//! Kernel module - infrastructure shared by every pipeline.

pub mod asr;
pub mod browser;
pub mod events;
pub mod jobs;
pub mod store;

pub use asr::{AsrClient, AsrResult};
pub use events::{CoreEvent, EventBus, EventEnvelope};
pub use store::{MemoryStore, RedisStore, Store};
