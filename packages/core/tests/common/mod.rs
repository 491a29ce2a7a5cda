//! Shared test harness: in-memory store and queue construction.

use std::sync::Arc;
use std::time::Duration;

use shelfmark_core::kernel::jobs::{Queue, QueueOptions, Retention};
use shelfmark_core::kernel::store::{MemoryStore, Store};

pub fn memory_store() -> Arc<dyn Store> {
    Arc::new(MemoryStore::new())
}

/// A queue with fast backoff suitable for tests.
pub fn test_queue(name: &str, store: Arc<dyn Store>) -> Queue {
    Queue::new(
        name,
        store,
        QueueOptions {
            attempts: 3,
            backoff_base: Duration::from_millis(10),
            remove_on_complete: Retention::KEEP_ALL,
            remove_on_fail: Retention::KEEP_ALL,
        },
    )
}
