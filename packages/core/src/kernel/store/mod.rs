//! Durable key-value store seam.
//!
//! Everything stateful (queues, dedup marks, feed caches, scheduler state)
//! goes through [`Store`], so the whole pipeline can run against
//! [`MemoryStore`] in tests and [`RedisStore`] in production.
//!
//! Key prefixes in use:
//! - `queue:{name}:*` — job records, wait list, delayed/terminal zsets
//! - `feed:cache:{source}` — conditional-polling cache (etag/last-modified)
//! - `feed:guids:{source}` — per-source seen GUIDs
//! - `bookmarks:seen-urls` — global canonical-URL set
//! - `bookmark:{canonicalUrl}` — per-URL provenance
//! - `failures:{weekId}` — terminal conversion failures per ISO week

mod memory;
mod redis_store;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

use anyhow::Result;
use async_trait::async_trait;

/// Minimal set of atomic operations the core needs from its backing store.
///
/// Mirrors the Redis data types (string, hash, set, list, sorted set). Every
/// operation is atomic on its own; multi-key flows rely on single-writer
/// discipline per job record.
#[async_trait]
pub trait Store: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
    async fn del(&self, key: &str) -> Result<()>;
    async fn exists(&self, key: &str) -> Result<bool>;
    /// All keys starting with `prefix`.
    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>>;

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>>;
    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<()>;
    async fn hdel(&self, key: &str, field: &str) -> Result<()>;
    async fn hgetall(&self, key: &str) -> Result<Vec<(String, String)>>;

    /// Returns true when the member was newly added.
    async fn sadd(&self, key: &str, member: &str) -> Result<bool>;
    async fn srem(&self, key: &str, member: &str) -> Result<()>;
    async fn sismember(&self, key: &str, member: &str) -> Result<bool>;

    async fn rpush(&self, key: &str, value: &str) -> Result<()>;
    async fn lpush(&self, key: &str, value: &str) -> Result<()>;
    async fn lpop(&self, key: &str) -> Result<Option<String>>;
    async fn llen(&self, key: &str) -> Result<usize>;
    async fn lrem(&self, key: &str, value: &str) -> Result<()>;

    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<()>;
    async fn zrem(&self, key: &str, member: &str) -> Result<()>;
    async fn zcard(&self, key: &str) -> Result<usize>;
    /// Members with score <= `max`, ascending, capped at `limit`.
    async fn zrange_by_score(&self, key: &str, max: f64, limit: usize) -> Result<Vec<String>>;
    /// Members by rank (ascending score). `stop` is inclusive; negative
    /// indices count from the end, Redis-style.
    async fn zrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>>;
    async fn zscore(&self, key: &str, member: &str) -> Result<Option<f64>>;
}
