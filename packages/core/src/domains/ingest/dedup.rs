//! Two-level deduplication: per-source GUID sets and a global canonical-URL
//! set with provenance.
//!
//! Marks are sticky: once a GUID is seen for a source it is never processed
//! again by that source, even if the downstream enqueue was lost. Consumers
//! needing stronger guarantees rely on downstream idempotency.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::item::FeedSource;
use crate::kernel::store::Store;

/// Where and when a canonical URL was first seen.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrlProvenance {
    pub source: FeedSource,
    pub first_seen_at: DateTime<Utc>,
}

/// Store-backed dedup index.
#[derive(Clone)]
pub struct DedupIndex {
    store: Arc<dyn Store>,
}

impl DedupIndex {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    fn guids_key(source: FeedSource) -> String {
        format!("feed:guids:{}", source)
    }

    fn provenance_key(canonical_url: &str) -> String {
        format!("bookmark:{canonical_url}")
    }

    const SEEN_URLS_KEY: &'static str = "bookmarks:seen-urls";

    pub async fn is_guid_seen(&self, source: FeedSource, guid: &str) -> Result<bool> {
        self.store.sismember(&Self::guids_key(source), guid).await
    }

    pub async fn mark_guid_seen(&self, source: FeedSource, guid: &str) -> Result<()> {
        self.store.sadd(&Self::guids_key(source), guid).await?;
        Ok(())
    }

    pub async fn is_url_seen(&self, canonical_url: &str) -> Result<bool> {
        self.store.sismember(Self::SEEN_URLS_KEY, canonical_url).await
    }

    /// Mark a canonical URL seen, recording provenance on first sight.
    pub async fn mark_url_seen(&self, canonical_url: &str, source: FeedSource) -> Result<()> {
        let newly_added = self.store.sadd(Self::SEEN_URLS_KEY, canonical_url).await?;
        if newly_added {
            let provenance = UrlProvenance {
                source,
                first_seen_at: Utc::now(),
            };
            self.store
                .set(
                    &Self::provenance_key(canonical_url),
                    &serde_json::to_string(&provenance)?,
                )
                .await?;
        }
        Ok(())
    }

    pub async fn url_provenance(&self, canonical_url: &str) -> Result<Option<UrlProvenance>> {
        match self.store.get(&Self::provenance_key(canonical_url)).await? {
            Some(json) => Ok(serde_json::from_str(&json).ok()),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::store::MemoryStore;

    fn index() -> DedupIndex {
        DedupIndex::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn guid_marks_are_per_source() {
        let dedup = index();
        dedup
            .mark_guid_seen(FeedSource::Pocketfeed, "g1")
            .await
            .unwrap();
        assert!(dedup.is_guid_seen(FeedSource::Pocketfeed, "g1").await.unwrap());
        assert!(!dedup.is_guid_seen(FeedSource::Reader, "g1").await.unwrap());
    }

    #[tokio::test]
    async fn url_marks_are_global() {
        let dedup = index();
        dedup
            .mark_url_seen("https://example.com/x", FeedSource::Pocketfeed)
            .await
            .unwrap();
        assert!(dedup.is_url_seen("https://example.com/x").await.unwrap());

        let prov = dedup
            .url_provenance("https://example.com/x")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(prov.source, FeedSource::Pocketfeed);
    }

    #[tokio::test]
    async fn second_mark_keeps_first_provenance() {
        let dedup = index();
        dedup
            .mark_url_seen("https://example.com/x", FeedSource::Pocketfeed)
            .await
            .unwrap();
        dedup
            .mark_url_seen("https://example.com/x", FeedSource::Reader)
            .await
            .unwrap();
        let prov = dedup
            .url_provenance("https://example.com/x")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(prov.source, FeedSource::Pocketfeed);
    }
}
