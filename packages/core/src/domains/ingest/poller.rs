//! Feed poll job handler.
//!
//! One poll tick fetches each configured source conditionally, applies the
//! two-level dedup (GUID per source, canonical URL globally), and fans new
//! items out to the metadata queue. Dedup marks happen before enqueue, so a
//! crash in between drops the item rather than duplicating it; downstream
//! idempotency covers the rest.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use super::dedup::DedupIndex;
use super::feeds::{FeedCache, FeedFetcher, PollFetch};
use super::item::{BookmarkItem, FeedSource};
use crate::kernel::events::{CoreEvent, EventBus};
use crate::kernel::jobs::{ActiveJob, JobHandler, JobOptions, Queue};
use crate::kernel::store::Store;

/// Payload of a feed-poll job; `source: None` polls every configured source.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PollJob {
    #[serde(default)]
    pub source: Option<FeedSource>,
}

/// Configured feed endpoints.
#[derive(Debug, Clone, Default)]
pub struct FeedEndpoints {
    pub pocketfeed_url: Option<String>,
    pub reader_api_url: Option<String>,
}

impl FeedEndpoints {
    pub fn url_for(&self, source: FeedSource) -> Option<&str> {
        match source {
            FeedSource::Pocketfeed => self.pocketfeed_url.as_deref(),
            FeedSource::Reader => self.reader_api_url.as_deref(),
        }
    }

    pub fn configured_sources(&self) -> Vec<FeedSource> {
        FeedSource::ALL
            .into_iter()
            .filter(|s| self.url_for(*s).is_some())
            .collect()
    }
}

/// Handler for the feed-poll queue.
pub struct PollHandler {
    store: Arc<dyn Store>,
    dedup: DedupIndex,
    fetcher: FeedFetcher,
    metadata_queue: Queue,
    endpoints: FeedEndpoints,
    bus: EventBus,
}

impl PollHandler {
    pub fn new(
        store: Arc<dyn Store>,
        metadata_queue: Queue,
        endpoints: FeedEndpoints,
        bus: EventBus,
    ) -> Result<Self> {
        Ok(Self {
            dedup: DedupIndex::new(store.clone()),
            store,
            fetcher: FeedFetcher::new()?,
            metadata_queue,
            endpoints,
            bus,
        })
    }

    /// Poll one source: conditional fetch, dedup, fan-out, cache update.
    async fn poll_source(&self, source: FeedSource) -> Result<usize> {
        let Some(feed_url) = self.endpoints.url_for(source) else {
            return Ok(0);
        };

        let cache = FeedCache::load(&self.store, source).await?;
        let outcome = self.fetcher.fetch(source, feed_url, &cache, &self.dedup).await?;

        let (items, new_cache) = match outcome {
            PollFetch::NotModified => {
                info!(source = %source, "feed not modified");
                self.bus.emit(CoreEvent::FeedPolled {
                    source: source.to_string(),
                    new_items: 0,
                    not_modified: true,
                });
                return Ok(0);
            }
            PollFetch::Items(items, new_cache) => (items, new_cache),
        };

        let mut enqueued = 0;
        for item in items {
            if self.dedup.is_guid_seen(source, &item.guid).await? {
                continue;
            }
            self.dedup.mark_guid_seen(source, &item.guid).await?;

            if self.dedup.is_url_seen(&item.canonical_url).await? {
                continue;
            }
            self.dedup.mark_url_seen(&item.canonical_url, source).await?;

            self.enqueue_metadata(&item).await?;
            enqueued += 1;
        }

        new_cache.save(&self.store, source).await?;

        info!(source = %source, new_items = enqueued, "feed polled");
        self.bus.emit(CoreEvent::FeedPolled {
            source: source.to_string(),
            new_items: enqueued,
            not_modified: false,
        });
        Ok(enqueued)
    }

    async fn enqueue_metadata(&self, item: &BookmarkItem) -> Result<()> {
        self.metadata_queue
            .add(
                "extract-metadata",
                serde_json::to_value(item)?,
                JobOptions::default(),
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl JobHandler for PollHandler {
    async fn run(&self, job: &ActiveJob) -> Result<Value> {
        let payload: PollJob = job.payload().unwrap_or_default();

        let sources = match payload.source {
            Some(source) => vec![source],
            None => self.endpoints.configured_sources(),
        };

        let mut total = 0;
        for source in sources {
            match self.poll_source(source).await {
                Ok(count) => total += count,
                Err(e) => {
                    // One broken feed must not block the others.
                    warn!(source = %source, error = %e, "feed poll failed");
                }
            }
        }

        Ok(serde_json::json!({ "new_items": total }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_report_configured_sources() {
        let endpoints = FeedEndpoints {
            pocketfeed_url: Some("https://feed.example.com/rss".into()),
            reader_api_url: None,
        };
        assert_eq!(endpoints.configured_sources(), vec![FeedSource::Pocketfeed]);
        assert!(endpoints.url_for(FeedSource::Reader).is_none());
    }

    #[test]
    fn poll_job_defaults_to_all_sources() {
        let payload: PollJob = serde_json::from_str("{}").unwrap();
        assert!(payload.source.is_none());
        let payload: PollJob = serde_json::from_str(r#"{"source": "reader"}"#).unwrap();
        assert_eq!(payload.source, Some(FeedSource::Reader));
    }
}
