//! Bookmark ingestion: feed polling, deduplication, enrichment, routing.

pub mod dedup;
pub mod enrich;
pub mod feeds;
pub mod item;
pub mod poller;
pub mod router;

pub use dedup::{DedupIndex, UrlProvenance};
pub use enrich::{extract_from_html, MetadataExtractor, PageMetadata};
pub use feeds::{bearer_token_from_url, FeedCache, FeedFetcher, PollFetch};
pub use item::{BookmarkItem, Enclosure, FeedSource, MediaType};
pub use poller::{FeedEndpoints, PollHandler, PollJob};
pub use router::{is_podcast_url, is_video_only_url, media_job_id, RouteHandler};
