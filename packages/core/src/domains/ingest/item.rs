//! Bookmark feed entities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of artifact an item ultimately becomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Video,
    Transcript,
    Podcast,
    Pdf,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Video => "video",
            MediaType::Transcript => "transcript",
            MediaType::Podcast => "podcast",
            MediaType::Pdf => "pdf",
        }
    }

    /// Directory name inside a weekly bin.
    pub fn plural(&self) -> &'static str {
        match self {
            MediaType::Video => "videos",
            MediaType::Transcript => "transcripts",
            MediaType::Podcast => "podcasts",
            MediaType::Pdf => "pdfs",
        }
    }
}

/// Configured bookmark feed sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedSource {
    /// RSS feed with occasional PDF enclosures (meeting transcripts).
    Pocketfeed,
    /// Paginated JSON bookmark API with Bearer auth.
    Reader,
}

impl FeedSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedSource::Pocketfeed => "pocketfeed",
            FeedSource::Reader => "reader",
        }
    }

    pub const ALL: [FeedSource; 2] = [FeedSource::Pocketfeed, FeedSource::Reader];
}

impl std::fmt::Display for FeedSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A file attachment carried by a feed item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Enclosure {
    pub url: String,
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u64>,
}

/// One feed entry.
///
/// `canonical_url` is always the canonicalizer applied to `original_url`;
/// the pair travels together because dedup keys off the canonical form
/// while external links need the URL as received.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookmarkItem {
    pub original_url: String,
    pub canonical_url: String,
    pub guid: String,
    pub source: FeedSource,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bookmarked_at: Option<DateTime<Utc>>,

    // Enrichment, filled by the metadata stage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enclosure: Option<Enclosure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<MediaType>,
}

impl BookmarkItem {
    pub fn new(
        original_url: impl Into<String>,
        canonical_url: impl Into<String>,
        guid: impl Into<String>,
        source: FeedSource,
    ) -> Self {
        Self {
            original_url: original_url.into(),
            canonical_url: canonical_url.into(),
            guid: guid.into(),
            source,
            title: None,
            creator: None,
            bookmarked_at: None,
            author: None,
            description: None,
            image: None,
            publisher: None,
            published_at: None,
            enclosure: None,
            media_type: None,
        }
    }
}
