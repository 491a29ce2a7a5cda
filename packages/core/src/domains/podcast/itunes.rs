//! iTunes Lookup API client.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use tracing::debug;

const LOOKUP_URL: &str = "https://itunes.apple.com/lookup";
const LOOKUP_LIMIT: u32 = 200;

/// Podcast-level facts from the lookup response.
#[derive(Debug, Clone, Deserialize)]
pub struct PodcastInfo {
    #[serde(rename = "collectionName")]
    pub collection_name: String,
    #[serde(rename = "artistName", default)]
    pub artist_name: Option<String>,
    #[serde(rename = "primaryGenreName", default)]
    pub genre: Option<String>,
    #[serde(rename = "feedUrl", default)]
    pub feed_url: Option<String>,
}

/// Episode-level facts from the lookup response.
#[derive(Debug, Clone, Deserialize)]
pub struct EpisodeInfo {
    #[serde(rename = "trackId")]
    pub track_id: u64,
    #[serde(rename = "trackName")]
    pub track_name: String,
    #[serde(rename = "episodeUrl", default)]
    pub episode_url: Option<String>,
    #[serde(rename = "trackTimeMillis", default)]
    pub track_time_millis: Option<u64>,
    #[serde(rename = "releaseDate", default)]
    pub release_date: Option<String>,
    #[serde(rename = "episodeGuid", default)]
    pub episode_guid: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    results: Vec<serde_json::Value>,
}

/// Combined lookup result for one episode.
#[derive(Debug, Clone)]
pub struct PodcastLookup {
    pub podcast: PodcastInfo,
    pub episode: EpisodeInfo,
}

/// Client for the iTunes Lookup API.
#[derive(Debug, Clone)]
pub struct ItunesClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl ItunesClient {
    pub fn new() -> Result<Self> {
        Self::with_base_url(LOOKUP_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("failed to create iTunes HTTP client")?;
        Ok(Self {
            http_client,
            base_url: base_url.into(),
        })
    }

    /// Look up a podcast and locate one episode by its track id.
    ///
    /// The API returns the podcast record followed by up to `limit`
    /// episodes; an episode missing from the first batch is an error the
    /// caller can surface directly.
    pub async fn lookup_episode(&self, podcast_id: u64, episode_id: u64) -> Result<PodcastLookup> {
        let response = self
            .http_client
            .get(&self.base_url)
            .query(&[
                ("id", podcast_id.to_string()),
                ("media", "podcast".to_string()),
                ("entity", "podcastEpisode".to_string()),
                ("limit", LOOKUP_LIMIT.to_string()),
            ])
            .send()
            .await
            .context("iTunes lookup request failed")?;

        if !response.status().is_success() {
            anyhow::bail!("iTunes lookup returned HTTP {}", response.status());
        }

        let parsed: LookupResponse = response.json().await.context("invalid iTunes JSON")?;
        debug!(records = parsed.results.len(), "iTunes lookup response");
        find_episode(&parsed.results, podcast_id, episode_id)
    }
}

fn find_episode(
    results: &[serde_json::Value],
    podcast_id: u64,
    episode_id: u64,
) -> Result<PodcastLookup> {
    let mut podcast: Option<PodcastInfo> = None;
    let mut episode: Option<EpisodeInfo> = None;

    for record in results {
        let is_episode =
            record.get("wrapperType").and_then(|w| w.as_str()) == Some("podcastEpisode");
        if is_episode {
            if let Ok(ep) = serde_json::from_value::<EpisodeInfo>(record.clone()) {
                if ep.track_id == episode_id {
                    episode = Some(ep);
                }
            }
        } else if podcast.is_none() && record.get("collectionName").is_some() {
            // The single podcast record arrives as wrapperType "track" with
            // kind "podcast".
            podcast = serde_json::from_value(record.clone()).ok();
        }
    }

    let podcast = podcast
        .ok_or_else(|| anyhow!("iTunes lookup for podcast {podcast_id} returned no podcast record"))?;
    let episode = episode.ok_or_else(|| {
        anyhow!(
            "episode {episode_id} not found in the first {LOOKUP_LIMIT} episodes of podcast {podcast_id} \
             ({}); older episodes are beyond the lookup window",
            podcast.collection_name
        )
    })?;

    Ok(PodcastLookup { podcast, episode })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_results() -> Vec<serde_json::Value> {
        vec![
            json!({
                "wrapperType": "track",
                "kind": "podcast",
                "collectionName": "Deep Questions",
                "artistName": "Cal",
                "primaryGenreName": "Education",
                "feedUrl": "https://feeds.example.com/deep.xml"
            }),
            json!({
                "wrapperType": "podcastEpisode",
                "trackId": 11,
                "trackName": "Episode One",
                "episodeUrl": "https://cdn.example.com/ep1.mp3",
                "trackTimeMillis": 120000,
                "releaseDate": "2024-02-01T10:00:00Z"
            }),
            json!({
                "wrapperType": "podcastEpisode",
                "trackId": 12,
                "trackName": "Episode Two",
                "episodeUrl": "https://cdn.example.com/ep2.mp3"
            }),
        ]
    }

    #[test]
    fn episode_is_located_by_track_id() {
        let lookup = find_episode(&sample_results(), 1, 12).unwrap();
        assert_eq!(lookup.episode.track_name, "Episode Two");
        assert_eq!(lookup.podcast.collection_name, "Deep Questions");
        assert_eq!(
            lookup.podcast.feed_url.as_deref(),
            Some("https://feeds.example.com/deep.xml")
        );
    }

    #[test]
    fn missing_episode_is_a_descriptive_error() {
        let err = find_episode(&sample_results(), 1, 999).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("999"));
        assert!(msg.contains("Deep Questions"));
    }

    #[test]
    fn missing_podcast_record_errors() {
        let only_episode = vec![json!({
            "wrapperType": "podcastEpisode",
            "trackId": 11,
            "trackName": "Orphan"
        })];
        assert!(find_episode(&only_episode, 1, 11).is_err());
    }
}
