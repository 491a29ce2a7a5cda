//! Podcast platform URL parsing.
//!
//! `https://podcasts.apple.com/{country}/podcast/{slug}/id{podcastId}?i={episodeId}`

use anyhow::{anyhow, Result};
use url::Url;

/// Parsed podcast episode URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodcastUrl {
    pub country: String,
    pub podcast_id: u64,
    pub episode_id: u64,
    pub slug: String,
}

pub fn parse_podcast_url(raw: &str) -> Result<PodcastUrl> {
    let url = Url::parse(raw).map_err(|e| anyhow!("invalid podcast URL {raw}: {e}"))?;

    let segments: Vec<&str> = url
        .path()
        .trim_matches('/')
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();

    // {country}/podcast/{slug}/id{podcastId}
    let (country, slug, id_segment) = match segments.as_slice() {
        [country, kind, slug, id] if *kind == "podcast" => (*country, *slug, *id),
        _ => return Err(anyhow!("unrecognized podcast URL path: {}", url.path())),
    };

    let podcast_id: u64 = id_segment
        .strip_prefix("id")
        .ok_or_else(|| anyhow!("missing id segment in {raw}"))?
        .parse()
        .map_err(|_| anyhow!("non-numeric podcast id in {raw}"))?;

    let episode_id: u64 = url
        .query_pairs()
        .find(|(k, _)| k == "i")
        .ok_or_else(|| anyhow!("missing ?i= episode id in {raw}"))?
        .1
        .parse()
        .map_err(|_| anyhow!("non-numeric episode id in {raw}"))?;

    Ok(PodcastUrl {
        country: country.to_string(),
        podcast_id,
        episode_id,
        slug: slug.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_url_parses() {
        let parsed = parse_podcast_url(
            "https://podcasts.apple.com/us/podcast/deep-questions/id1515786216?i=1000600000000",
        )
        .unwrap();
        assert_eq!(parsed.country, "us");
        assert_eq!(parsed.podcast_id, 1515786216);
        assert_eq!(parsed.episode_id, 1000600000000);
        assert_eq!(parsed.slug, "deep-questions");
    }

    #[test]
    fn trailing_slash_and_extra_params_are_fine() {
        let parsed =
            parse_podcast_url("https://podcasts.apple.com/de/podcast/x/id1/?i=10&l=en").unwrap();
        assert_eq!(parsed.podcast_id, 1);
        assert_eq!(parsed.episode_id, 10);
        assert_eq!(parsed.country, "de");
    }

    #[test]
    fn missing_episode_id_is_rejected() {
        assert!(parse_podcast_url("https://podcasts.apple.com/us/podcast/x/id1").is_err());
    }

    #[test]
    fn non_podcast_path_is_rejected() {
        assert!(parse_podcast_url("https://podcasts.apple.com/us/artist/x/id1?i=2").is_err());
    }
}
