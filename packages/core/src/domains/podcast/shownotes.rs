//! Show-notes extraction from the podcast's RSS feed.
//!
//! The episode is matched by title (case-insensitive, trimmed) or GUID; the
//! HTML description yields a plain-text summary and the list of links.

use std::time::Duration;

use anyhow::{Context, Result};
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One link from the show notes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NoteLink {
    pub text: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Parsed show notes for one episode.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShowNotes {
    pub summary: String,
    pub links: Vec<NoteLink>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub footer: Option<String>,
}

/// Fetch the podcast feed and extract this episode's show notes.
///
/// Show notes are best-effort: any failure returns empty notes rather than
/// blocking the transcription pipeline.
pub async fn fetch_show_notes(
    feed_url: &str,
    episode_title: &str,
    episode_guid: Option<&str>,
) -> ShowNotes {
    match try_fetch(feed_url, episode_title, episode_guid).await {
        Ok(notes) => notes,
        Err(e) => {
            debug!(feed = %feed_url, error = %e, "show notes unavailable");
            ShowNotes::default()
        }
    }
}

async fn try_fetch(
    feed_url: &str,
    episode_title: &str,
    episode_guid: Option<&str>,
) -> Result<ShowNotes> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .context("failed to create feed client")?;
    let bytes = client
        .get(feed_url)
        .send()
        .await
        .context("feed request failed")?
        .bytes()
        .await
        .context("failed to read feed body")?;

    let feed = feed_rs::parser::parse(&bytes[..]).context("failed to parse podcast feed")?;
    let wanted = episode_title.trim().to_lowercase();

    let entry = feed
        .entries
        .iter()
        .find(|entry| {
            let title_match = entry
                .title
                .as_ref()
                .map(|t| t.content.trim().to_lowercase() == wanted)
                .unwrap_or(false);
            let guid_match = episode_guid.map(|g| entry.id == g).unwrap_or(false);
            title_match || guid_match
        })
        .context("episode not found in podcast feed")?;

    let html = entry
        .content
        .as_ref()
        .and_then(|c| c.body.clone())
        .or_else(|| entry.summary.as_ref().map(|s| s.content.clone()))
        .unwrap_or_default();

    Ok(parse_notes_html(&html))
}

/// Turn a show-notes HTML description into summary text + links.
pub fn parse_notes_html(html: &str) -> ShowNotes {
    let document = Html::parse_fragment(html);

    let mut links = Vec::new();
    if let Ok(selector) = Selector::parse("a[href]") {
        for a in document.select(&selector) {
            let Some(href) = a.value().attr("href") else {
                continue;
            };
            if !href.starts_with("http") {
                continue;
            }
            let text = a.text().collect::<String>().trim().to_string();
            links.push(NoteLink {
                text: if text.is_empty() {
                    href.to_string()
                } else {
                    text
                },
                url: href.to_string(),
                source: url::Url::parse(href)
                    .ok()
                    .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_string())),
            });
        }
    }

    let text = document
        .root_element()
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    // A short closing line (credits, subscribe blurb) becomes the footer.
    let (summary, footer) = match text.rsplit_once(". ") {
        Some((body, tail)) if tail.len() < 120 && body.len() > 200 => {
            (format!("{body}."), Some(tail.trim().to_string()))
        }
        _ => (text, None),
    };

    ShowNotes {
        summary,
        links,
        footer: footer.filter(|f| !f.is_empty()),
    }
}

/// Brand names from the note links, used as spelling hints for the
/// reformatter.
pub fn brand_names(notes: &ShowNotes) -> Vec<String> {
    let mut names: Vec<String> = notes
        .links
        .iter()
        .filter_map(|l| l.source.clone())
        .map(|host| host.split('.').next().unwrap_or(&host).to_string())
        .filter(|n| n.len() > 2)
        .collect();
    names.sort();
    names.dedup();
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn links_and_summary_are_extracted() {
        let html = r#"<p>We discuss archiving with <a href="https://www.example.com/tool">Example Tool</a>
            and the <a href="https://museum.org/visit">museum</a>.</p>"#;
        let notes = parse_notes_html(html);
        assert_eq!(notes.links.len(), 2);
        assert_eq!(notes.links[0].text, "Example Tool");
        assert_eq!(notes.links[0].source.as_deref(), Some("example.com"));
        assert!(notes.summary.contains("We discuss archiving"));
    }

    #[test]
    fn relative_links_are_skipped() {
        let notes = parse_notes_html(r#"<a href="/local">x</a><a href="https://a.com/b">y</a>"#);
        assert_eq!(notes.links.len(), 1);
        assert_eq!(notes.links[0].url, "https://a.com/b");
    }

    #[test]
    fn empty_anchor_text_falls_back_to_href() {
        let notes = parse_notes_html(r#"<a href="https://a.com/b"></a>"#);
        assert_eq!(notes.links[0].text, "https://a.com/b");
    }

    #[test]
    fn brand_names_come_from_link_hosts() {
        let notes = ShowNotes {
            summary: String::new(),
            links: vec![
                NoteLink {
                    text: "x".into(),
                    url: "https://athleticgreens.com/offer".into(),
                    source: Some("athleticgreens.com".into()),
                },
                NoteLink {
                    text: "y".into(),
                    url: "https://squarespace.com".into(),
                    source: Some("squarespace.com".into()),
                },
            ],
            footer: None,
        };
        assert_eq!(brand_names(&notes), vec!["athleticgreens", "squarespace"]);
    }
}
