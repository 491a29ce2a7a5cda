//! Weekly-bin PDF persistence with embedded metadata.
//!
//! Every saved PDF carries its source URL in the `Subject` metadata field,
//! so a rerun can recover the URL long after the queue records were pruned.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use lopdf::{Document, Object};
use tracing::{debug, warn};

use super::week::bin_path;
use crate::common::urls::{basename_from_url, sanitize_filename};
use crate::domains::ingest::MediaType;

const MAX_BASENAME_LEN: usize = 100;

/// Options for one save.
#[derive(Debug, Clone, Default)]
pub struct SaveOptions {
    pub title: Option<String>,
    pub bookmarked_at: Option<DateTime<Utc>>,
    /// Social capture that fell back to the original long-form article.
    pub direct_article: bool,
}

/// Weekly-bin PDF store rooted at the data directory.
#[derive(Debug, Clone)]
pub struct PdfStore {
    data_dir: PathBuf,
}

impl PdfStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Persist PDF bytes for `original_url` into its weekly bin.
    ///
    /// Embeds `Subject = original_url` and a capture `Producer` marker,
    /// derives the filename from the URL (or the title for non-descriptive
    /// paths), and returns the absolute path.
    pub async fn save_pdf(
        &self,
        bytes: &[u8],
        original_url: &str,
        opts: &SaveOptions,
    ) -> Result<PathBuf> {
        let stamped = embed_metadata(bytes, original_url).unwrap_or_else(|e| {
            warn!(url = %original_url, error = %e, "metadata embedding failed, saving as-is");
            bytes.to_vec()
        });

        let when = opts.bookmarked_at.unwrap_or_else(Utc::now);
        let dir = bin_path(&self.data_dir, when, MediaType::Pdf);
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("failed to create {}", dir.display()))?;

        let mut base = basename_from_url(original_url, opts.title.as_deref());
        // Social status captures name what they actually contain.
        if base.contains("-status-") {
            let replacement = if opts.direct_article { "-article-" } else { "-post-" };
            base = base.replace("-status-", replacement);
        }
        let filename = format!("{}.pdf", sanitize_filename(&base, MAX_BASENAME_LEN));

        let path = dir.join(filename);
        tokio::fs::write(&path, &stamped)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;

        debug!(path = %path.display(), bytes = stamped.len(), "PDF saved");
        Ok(absolute(&path))
    }

    /// Delete `old_path` unless it resolves to the same file as `new_path`.
    ///
    /// Called only after a successful save; a vanished old file is fine,
    /// permission problems are logged and swallowed.
    pub async fn delete_if_different(&self, old_path: &Path, new_path: &Path) {
        let old_abs = absolute(old_path);
        let new_abs = absolute(new_path);
        if old_abs == new_abs {
            return;
        }
        match tokio::fs::remove_file(&old_abs).await {
            Ok(()) => debug!(path = %old_abs.display(), "stale artifact removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %old_abs.display(), error = %e, "failed to remove stale artifact")
            }
        }
    }
}

fn absolute(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(path))
                .unwrap_or_else(|_| path.to_path_buf())
        }
    })
}

/// Set `Subject` (source URL) and `Producer` (capture marker) in the PDF
/// Info dictionary.
pub fn embed_metadata(bytes: &[u8], subject_url: &str) -> Result<Vec<u8>> {
    let mut doc = Document::load_mem(bytes).context("failed to parse PDF")?;

    let mut info = existing_info(&doc).unwrap_or_default();
    info.set("Subject", Object::string_literal(subject_url));
    info.set(
        "Producer",
        Object::string_literal(format!(
            "shelfmark capture {}",
            Utc::now().format("%Y-%m-%dT%H:%M:%SZ")
        )),
    );
    let info_id = doc.add_object(Object::Dictionary(info));
    doc.trailer.set("Info", Object::Reference(info_id));

    let mut out = Vec::new();
    doc.save_to(&mut out).context("failed to serialize PDF")?;
    Ok(out)
}

fn existing_info(doc: &Document) -> Option<lopdf::Dictionary> {
    let obj = doc.trailer.get(b"Info").ok()?;
    let dict = match obj {
        Object::Reference(id) => doc.get_object(*id).ok()?.as_dict().ok()?,
        Object::Dictionary(dict) => dict,
        _ => return None,
    };
    Some(dict.clone())
}

/// Read the `Subject` metadata (the source URL) back out of a PDF file.
pub fn extract_subject(path: &Path) -> Result<Option<String>> {
    let doc = Document::load(path).with_context(|| format!("failed to load {}", path.display()))?;
    Ok(subject_of(&doc))
}

/// Read `Subject` from in-memory PDF bytes.
pub fn extract_subject_mem(bytes: &[u8]) -> Result<Option<String>> {
    let doc = Document::load_mem(bytes).context("failed to parse PDF")?;
    Ok(subject_of(&doc))
}

fn subject_of(doc: &Document) -> Option<String> {
    let info = existing_info(doc)?;
    let raw = match info.get(b"Subject").ok()? {
        Object::String(bytes, _) => bytes.clone(),
        _ => return None,
    };
    Some(decode_pdf_string(&raw))
}

/// PDF text strings are either UTF-16BE with a BOM or PDFDocEncoding
/// (Latin-1 superset); URLs written by this store are plain ASCII.
fn decode_pdf_string(raw: &[u8]) -> String {
    if raw.len() >= 2 && raw[0] == 0xFE && raw[1] == 0xFF {
        let utf16: Vec<u16> = raw[2..]
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();
        String::from_utf16_lossy(&utf16)
    } else {
        raw.iter().map(|&b| b as char).collect()
    }
}
