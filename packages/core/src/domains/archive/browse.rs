//! Weekly-bin browsing surface used by external collaborators.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use super::pdf_store::extract_subject;
use super::week::parse_week_id;

/// One weekly bin.
#[derive(Debug, Clone, Serialize)]
pub struct WeekSummary {
    pub year: i32,
    pub week: u32,
    pub path: PathBuf,
    pub file_count: usize,
}

/// One archived file.
#[derive(Debug, Clone, Serialize)]
pub struct FileEntry {
    pub name: String,
    /// Path relative to the data directory.
    pub path: String,
    pub size: u64,
    pub modified: DateTime<Utc>,
    /// Media type directory the file lives in (`pdfs`, `videos`, ...).
    pub media_type: String,
    /// Source URL recovered from PDF metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    /// Sibling files sharing the basename (podcast PDF + audio).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub related_files: Vec<String>,
}

/// Read-side view over the weekly bins.
#[derive(Debug, Clone)]
pub struct Library {
    data_dir: PathBuf,
}

impl Library {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn media_dir(&self) -> PathBuf {
        self.data_dir.join("media")
    }

    /// All weekly bins, newest first.
    pub async fn list_weeks(&self) -> Result<Vec<WeekSummary>> {
        let media_dir = self.media_dir();
        let mut weeks = Vec::new();

        let mut entries = match tokio::fs::read_dir(&media_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(weeks),
            Err(e) => return Err(e).context("failed to read media directory"),
        };

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            let Some((year, week)) = parse_week_id(&name) else {
                continue;
            };
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let file_count = count_files(&entry.path()).await;
            weeks.push(WeekSummary {
                year,
                week,
                path: entry.path(),
                file_count,
            });
        }

        weeks.sort_by(|a, b| (b.year, b.week).cmp(&(a.year, a.week)));
        Ok(weeks)
    }

    /// Files inside one weekly bin, grouped info included.
    pub async fn list_files(&self, week_id: &str) -> Result<Vec<FileEntry>> {
        let (year, week) = parse_week_id(week_id)
            .with_context(|| format!("invalid week id: {week_id}"))?;
        let week_dir = self.media_dir().join(super::week::week_id(year, week));

        let mut files = Vec::new();
        let mut type_dirs = match tokio::fs::read_dir(&week_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(files),
            Err(e) => return Err(e).context("failed to read week directory"),
        };

        while let Some(type_dir) = type_dirs.next_entry().await? {
            if !type_dir.file_type().await?.is_dir() {
                continue;
            }
            let media_type = type_dir.file_name().to_string_lossy().to_string();

            // First pass: names for sibling resolution.
            let mut names = Vec::new();
            let mut inner = tokio::fs::read_dir(type_dir.path()).await?;
            while let Some(file) = inner.next_entry().await? {
                if file.file_type().await?.is_file() {
                    names.push(file.file_name().to_string_lossy().to_string());
                }
            }

            for name in &names {
                let path = type_dir.path().join(name);
                let meta = match tokio::fs::metadata(&path).await {
                    Ok(meta) => meta,
                    Err(_) => continue,
                };

                let stem = Path::new(name)
                    .file_stem()
                    .map(|s| s.to_string_lossy().to_string())
                    .unwrap_or_default();
                let related_files = names
                    .iter()
                    .filter(|other| {
                        *other != name
                            && Path::new(other.as_str())
                                .file_stem()
                                .map(|s| s.to_string_lossy() == stem)
                                .unwrap_or(false)
                    })
                    .cloned()
                    .collect();

                let source_url = if name.ends_with(".pdf") {
                    extract_subject(&path).unwrap_or_else(|e| {
                        warn!(path = %path.display(), error = %e, "failed to read PDF subject");
                        None
                    })
                } else {
                    None
                };

                files.push(FileEntry {
                    name: name.clone(),
                    path: path
                        .strip_prefix(&self.data_dir)
                        .unwrap_or(&path)
                        .to_string_lossy()
                        .to_string(),
                    size: meta.len(),
                    modified: meta.modified().map(DateTime::<Utc>::from).unwrap_or_else(|_| Utc::now()),
                    media_type: media_type.clone(),
                    source_url,
                    related_files,
                });
            }
        }

        files.sort_by(|a, b| b.modified.cmp(&a.modified));
        Ok(files)
    }

    /// Delete files by data-dir-relative path.
    ///
    /// Paths resolving outside the data directory are rejected before any
    /// filesystem access: traversal is fatal at this boundary.
    pub async fn delete_files(&self, rel_paths: &[String]) -> Result<usize> {
        let root = self
            .data_dir
            .canonicalize()
            .context("data directory does not exist")?;

        // Validate everything first so a bad entry rejects the whole batch.
        let mut resolved = Vec::with_capacity(rel_paths.len());
        for rel in rel_paths {
            let candidate = self.data_dir.join(rel);
            let abs = candidate
                .canonicalize()
                .with_context(|| format!("no such file: {rel}"))?;
            if !abs.starts_with(&root) {
                anyhow::bail!("path escapes the data directory: {rel}");
            }
            resolved.push(abs);
        }

        let mut deleted = 0;
        for path in resolved {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => deleted += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e).context(format!("failed to delete {}", path.display())),
            }
        }
        Ok(deleted)
    }
}

async fn count_files(week_dir: &Path) -> usize {
    let mut count = 0;
    let Ok(mut type_dirs) = tokio::fs::read_dir(week_dir).await else {
        return 0;
    };
    while let Ok(Some(type_dir)) = type_dirs.next_entry().await {
        let Ok(mut files) = tokio::fs::read_dir(type_dir.path()).await else {
            continue;
        };
        while let Ok(Some(file)) = files.next_entry().await {
            if file.file_type().await.map(|t| t.is_file()).unwrap_or(false) {
                count += 1;
            }
        }
    }
    count
}
