//! Terminal-failure log, keyed by ISO week.
//!
//! Conversion failures that exhausted their retries are recorded here (and
//! their last PDF lands under `DATA_DIR/debug/{jobId}.pdf`) so the browsing
//! surface can list and prune them.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::week::{week_id, week_of};
use crate::kernel::jobs::{classify, FailureKind};
use crate::kernel::store::Store;

/// One recorded terminal failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureRecord {
    pub job_id: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_url: Option<String>,
    pub failure_reason: String,
    pub failed_at: DateTime<Utc>,
}

impl FailureRecord {
    pub fn kind(&self) -> FailureKind {
        classify(&self.failure_reason).0
    }

    pub fn is_bot_detected(&self) -> bool {
        self.kind() == FailureKind::BotDetected
    }
}

/// Store-backed failure log.
#[derive(Clone)]
pub struct FailureLog {
    store: Arc<dyn Store>,
}

impl FailureLog {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    fn key(year: i32, week: u32) -> String {
        format!("failures:{}", week_id(year, week))
    }

    pub async fn record(&self, record: &FailureRecord) -> Result<()> {
        let (year, week) = week_of(record.failed_at);
        self.store
            .hset(
                &Self::key(year, week),
                &record.job_id,
                &serde_json::to_string(record)?,
            )
            .await?;
        debug!(job_id = %record.job_id, reason = %record.failure_reason, "failure recorded");
        Ok(())
    }

    pub async fn list_week(&self, year: i32, week: u32) -> Result<Vec<FailureRecord>> {
        let mut records: Vec<FailureRecord> = self
            .store
            .hgetall(&Self::key(year, week))
            .await?
            .into_iter()
            .filter_map(|(_, json)| serde_json::from_str(&json).ok())
            .collect();
        records.sort_by(|a, b| b.failed_at.cmp(&a.failed_at));
        Ok(records)
    }

    /// Delete failure records by job id, plus their debug artifacts.
    pub async fn delete(&self, job_ids: &[String], debug_dir: &Path) -> Result<usize> {
        let keys = self.store.keys_with_prefix("failures:").await?;
        let mut deleted = 0;
        for job_id in job_ids {
            for key in &keys {
                if self.store.hget(key, job_id).await?.is_some() {
                    self.store.hdel(key, job_id).await?;
                    deleted += 1;
                }
            }
            let debug_pdf = debug_dir.join(format!("{job_id}.pdf"));
            match tokio::fs::remove_file(&debug_pdf).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(path = %debug_pdf.display(), error = %e, "failed to remove debug artifact")
                }
            }
        }
        Ok(deleted)
    }
}
