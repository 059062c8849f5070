//! Append-only JSONL archive for bootcamp cohort requests.
//!
//! The archive is the fallback channel when SMTP delivery fails: every
//! request is appended here first, one JSON object per line, so a rejected
//! email never loses the submission. Setting `BOOTCAMP_REQUEST_ARCHIVE` to
//! an empty string disables archiving entirely.

use std::path::{Path, PathBuf};

use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::io::AsyncWriteExt;

use crate::config::AppConfig;

/// File-backed archive of inbound cohort requests.
#[derive(Debug, Clone)]
pub struct RequestArchive {
    path: Option<PathBuf>,
}

impl RequestArchive {
    pub fn from_config(config: &AppConfig) -> Self {
        let raw = config.bootcamp_request_archive.trim();
        if raw.is_empty() {
            Self { path: None }
        } else {
            Self {
                path: Some(PathBuf::from(raw)),
            }
        }
    }

    pub fn disabled() -> Self {
        Self { path: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.path.is_some()
    }

    /// Appends one request to the archive, returning whether it was recorded.
    ///
    /// Failures are logged rather than propagated; the caller only needs to
    /// know whether this channel captured the payload.
    pub async fn append(&self, payload: &Value) -> bool {
        let Some(path) = &self.path else {
            return false;
        };

        match self.write_entry(path, payload).await {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "bootcamp request archived");
                true
            }
            Err(err) => {
                tracing::error!(path = %path.display(), error = %err, "failed to archive bootcamp request");
                false
            }
        }
    }

    async fn write_entry(&self, path: &Path, payload: &Value) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let entry = serde_json::json!({
            "received_at": OffsetDateTime::now_utc().format(&Rfc3339)?,
            "payload": payload,
        });
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}
