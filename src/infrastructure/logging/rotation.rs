//! Retention for rolled log files.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use std::path::Path;
use tracing::{debug, info};

use super::logger::LOG_FILE_PREFIX;

/// Delete rolled log files in `log_dir` last modified more than
/// `retention_days` ago. Returns the number of files removed.
pub async fn prune_old_logs(log_dir: &Path, retention_days: u32) -> Result<usize> {
    if !tokio::fs::try_exists(log_dir).await.unwrap_or(false) {
        return Ok(0);
    }

    let cutoff = Utc::now() - Duration::days(i64::from(retention_days));
    let mut removed = 0;
    let mut entries = tokio::fs::read_dir(log_dir)
        .await
        .context("failed to read log directory")?;

    while let Some(entry) = entries.next_entry().await.context("failed to read directory entry")? {
        let path = entry.path();
        let is_log = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(LOG_FILE_PREFIX));
        if !is_log {
            continue;
        }

        let modified: DateTime<Utc> = entry
            .metadata()
            .await
            .and_then(|m| m.modified())
            .context("failed to get file modification time")?
            .into();
        if modified < cutoff {
            tokio::fs::remove_file(&path)
                .await
                .context("failed to delete old log file")?;
            debug!(path = %path.display(), "deleted old log file");
            removed += 1;
        }
    }

    if removed > 0 {
        info!(count = removed, "pruned old log files");
    }
    Ok(removed)
}
