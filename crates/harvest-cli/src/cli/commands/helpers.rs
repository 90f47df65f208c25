//! Helper utilities for CLI commands.

use std::sync::Arc;
use std::time::Duration;

use console::style;

use harvest::{CheckpointStore, Checkpoint, FsStorage, JobKey, JobStatus, Settings};

/// Open the filesystem store under the data directory.
pub fn open_storage(settings: &Settings) -> anyhow::Result<Arc<FsStorage>> {
    settings.ensure_directories().map_err(|e| {
        anyhow::anyhow!(
            "Cannot create data directory {}: {}",
            settings.data_dir.display(),
            e
        )
    })?;
    Ok(Arc::new(FsStorage::new(settings.data_dir.clone())))
}

/// Load a job's checkpoint, printing a hint if there is none.
pub async fn load_checkpoint(
    settings: &Settings,
    key: &JobKey,
) -> anyhow::Result<Option<Checkpoint>> {
    let store = CheckpointStore::new(open_storage(settings)?);
    let checkpoint = store.load_checkpoint(key).await?;
    if checkpoint.is_none() {
        println!(
            "{} No checkpoint for {} in {}",
            style("!").yellow(),
            style(key).cyan(),
            settings.data_dir.display()
        );
    }
    Ok(checkpoint)
}

/// Format a count with thousands separators.
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let bytes: Vec<_> = s.bytes().rev().collect();
    let chunks: Vec<_> = bytes
        .chunks(3)
        .map(|chunk| chunk.iter().rev().map(|&b| b as char).collect::<String>())
        .collect();
    chunks.into_iter().rev().collect::<Vec<_>>().join(",")
}

/// Format a duration as `1h 02m 03s`, `2m 03s` or `3s`.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{}h {:02}m {:02}s", h, m, s)
    } else if m > 0 {
        format!("{}m {:02}s", m, s)
    } else {
        format!("{}s", s)
    }
}

/// Status label colored by outcome.
pub fn status_label(status: JobStatus) -> String {
    let label = status.as_str();
    match status {
        JobStatus::Completed => style(label).green().to_string(),
        JobStatus::Paused => style(label).yellow().to_string(),
        JobStatus::Failed => style(label).red().to_string(),
        JobStatus::Running => style(label).cyan().to_string(),
    }
}
