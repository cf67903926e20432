//! Utility functions for the curator
//!
//! Common helper functions used throughout the crate.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::db::MODEL_VERSION;

/// Prefix shared by every staging directory under the database root
pub const STAGING_PREFIX: &str = "tmp-v";

/// Generate a time-ordered UUID (v7)
pub fn generate_uuid() -> uuid::Uuid {
    uuid::Uuid::now_v7()
}

/// Name prefix for a staging directory used for `purpose`
pub fn staging_prefix(purpose: &str) -> String {
    format!("{}{}-{}-", STAGING_PREFIX, MODEL_VERSION, purpose)
}

/// Unique staging path under `root`; nothing is created
pub fn staging_dir_path(root: &Path, purpose: &str) -> PathBuf {
    root.join(format!("{}{}", staging_prefix(purpose), generate_uuid().simple()))
}

/// Create a fresh, uniquely named staging directory under `root`
pub async fn create_staging_dir(root: &Path, purpose: &str) -> std::io::Result<PathBuf> {
    let dir = staging_dir_path(root, purpose);
    tokio::fs::create_dir(&dir).await?;
    Ok(dir)
}

/// Whether `path` names a staging directory rather than an artifact
pub fn is_staging_dir(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.starts_with(STAGING_PREFIX))
        .unwrap_or(false)
}

/// Format a duration by its largest whole unit ("5 days", "1 hour")
pub fn format_duration_short(duration: &Duration) -> String {
    const MINUTE: u64 = 60;
    const HOUR: u64 = 60 * MINUTE;
    const DAY: u64 = 24 * HOUR;

    let secs = duration.as_secs();
    let (value, unit) = if secs >= DAY {
        (secs / DAY, "day")
    } else if secs >= HOUR {
        (secs / HOUR, "hour")
    } else if secs >= MINUTE {
        (secs / MINUTE, "minute")
    } else if secs > 0 {
        (secs, "second")
    } else {
        (duration.subsec_millis() as u64, "millisecond")
    };

    if value == 1 {
        format!("{} {}", value, unit)
    } else {
        format!("{} {}s", value, unit)
    }
}

/// Format file size for display
pub fn format_file_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
