//! Job history on disk: one JSON file per finished job.

use crate::model::JobRecord;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

const APP_DIR: &str = "socialclip";

fn base_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

pub fn history_dir() -> PathBuf {
    base_dir().join("history")
}

/// Where the TUI writes its tracing output.
pub fn log_dir() -> PathBuf {
    base_dir().join("logs")
}

fn record_file_name(r: &JobRecord) -> String {
    let stamp: String = r
        .timestamp_utc
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    format!("job-{stamp}-{}.json", r.id)
}

pub fn save_record(r: &JobRecord) -> Result<PathBuf> {
    save_record_in(&history_dir(), r)
}

pub fn save_record_in(dir: &Path, r: &JobRecord) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    let path = dir.join(record_file_name(r));
    let data = serde_json::to_vec_pretty(r)?;
    std::fs::write(&path, data).with_context(|| format!("write {}", path.display()))?;
    Ok(path)
}

pub fn load_recent(limit: usize) -> Result<Vec<JobRecord>> {
    load_recent_in(&history_dir(), limit)
}

/// Newest first. Unreadable or foreign files are skipped.
pub fn load_recent_in(dir: &Path, limit: usize) -> Result<Vec<JobRecord>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut records = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("read {}", dir.display()))? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let Ok(bytes) = std::fs::read(&path) else {
            continue;
        };
        match serde_json::from_slice::<JobRecord>(&bytes) {
            Ok(r) => records.push(r),
            Err(e) => tracing::debug!(path = %path.display(), "skipping history file: {e}"),
        }
    }
    records.sort_by(|a, b| b.timestamp_utc.cmp(&a.timestamp_utc));
    records.truncate(limit);
    Ok(records)
}

pub fn delete_record(r: &JobRecord) -> Result<()> {
    delete_record_in(&history_dir(), r)
}

pub fn delete_record_in(dir: &Path, r: &JobRecord) -> Result<()> {
    let path = dir.join(record_file_name(r));
    std::fs::remove_file(&path).with_context(|| format!("delete {}", path.display()))
}

pub fn export_json(path: &Path, r: &JobRecord) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    let data = serde_json::to_vec_pretty(r)?;
    std::fs::write(path, data).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}
