//! Text summary builder for CLI output.
//!
//! Formats human-readable lines for `--text` and `--info` modes.

use crate::engine::tools::ToolStatus;
use crate::model::{JobRecord, MediaInfo};

/// Pre-formatted lines for text output.
pub(crate) struct TextSummary {
    pub lines: Vec<String>,
}

fn format_duration(secs: f64) -> String {
    let total = secs.round() as u64;
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{h}:{m:02}:{s:02}")
    } else {
        format!("{m}:{s:02}")
    }
}

/// Lines describing an extractor metadata lookup.
pub(crate) fn build_metadata_summary(info: &MediaInfo) -> TextSummary {
    let mut lines = vec![format!("Title: {}", info.display_title())];
    lines.push(format!("Uploader: {}", info.uploader_name().unwrap_or("-")));
    if let Some(id) = info.video_id() {
        lines.push(format!("Id: {id}"));
    }
    if let Some(h) = info.known_height() {
        lines.push(format!("Height: {h}p"));
    }
    if let Some(d) = info.duration.filter(|d| *d > 0.0) {
        lines.push(format!("Duration: {}", format_duration(d)));
    }
    if let Some(ext) = info.ext.as_deref() {
        lines.push(format!("Extension: {ext}"));
    }
    if let Some(url) = info.webpage_url.as_deref() {
        lines.push(format!("Page: {url}"));
    }
    TextSummary { lines }
}

/// One block per finished job.
pub(crate) fn build_job_summary(records: &[JobRecord]) -> TextSummary {
    let mut lines = Vec::new();
    for r in records {
        let status = if r.ok { "OK" } else { "FAILED" };
        lines.push(format!(
            "[{status}] {} {} ({})",
            r.kind,
            r.source,
            humantime::format_duration(std::time::Duration::from_secs(r.elapsed.as_secs()))
        ));
        lines.push(format!("  {}", r.message));
        if let Some(out) = r.output.as_ref() {
            lines.push(format!("  Output: {}", out.display()));
        }
    }
    TextSummary { lines }
}

/// `--check-tools` table.
pub(crate) fn build_tools_summary(tools: &[ToolStatus]) -> TextSummary {
    let lines = tools
        .iter()
        .map(|t| match (&t.path, &t.version) {
            (Some(p), Some(v)) => format!("{:<8} {}  ({v})", t.name, p.display()),
            (Some(p), None) => format!("{:<8} {}  (version unknown)", t.name, p.display()),
            _ => format!("{:<8} not found", t.name),
        })
        .collect();
    TextSummary { lines }
}
