//! yt-dlp invocation: metadata lookup and the actual download.

use crate::engine::process::{run_tool, Stream};
use crate::engine::{JobControl, JobReporter};
use crate::model::MediaInfo;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tokio::sync::mpsc;

/// Best video plus best audio, falling back to the best single file.
pub const FORMAT_SELECTOR: &str = "bestvideo+bestaudio/best";
pub const MERGE_FORMAT: &str = "mp4";

/// One parsed `[download]` progress line.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadProgress {
    pub percent: f64,
    pub speed: Option<String>,
    pub eta: Option<String>,
}

/// `-J` lookup with the same format and merge settings as the download, so the reported
/// `ext` is the container the download ends up in.
pub fn metadata_args(url: &str) -> Vec<String> {
    vec![
        "-J".into(),
        "--no-playlist".into(),
        "--no-warnings".into(),
        "-f".into(),
        FORMAT_SELECTOR.into(),
        "--merge-output-format".into(),
        MERGE_FORMAT.into(),
        "--".into(),
        url.into(),
    ]
}

pub fn download_args(url: &str, template: &str) -> Vec<String> {
    vec![
        "-f".into(),
        FORMAT_SELECTOR.into(),
        "--merge-output-format".into(),
        MERGE_FORMAT.into(),
        "--no-playlist".into(),
        "--newline".into(),
        "--progress".into(),
        "--no-simulate".into(),
        "--print".into(),
        "after_move:filepath".into(),
        "-o".into(),
        template.into(),
        "--".into(),
        url.into(),
    ]
}

/// Parse the `-J` document printed by yt-dlp.
pub fn parse_metadata(json: &str) -> Result<MediaInfo> {
    serde_json::from_str(json.trim()).context("yt-dlp returned malformed metadata")
}

/// Parse lines like `[download]  42.3% of ~ 10.00MiB at  1.23MiB/s ETA 00:05`.
pub fn parse_progress(line: &str) -> Option<DownloadProgress> {
    let rest = line.trim_start().strip_prefix("[download]")?;
    let mut tokens = rest.split_whitespace();
    let percent = tokens
        .next()?
        .strip_suffix('%')?
        .parse::<f64>()
        .ok()?
        .clamp(0.0, 100.0);

    let mut speed = None;
    let mut eta = None;
    while let Some(tok) = tokens.next() {
        match tok {
            "at" => speed = tokens.next().map(str::to_string),
            "ETA" => eta = tokens.next().map(str::to_string),
            _ => {}
        }
    }
    Some(DownloadProgress {
        percent,
        speed: speed.filter(|s| !s.starts_with("Unknown")),
        eta: eta.filter(|s| !s.starts_with("Unknown")),
    })
}

/// The last printed `after_move:filepath` line, i.e. the final file on disk.
pub fn final_path_from_lines(lines: &[String]) -> Option<PathBuf> {
    lines
        .iter()
        .rev()
        .map(|l| l.trim().trim_matches('"'))
        .find(|l| !l.is_empty() && !l.starts_with('['))
        .map(|l| PathBuf::from(l.strip_prefix("\\\\?\\").unwrap_or(l)))
}

pub async fn fetch_metadata(
    ytdlp: &Path,
    url: &str,
    control: &mut mpsc::UnboundedReceiver<JobControl>,
) -> Result<MediaInfo> {
    let mut cmd = Command::new(ytdlp);
    cmd.args(metadata_args(url));
    let run = run_tool(cmd, control, |_, _| {}).await?;
    run.ensure_success()?;
    parse_metadata(&run.stdout_lines.join("\n"))
}

/// Download `url` into `template` and return the file yt-dlp produced.
pub async fn download(
    ytdlp: &Path,
    url: &str,
    template: &str,
    reporter: &JobReporter,
    control: &mut mpsc::UnboundedReceiver<JobControl>,
) -> Result<PathBuf> {
    let mut cmd = Command::new(ytdlp);
    cmd.args(download_args(url, template));

    let mut last_whole = -1i64;
    let run = run_tool(cmd, control, |stream, line| {
        if let Some(p) = parse_progress(line) {
            // yt-dlp prints several lines per percent; forward one per whole percent.
            let whole = p.percent.floor() as i64;
            if whole != last_whole {
                last_whole = whole;
                reporter.progress(&p);
            }
        } else if stream == Stream::Stderr && line.starts_with("ERROR") {
            reporter.status(line.to_string());
        }
    })
    .await?;
    run.ensure_success()?;

    Ok(final_path_from_lines(&run.stdout_lines)
        .unwrap_or_else(|| PathBuf::from(template.replace("%(ext)s", MERGE_FORMAT))))
}
