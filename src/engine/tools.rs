use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Locations of the external tools the workers shell out to.
#[derive(Debug, Clone, Default)]
pub struct ToolPaths {
    pub ytdlp: Option<PathBuf>,
    pub ffmpeg: Option<PathBuf>,
    pub ffprobe: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolStatus {
    pub name: String,
    pub available: bool,
    pub path: Option<PathBuf>,
    pub version: Option<String>,
}

/// Prefer an explicit path when it points at a file, otherwise search `PATH`.
fn resolve_binary(custom: Option<&Path>, name: &str) -> Option<PathBuf> {
    if let Some(path) = custom {
        if path.is_file() {
            return Some(path.to_path_buf());
        }
        tracing::warn!(tool = name, path = %path.display(), "custom tool path is not a file, searching PATH");
    }
    which::which(name).ok()
}

impl ToolPaths {
    pub fn resolve(ytdlp: Option<&Path>, ffmpeg: Option<&Path>, ffprobe: Option<&Path>) -> Self {
        Self {
            ytdlp: resolve_binary(ytdlp, "yt-dlp"),
            ffmpeg: resolve_binary(ffmpeg, "ffmpeg"),
            ffprobe: resolve_binary(ffprobe, "ffprobe"),
        }
    }

    pub fn require_ytdlp(&self) -> Result<&Path> {
        self.ytdlp
            .as_deref()
            .context("yt-dlp not found on PATH (use --ytdlp-path)")
    }

    pub fn require_ffmpeg(&self) -> Result<&Path> {
        self.ffmpeg
            .as_deref()
            .context("ffmpeg not found on PATH (use --ffmpeg-path)")
    }

    pub async fn inspect(&self) -> Vec<ToolStatus> {
        vec![
            inspect_tool("yt-dlp", self.ytdlp.as_deref(), "--version").await,
            inspect_tool("ffmpeg", self.ffmpeg.as_deref(), "-version").await,
            inspect_tool("ffprobe", self.ffprobe.as_deref(), "-version").await,
        ]
    }
}

async fn run_version(binary: &Path, arg: &str) -> Option<String> {
    let output = Command::new(binary)
        .arg(arg)
        .kill_on_drop(true)
        .output()
        .await
        .ok()?;
    if !output.status.success() {
        return None;
    }
    first_non_empty_line(&String::from_utf8_lossy(&output.stdout))
}

fn first_non_empty_line(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}

async fn inspect_tool(name: &str, path: Option<&Path>, version_arg: &str) -> ToolStatus {
    let version = match path {
        Some(p) => run_version(p, version_arg).await,
        None => None,
    };
    ToolStatus {
        name: name.to_string(),
        available: version.is_some(),
        path: path.map(Path::to_path_buf),
        version,
    }
}
