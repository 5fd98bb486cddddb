use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// What the download worker should leave on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
pub enum DownloadOutput {
    #[value(name = "mp4")]
    Mp4,
    #[value(name = "mp3")]
    Mp3,
}

impl DownloadOutput {
    pub fn label(self) -> &'static str {
        match self {
            DownloadOutput::Mp4 => "Video (MP4)",
            DownloadOutput::Mp3 => "Audio (MP3)",
        }
    }

    pub fn cycle(self) -> Self {
        match self {
            DownloadOutput::Mp4 => DownloadOutput::Mp3,
            DownloadOutput::Mp3 => DownloadOutput::Mp4,
        }
    }
}

/// Target format for converting an existing file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
pub enum ConvertTarget {
    #[value(name = "mp4")]
    Mp4,
    #[value(name = "mp3")]
    Mp3,
    #[value(name = "wav")]
    Wav,
}

impl ConvertTarget {
    pub fn label(self) -> &'static str {
        match self {
            ConvertTarget::Mp4 => "MP4 (Video)",
            ConvertTarget::Mp3 => "MP3 (Audio)",
            ConvertTarget::Wav => "WAV (Audio)",
        }
    }

    pub fn cycle(self) -> Self {
        match self {
            ConvertTarget::Mp4 => ConvertTarget::Mp3,
            ConvertTarget::Mp3 => ConvertTarget::Wav,
            ConvertTarget::Wav => ConvertTarget::Mp4,
        }
    }

    pub fn is_audio(self) -> bool {
        matches!(self, ConvertTarget::Mp3 | ConvertTarget::Wav)
    }
}

/// Output heights offered for video conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
pub enum Resolution {
    #[value(name = "720")]
    P720,
    #[default]
    #[value(name = "1080")]
    P1080,
    #[value(name = "1440")]
    P1440,
    #[value(name = "2160")]
    P2160,
}

impl Resolution {
    pub const ALL: [Resolution; 4] = [
        Resolution::P720,
        Resolution::P1080,
        Resolution::P1440,
        Resolution::P2160,
    ];

    pub fn height(self) -> u32 {
        match self {
            Resolution::P720 => 720,
            Resolution::P1080 => 1080,
            Resolution::P1440 => 1440,
            Resolution::P2160 => 2160,
        }
    }

    pub fn next(self) -> Self {
        let idx = Self::ALL.iter().position(|r| *r == self).unwrap_or(0);
        Self::ALL[(idx + 1) % Self::ALL.len()]
    }

    pub fn prev(self) -> Self {
        let idx = Self::ALL.iter().position(|r| *r == self).unwrap_or(0);
        Self::ALL[(idx + Self::ALL.len() - 1) % Self::ALL.len()]
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}p", self.height())
    }
}

/// Subset of the extractor's info dict that the app cares about.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub uploader: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub creator: Option<String>,
    #[serde(default)]
    pub uploader_id: Option<String>,
    #[serde(default)]
    pub ext: Option<String>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub webpage_url: Option<String>,
}

/// Present and not the empty string. Whitespace-only values count as present.
fn non_empty(v: &Option<String>) -> Option<&str> {
    v.as_deref().filter(|s| !s.is_empty())
}

impl MediaInfo {
    /// Title, falling back to the id and then to "video".
    pub fn display_title(&self) -> &str {
        non_empty(&self.title)
            .or_else(|| non_empty(&self.id))
            .unwrap_or("video")
    }

    /// First available of uploader, channel, creator, uploader_id.
    pub fn uploader_name(&self) -> Option<&str> {
        [&self.uploader, &self.channel, &self.creator, &self.uploader_id]
            .into_iter()
            .find_map(non_empty)
    }

    pub fn video_id(&self) -> Option<&str> {
        non_empty(&self.id)
    }

    /// Known height; extractors report 0 for audio-only or unknown streams.
    pub fn known_height(&self) -> Option<u32> {
        self.height.filter(|h| *h > 0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadRequest {
    pub url: String,
    pub save_dir: PathBuf,
    pub output: DownloadOutput,
    pub convert: bool,
    pub resolution: Resolution,
    pub add_uploader: bool,
    pub add_timestamp: bool,
}

impl DownloadRequest {
    /// Resolution conversion only applies to video downloads.
    pub fn wants_conversion(&self) -> bool {
        self.convert && self.output == DownloadOutput::Mp4
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvertRequest {
    pub input: PathBuf,
    pub target: ConvertTarget,
    pub resolution: Resolution,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobKind {
    Download,
    Convert,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobKind::Download => f.write_str("download"),
            JobKind::Convert => f.write_str("convert"),
        }
    }
}

/// Terminal result of a worker that did not fail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JobOutcome {
    Downloaded {
        path: PathBuf,
    },
    AudioSaved {
        path: PathBuf,
    },
    Converted {
        path: PathBuf,
        height: u32,
    },
    SkippedUpscale {
        file: Option<PathBuf>,
        source: u32,
        target: u32,
    },
    SkippedSameResolution {
        file: Option<PathBuf>,
        height: u32,
    },
    Aborted {
        reason: String,
    },
    Cancelled,
}

impl JobOutcome {
    pub fn to_message(&self) -> String {
        match self {
            JobOutcome::Downloaded { path } => format!("Download finished: {}", path.display()),
            JobOutcome::AudioSaved { path } => format!("Audio saved: {}", path.display()),
            JobOutcome::Converted { path, .. } => {
                format!("Conversion completed: {}", path.display())
            }
            JobOutcome::SkippedUpscale { source, target, .. } => format!(
                "Skipped conversion: source ({source}p) is lower than target ({target}p). No upscaling."
            ),
            JobOutcome::SkippedSameResolution { height, .. } => {
                format!("Skipped conversion: source resolution equals target ({height}p).")
            }
            JobOutcome::Aborted { reason } => reason.clone(),
            JobOutcome::Cancelled => "Cancelled.".to_string(),
        }
    }

    /// The file the job left behind, if any.
    pub fn output(&self) -> Option<&PathBuf> {
        match self {
            JobOutcome::Downloaded { path }
            | JobOutcome::AudioSaved { path }
            | JobOutcome::Converted { path, .. } => Some(path),
            JobOutcome::SkippedUpscale { file, .. }
            | JobOutcome::SkippedSameResolution { file, .. } => file.as_ref(),
            JobOutcome::Aborted { .. } | JobOutcome::Cancelled => None,
        }
    }

    pub fn is_success(&self) -> bool {
        !matches!(self, JobOutcome::Aborted { .. } | JobOutcome::Cancelled)
    }
}

/// Events emitted by the controller and workers, consumed by UI/CLI layers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AppEvent {
    JobStarted {
        job: JobKind,
    },
    Status {
        job: JobKind,
        message: String,
    },
    Progress {
        job: JobKind,
        percent: f64,
        speed: Option<String>,
        eta: Option<String>,
    },
    Metadata {
        info: Box<MediaInfo>,
    },
    JobFinished {
        job: JobKind,
        source: String,
        elapsed_ms: u64,
        outcome: JobOutcome,
    },
    JobFailed {
        job: JobKind,
        source: String,
        elapsed_ms: u64,
        error: String,
    },
    Info(String),
}

/// A finished job as stored in the history directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: String,
    pub kind: JobKind,
    #[serde(default)]
    pub timestamp_utc: String,
    pub source: String,
    pub message: String,
    #[serde(default)]
    pub output: Option<PathBuf>,
    pub ok: bool,
    #[serde(with = "humantime_serde", default)]
    pub elapsed: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_title_falls_back_to_id_then_video() {
        let mut info = MediaInfo {
            id: Some("abc123".into()),
            ..Default::default()
        };
        assert_eq!(info.display_title(), "abc123");
        info.title = Some(String::new());
        assert_eq!(info.display_title(), "abc123");
        // Blank but present titles are kept; filename cleaning turns them into "video".
        info.title = Some("  ".into());
        assert_eq!(info.display_title(), "  ");
        assert_eq!(crate::naming::clean_title(info.display_title()), "video");
        info.title = Some("Clip".into());
        assert_eq!(info.display_title(), "Clip");
        assert_eq!(MediaInfo::default().display_title(), "video");
    }

    #[test]
    fn uploader_name_prefers_uploader_over_channel() {
        let info = MediaInfo {
            uploader: Some(String::new()),
            channel: Some("Chan".into()),
            creator: Some("Creator".into()),
            ..Default::default()
        };
        assert_eq!(info.uploader_name(), Some("Chan"));
        assert_eq!(MediaInfo::default().uploader_name(), None);
    }

    #[test]
    fn media_info_ignores_unknown_extractor_fields() {
        let raw = r#"{"id":"x1","title":"T","height":720,"formats":[{"a":1}],"ext":"mp4"}"#;
        let info: MediaInfo = serde_json::from_str(raw).unwrap();
        assert_eq!(info.known_height(), Some(720));
        assert_eq!(info.ext.as_deref(), Some("mp4"));
    }

    #[test]
    fn conversion_only_for_video_downloads() {
        let mut req = DownloadRequest {
            url: "https://example.com/v".into(),
            save_dir: PathBuf::from("."),
            output: DownloadOutput::Mp3,
            convert: true,
            resolution: Resolution::P720,
            add_uploader: false,
            add_timestamp: false,
        };
        assert!(!req.wants_conversion());
        req.output = DownloadOutput::Mp4;
        assert!(req.wants_conversion());
    }

    #[test]
    fn resolution_cycles_in_both_directions() {
        assert_eq!(Resolution::P2160.next(), Resolution::P720);
        assert_eq!(Resolution::P720.prev(), Resolution::P2160);
        assert_eq!(Resolution::default().height(), 1080);
    }

    #[test]
    fn skip_messages_name_both_heights() {
        let msg = JobOutcome::SkippedUpscale {
            file: None,
            source: 480,
            target: 1080,
        }
        .to_message();
        assert!(msg.contains("(480p)") && msg.contains("(1080p)"));
        assert!(JobOutcome::Cancelled.output().is_none());
    }
}
