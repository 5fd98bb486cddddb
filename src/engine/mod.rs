mod convert;
mod download;
pub mod ffmpeg;
mod process;
pub mod tools;
pub mod ytdlp;

pub use convert::ConvertJob;
pub use download::DownloadJob;

use crate::model::{AppEvent, JobKind, MediaInfo};
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc;
use tools::ToolPaths;

#[derive(Debug, Clone)]
pub enum JobControl {
    /// Kill the running tool and stop the job
    Cancel,
}

/// Error marker for a job stopped by `JobControl::Cancel`.
#[derive(Debug, Clone, Copy)]
pub struct Cancelled;

impl fmt::Display for Cancelled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("cancelled")
    }
}

impl std::error::Error for Cancelled {}

/// Settings shared by every job.
#[derive(Debug, Clone)]
pub struct EngineContext {
    pub tools: ToolPaths,
    pub probe_timeout: Duration,
}

/// Sends a job's status lines to presentation layers and the log.
#[derive(Debug, Clone)]
pub struct JobReporter {
    job: JobKind,
    event_tx: mpsc::UnboundedSender<AppEvent>,
}

impl JobReporter {
    pub fn new(job: JobKind, event_tx: mpsc::UnboundedSender<AppEvent>) -> Self {
        Self { job, event_tx }
    }

    pub fn status(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!(job = %self.job, "{message}");
        let _ = self.event_tx.send(AppEvent::Status {
            job: self.job,
            message,
        });
    }

    pub fn progress(&self, p: &ytdlp::DownloadProgress) {
        let _ = self.event_tx.send(AppEvent::Progress {
            job: self.job,
            percent: p.percent,
            speed: p.speed.clone(),
            eta: p.eta.clone(),
        });
    }

    pub fn metadata(&self, info: &MediaInfo) {
        let _ = self.event_tx.send(AppEvent::Metadata {
            info: Box::new(info.clone()),
        });
    }
}

/// Map a cancelled job onto its outcome; other errors pass through.
fn settle_cancel(
    res: anyhow::Result<crate::model::JobOutcome>,
) -> anyhow::Result<crate::model::JobOutcome> {
    match res {
        Err(e) if e.downcast_ref::<Cancelled>().is_some() => {
            Ok(crate::model::JobOutcome::Cancelled)
        }
        other => other,
    }
}

/// Shell-script stand-ins for yt-dlp, ffmpeg and ffprobe.
#[cfg(all(test, unix))]
pub(crate) mod stub_tools {
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};

    /// Write an executable `sh` script that appends its arguments to `<name>.log` and then runs `body`.
    pub fn write(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        let log = dir.join(format!("{name}.log"));
        let script = format!(
            "#!/bin/sh\nprintf '%s\\n' \"$*\" >> '{}'\n{body}\n",
            log.display()
        );
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    /// Argument lines recorded by the stub called `name`.
    pub fn calls(dir: &Path, name: &str) -> Vec<String> {
        std::fs::read_to_string(dir.join(format!("{name}.log")))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// yt-dlp: `-J` prints `json` with `@EXT@` replaced by the container a merged download
    /// would get (`webm` unless `--merge-output-format mp4` is passed). Otherwise writes `NEW`
    /// to the `-o` template with `mp4` filled in, keeping an existing file as yt-dlp does, and
    /// prints the final path.
    pub fn ytdlp(dir: &Path, json: &str) -> PathBuf {
        let body = format!(
            r#"if [ "$1" = "-J" ]; then
  ext=webm
  case " $* " in *" --merge-output-format mp4 "*) ext=mp4;; esac
  echo '{json}' | sed "s/@EXT@/$ext/"
  exit 0
fi
out=""
while [ $# -gt 0 ]; do
  if [ "$1" = "-o" ]; then out="$2"; fi
  shift
done
file=$(printf '%s' "$out" | sed 's/%(ext)s/mp4/')
echo "[download]  50.0% of 1.00MiB at 1.00MiB/s ETA 00:01"
if [ ! -e "$file" ]; then printf 'NEW' > "$file"; fi
echo "[download] 100% of 1.00MiB"
echo "$file""#
        );
        write(dir, "yt-dlp", &body)
    }

    /// ffmpeg: writes `ENC` to its last argument.
    pub fn ffmpeg(dir: &Path) -> PathBuf {
        write(dir, "ffmpeg", "for last; do :; done\nprintf 'ENC' > \"$last\"")
    }

    /// ffprobe: reports `height` for any input.
    pub fn ffprobe(dir: &Path, height: u32) -> PathBuf {
        write(dir, "ffprobe", &format!("echo {height}"))
    }
}
