//! ffmpeg/ffprobe invocation: height probing, audio extraction and downscaling.

use crate::engine::process::run_tool;
use crate::engine::tools::ToolPaths;
use crate::engine::{JobControl, JobReporter};
use crate::naming;
use anyhow::Result;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::mpsc;

fn base_args(input: &Path) -> Vec<OsString> {
    vec![
        "-hide_banner".into(),
        "-nostdin".into(),
        "-loglevel".into(),
        "error".into(),
        "-i".into(),
        input.into(),
    ]
}

pub fn mp3_args(input: &Path, output: &Path) -> Vec<OsString> {
    let mut args = base_args(input);
    args.extend(["-q:a", "0", "-map", "a", "-y"].map(OsString::from));
    args.push(output.into());
    args
}

pub fn wav_args(input: &Path, output: &Path) -> Vec<OsString> {
    let mut args = base_args(input);
    args.extend(
        ["-vn", "-acodec", "pcm_s16le", "-ar", "44100", "-ac", "2", "-y"].map(OsString::from),
    );
    args.push(output.into());
    args
}

pub fn scale_args(input: &Path, output: &Path, height: u32) -> Vec<OsString> {
    let mut args = base_args(input);
    args.extend(["-c:v", "libx264", "-preset", "slow", "-crf", "22", "-vf"].map(OsString::from));
    args.push(format!("scale=-2:{height}").into());
    args.extend(["-c:a", "aac", "-b:a", "128k", "-y"].map(OsString::from));
    args.push(output.into());
    args
}

pub fn ffprobe_height_args(input: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = [
        "-v",
        "error",
        "-select_streams",
        "v:0",
        "-show_entries",
        "stream=height",
        "-of",
        "csv=p=0",
    ]
    .map(OsString::from)
    .to_vec();
    args.push(input.into());
    args
}

/// First numeric line of ffprobe's `csv=p=0` output.
pub fn parse_probe_height(output: &str) -> Option<u32> {
    output
        .lines()
        .map(|l| l.trim().trim_end_matches(','))
        .find_map(|l| l.parse::<u32>().ok())
        .filter(|h| *h > 0)
}

/// Height from the stream summary `ffmpeg -i` prints, e.g. `Video: h264 ..., 1920x1080 [SAR 1:1]`.
pub fn parse_stream_info_height(lines: &[String]) -> Option<u32> {
    lines
        .iter()
        .filter(|l| l.contains("Stream #") && l.contains("Video:"))
        .flat_map(|l| l.split(|c: char| c == ',' || c.is_whitespace()))
        .find_map(|tok| {
            let (w, h) = tok.split_once('x')?;
            let w = w.parse::<u32>().ok()?;
            let h = h.parse::<u32>().ok()?;
            (w > 0 && h > 0).then_some(h)
        })
}

/// Detect the first video stream's height. `None` when neither ffprobe nor ffmpeg can tell.
pub async fn probe_height(tools: &ToolPaths, input: &Path, timeout: Duration) -> Option<u32> {
    // Probes are short and not user-cancellable; a private control channel is enough.
    let (_ctrl_tx, mut ctrl_rx) = mpsc::unbounded_channel::<JobControl>();

    if let Some(ffprobe) = tools.ffprobe.as_deref() {
        let mut cmd = Command::new(ffprobe);
        cmd.args(ffprobe_height_args(input));
        match tokio::time::timeout(timeout, run_tool(cmd, &mut ctrl_rx, |_, _| {})).await {
            Ok(Ok(run)) if run.status.success() => {
                if let Some(h) = parse_probe_height(&run.stdout_lines.join("\n")) {
                    return Some(h);
                }
            }
            Ok(Ok(run)) => tracing::debug!(status = %run.status, "ffprobe failed"),
            Ok(Err(e)) => tracing::debug!("ffprobe error: {e:#}"),
            Err(_) => tracing::warn!("ffprobe timed out after {timeout:?}"),
        }
    }

    let ffmpeg = tools.ffmpeg.as_deref()?;
    let mut cmd = Command::new(ffmpeg);
    cmd.arg("-hide_banner").arg("-nostdin").arg("-i").arg(input);
    // Exits non-zero (no output file given) but the stream summary is still printed.
    let mut lines = Vec::new();
    let probe = run_tool(cmd, &mut ctrl_rx, |_, line| lines.push(line.to_string()));
    let result = tokio::time::timeout(timeout, probe).await;
    match result {
        Ok(Ok(_)) => parse_stream_info_height(&lines),
        Ok(Err(e)) => {
            tracing::debug!("ffmpeg probe error: {e:#}");
            None
        }
        Err(_) => {
            tracing::warn!("ffmpeg probe timed out after {timeout:?}");
            None
        }
    }
}

async fn run_ffmpeg(
    tools: &ToolPaths,
    args: Vec<OsString>,
    control: &mut mpsc::UnboundedReceiver<JobControl>,
) -> Result<()> {
    let mut cmd = Command::new(tools.require_ffmpeg()?);
    cmd.args(args);
    run_tool(cmd, control, |_, _| {}).await?.ensure_success()
}

/// Extract the audio stream as VBR MP3.
pub async fn to_mp3(
    tools: &ToolPaths,
    input: &Path,
    output: &Path,
    control: &mut mpsc::UnboundedReceiver<JobControl>,
) -> Result<()> {
    run_ffmpeg(tools, mp3_args(input, output), control).await
}

/// Extract audio as 16-bit 44.1kHz stereo WAV.
pub async fn to_wav(
    tools: &ToolPaths,
    input: &Path,
    output: &Path,
    control: &mut mpsc::UnboundedReceiver<JobControl>,
) -> Result<()> {
    run_ffmpeg(tools, wav_args(input, output), control).await
}

/// Re-encode `input` to `height` pixels high as `<stem>_<height>p.mp4`.
pub async fn scale_to_height(
    tools: &ToolPaths,
    input: &Path,
    height: u32,
    reporter: &JobReporter,
    control: &mut mpsc::UnboundedReceiver<JobControl>,
) -> Result<PathBuf> {
    let output = naming::resolution_variant(input, height);
    reporter.status(format!(
        "Converting to {height}p -> {}",
        output.display()
    ));
    run_ffmpeg(tools, scale_args(input, &output, height), control).await?;
    Ok(output)
}
