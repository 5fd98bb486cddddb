use crate::engine::tools::ToolPaths;
use crate::engine::EngineContext;
use crate::model::{
    AppEvent, ConvertRequest, ConvertTarget, DownloadOutput, DownloadRequest, JobKind, JobRecord,
    Resolution,
};
use crate::orchestrator::{process_job_completion, run_controller, UiCommand};
use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "socialclip",
    version,
    about = "Download social media videos with yt-dlp and convert them with ffmpeg"
)]
pub struct Cli {
    /// Video page URL to download
    #[arg(long)]
    pub url: Option<String>,

    /// Folder downloads are saved to (default: ~/Downloads)
    #[arg(long)]
    pub save_dir: Option<PathBuf>,

    /// Keep the video or extract its audio
    #[arg(long, value_enum, default_value_t = DownloadOutput::Mp4)]
    pub output: DownloadOutput,

    /// Downscale the downloaded video to --resolution (never upscales)
    #[arg(long)]
    pub convert: bool,

    /// Target height for --convert
    #[arg(long, value_enum, default_value_t = Resolution::P1080)]
    pub resolution: Resolution,

    /// Append the uploader name to the filename
    #[arg(long)]
    pub add_uploader: bool,

    /// Append a local timestamp to the filename
    #[arg(long)]
    pub add_timestamp: bool,

    /// Existing media file to convert
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// Target format for --file
    #[arg(long, value_enum, default_value_t = ConvertTarget::Mp4)]
    pub convert_to: ConvertTarget,

    /// Target height when converting --file to mp4
    #[arg(long, value_enum, default_value_t = Resolution::P1080)]
    pub convert_resolution: Resolution,

    /// Print metadata for --url and exit (no download)
    #[arg(long)]
    pub info: bool,

    /// Print JSON result and exit (no TUI)
    #[arg(long)]
    pub json: bool,

    /// Print text summary and exit (no TUI)
    #[arg(long)]
    pub text: bool,

    /// Run silently: suppress all output except errors (for scripted usage)
    #[arg(long)]
    pub silent: bool,

    /// Path to the yt-dlp executable
    #[arg(long)]
    pub ytdlp_path: Option<PathBuf>,

    /// Path to the ffmpeg executable
    #[arg(long)]
    pub ffmpeg_path: Option<PathBuf>,

    /// Path to the ffprobe executable
    #[arg(long)]
    pub ffprobe_path: Option<PathBuf>,

    /// Report which external tools were found and exit
    #[arg(long)]
    pub check_tools: bool,

    /// Give up on resolution probing after this long
    #[arg(long, default_value = "15s")]
    pub probe_timeout: humantime::Duration,

    /// Use --auto-save true or --auto-save false to override
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub auto_save: bool,

    /// Number of history entries the TUI loads
    #[arg(long, default_value_t = 50)]
    pub history_load: usize,

    /// Start the download for --url as soon as the TUI opens
    #[arg(long)]
    pub start_on_launch: bool,

    /// Debug-level logging
    #[arg(long, short)]
    pub verbose: bool,
}

impl Cli {
    /// True when no TUI is started.
    pub fn is_headless(&self) -> bool {
        self.silent || self.json || self.text || self.info || self.check_tools
    }
}

pub async fn run(args: Cli) -> Result<()> {
    // Validate that --silent can only be used with --json
    if args.silent && !args.json {
        return Err(anyhow::anyhow!(
            "--silent can only be used with --json. Use --silent --json together."
        ));
    }

    if !args.is_headless() {
        #[cfg(feature = "tui")]
        {
            if let Err(e) = crate::logging::init_file(args.verbose) {
                eprintln!("logging disabled: {e:#}");
            }
            return crate::tui::run(args).await;
        }
        #[cfg(not(feature = "tui"))]
        {
            // Fallback when built without TUI support.
            crate::logging::init_stderr(args.verbose);
            return run_jobs(args).await;
        }
    }

    crate::logging::init_stderr(args.verbose);

    if args.check_tools {
        return run_check_tools(args).await;
    }
    if args.info {
        return run_info(args).await;
    }
    run_jobs(args).await
}

/// Resolve tool locations and shared job settings.
pub fn build_context(args: &Cli) -> EngineContext {
    EngineContext {
        tools: ToolPaths::resolve(
            args.ytdlp_path.as_deref(),
            args.ffmpeg_path.as_deref(),
            args.ffprobe_path.as_deref(),
        ),
        probe_timeout: Duration::from(args.probe_timeout),
    }
}

/// Build a `DownloadRequest` when a non-blank `--url` was given.
pub fn build_download_request(args: &Cli) -> Option<DownloadRequest> {
    let url = args.url.as_deref().map(str::trim).filter(|u| !u.is_empty())?;
    Some(DownloadRequest {
        url: url.to_string(),
        save_dir: args
            .save_dir
            .clone()
            .unwrap_or_else(crate::naming::default_download_folder),
        output: args.output,
        convert: args.convert,
        resolution: args.resolution,
        add_uploader: args.add_uploader,
        add_timestamp: args.add_timestamp,
    })
}

/// Build a `ConvertRequest` when `--file` was given.
pub fn build_convert_request(args: &Cli) -> Option<ConvertRequest> {
    let input = args.file.clone().filter(|p| !p.as_os_str().is_empty())?;
    Some(ConvertRequest {
        input,
        target: args.convert_to,
        resolution: args.convert_resolution,
    })
}

/// Run the requested download and/or conversion through the controller and report the results.
async fn run_jobs(args: Cli) -> Result<()> {
    let download = build_download_request(&args);
    let convert = build_convert_request(&args);
    if download.is_none() && convert.is_none() {
        anyhow::bail!("nothing to do: pass --url to download or --file to convert");
    }

    let silent = args.silent;
    let (out_tx, out_handle) = if silent {
        (None, None)
    } else {
        let (tx, handle) = spawn_output_writer();
        (Some(tx), Some(handle))
    };
    let say = |line: String| {
        if let Some(tx) = out_tx.as_ref() {
            let _ = tx.send(OutputLine::Stderr(line));
        }
    };

    let ctx = Arc::new(build_context(&args));
    let (evt_tx, mut evt_rx) = mpsc::unbounded_channel::<AppEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();
    let controller = tokio::spawn(run_controller(ctx, evt_tx, cmd_rx));

    let mut pending = 0usize;
    if let Some(req) = download {
        let _ = cmd_tx.send(UiCommand::StartDownload(req));
        pending += 1;
    }
    if let Some(req) = convert {
        let _ = cmd_tx.send(UiCommand::StartConvert(req));
        pending += 1;
    }

    let mut records: Vec<JobRecord> = Vec::new();
    let mut last_decile = -1i64;
    let mut interrupted = false;

    while pending > 0 {
        tokio::select! {
            ev = evt_rx.recv() => {
                let Some(ev) = ev else { break };
                match &ev {
                    AppEvent::Status { job, message } => say(format!("[{job}] {message}")),
                    AppEvent::Progress { job, percent, speed, eta } => {
                        let decile = (*percent / 10.0).floor() as i64;
                        if decile != last_decile {
                            last_decile = decile;
                            say(format!(
                                "[{job}] {percent:.1}% at {} ETA {}",
                                speed.as_deref().unwrap_or("-"),
                                eta.as_deref().unwrap_or("-")
                            ));
                        }
                    }
                    AppEvent::Metadata { info } => {
                        say(format!("[download] Title: {}", info.display_title()));
                    }
                    AppEvent::Info(msg) => say(msg.clone()),
                    AppEvent::JobStarted { .. } => {}
                    AppEvent::JobFinished { job, outcome, .. } => {
                        say(format!("[{job}] {}", outcome.to_message()));
                    }
                    AppEvent::JobFailed { job, error, .. } => say(format!("[{job}] {error}")),
                }
                if let Some(done) = process_job_completion(&ev, args.auto_save, 0) {
                    pending -= 1;
                    if let Some(p) = done.saved_path.as_ref() {
                        say(format!("Saved: {}", p.display()));
                    }
                    if let Some(e) = done.save_error {
                        say(e);
                    }
                    records.push(done.record);
                }
            }
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                interrupted = true;
                say("Interrupted, cancelling…".to_string());
                let _ = cmd_tx.send(UiCommand::Cancel(JobKind::Download));
                let _ = cmd_tx.send(UiCommand::Cancel(JobKind::Convert));
            }
        }
    }

    let _ = cmd_tx.send(UiCommand::Quit);
    controller
        .await
        .context("controller task failed")?
        .context("controller failed")?;

    if let Some(tx) = out_tx.as_ref() {
        if args.json {
            let out = serde_json::to_string_pretty(&records)?;
            let _ = tx.send(OutputLine::Stdout(out));
        } else {
            let summary = crate::text_summary::build_job_summary(&records);
            for line in summary.lines {
                let _ = tx.send(OutputLine::Stdout(line));
            }
        }
    }

    drop(out_tx);
    if let Some(handle) = out_handle {
        let _ = handle.await;
    }

    let failed = records.iter().filter(|r| !r.ok).count();
    if failed > 0 {
        anyhow::bail!("{failed} of {} job(s) did not complete", records.len());
    }
    Ok(())
}

/// Fetch and print metadata for `--url` without downloading.
async fn run_info(args: Cli) -> Result<()> {
    let url = args
        .url
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .context("--info requires --url")?
        .to_string();

    let ctx = Arc::new(build_context(&args));
    let (evt_tx, mut evt_rx) = mpsc::unbounded_channel::<AppEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();
    let controller = tokio::spawn(run_controller(ctx, evt_tx, cmd_rx));
    let _ = cmd_tx.send(UiCommand::FetchMetadata(url));

    let res = loop {
        match evt_rx.recv().await {
            Some(AppEvent::Metadata { info }) => break Ok(info),
            Some(AppEvent::Info(msg)) => break Err(anyhow::anyhow!(msg)),
            Some(_) => continue,
            None => break Err(anyhow::anyhow!("controller stopped before metadata arrived")),
        }
    };
    let _ = cmd_tx.send(UiCommand::Quit);
    let _ = controller.await;
    let info = res?;

    if args.silent {
        return Ok(());
    }
    let (out_tx, out_handle) = spawn_output_writer();
    if args.json {
        let _ = out_tx.send(OutputLine::Stdout(serde_json::to_string_pretty(&info)?));
    } else {
        for line in crate::text_summary::build_metadata_summary(&info).lines {
            let _ = out_tx.send(OutputLine::Stdout(line));
        }
    }
    drop(out_tx);
    let _ = out_handle.await;
    Ok(())
}

/// Report tool discovery. Fails when a required tool is missing.
async fn run_check_tools(args: Cli) -> Result<()> {
    let tools = build_context(&args).tools.inspect().await;

    if !args.silent {
        let (out_tx, out_handle) = spawn_output_writer();
        if args.json {
            let _ = out_tx.send(OutputLine::Stdout(serde_json::to_string_pretty(&tools)?));
        } else {
            for line in crate::text_summary::build_tools_summary(&tools).lines {
                let _ = out_tx.send(OutputLine::Stdout(line));
            }
        }
        drop(out_tx);
        let _ = out_handle.await;
    }

    // ffprobe is optional; probing falls back to ffmpeg.
    let missing: Vec<&str> = tools
        .iter()
        .filter(|t| !t.available && t.name != "ffprobe")
        .map(|t| t.name.as_str())
        .collect();
    if !missing.is_empty() {
        anyhow::bail!("missing required tools: {}", missing.join(", "));
    }
    Ok(())
}
