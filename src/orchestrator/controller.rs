//! Job lifecycle controller.
//!
//! Owns the download and convert slots, starts/cancels workers and emits events for
//! presentation layers. One job per kind may run; the two kinds are independent.

use crate::engine::{ytdlp, ConvertJob, DownloadJob, EngineContext, JobControl, JobReporter};
use crate::model::{AppEvent, ConvertRequest, DownloadRequest, JobKind, JobOutcome, MediaInfo};
use anyhow::Result;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Duration;

/// Commands emitted by UI layers to control the workers.
#[derive(Debug, Clone)]
pub(crate) enum UiCommand {
    FetchMetadata(String),
    StartDownload(DownloadRequest),
    StartConvert(ConvertRequest),
    Cancel(JobKind),
    Quit,
}

/// Internal handle for a running job.
struct JobCtx {
    source: String,
    started: Instant,
    ctrl_tx: UnboundedSender<JobControl>,
    handle: Option<JoinHandle<Result<JobOutcome>>>,
    cancel_deadline: Option<tokio::time::Instant>,
}

impl JobCtx {
    fn cancel(&mut self, event_tx: &UnboundedSender<AppEvent>, job: JobKind) {
        if self.cancel_deadline.is_some() {
            return;
        }
        let _ = self.ctrl_tx.send(JobControl::Cancel);
        let _ = event_tx.send(AppEvent::Status {
            job,
            message: "Cancelling…".into(),
        });
        self.cancel_deadline = Some(tokio::time::Instant::now() + Duration::from_secs(3));
    }
}

fn start_download(
    ctx: &Arc<EngineContext>,
    req: DownloadRequest,
    event_tx: &UnboundedSender<AppEvent>,
) -> JobCtx {
    let (ctrl_tx, ctrl_rx) = mpsc::unbounded_channel::<JobControl>();
    let source = req.url.clone();
    let reporter = JobReporter::new(JobKind::Download, event_tx.clone());
    let job = DownloadJob::new(ctx.clone(), req);
    let _ = event_tx.send(AppEvent::JobStarted {
        job: JobKind::Download,
    });
    let handle = tokio::spawn(async move { job.run(reporter, ctrl_rx).await });
    JobCtx {
        source,
        started: Instant::now(),
        ctrl_tx,
        handle: Some(handle),
        cancel_deadline: None,
    }
}

fn start_convert(
    ctx: &Arc<EngineContext>,
    req: ConvertRequest,
    event_tx: &UnboundedSender<AppEvent>,
) -> JobCtx {
    let (ctrl_tx, ctrl_rx) = mpsc::unbounded_channel::<JobControl>();
    let source = req.input.display().to_string();
    let reporter = JobReporter::new(JobKind::Convert, event_tx.clone());
    let job = ConvertJob::new(ctx.clone(), req);
    let _ = event_tx.send(AppEvent::JobStarted {
        job: JobKind::Convert,
    });
    let handle = tokio::spawn(async move { job.run(reporter, ctrl_rx).await });
    JobCtx {
        source,
        started: Instant::now(),
        ctrl_tx,
        handle: Some(handle),
        cancel_deadline: None,
    }
}

async fn fetch_preview(ctx: &EngineContext, url: &str) -> Result<MediaInfo> {
    let bin = ctx.tools.require_ytdlp()?;
    // Previews are not cancellable from the UI.
    let (_ctrl_tx, mut ctrl_rx) = mpsc::unbounded_channel::<JobControl>();
    ytdlp::fetch_metadata(bin, url, &mut ctrl_rx).await
}

/// Metadata preview runs outside the job slots; it never blocks a download.
fn spawn_metadata_fetch(ctx: &Arc<EngineContext>, url: String, event_tx: &UnboundedSender<AppEvent>) {
    let ctx = ctx.clone();
    let event_tx = event_tx.clone();
    tokio::spawn(async move {
        match fetch_preview(&ctx, &url).await {
            Ok(info) => {
                let _ = event_tx.send(AppEvent::Metadata {
                    info: Box::new(info),
                });
            }
            Err(e) => {
                tracing::warn!("metadata fetch failed: {e:#}");
                let _ = event_tx.send(AppEvent::Info(format!("Metadata fetch failed: {e:#}")));
            }
        }
    });
}

fn failure_message(job: JobKind, e: &anyhow::Error) -> String {
    match job {
        JobKind::Download => format!("Error during download/conversion: {e:#}"),
        JobKind::Convert => format!("Error during conversion: {e:#}"),
    }
}

/// Turn a joined worker into its terminal event.
fn completion_event(
    job: JobKind,
    ctx: &JobCtx,
    join_res: std::result::Result<Result<JobOutcome>, JoinError>,
) -> AppEvent {
    let source = ctx.source.clone();
    let elapsed_ms = ctx.started.elapsed().as_millis() as u64;
    match join_res {
        Ok(Ok(outcome)) => AppEvent::JobFinished {
            job,
            source,
            elapsed_ms,
            outcome,
        },
        Ok(Err(e)) => {
            tracing::error!(job = %job, "job failed: {e:#}");
            AppEvent::JobFailed {
                job,
                source,
                elapsed_ms,
                error: failure_message(job, &e),
            }
        }
        Err(e) => AppEvent::JobFailed {
            job,
            source,
            elapsed_ms,
            error: format!("Job join failed: {e}"),
        },
    }
}

/// Await the slot's handle without taking it; pending forever when idle.
async fn wait_job(
    slot: &mut Option<JobCtx>,
) -> Option<std::result::Result<Result<JobOutcome>, JoinError>> {
    if let Some(ctx) = slot {
        if let Some(h) = ctx.handle.as_mut() {
            return Some(h.await);
        }
    }
    futures::future::pending().await
}

/// Orchestrate jobs based on UI commands and emit events back to presentation layers.
pub(crate) async fn run_controller(
    ctx: Arc<EngineContext>,
    event_tx: UnboundedSender<AppEvent>,
    mut cmd_rx: UnboundedReceiver<UiCommand>,
) -> Result<()> {
    let mut download: Option<JobCtx> = None;
    let mut convert: Option<JobCtx> = None;
    let mut quit_pending = false;
    // Cancel watchdog: if a cancel takes too long, keep the UI informed.
    let mut watchdog = tokio::time::interval(Duration::from_millis(500));

    loop {
        if quit_pending && download.is_none() && convert.is_none() {
            break Ok(());
        }

        tokio::select! {
            cmd = cmd_rx.recv(), if !quit_pending => {
                match cmd {
                    Some(UiCommand::FetchMetadata(url)) => {
                        spawn_metadata_fetch(&ctx, url, &event_tx);
                    }
                    Some(UiCommand::StartDownload(req)) => {
                        if download.is_some() {
                            let _ = event_tx.send(AppEvent::Info(
                                "A download is already running.".into(),
                            ));
                        } else {
                            download = Some(start_download(&ctx, req, &event_tx));
                        }
                    }
                    Some(UiCommand::StartConvert(req)) => {
                        if convert.is_some() {
                            let _ = event_tx.send(AppEvent::Info(
                                "A conversion is already running.".into(),
                            ));
                        } else {
                            convert = Some(start_convert(&ctx, req, &event_tx));
                        }
                    }
                    Some(UiCommand::Cancel(kind)) => {
                        let slot = match kind {
                            JobKind::Download => &mut download,
                            JobKind::Convert => &mut convert,
                        };
                        match slot {
                            Some(job) => job.cancel(&event_tx, kind),
                            None => {
                                let _ = event_tx.send(AppEvent::Info(format!("No {kind} is running.")));
                            }
                        }
                    }
                    // Quit waits for running jobs so their children are reaped.
                    Some(UiCommand::Quit) | None => {
                        quit_pending = true;
                        if let Some(job) = download.as_mut() {
                            job.cancel(&event_tx, JobKind::Download);
                        }
                        if let Some(job) = convert.as_mut() {
                            job.cancel(&event_tx, JobKind::Convert);
                        }
                    }
                }
            }
            // Do not take the JoinHandle before this branch wins; otherwise it can be dropped
            // if another select branch is chosen, and we'll never observe completion.
            Some(join_res) = wait_job(&mut download) => {
                if let Some(job) = download.take() {
                    let _ = event_tx.send(completion_event(JobKind::Download, &job, join_res));
                }
            }
            Some(join_res) = wait_job(&mut convert) => {
                if let Some(job) = convert.take() {
                    let _ = event_tx.send(completion_event(JobKind::Convert, &job, join_res));
                }
            }
            _ = watchdog.tick() => {
                let now = tokio::time::Instant::now();
                for (kind, slot) in [(JobKind::Download, &mut download), (JobKind::Convert, &mut convert)] {
                    if let Some(job) = slot.as_mut() {
                        if job.cancel_deadline.is_some_and(|d| now >= d) {
                            let _ = event_tx.send(AppEvent::Status {
                                job: kind,
                                message: "Still cancelling…".into(),
                            });
                            job.cancel_deadline = Some(now + Duration::from_secs(3));
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::tools::ToolPaths;
    use crate::model::ConvertTarget;
    use crate::model::Resolution;
    use std::path::PathBuf;

    fn ctx() -> Arc<EngineContext> {
        Arc::new(EngineContext {
            tools: ToolPaths::default(),
            probe_timeout: Duration::from_secs(1),
        })
    }

    async fn next_terminal(rx: &mut UnboundedReceiver<AppEvent>) -> AppEvent {
        loop {
            let ev = rx.recv().await.expect("event channel closed");
            if matches!(ev, AppEvent::JobFinished { .. } | AppEvent::JobFailed { .. }) {
                return ev;
            }
        }
    }

    #[tokio::test]
    async fn convert_of_missing_file_finishes_as_aborted() {
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let ctrl = tokio::spawn(run_controller(ctx(), event_tx, cmd_rx));

        cmd_tx
            .send(UiCommand::StartConvert(ConvertRequest {
                input: PathBuf::from("/nonexistent/in.mp4"),
                target: ConvertTarget::Mp3,
                resolution: Resolution::P720,
            }))
            .unwrap();

        match next_terminal(&mut event_rx).await {
            AppEvent::JobFinished {
                job,
                source,
                outcome,
                ..
            } => {
                assert_eq!(job, JobKind::Convert);
                assert_eq!(source, "/nonexistent/in.mp4");
                assert!(!outcome.is_success());
            }
            other => panic!("unexpected {other:?}"),
        }

        cmd_tx.send(UiCommand::Quit).unwrap();
        ctrl.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn download_without_ytdlp_reports_prefixed_failure() {
        let dir = tempfile::tempdir().unwrap();
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let ctrl = tokio::spawn(run_controller(ctx(), event_tx, cmd_rx));

        cmd_tx
            .send(UiCommand::StartDownload(DownloadRequest {
                url: "https://example.com/v".into(),
                save_dir: dir.path().to_path_buf(),
                output: crate::model::DownloadOutput::Mp4,
                convert: false,
                resolution: Resolution::P1080,
                add_uploader: false,
                add_timestamp: false,
            }))
            .unwrap();

        match next_terminal(&mut event_rx).await {
            AppEvent::JobFailed { job, error, .. } => {
                assert_eq!(job, JobKind::Download);
                assert!(error.starts_with("Error during download/conversion:"));
            }
            other => panic!("unexpected {other:?}"),
        }
        drop(cmd_tx);
        ctrl.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn cancel_without_job_is_informational() {
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let ctrl = tokio::spawn(run_controller(ctx(), event_tx, cmd_rx));
        cmd_tx.send(UiCommand::Cancel(JobKind::Download)).unwrap();
        match event_rx.recv().await.unwrap() {
            AppEvent::Info(msg) => assert_eq!(msg, "No download is running."),
            other => panic!("unexpected {other:?}"),
        }
        cmd_tx.send(UiCommand::Quit).unwrap();
        ctrl.await.unwrap().unwrap();
    }

    #[test]
    fn failure_messages_are_prefixed_per_kind() {
        let e = anyhow::anyhow!("boom");
        assert_eq!(
            failure_message(JobKind::Convert, &e),
            "Error during conversion: boom"
        );
    }
}
