use crate::engine::{ffmpeg, settle_cancel, ytdlp, EngineContext, JobControl, JobReporter};
use crate::model::{DownloadOutput, DownloadRequest, JobOutcome};
use crate::naming;
use crate::resolution::{decide_scale, ScaleDecision};
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Download worker: metadata, naming, yt-dlp, then optional audio extraction or downscale.
pub struct DownloadJob {
    ctx: Arc<EngineContext>,
    req: DownloadRequest,
}

impl DownloadJob {
    pub fn new(ctx: Arc<EngineContext>, req: DownloadRequest) -> Self {
        Self { ctx, req }
    }

    pub async fn run(
        self,
        reporter: JobReporter,
        mut control_rx: mpsc::UnboundedReceiver<JobControl>,
    ) -> Result<JobOutcome> {
        settle_cancel(self.run_inner(&reporter, &mut control_rx).await)
    }

    async fn run_inner(
        &self,
        reporter: &JobReporter,
        control: &mut mpsc::UnboundedReceiver<JobControl>,
    ) -> Result<JobOutcome> {
        let req = &self.req;
        let tools = &self.ctx.tools;
        let ytdlp_bin = tools.require_ytdlp()?;

        tokio::fs::create_dir_all(&req.save_dir)
            .await
            .with_context(|| format!("failed to create {}", req.save_dir.display()))?;

        reporter.status("Preparing download (fetching metadata)...");
        let info = ytdlp::fetch_metadata(ytdlp_bin, &req.url, control)
            .await
            .context("failed to fetch metadata")?;
        reporter.metadata(&info);

        let base = naming::build_base_filename(
            &info,
            req.add_uploader,
            req.add_timestamp,
            naming::local_now(),
        );
        let ext = info
            .ext
            .as_deref()
            .filter(|e| !e.is_empty())
            .unwrap_or(ytdlp::MERGE_FORMAT);
        let unique = naming::make_unique_filepath(&req.save_dir, &base, ext, info.video_id());
        let template = naming::output_template(&unique);
        let final_base = unique
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or(base);
        reporter.status(format!("Downloading as: {final_base}"));

        reporter.status("Starting download...");
        let downloaded = ytdlp::download(ytdlp_bin, &req.url, &template, reporter, control)
            .await
            .context("yt-dlp download failed")?;
        reporter.status(format!("Downloaded: {}", downloaded.display()));

        let source_height = match info.known_height() {
            Some(h) => Some(h),
            None => ffmpeg::probe_height(tools, &downloaded, self.ctx.probe_timeout).await,
        };
        reporter.status(format!(
            "Detected source height: {}p",
            source_height.unwrap_or(0)
        ));

        if req.output == DownloadOutput::Mp3 {
            reporter.status("Converting downloaded file to MP3...");
            let mp3 = naming::sibling_with_extension(&downloaded, "mp3");
            ffmpeg::to_mp3(tools, &downloaded, &mp3, control).await?;
            return Ok(JobOutcome::AudioSaved { path: mp3 });
        }

        if req.wants_conversion() {
            let target = req.resolution.height();
            return self
                .convert_download(&downloaded, source_height, target, reporter, control)
                .await;
        }

        Ok(JobOutcome::Downloaded { path: downloaded })
    }

    async fn convert_download(
        &self,
        downloaded: &Path,
        source_height: Option<u32>,
        target: u32,
        reporter: &JobReporter,
        control: &mut mpsc::UnboundedReceiver<JobControl>,
    ) -> Result<JobOutcome> {
        match decide_scale(source_height, target) {
            ScaleDecision::SkipUpscale { source, target } => {
                return Ok(JobOutcome::SkippedUpscale {
                    file: Some(downloaded.to_path_buf()),
                    source,
                    target,
                })
            }
            ScaleDecision::SkipEqual { height } => {
                return Ok(JobOutcome::SkippedSameResolution {
                    file: Some(downloaded.to_path_buf()),
                    height,
                })
            }
            // A fresh download with an unknown height is still worth a try.
            ScaleDecision::UnknownSource => reporter.status(
                "Warning: could not detect source resolution; attempting conversion.",
            ),
            ScaleDecision::Scale { .. } => {}
        }

        let path =
            ffmpeg::scale_to_height(&self.ctx.tools, downloaded, target, reporter, control).await?;
        Ok(JobOutcome::Converted {
            path,
            height: target,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::tools::ToolPaths;
    use crate::model::{AppEvent, JobKind, Resolution};
    use std::time::Duration;

    fn job(ctx: EngineContext, save_dir: &Path) -> DownloadJob {
        DownloadJob::new(
            Arc::new(ctx),
            DownloadRequest {
                url: "https://example.com/watch?v=1".into(),
                save_dir: save_dir.to_path_buf(),
                output: DownloadOutput::Mp4,
                convert: true,
                resolution: Resolution::P1080,
                add_uploader: false,
                add_timestamp: false,
            },
        )
    }

    fn no_tools() -> EngineContext {
        EngineContext {
            tools: ToolPaths::default(),
            probe_timeout: Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn missing_ytdlp_fails_the_job() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        let (_ctl_tx, ctl_rx) = mpsc::unbounded_channel();
        let err = job(no_tools(), dir.path())
            .run(JobReporter::new(JobKind::Download, tx), ctl_rx)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("yt-dlp"));
    }

    #[tokio::test]
    async fn lower_source_skips_conversion_and_keeps_download() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("clip.mp4");
        let (tx, _rx) = mpsc::unbounded_channel();
        let (_ctl_tx, mut ctl_rx) = mpsc::unbounded_channel();
        let reporter = JobReporter::new(JobKind::Download, tx);
        let out = job(no_tools(), dir.path())
            .convert_download(&file, Some(720), 1080, &reporter, &mut ctl_rx)
            .await
            .unwrap();
        assert_eq!(
            out,
            JobOutcome::SkippedUpscale {
                file: Some(file),
                source: 720,
                target: 1080
            }
        );
    }

    #[tokio::test]
    async fn unknown_height_warns_then_attempts_conversion() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("clip.mp4");
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (_ctl_tx, mut ctl_rx) = mpsc::unbounded_channel();
        let reporter = JobReporter::new(JobKind::Download, tx);
        // Without ffmpeg the attempt itself fails, after the warning.
        let res = job(no_tools(), dir.path())
            .convert_download(&file, None, 720, &reporter, &mut ctl_rx)
            .await;
        assert!(res.is_err());
        let first = rx.try_recv().unwrap();
        assert!(matches!(
            first,
            AppEvent::Status { ref message, .. } if message.starts_with("Warning: could not detect")
        ));
    }

    #[cfg(unix)]
    mod with_stub_tools {
        use super::*;
        use crate::engine::stub_tools;

        const CLIP_JSON: &str =
            r#"{"id":"abc","title":"Clip","uploader":"Chan","ext":"@EXT@","height":1080}"#;

        fn stub_ctx(bin: &Path) -> EngineContext {
            EngineContext {
                tools: ToolPaths {
                    ytdlp: Some(stub_tools::ytdlp(bin, CLIP_JSON)),
                    ffmpeg: Some(stub_tools::ffmpeg(bin)),
                    ffprobe: None,
                },
                probe_timeout: Duration::from_secs(5),
            }
        }

        async fn run_job(job: DownloadJob) -> (JobOutcome, Vec<AppEvent>) {
            let (tx, mut rx) = mpsc::unbounded_channel();
            let (_ctl_tx, ctl_rx) = mpsc::unbounded_channel();
            let out = job
                .run(JobReporter::new(JobKind::Download, tx), ctl_rx)
                .await
                .unwrap();
            let mut events = Vec::new();
            while let Ok(ev) = rx.try_recv() {
                events.push(ev);
            }
            (out, events)
        }

        #[tokio::test]
        async fn taken_title_falls_back_to_id_and_never_reports_the_old_file() {
            let bin = tempfile::tempdir().unwrap();
            let out_dir = tempfile::tempdir().unwrap();
            let old = out_dir.path().join("Clip.mp4");
            std::fs::write(&old, "OLD").unwrap();

            let mut j = job(stub_ctx(bin.path()), out_dir.path());
            j.req.convert = false;
            let (out, events) = run_job(j).await;

            let expected = out_dir.path().join("Clip_abc.mp4");
            assert_eq!(
                out,
                JobOutcome::Downloaded {
                    path: expected.clone()
                }
            );
            assert_eq!(std::fs::read_to_string(&expected).unwrap(), "NEW");
            assert_eq!(std::fs::read_to_string(&old).unwrap(), "OLD");

            let calls = stub_tools::calls(bin.path(), "yt-dlp");
            assert_eq!(calls.len(), 2, "{calls:?}");
            assert!(calls[0].starts_with("-J "));
            assert!(calls[0].contains("--merge-output-format mp4"));
            let template = out_dir.path().join("Clip_abc.%(ext)s");
            assert!(calls[1].contains(&format!("-o {}", template.display())));
            assert!(calls[1].ends_with("-- https://example.com/watch?v=1"));

            assert!(events
                .iter()
                .any(|e| matches!(e, AppEvent::Metadata { info } if info.display_title() == "Clip")));
            assert!(events
                .iter()
                .any(|e| matches!(e, AppEvent::Progress { percent, .. } if *percent == 50.0)));
        }

        #[tokio::test]
        async fn mp3_output_extracts_audio_next_to_the_download() {
            let bin = tempfile::tempdir().unwrap();
            let out_dir = tempfile::tempdir().unwrap();
            let mut j = job(stub_ctx(bin.path()), out_dir.path());
            j.req.output = DownloadOutput::Mp3;
            let (out, _) = run_job(j).await;

            let mp3 = out_dir.path().join("Clip.mp3");
            assert_eq!(out, JobOutcome::AudioSaved { path: mp3.clone() });
            assert_eq!(std::fs::read_to_string(&mp3).unwrap(), "ENC");
            let calls = stub_tools::calls(bin.path(), "ffmpeg");
            assert_eq!(calls.len(), 1);
            assert!(calls[0].contains(&format!("-i {}", out_dir.path().join("Clip.mp4").display())));
            assert!(calls[0].contains("-map a"));
            assert!(calls[0].ends_with(&mp3.display().to_string()));
        }

        #[tokio::test]
        async fn taller_source_is_downscaled_with_uploader_in_name() {
            let bin = tempfile::tempdir().unwrap();
            let out_dir = tempfile::tempdir().unwrap();
            let mut j = job(stub_ctx(bin.path()), out_dir.path());
            j.req.resolution = Resolution::P720;
            j.req.add_uploader = true;
            let (out, _) = run_job(j).await;

            let scaled = out_dir.path().join("Clip_Chan_720p.mp4");
            assert_eq!(
                out,
                JobOutcome::Converted {
                    path: scaled.clone(),
                    height: 720
                }
            );
            assert!(out_dir.path().join("Clip_Chan.mp4").exists());
            let calls = stub_tools::calls(bin.path(), "ffmpeg");
            assert_eq!(calls.len(), 1);
            assert!(calls[0].contains("scale=-2:720"));
            assert!(calls[0].ends_with(&scaled.display().to_string()));
        }

        #[tokio::test]
        async fn shorter_source_keeps_the_download_without_ffmpeg() {
            let bin = tempfile::tempdir().unwrap();
            let out_dir = tempfile::tempdir().unwrap();
            let mut j = job(stub_ctx(bin.path()), out_dir.path());
            j.req.resolution = Resolution::P2160;
            let (out, _) = run_job(j).await;

            assert_eq!(
                out,
                JobOutcome::SkippedUpscale {
                    file: Some(out_dir.path().join("Clip.mp4")),
                    source: 1080,
                    target: 2160
                }
            );
            assert!(stub_tools::calls(bin.path(), "ffmpeg").is_empty());
        }
    }
}
