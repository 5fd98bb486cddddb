use crate::engine::{ffmpeg, settle_cancel, EngineContext, JobControl, JobReporter};
use crate::model::{ConvertRequest, ConvertTarget, JobOutcome};
use crate::naming;
use crate::resolution::{decide_scale, ScaleDecision};
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Converts a file that is already on disk.
pub struct ConvertJob {
    ctx: Arc<EngineContext>,
    req: ConvertRequest,
}

impl ConvertJob {
    pub fn new(ctx: Arc<EngineContext>, req: ConvertRequest) -> Self {
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
        let input = &self.req.input;
        let tools = &self.ctx.tools;

        if !tokio::fs::try_exists(input).await.unwrap_or(false) {
            return Ok(JobOutcome::Aborted {
                reason: "Input file does not exist.".into(),
            });
        }

        match self.req.target {
            ConvertTarget::Mp3 => {
                let path = naming::sibling_with_extension(input, "mp3");
                reporter.status(format!("Converting to MP3: {}", path.display()));
                ffmpeg::to_mp3(tools, input, &path, control).await?;
                Ok(JobOutcome::AudioSaved { path })
            }
            ConvertTarget::Wav => {
                let path = naming::sibling_with_extension(input, "wav");
                reporter.status(format!("Converting to WAV: {}", path.display()));
                ffmpeg::to_wav(tools, input, &path, control).await?;
                Ok(JobOutcome::AudioSaved { path })
            }
            ConvertTarget::Mp4 => {
                let target = self.req.resolution.height();
                let source = ffmpeg::probe_height(tools, input, self.ctx.probe_timeout).await;
                reporter.status(format!(
                    "Source resolution detected: {}p",
                    source.unwrap_or(0)
                ));

                match decide_scale(source, target) {
                    ScaleDecision::UnknownSource => {
                        reporter
                            .status("Warning: couldn't detect source height; aborting conversion.");
                        Ok(JobOutcome::Aborted {
                            reason: "Conversion aborted: unknown source resolution.".into(),
                        })
                    }
                    ScaleDecision::SkipUpscale { source, target } => {
                        Ok(JobOutcome::SkippedUpscale {
                            file: Some(input.clone()),
                            source,
                            target,
                        })
                    }
                    ScaleDecision::SkipEqual { height } => Ok(JobOutcome::SkippedSameResolution {
                        file: Some(input.clone()),
                        height,
                    }),
                    ScaleDecision::Scale { .. } => {
                        let path =
                            ffmpeg::scale_to_height(tools, input, target, reporter, control).await?;
                        Ok(JobOutcome::Converted {
                            path,
                            height: target,
                        })
                    }
                }
            }
        }
    }
}
