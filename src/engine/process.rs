use crate::engine::{Cancelled, JobControl};
use anyhow::{Context, Result};
use std::collections::VecDeque;
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

/// Number of stderr lines kept for error reports.
const STDERR_TAIL: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Stream {
    Stdout,
    Stderr,
}

/// Captured result of a finished tool invocation.
#[derive(Debug)]
pub(crate) struct ProcessRun {
    pub program: String,
    pub status: ExitStatus,
    pub stdout_lines: Vec<String>,
    pub stderr_tail: VecDeque<String>,
}

impl ProcessRun {
    pub fn ensure_success(&self) -> Result<()> {
        if self.status.success() {
            return Ok(());
        }
        let tail: Vec<&str> = self
            .stderr_tail
            .iter()
            .map(String::as_str)
            .filter(|l| !l.trim().is_empty())
            .collect();
        if tail.is_empty() {
            anyhow::bail!("{} exited with {}", self.program, self.status);
        }
        anyhow::bail!(
            "{} exited with {}: {}",
            self.program,
            self.status,
            tail.join(" | ")
        )
    }
}

/// Run `cmd` to completion, feeding every output line to `on_line`.
///
/// A `JobControl::Cancel` received while the process runs kills it and yields a
/// [`Cancelled`] error.
pub(crate) async fn run_tool<F>(
    mut cmd: Command,
    control: &mut mpsc::UnboundedReceiver<JobControl>,
    mut on_line: F,
) -> Result<ProcessRun>
where
    F: FnMut(Stream, &str),
{
    let program = cmd.as_std().get_program().to_string_lossy().into_owned();
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    tracing::debug!(program = %program, args = ?cmd.as_std().get_args().collect::<Vec<_>>(), "spawning tool");
    let mut child = cmd
        .spawn()
        .with_context(|| format!("failed to start {program}"))?;

    let (line_tx, mut line_rx) = mpsc::unbounded_channel::<(Stream, String)>();
    if let Some(out) = child.stdout.take() {
        spawn_line_reader(out, Stream::Stdout, line_tx.clone());
    }
    if let Some(err) = child.stderr.take() {
        spawn_line_reader(err, Stream::Stderr, line_tx.clone());
    }
    drop(line_tx);

    let mut stdout_lines = Vec::new();
    let mut stderr_tail = VecDeque::with_capacity(STDERR_TAIL);
    let mut control_open = true;

    loop {
        tokio::select! {
            line = line_rx.recv() => match line {
                Some((stream, line)) => {
                    on_line(stream, &line);
                    match stream {
                        Stream::Stdout => stdout_lines.push(line),
                        Stream::Stderr => {
                            if stderr_tail.len() == STDERR_TAIL {
                                stderr_tail.pop_front();
                            }
                            stderr_tail.push_back(line);
                        }
                    }
                }
                // Both pipes closed: the process is exiting.
                None => break,
            },
            msg = control.recv(), if control_open => match msg {
                Some(JobControl::Cancel) => {
                    tracing::info!(program = %program, "killing tool on cancel");
                    let _ = child.kill().await;
                    return Err(Cancelled.into());
                }
                None => control_open = false,
            },
        }
    }

    let status = child
        .wait()
        .await
        .with_context(|| format!("failed to wait for {program}"))?;
    tracing::debug!(program = %program, %status, "tool exited");

    Ok(ProcessRun {
        program,
        status,
        stdout_lines,
        stderr_tail,
    })
}

fn spawn_line_reader<R>(reader: R, stream: Stream, tx: mpsc::UnboundedSender<(Stream, String)>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut raw = Vec::new();
        loop {
            raw.clear();
            match reader.read_until(b'\n', &mut raw).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    while matches!(raw.last(), Some(b'\n' | b'\r')) {
                        raw.pop();
                    }
                    let line = String::from_utf8_lossy(&raw).into_owned();
                    if tx.send((stream, line)).is_err() {
                        break;
                    }
                }
            }
        }
    });
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn collects_stdout_and_stderr_lines() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("echo one; echo two; echo oops >&2");
        let (_tx, mut rx) = mpsc::unbounded_channel();
        let mut seen = Vec::new();
        let run = run_tool(cmd, &mut rx, |s, l| seen.push((s, l.to_string())))
            .await
            .unwrap();
        assert!(run.status.success());
        assert_eq!(run.stdout_lines, vec!["one", "two"]);
        assert_eq!(run.stderr_tail.back().map(String::as_str), Some("oops"));
        assert_eq!(seen.len(), 3);
    }

    #[tokio::test]
    async fn failure_carries_stderr_tail() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("echo broken input >&2; exit 3");
        let (_tx, mut rx) = mpsc::unbounded_channel();
        let run = run_tool(cmd, &mut rx, |_, _| {}).await.unwrap();
        let err = run.ensure_success().unwrap_err().to_string();
        assert!(err.contains("broken input"), "{err}");
    }

    #[tokio::test]
    async fn cancel_kills_running_process() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("sleep 30");
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.send(JobControl::Cancel).unwrap();
        let err = run_tool(cmd, &mut rx, |_, _| {}).await.unwrap_err();
        assert!(err.downcast_ref::<Cancelled>().is_some());
    }

    #[tokio::test]
    async fn missing_program_is_an_error() {
        let cmd = Command::new("definitely-not-a-real-tool-xyz");
        let (_tx, mut rx) = mpsc::unbounded_channel();
        let err = run_tool(cmd, &mut rx, |_, _| {}).await.unwrap_err();
        assert!(format!("{err:#}").contains("failed to start"));
    }
}
