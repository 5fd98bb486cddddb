//! tracing subscriber setup.
//!
//! The TUI owns the terminal, so in that mode logs go to a file. Headless modes log to stderr.

use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

fn filter(verbose: bool, fallback: &str) -> EnvFilter {
    if verbose {
        return EnvFilter::new("socialclip=debug");
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback))
}

fn open_log_file(dir: &Path) -> Result<(File, PathBuf)> {
    std::fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    let path = dir.join("socialclip.log");
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("open {}", path.display()))?;
    Ok((file, path))
}

/// Log to `<data dir>/socialclip/logs/socialclip.log`. Returns the log path.
pub fn init_file(verbose: bool) -> Result<PathBuf> {
    let (file, path) = open_log_file(&crate::storage::log_dir())?;
    tracing_subscriber::fmt()
        .with_env_filter(filter(verbose, "socialclip=info"))
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install logger: {e}"))?;
    Ok(path)
}

/// Log to stderr; quiet unless `--verbose` or `RUST_LOG` asks for more.
pub fn init_stderr(verbose: bool) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter(verbose, "warn"))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_file_is_created_and_appendable() {
        let dir = tempfile::tempdir().unwrap();
        let (_f, path) = open_log_file(&dir.path().join("logs")).unwrap();
        assert!(path.exists());
        let (_f, again) = open_log_file(&dir.path().join("logs")).unwrap();
        assert_eq!(path, again);
    }
}
