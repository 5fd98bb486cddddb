use crate::model::JobRecord;
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::mpsc as std_mpsc;
use std::sync::OnceLock;
use std::time::Duration;

use super::state::UiState;

// Global clipboard manager channel - initialized once on first use
static CLIPBOARD_SENDER: OnceLock<std_mpsc::Sender<String>> = OnceLock::new();

fn export_file_name(r: &JobRecord) -> String {
    format!(
        "socialclip-{}-{}-{}.json",
        r.kind,
        r.timestamp_utc.replace(':', "-").replace('T', "_"),
        r.id.chars().take(8).collect::<String>()
    )
}

/// Export a history record as JSON into the current directory.
/// Returns the absolute path of the exported file.
pub fn export_record_json(r: &JobRecord) -> Result<PathBuf> {
    let current_dir = std::env::current_dir().context("get current directory")?;
    let path = current_dir.join(export_file_name(r));
    crate::storage::export_json(&path, r)?;
    Ok(path)
}

/// Export the selected history record and remember its path for Ctrl-Y.
pub fn export_selected(state: &mut UiState) {
    let Some(r) = state.selected_record() else {
        state.info = "No history entry selected.".into();
        return;
    };
    match export_record_json(r) {
        Ok(p) => {
            state.last_exported_path = Some(p.to_string_lossy().to_string());
            state.info = format!("Exported JSON: {} (press Ctrl-Y to copy path)", p.display());
        }
        Err(e) => {
            state.info = format!("JSON export failed: {e:#}");
        }
    }
}

/// What Ctrl-Y copies: the last export on the History tab, otherwise the last job output.
pub fn clipboard_candidate(state: &UiState) -> Option<String> {
    if state.tab == super::state::Tab::History {
        if let Some(p) = state.last_exported_path.as_ref() {
            return Some(p.clone());
        }
        if let Some(out) = state.selected_record().and_then(|r| r.output.as_ref()) {
            return Some(out.display().to_string());
        }
    }
    state.last_output.as_ref().map(|p| p.display().to_string())
}

/// Initialize the clipboard manager thread if not already initialized.
/// Each clipboard instance is kept alive long enough for clipboard managers to read it.
fn init_clipboard_manager() -> Result<&'static std_mpsc::Sender<String>> {
    CLIPBOARD_SENDER.get_or_init(|| {
        let (tx, rx) = std_mpsc::channel::<String>();

        std::thread::spawn(move || {
            use arboard::Clipboard;

            for text in rx {
                if let Ok(mut clipboard) = Clipboard::new() {
                    if clipboard.set_text(&text).is_ok() {
                        std::thread::sleep(Duration::from_secs(2));
                    }
                }
            }
        });

        tx
    });

    CLIPBOARD_SENDER
        .get()
        .ok_or_else(|| anyhow::anyhow!("Failed to initialize clipboard manager"))
}

/// Copy text to clipboard without blocking the UI thread.
pub fn copy_to_clipboard(text: &str) -> Result<()> {
    let sender = init_clipboard_manager()?;
    sender
        .send(text.to_string())
        .map_err(|_| anyhow::anyhow!("Clipboard manager channel closed"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::JobKind;
    use crate::tui::state::Tab;

    fn record() -> JobRecord {
        JobRecord {
            id: "0123456789abcdef".into(),
            kind: JobKind::Convert,
            timestamp_utc: "2024-05-01T10:20:30Z".into(),
            source: "/tmp/in.mp4".into(),
            message: "Audio saved: /tmp/in.mp3".into(),
            output: Some(PathBuf::from("/tmp/in.mp3")),
            ok: true,
            elapsed: Duration::from_secs(1),
        }
    }

    #[test]
    fn export_name_is_filesystem_safe() {
        assert_eq!(
            export_file_name(&record()),
            "socialclip-convert-2024-05-01_10-20-30Z-01234567.json"
        );
    }

    #[test]
    fn export_name_handles_short_and_non_ascii_ids() {
        let mut r = record();
        r.id = "ïd-ümlaut-x".into();
        assert!(export_file_name(&r).ends_with("-ïd-ümlau.json"));
        r.id = "ab".into();
        assert!(export_file_name(&r).ends_with("-ab.json"));
    }

    #[test]
    fn clipboard_prefers_history_selection_on_history_tab() {
        let mut state = UiState {
            last_output: Some(PathBuf::from("/tmp/last.mp4")),
            ..Default::default()
        };
        assert_eq!(clipboard_candidate(&state).as_deref(), Some("/tmp/last.mp4"));
        state.tab = Tab::History;
        state.history = vec![record()];
        assert_eq!(clipboard_candidate(&state).as_deref(), Some("/tmp/in.mp3"));
    }
}
