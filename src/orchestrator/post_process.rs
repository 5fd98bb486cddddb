//! Post-job processing utilities.
//!
//! Turns a terminal job event into a history record, auto-saves it and refreshes history.

use crate::model::{AppEvent, JobRecord};
use crate::storage;
use rand::RngCore;
use std::path::PathBuf;
use std::time::Duration;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Result of post-job processing, ready for presentation layers.
pub(crate) struct ProcessedJob {
    pub record: JobRecord,
    pub saved_path: Option<PathBuf>,
    pub save_error: Option<String>,
    pub history: Vec<JobRecord>,
}

/// Random id used in history file names.
fn gen_job_id() -> String {
    let mut b = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut b);
    format!("{:016x}", u64::from_le_bytes(b))
}

fn utc_timestamp() -> String {
    let now = OffsetDateTime::now_utc();
    now.replace_nanosecond(0)
        .unwrap_or(now)
        .format(&Rfc3339)
        .unwrap_or_default()
}

/// Build the history record for a finished or failed job. Other events yield `None`.
fn record_for_event(ev: &AppEvent) -> Option<JobRecord> {
    let (job, source, elapsed_ms, message, output, ok) = match ev {
        AppEvent::JobFinished {
            job,
            source,
            elapsed_ms,
            outcome,
        } => (
            *job,
            source,
            *elapsed_ms,
            outcome.to_message(),
            outcome.output().cloned(),
            outcome.is_success(),
        ),
        AppEvent::JobFailed {
            job,
            source,
            elapsed_ms,
            error,
        } => (*job, source, *elapsed_ms, error.clone(), None, false),
        _ => return None,
    };
    Some(JobRecord {
        id: gen_job_id(),
        kind: job,
        timestamp_utc: utc_timestamp(),
        source: source.clone(),
        message,
        output,
        ok,
        elapsed: Duration::from_millis(elapsed_ms),
    })
}

/// Process a terminal job event: build the record, auto-save, and reload history.
pub(crate) fn process_job_completion(
    ev: &AppEvent,
    auto_save: bool,
    history_load: usize,
) -> Option<ProcessedJob> {
    let record = record_for_event(ev)?;

    let (saved_path, save_error) = if auto_save {
        match storage::save_record(&record) {
            Ok(p) => (Some(p), None),
            Err(e) => {
                tracing::warn!("failed to save job record: {e:#}");
                (None, Some(format!("Save failed: {e:#}")))
            }
        }
    } else {
        (None, None)
    };

    let history = if history_load == 0 {
        Vec::new()
    } else {
        storage::load_recent(history_load).unwrap_or_default()
    };

    Some(ProcessedJob {
        record,
        saved_path,
        save_error,
        history,
    })
}
