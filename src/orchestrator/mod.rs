//! Application-level orchestration utilities.
//!
//! This module owns job lifecycle control (start/cancel/quit) and post-job processing
//! such as history records and auto-save. UI/CLI layers call into this module to keep
//! responsibilities separated.

mod controller;
mod post_process;

pub(crate) use controller::{run_controller, UiCommand};
pub(crate) use post_process::{process_job_completion, ProcessedJob};
