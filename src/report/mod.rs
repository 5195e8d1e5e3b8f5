//! The report pipeline: three ordered phases (structure, sections,
//! summary) executed by a bounded worker pool with resumable state.

pub mod content;
pub mod engine;
pub mod prompts;
pub mod structure;

use tracing::{info, warn};

use crate::store::Report;

pub use engine::ReportEngine;

/// One report submission.
#[derive(Debug, Clone)]
pub struct ReportTask {
    pub report_id: String,
    pub repo_url: String,
    pub git_ref: String,
    pub report_type: String,
}

/// Completion callback. Best effort: failures are logged, never escalated.
pub trait Notifier: Send + Sync {
    fn report_completed(&self, report: &Report);
    fn report_failed(&self, report: &Report);
}

pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn report_completed(&self, report: &Report) {
        info!(
            report = %report.id,
            sections = report.total_sections,
            "report completed"
        );
    }

    fn report_failed(&self, report: &Report) {
        warn!(report = %report.id, error = %report.error, "report failed");
    }
}
