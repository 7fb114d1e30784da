//! Progress reporting
//!
//! Purely observational: a sink never influences the run.

use tracing::info;

/// Receives (units_total, units_done) after each unit reaches a final status
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, units_total: usize, units_done: usize);
}

/// Logs one line per finished unit
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn on_progress(&self, units_total: usize, units_done: usize) {
        info!("{}/{} units processed.", units_done, units_total);
    }
}

/// Discards progress
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn on_progress(&self, _units_total: usize, _units_done: usize) {}
}
