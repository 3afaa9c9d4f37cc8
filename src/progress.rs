//! Progress tracking and the cooperative abort protocol

use crate::{Error, Result};

/// Snapshot handed to the progress observer
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportProgress {
    pub total_tables: usize,
    pub completed_tables: usize,
    /// Unknown until the header has been parsed
    pub total_rows: Option<u64>,
    pub completed_rows: u64,
    pub done: bool,
}

/// Observer for progress snapshots. Returning `true` requests abort.
pub type ProgressCallback = Box<dyn FnMut(&ImportProgress) -> bool + Send>;

/// Accumulates counters and forwards snapshots to the observer
pub struct ProgressTracker {
    progress: ImportProgress,
    callback: Option<ProgressCallback>,
}

impl ProgressTracker {
    pub fn new(total_tables: usize, total_rows: u64, callback: Option<ProgressCallback>) -> Self {
        Self {
            progress: ImportProgress {
                total_tables,
                total_rows: Some(total_rows),
                ..Default::default()
            },
            callback,
        }
    }

    pub fn progress(&self) -> &ImportProgress {
        &self.progress
    }

    /// Invoke the observer; fails with [`Error::Aborted`] if it asks to stop
    pub fn notify(&mut self) -> Result<()> {
        let Some(callback) = self.callback.as_mut() else {
            return Ok(());
        };
        if callback(&self.progress) {
            tracing::info!(
                "Import aborted by observer at {}/{} rows",
                self.progress.completed_rows,
                self.progress.total_rows.unwrap_or_default()
            );
            return Err(Error::Aborted);
        }
        Ok(())
    }

    /// Count rows handed to storage. Never moves past the declared total.
    pub fn add_rows(&mut self, rows: usize) {
        let next = self.progress.completed_rows.saturating_add(rows as u64);
        self.progress.completed_rows = match self.progress.total_rows {
            Some(total) if next > total => {
                tracing::warn!("Export holds more rows than its manifest declares ({} > {})", next, total);
                total
            }
            _ => next,
        };
    }

    pub fn complete_table(&mut self) {
        self.progress.completed_tables += 1;
    }

    /// Final notification with `done = true`
    pub fn finish(&mut self) -> Result<()> {
        self.progress.done = true;
        self.notify()
    }
}
