//! Vigil Ledger
//!
//! The supervisor side of the Vigil health-reporting protocol. After a job
//! process has fully terminated, the supervisor captures its exit code and
//! appends exactly one row to the shared fleet ledger through
//! [`LedgerWriter`]. The job process itself never touches the ledger.
//!
//! The ledger is a multi-writer, append-only file shared by every job on
//! the host. The only concurrency discipline is that each append is atomic
//! with respect to other appends: a row is written with a single
//! `write_all` on a file opened in append mode, so rows from overlapping
//! writers may interleave in any order but never inside one another. There
//! is no lock manager and no read-modify-write.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, error};

use vigil_core::domain::ledger::LedgerEntry;

/// Errors from appending to the shared ledger.
///
/// The writer never retries: an unappendable ledger is itself an alertable
/// condition, handled by filesystem monitoring outside this protocol, and
/// by the time the writer runs the job's exit status is already fixed.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger append failed: {0}")]
    Io(#[from] io::Error),
}

/// Appends completed-job rows to the shared ledger file.
pub struct LedgerWriter {
    path: PathBuf,
}

impl LedgerWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Appends exactly one row for one terminated job execution.
    ///
    /// Opens the ledger in append mode (creating it if missing) and writes
    /// the whole row, newline included, in a single `write_all`.
    pub fn append(&self, entry: &LedgerEntry) -> Result<(), LedgerError> {
        let mut row = entry.to_row();
        row.push('\n');

        let result = self.append_bytes(row.as_bytes());
        match &result {
            Ok(()) => debug!(
                ledger = %self.path.display(),
                project = %entry.project,
                script = %entry.script,
                exit_code = entry.exit_code,
                "ledger row appended"
            ),
            Err(append_error) => error!(
                ledger = %self.path.display(),
                project = %entry.project,
                script = %entry.script,
                "ledger append failed: {append_error}"
            ),
        }
        result
    }

    fn append_bytes(&self, row: &[u8]) -> Result<(), LedgerError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(row)?;
        file.flush()?;
        Ok(())
    }

    /// Path of the shared ledger file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}
