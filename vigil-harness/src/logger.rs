//! Run logger
//!
//! Durable, ordered, append-only record of everything noteworthy during one
//! job execution, plus a running high-water-mark severity. The logger owns
//! its file exclusively for the execution's lifetime; every `log` call is
//! exactly one append, in call order, so the file faithfully reconstructs
//! what happened and in what order after the process is gone.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;
use tracing::debug;

use vigil_core::domain::record::{RUN_LOG_HEADER, RunRecord};
use vigil_core::domain::severity::{ExitStatus, Severity};

/// Errors from the run log backing store.
///
/// An unwritable run log is fatal to the job: the reliability protocol
/// cannot function without a truthful record, so callers propagate these to
/// the exit manager boundary instead of continuing.
#[derive(Debug, Error)]
pub enum RunLogError {
    #[error("run log I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("run logger lock poisoned")]
    Poisoned,
}

struct LoggerInner {
    file: File,
    high_water: Option<Severity>,
}

/// Append-only log sink for one job execution.
///
/// State lives behind a `Mutex` so a single `Arc<RunLogger>` can be shared
/// between the exit manager and the business logic it wraps. The supported
/// usage is single-threaded cooperative execution; the lock means a stray
/// concurrent caller serializes instead of corrupting the file.
pub struct RunLogger {
    path: PathBuf,
    inner: Mutex<LoggerInner>,
}

impl RunLogger {
    /// Opens `<log_dir>/<script>.log` for appending, creating the directory
    /// as needed and writing the header line if the file is new or empty.
    pub fn create(log_dir: impl AsRef<Path>, script: &str) -> Result<Self, RunLogError> {
        let log_dir = log_dir.as_ref();
        fs::create_dir_all(log_dir)?;

        let path = log_dir.join(format!("{script}.log"));
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;

        if file.metadata()?.len() == 0 {
            writeln!(file, "{RUN_LOG_HEADER}")?;
        }

        debug!(path = %path.display(), "run log opened");

        Ok(Self {
            path,
            inner: Mutex::new(LoggerInner {
                file,
                high_water: None,
            }),
        })
    }

    /// Appends one record with the current UTC timestamp and raises the
    /// high-water mark to `worse_of(current, severity)`.
    pub fn log(&self, severity: Severity, message: impl AsRef<str>) -> Result<(), RunLogError> {
        let mut line = RunRecord::new(severity, message.as_ref()).to_line();
        line.push('\n');

        let mut inner = self.inner.lock().map_err(|_| RunLogError::Poisoned)?;
        inner.file.write_all(line.as_bytes())?;
        inner.high_water = Some(match inner.high_water {
            Some(current) => Severity::worse_of(current, severity),
            None => severity,
        });
        Ok(())
    }

    pub fn info(&self, message: impl AsRef<str>) -> Result<(), RunLogError> {
        self.log(Severity::Info, message)
    }

    pub fn warning(&self, message: impl AsRef<str>) -> Result<(), RunLogError> {
        self.log(Severity::Warning, message)
    }

    pub fn error(&self, message: impl AsRef<str>) -> Result<(), RunLogError> {
        self.log(Severity::Error, message)
    }

    pub fn critical(&self, message: impl AsRef<str>) -> Result<(), RunLogError> {
        self.log(Severity::Critical, message)
    }

    /// Worst severity logged so far this execution, `None` if nothing has
    /// been logged.
    pub fn high_water_mark(&self) -> Option<Severity> {
        match self.inner.lock() {
            Ok(inner) => inner.high_water,
            Err(_) => Some(Severity::Critical),
        }
    }

    /// Exit status implied by the records logged so far: `Success` when
    /// nothing (or only `Info`) has been logged, otherwise the high-water
    /// mark.
    pub fn highest_severity(&self) -> ExitStatus {
        ExitStatus::from_highest_severity(self.high_water_mark())
    }

    /// Flushes and fsyncs the backing file. Called by the exit managers
    /// during finalization; safe to call more than once.
    pub fn sync(&self) -> Result<(), RunLogError> {
        let mut inner = self.inner.lock().map_err(|_| RunLogError::Poisoned)?;
        inner.file.flush()?;
        inner.file.sync_all()?;
        Ok(())
    }

    /// Path of the backing log file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}
