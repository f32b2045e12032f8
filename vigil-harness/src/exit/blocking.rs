//! Synchronous exit manager
//!
//! Wraps directly-invoked business logic. Faults are any `Err` the logic
//! returns plus panics, which are caught at this boundary and converted
//! into a described `Critical` record before the final status is computed.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use anyhow::anyhow;
use tracing::debug;

use vigil_core::domain::severity::ExitStatus;

use crate::logger::RunLogger;

use super::{
    RunEnd, classify_job_error, close_run_log, conclude, note_cleanup_failure,
    note_terminal_condition, panic_message,
};

struct Cleanup {
    label: String,
    run: Box<dyn FnOnce() -> anyhow::Result<()>>,
}

/// Scoped-execution wrapper for synchronous business logic.
///
/// Construction hands the manager a shared [`RunLogger`]; [`run`] makes the
/// logger available to the wrapped logic and guarantees finalization on
/// every exit path. The computed status becomes the process exit code via
/// [`ExitStatus::exit_process`] at the entry point:
///
/// ```no_run
/// use std::sync::Arc;
/// use vigil_harness::exit::ExitManager;
/// use vigil_harness::logger::RunLogger;
///
/// fn main() -> anyhow::Result<()> {
///     let logger = Arc::new(RunLogger::create("logs", "sync_layers")?);
///     let status = ExitManager::new(Arc::clone(&logger)).run(|log| {
///         log.info("starting layer sync")?;
///         // ... business logic ...
///         Ok(())
///     });
///     status.exit_process()
/// }
/// ```
///
/// [`run`]: ExitManager::run
pub struct ExitManager {
    logger: Arc<RunLogger>,
    cleanups: Vec<Cleanup>,
}

impl ExitManager {
    pub fn new(logger: Arc<RunLogger>) -> Self {
        Self {
            logger,
            cleanups: Vec::new(),
        }
    }

    /// Registers a cleanup closure that runs during finalization on every
    /// exit path, in registration order. A cleanup failure is logged at
    /// `Error` and never prevents the remaining cleanups from running.
    pub fn with_cleanup(
        mut self,
        label: impl Into<String>,
        run: impl FnOnce() -> anyhow::Result<()> + 'static,
    ) -> Self {
        self.cleanups.push(Cleanup {
            label: label.into(),
            run: Box::new(run),
        });
        self
    }

    /// Runs the business logic and finalizes, returning the final status.
    ///
    /// Finalization happens exactly once whether the logic completes,
    /// returns an error, signals an early exit, or panics.
    pub fn run<F>(self, job: F) -> ExitStatus
    where
        F: FnOnce(&RunLogger) -> anyhow::Result<()>,
    {
        let logger = Arc::clone(&self.logger);
        let end = match panic::catch_unwind(AssertUnwindSafe(|| job(&logger))) {
            Ok(Ok(())) => RunEnd::Completed,
            Ok(Err(error)) => classify_job_error(error),
            Err(payload) => RunEnd::Fault(anyhow!(
                "job panicked: {}",
                panic_message(payload.as_ref())
            )),
        };
        self.finalize(end)
    }

    fn finalize(mut self, end: RunEnd) -> ExitStatus {
        let mut log_failed = note_terminal_condition(&self.logger, &end);

        for Cleanup { label, run } in self.cleanups.drain(..) {
            // A panicking cleanup must not take finalization down with it.
            let outcome = panic::catch_unwind(AssertUnwindSafe(run)).unwrap_or_else(|payload| {
                Err(anyhow!("cleanup panicked: {}", panic_message(payload.as_ref())))
            });
            if let Err(error) = outcome {
                log_failed |= note_cleanup_failure(&self.logger, &label, &error);
            }
        }

        log_failed |= close_run_log(&self.logger);

        let status = conclude(&self.logger, &end, log_failed);
        debug!(status = %status, "job scope finalized");
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::fs;
    use std::rc::Rc;

    use vigil_core::domain::record::RunRecord;
    use vigil_core::domain::severity::Severity;

    use crate::exit::EarlyExit;

    fn new_logger(dir: &tempfile::TempDir) -> Arc<RunLogger> {
        Arc::new(RunLogger::create(dir.path(), "job").unwrap())
    }

    fn records(logger: &RunLogger) -> Vec<RunRecord> {
        fs::read_to_string(logger.path())
            .unwrap()
            .lines()
            .skip(1)
            .map(|line| RunRecord::parse_line(line).unwrap())
            .collect()
    }

    #[test]
    fn test_clean_run_with_no_records_is_success() {
        let dir = tempfile::tempdir().unwrap();
        let logger = new_logger(&dir);
        let status = ExitManager::new(Arc::clone(&logger)).run(|_| Ok(()));
        assert_eq!(status, ExitStatus::Success);
        assert_eq!(status.code(), 1);
        assert!(records(&logger).is_empty());
    }

    #[test]
    fn test_final_status_reflects_worst_logged_event() {
        let dir = tempfile::tempdir().unwrap();
        let logger = new_logger(&dir);
        let status = ExitManager::new(Arc::clone(&logger)).run(|log| {
            log.info("starting")?;
            log.warning("input layer missing one field")?;
            log.info("finishing anyway")?;
            Ok(())
        });
        assert_eq!(status, ExitStatus::Warning);
        assert_eq!(status.code(), 30);
    }

    #[test]
    fn test_fault_forces_critical_and_is_recorded_last() {
        let dir = tempfile::tempdir().unwrap();
        let logger = new_logger(&dir);
        let status = ExitManager::new(Arc::clone(&logger)).run(|log| {
            log.info("starting")?;
            log.warning("minor drift")?;
            Err(anyhow!("target layer rejected the update"))
        });
        assert_eq!(status, ExitStatus::Critical);

        let records = records(&logger);
        assert_eq!(records.len(), 3);
        assert_eq!(records[2].severity, Severity::Critical);
        assert!(records[2].message.contains("unhandled fault"));
        assert!(records[2].message.contains("target layer rejected the update"));
    }

    #[test]
    fn test_panic_is_caught_and_described() {
        let dir = tempfile::tempdir().unwrap();
        let logger = new_logger(&dir);
        let status = ExitManager::new(Arc::clone(&logger)).run(|_| panic!("index out of range"));
        assert_eq!(status, ExitStatus::Critical);

        let records = records(&logger);
        assert_eq!(records.len(), 1);
        assert!(records[0].message.contains("job panicked"));
        assert!(records[0].message.contains("index out of range"));
    }

    #[test]
    fn test_early_exit_keeps_logged_status() {
        let dir = tempfile::tempdir().unwrap();
        let logger = new_logger(&dir);
        let status = ExitManager::new(Arc::clone(&logger)).run(|log| {
            log.warning("inputs unchanged since last run")?;
            Err(EarlyExit.into())
        });
        assert_eq!(status, ExitStatus::Warning);

        let records = records(&logger);
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].severity, Severity::Info);
        assert!(records[1].message.contains("early exit"));
    }

    #[test]
    fn test_early_exit_with_no_records_is_success() {
        let dir = tempfile::tempdir().unwrap();
        let logger = new_logger(&dir);
        let status = ExitManager::new(Arc::clone(&logger)).run(|_| Err(EarlyExit.into()));
        assert_eq!(status, ExitStatus::Success);
    }

    #[test]
    fn test_cleanups_run_in_order_on_every_path() {
        let dir = tempfile::tempdir().unwrap();
        let logger = new_logger(&dir);
        let order = Rc::new(Cell::new(Vec::new()));

        let first = Rc::clone(&order);
        let second = Rc::clone(&order);
        let status = ExitManager::new(Arc::clone(&logger))
            .with_cleanup("close requester", move || {
                let mut seen = first.take();
                seen.push("close requester");
                first.set(seen);
                Ok(())
            })
            .with_cleanup("shutdown executor", move || {
                let mut seen = second.take();
                seen.push("shutdown executor");
                second.set(seen);
                Ok(())
            })
            .run(|_| Err(anyhow!("fault before cleanup")));

        assert_eq!(status, ExitStatus::Critical);
        assert_eq!(order.take(), vec!["close requester", "shutdown executor"]);
    }

    #[test]
    fn test_cleanup_failure_degrades_status_to_error() {
        let dir = tempfile::tempdir().unwrap();
        let logger = new_logger(&dir);
        let status = ExitManager::new(Arc::clone(&logger))
            .with_cleanup("release token", || Err(anyhow!("token service unreachable")))
            .run(|_| Ok(()));

        assert_eq!(status, ExitStatus::Error);
        let records = records(&logger);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].severity, Severity::Error);
        assert!(records[0].message.contains("release token"));
    }

    #[test]
    fn test_cleanup_panic_is_contained() {
        let dir = tempfile::tempdir().unwrap();
        let logger = new_logger(&dir);
        let second_ran = Rc::new(Cell::new(false));
        let flag = Rc::clone(&second_ran);

        let status = ExitManager::new(Arc::clone(&logger))
            .with_cleanup("drop workspace", || panic!("workspace already gone"))
            .with_cleanup("close requester", move || {
                flag.set(true);
                Ok(())
            })
            .run(|_| Ok(()));

        assert_eq!(status, ExitStatus::Error);
        assert!(second_ran.get());
        let records = records(&logger);
        assert!(records[0].message.contains("cleanup panicked"));
        assert!(records[0].message.contains("workspace already gone"));
    }

    #[test]
    fn test_fault_outranks_cleanup_failure() {
        let dir = tempfile::tempdir().unwrap();
        let logger = new_logger(&dir);
        let status = ExitManager::new(Arc::clone(&logger))
            .with_cleanup("release token", || Err(anyhow!("also broken")))
            .run(|_| Err(anyhow!("primary fault")));
        assert_eq!(status, ExitStatus::Critical);
    }
}
