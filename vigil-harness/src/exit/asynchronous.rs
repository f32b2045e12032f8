//! Asynchronous exit manager
//!
//! The same contract as the synchronous manager for business logic that may
//! suspend (network I/O, timers). The job runs on its own spawned task so
//! that once cancellation is observed (an elapsed timeout or an external
//! signal, the only two sources) finalization runs to completion even if
//! the job is suspended mid-operation and never resumes.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use tokio::task::JoinError;
use tracing::debug;

use vigil_core::domain::severity::ExitStatus;

use crate::logger::RunLogger;

use super::{
    CancelCause, RunEnd, classify_job_error, close_run_log, conclude, note_cleanup_failure,
    note_terminal_condition, panic_message,
};

type CancelSignal = Pin<Box<dyn Future<Output = ()> + Send>>;
type CleanupFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

struct Cleanup {
    label: String,
    run: Box<dyn FnOnce() -> CleanupFuture + Send>,
}

/// Scoped-execution wrapper for suspendable business logic.
///
/// The scheduling model is single-threaded cooperative concurrency: one
/// logical thread of control per job, so run log ordering stays a total
/// order. Cancellation resolves to `Critical` like a fault does, but with a
/// distinguishing record so the durable trail separates "the job was killed
/// externally" from "the job's own logic broke".
///
/// ```no_run
/// use std::sync::Arc;
/// use std::time::Duration;
/// use vigil_harness::exit::AsyncExitManager;
/// use vigil_harness::logger::RunLogger;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let logger = Arc::new(RunLogger::create("logs", "poll_feeds")?);
///     let status = AsyncExitManager::new(Arc::clone(&logger))
///         .with_timeout(Duration::from_secs(900))
///         .run(|log| async move {
///             log.info("polling upstream feeds")?;
///             // ... suspendable business logic ...
///             Ok(())
///         })
///         .await;
///     status.exit_process()
/// }
/// ```
pub struct AsyncExitManager {
    logger: Arc<RunLogger>,
    timeout: Option<Duration>,
    cancel_signal: Option<CancelSignal>,
    cleanups: Vec<Cleanup>,
}

impl AsyncExitManager {
    pub fn new(logger: Arc<RunLogger>) -> Self {
        Self {
            logger,
            timeout: None,
            cancel_signal: None,
            cleanups: Vec::new(),
        }
    }

    /// Cancels the job once `timeout` has elapsed.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Cancels the job when `signal` resolves (e.g. `tokio::signal::ctrl_c`
    /// or a supervisor-held channel).
    pub fn with_cancel_signal<S>(mut self, signal: S) -> Self
    where
        S: Future<Output = ()> + Send + 'static,
    {
        self.cancel_signal = Some(Box::pin(signal));
        self
    }

    /// Registers an asynchronous cleanup that runs during finalization on
    /// every exit path, in registration order. Each cleanup runs to
    /// completion; a failure is logged at `Error` and never prevents the
    /// remaining cleanups from running.
    pub fn with_cleanup<F, Fut>(mut self, label: impl Into<String>, run: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.cleanups.push(Cleanup {
            label: label.into(),
            run: Box::new(move || Box::pin(run())),
        });
        self
    }

    /// Spawns the business logic, waits for it to end or be cancelled, and
    /// finalizes, returning the final status.
    ///
    /// Finalization happens exactly once whether the logic completes,
    /// returns an error, signals an early exit, panics, or is cancelled
    /// while suspended.
    pub async fn run<F, Fut>(mut self, job: F) -> ExitStatus
    where
        F: FnOnce(Arc<RunLogger>) -> Fut,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let mut handle = tokio::spawn(job(Arc::clone(&self.logger)));
        let timeout = self.timeout.take();
        let cancel_signal = self.cancel_signal.take();

        let end = tokio::select! {
            joined = &mut handle => classify_join(joined),
            cause = cancellation(timeout, cancel_signal) => {
                handle.abort();
                // Wait the aborted task out so no business logic is still
                // running (or holding the logger) during finalization.
                let _ = handle.await;
                RunEnd::Cancelled(cause)
            }
        };

        self.finalize(end).await
    }

    async fn finalize(mut self, end: RunEnd) -> ExitStatus {
        let mut log_failed = note_terminal_condition(&self.logger, &end);

        for Cleanup { label, run } in self.cleanups.drain(..) {
            // Spawned so a panicking cleanup surfaces as a JoinError instead
            // of taking finalization down with it.
            let outcome = match tokio::spawn(run()).await {
                Ok(outcome) => outcome,
                Err(join_error) if join_error.is_panic() => {
                    let payload = join_error.into_panic();
                    Err(anyhow!("cleanup panicked: {}", panic_message(payload.as_ref())))
                }
                Err(_) => Err(anyhow!("cleanup task aborted")),
            };
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

/// Resolves when either cancellation source fires; pends forever when
/// neither is configured.
async fn cancellation(timeout: Option<Duration>, signal: Option<CancelSignal>) -> CancelCause {
    let deadline = async {
        match timeout {
            Some(limit) => {
                tokio::time::sleep(limit).await;
                CancelCause::Timeout(limit)
            }
            None => std::future::pending().await,
        }
    };
    let external = async {
        match signal {
            Some(signal) => {
                signal.await;
                CancelCause::Signal
            }
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        cause = deadline => cause,
        cause = external => cause,
    }
}

fn classify_join(joined: Result<anyhow::Result<()>, JoinError>) -> RunEnd {
    match joined {
        Ok(Ok(())) => RunEnd::Completed,
        Ok(Err(error)) => classify_job_error(error),
        Err(join_error) if join_error.is_panic() => {
            let payload = join_error.into_panic();
            RunEnd::Fault(anyhow!("job panicked: {}", panic_message(payload.as_ref())))
        }
        Err(_) => RunEnd::Fault(anyhow!("job task aborted outside the exit protocol")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::atomic::{AtomicBool, Ordering};

    use tokio::sync::oneshot;

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

    #[tokio::test]
    async fn test_clean_async_run_is_success() {
        let dir = tempfile::tempdir().unwrap();
        let logger = new_logger(&dir);
        let status = AsyncExitManager::new(Arc::clone(&logger))
            .run(|log| async move {
                log.info("polling")?;
                Ok(())
            })
            .await;
        assert_eq!(status, ExitStatus::Success);
    }

    #[tokio::test]
    async fn test_async_fault_forces_critical() {
        let dir = tempfile::tempdir().unwrap();
        let logger = new_logger(&dir);
        let status = AsyncExitManager::new(Arc::clone(&logger))
            .run(|log| async move {
                log.warning("upstream slow")?;
                Err(anyhow!("upstream returned malformed payload"))
            })
            .await;
        assert_eq!(status, ExitStatus::Critical);

        let records = records(&logger);
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].severity, Severity::Critical);
        assert!(records[1].message.contains("unhandled fault"));
    }

    #[tokio::test]
    async fn test_task_panic_is_a_described_fault() {
        let dir = tempfile::tempdir().unwrap();
        let logger = new_logger(&dir);
        let status = AsyncExitManager::new(Arc::clone(&logger))
            .run(|_| async move { panic!("slice bounds") })
            .await;
        assert_eq!(status, ExitStatus::Critical);
        assert!(records(&logger)[0].message.contains("slice bounds"));
    }

    #[tokio::test]
    async fn test_timeout_cancels_suspended_job() {
        let dir = tempfile::tempdir().unwrap();
        let logger = new_logger(&dir);
        let status = AsyncExitManager::new(Arc::clone(&logger))
            .with_timeout(Duration::from_millis(50))
            .run(|log| async move {
                log.info("fetched page one")?;
                tokio::time::sleep(Duration::from_secs(3600)).await;
                log.info("never reached")?;
                Ok(())
            })
            .await;

        assert_eq!(status, ExitStatus::Critical);
        assert_eq!(status.code(), 50);

        let records = records(&logger);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].message, "fetched page one");
        assert_eq!(records[1].severity, Severity::Critical);
        assert!(records[1].message.contains("timed out after 50ms"));
    }

    #[tokio::test]
    async fn test_cancel_signal_yields_exactly_one_cancellation_record() {
        let dir = tempfile::tempdir().unwrap();
        let logger = new_logger(&dir);
        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
        let (suspended_tx, suspended_rx) = oneshot::channel::<()>();

        let manager = AsyncExitManager::new(Arc::clone(&logger)).with_cancel_signal(async {
            let _ = cancel_rx.await;
        });

        let run = manager.run(|log| async move {
            log.warning("halfway checkpoint")?;
            let _ = suspended_tx.send(());
            std::future::pending::<()>().await;
            Ok(())
        });
        tokio::pin!(run);

        // Let the job reach its suspension point, then cancel externally.
        tokio::select! {
            _ = &mut run => panic!("job should still be suspended"),
            _ = suspended_rx => {}
        }
        cancel_tx.send(()).unwrap();
        let status = run.await;

        assert_eq!(status, ExitStatus::Critical);
        let records = records(&logger);
        let cancellations: Vec<_> = records
            .iter()
            .filter(|r| r.message.contains("cancellation signal received"))
            .collect();
        assert_eq!(cancellations.len(), 1);
        assert_eq!(records[0].message, "halfway checkpoint");
    }

    #[tokio::test]
    async fn test_async_early_exit_keeps_logged_status() {
        let dir = tempfile::tempdir().unwrap();
        let logger = new_logger(&dir);
        let status = AsyncExitManager::new(Arc::clone(&logger))
            .run(|log| async move {
                log.info("no new features upstream")?;
                Err(EarlyExit.into())
            })
            .await;
        assert_eq!(status, ExitStatus::Success);
    }

    #[tokio::test]
    async fn test_async_cleanups_run_after_cancellation() {
        let dir = tempfile::tempdir().unwrap();
        let logger = new_logger(&dir);
        let cleaned = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cleaned);

        let status = AsyncExitManager::new(Arc::clone(&logger))
            .with_timeout(Duration::from_millis(10))
            .with_cleanup("close requester", move || async move {
                flag.store(true, Ordering::SeqCst);
                Ok(())
            })
            .run(|_| async move {
                std::future::pending::<()>().await;
                Ok(())
            })
            .await;

        assert_eq!(status, ExitStatus::Critical);
        assert!(cleaned.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_async_cleanup_failure_degrades_status() {
        let dir = tempfile::tempdir().unwrap();
        let logger = new_logger(&dir);
        let status = AsyncExitManager::new(Arc::clone(&logger))
            .with_cleanup("shutdown executor", || async {
                Err(anyhow!("executor still busy"))
            })
            .run(|_| async { Ok(()) })
            .await;

        assert_eq!(status, ExitStatus::Error);
        assert!(records(&logger)[0].message.contains("shutdown executor"));
    }
}
