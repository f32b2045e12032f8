//! Exit managers
//!
//! A scoped wrapper around a job's business logic that guarantees a final,
//! truthful exit status on every termination path: clean completion, a
//! handled degraded outcome, an unhandled fault, or (asynchronously)
//! cancellation and timeout. The "resource" being released here is the
//! obligation to emit a truthful exit code; release happens exactly once,
//! on every path.
//!
//! One capability, two backing strategies:
//! - [`ExitManager`] wraps directly-invoked business logic
//! - [`AsyncExitManager`] wraps a suspendable task and wires in
//!   cancellation and timeout
//!
//! Both share the same finalization sequence: record the terminal
//! condition, run registered cleanups, flush the run log, compute the final
//! status. Faults are caught exactly once at this boundary and never
//! re-raised; the process boundary is the final handler.

mod asynchronous;
mod blocking;

pub use asynchronous::AsyncExitManager;
pub use blocking::ExitManager;

use std::time::Duration;

use thiserror::Error;

use vigil_core::domain::severity::ExitStatus;
use vigil_core::timestamp;

use crate::logger::{RunLogError, RunLogger};

/// Signal a job returns to finish early without it being a fault.
///
/// The business logic returns `Err(EarlyExit.into())` when it discovers
/// there is nothing left to do (no inputs changed, upstream already
/// current). The exit manager detects it by downcast, notes it at `Info`,
/// and finishes with whatever status the run's records imply.
#[derive(Debug, Error)]
#[error("early exit signal")]
pub struct EarlyExit;

/// Longest fault description that will be written into a single record.
const MAX_FAULT_CHARS: usize = 5_000;

/// Condenses an error chain into one run-log-safe line: the full `{:#}`
/// chain with whitespace runs squeezed to single spaces and the result
/// truncated to [`MAX_FAULT_CHARS`].
pub fn describe_fault(error: &anyhow::Error) -> String {
    let mut description = format!("{error:#}")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    if description.chars().count() > MAX_FAULT_CHARS {
        description = description.chars().take(MAX_FAULT_CHARS).collect();
        description.push_str("...");
    }

    description
}

/// Why an asynchronous job was cancelled.
#[derive(Debug)]
pub(crate) enum CancelCause {
    Timeout(Duration),
    Signal,
}

/// How the wrapped business logic ended.
pub(crate) enum RunEnd {
    Completed,
    EarlyExit,
    Fault(anyhow::Error),
    Cancelled(CancelCause),
}

/// Splits the job's error into the early-exit signal vs. a real fault.
pub(crate) fn classify_job_error(error: anyhow::Error) -> RunEnd {
    if error.downcast_ref::<EarlyExit>().is_some() {
        RunEnd::EarlyExit
    } else {
        RunEnd::Fault(error)
    }
}

/// Best-effort extraction of a panic payload's message.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Last-resort reporting channel for when the run log itself cannot be
/// written during finalization. The line is timestamped so it stays usable
/// as evidence even outside the log file.
pub(crate) fn stderr_fallback(context: &str, error: &RunLogError) {
    eprintln!(
        "{} ---> run log unavailable while {context}: {error}",
        timestamp::now_utc_iso()
    );
}

/// Writes the record describing how the run ended. Returns `true` if the
/// run log could not be written.
pub(crate) fn note_terminal_condition(logger: &RunLogger, end: &RunEnd) -> bool {
    let written = match end {
        RunEnd::Completed => return false,
        RunEnd::EarlyExit => {
            logger.info("early exit signal received; finishing with logged status")
        }
        RunEnd::Fault(error) => logger.critical(format!("unhandled fault: {}", describe_fault(error))),
        RunEnd::Cancelled(CancelCause::Timeout(limit)) => {
            logger.critical(format!("job cancelled: timed out after {limit:?}"))
        }
        RunEnd::Cancelled(CancelCause::Signal) => {
            logger.critical("job cancelled: cancellation signal received")
        }
    };

    match written {
        Ok(()) => false,
        Err(error) => {
            stderr_fallback("recording the terminal condition", &error);
            true
        }
    }
}

/// Records one failed cleanup at `Error`. Returns `true` if the run log
/// could not be written.
pub(crate) fn note_cleanup_failure(logger: &RunLogger, label: &str, error: &anyhow::Error) -> bool {
    tracing::warn!(cleanup = label, "cleanup failed: {error:#}");
    match logger.error(format!("cleanup '{label}' failed: {}", describe_fault(error))) {
        Ok(()) => false,
        Err(log_error) => {
            stderr_fallback("recording a cleanup failure", &log_error);
            true
        }
    }
}

/// Flushes the run log at the end of the scope. Returns `true` on failure.
pub(crate) fn close_run_log(logger: &RunLogger) -> bool {
    match logger.sync() {
        Ok(()) => false,
        Err(error) => {
            stderr_fallback("flushing the run log", &error);
            true
        }
    }
}

/// Final status for the execution.
///
/// An unhandled fault or a cancellation is `Critical` unconditionally, even
/// if some code path already reported a lower severity. A finalization-time
/// logging failure also resolves to `Critical`: once the audit trail cannot
/// be completed, the worst determinable status is the only truthful answer.
/// Every other path takes the run log's high-water mark.
pub(crate) fn conclude(logger: &RunLogger, end: &RunEnd, log_failed: bool) -> ExitStatus {
    if log_failed {
        return ExitStatus::Critical;
    }
    match end {
        RunEnd::Fault(_) | RunEnd::Cancelled(_) => ExitStatus::Critical,
        RunEnd::Completed | RunEnd::EarlyExit => logger.highest_severity(),
    }
}
