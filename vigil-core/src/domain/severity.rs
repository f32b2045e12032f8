//! Severity and exit-status model
//!
//! Every job in the fleet reports its outcome through two closely related
//! enumerations: [`Severity`] classifies individual logged events, and
//! [`ExitStatus`] is the terminal code the job process exits with. The three
//! degraded levels reuse the 30/40/50 numeric convention of generic logging
//! severities so downstream tooling can interpret exit codes without
//! translation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Severity of a single logged event.
///
/// The levels form a total order (`Info < Warning < Error < Critical`) used
/// to reduce a run's records down to a single high-water mark. `Info` is
/// recorded for the audit trail but never degrades a run's status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    /// Every severity, in ascending order.
    pub const ALL: [Severity; 4] = [
        Severity::Info,
        Severity::Warning,
        Severity::Error,
        Severity::Critical,
    ];

    /// Fixed numeric code for this severity.
    pub fn code(self) -> i32 {
        match self {
            Severity::Info => 20,
            Severity::Warning => 30,
            Severity::Error => 40,
            Severity::Critical => 50,
        }
    }

    /// Reduces two severities to the worse one.
    ///
    /// Commutative and associative, so a run's high-water mark is independent
    /// of the order in which events were logged.
    pub fn worse_of(a: Severity, b: Severity) -> Severity {
        a.max(b)
    }

    /// Uppercase name as it appears in run log records.
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
            Severity::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown severity name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown severity name: {0}")]
pub struct ParseSeverityError(pub String);

impl FromStr for Severity {
    type Err = ParseSeverityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INFO" => Ok(Severity::Info),
            "WARNING" => Ok(Severity::Warning),
            "ERROR" => Ok(Severity::Error),
            "CRITICAL" => Ok(Severity::Critical),
            other => Err(ParseSeverityError(other.to_string())),
        }
    }
}

/// Terminal status of one job execution, and the process exit code it
/// terminates with.
///
/// `Success` carries a fixed non-zero code so that a programming error which
/// treats the status as a boolean still yields an observable, non-silent
/// outcome. It is the floor used when no degraded event and no fault
/// occurred; it does not participate in the severity ordering, which is why
/// this type derives no `Ord`. Aggregation happens over [`Severity`] and
/// maps down to a status once, at scope exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExitStatus {
    Success,
    Warning,
    Error,
    Critical,
}

impl ExitStatus {
    /// Fixed numeric exit code for this status.
    pub fn code(self) -> i32 {
        match self {
            ExitStatus::Success => 1,
            ExitStatus::Warning => 30,
            ExitStatus::Error => 40,
            ExitStatus::Critical => 50,
        }
    }

    /// Maps a recognized exit code back to its status.
    ///
    /// Returns `None` for anything else, including `0`: a process that
    /// exited zero never ran the exit protocol at all, and the supervisor
    /// must treat it as an ungoverned failure.
    pub fn from_code(code: i32) -> Option<ExitStatus> {
        match code {
            1 => Some(ExitStatus::Success),
            30 => Some(ExitStatus::Warning),
            40 => Some(ExitStatus::Error),
            50 => Some(ExitStatus::Critical),
            _ => None,
        }
    }

    /// Status for a run whose worst logged event was `highest`, or with no
    /// records at all (`None`).
    pub fn from_highest_severity(highest: Option<Severity>) -> ExitStatus {
        match highest {
            None | Some(Severity::Info) => ExitStatus::Success,
            Some(Severity::Warning) => ExitStatus::Warning,
            Some(Severity::Error) => ExitStatus::Error,
            Some(Severity::Critical) => ExitStatus::Critical,
        }
    }

    pub fn is_success(self) -> bool {
        matches!(self, ExitStatus::Success)
    }

    /// Uppercase name of this status.
    pub fn as_str(self) -> &'static str {
        match self {
            ExitStatus::Success => "SUCCESS",
            ExitStatus::Warning => "WARNING",
            ExitStatus::Error => "ERROR",
            ExitStatus::Critical => "CRITICAL",
        }
    }

    /// Terminates the hosting process with this status as its exit code.
    ///
    /// Entry points call this with the status computed by an exit manager so
    /// the supervisor observes the severity-derived code on every exit path.
    pub fn exit_process(self) -> ! {
        std::process::exit(self.code())
    }
}

impl From<Severity> for ExitStatus {
    fn from(severity: Severity) -> Self {
        ExitStatus::from_highest_severity(Some(severity))
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
