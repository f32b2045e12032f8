//! Ledger entries
//!
//! The shared ledger holds one CSV row per completed job execution across
//! the whole fleet. Field order and presence are fixed; new fields may only
//! ever be appended to the row, never inserted, so existing consumers keep
//! working.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::timestamp::{self, TimestampError};

const FIELD_SEPARATOR: char = ',';

/// One row of the shared exit ledger.
///
/// `exit_code` is the raw integer the supervisor observed. It is recorded
/// verbatim even when it is not a recognized [`ExitStatus`] code: a process
/// that crashed before the exit protocol could run still gets a row, which
/// is what lets downstream alerting notice ungoverned failures.
///
/// [`ExitStatus`]: crate::domain::severity::ExitStatus
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub timestamp: DateTime<Utc>,
    pub project: String,
    pub script: String,
    pub exit_code: i32,
}

impl LedgerEntry {
    /// Creates an entry stamped with the current UTC time.
    pub fn new(project: impl Into<String>, script: impl Into<String>, exit_code: i32) -> Self {
        Self {
            timestamp: timestamp::now_utc(),
            project: project.into(),
            script: script.into(),
            exit_code,
        }
    }

    /// Renders the entry as exactly one ledger row (no trailing newline).
    pub fn to_row(&self) -> String {
        format!(
            "{}{FIELD_SEPARATOR}{}{FIELD_SEPARATOR}{}{FIELD_SEPARATOR}{}",
            timestamp::iso_utc(self.timestamp),
            sanitize_identifier(&self.project),
            sanitize_identifier(&self.script),
            self.exit_code,
        )
    }

    /// Parses one ledger row.
    ///
    /// Fields appended after `exit_code` by a newer writer are ignored, per
    /// the append-only compatibility rule.
    pub fn parse_row(row: &str) -> Result<Self, ParseRowError> {
        let mut fields = row.trim_end_matches(['\r', '\n']).split(FIELD_SEPARATOR);
        let timestamp = fields.next().ok_or(ParseRowError::MissingFields)?;
        let project = fields.next().ok_or(ParseRowError::MissingFields)?;
        let script = fields.next().ok_or(ParseRowError::MissingFields)?;
        let exit_code = fields.next().ok_or(ParseRowError::MissingFields)?;
        Ok(Self {
            timestamp: timestamp::parse_iso_utc(timestamp)?,
            project: project.to_string(),
            script: script.to_string(),
            exit_code: exit_code
                .parse()
                .map_err(|_| ParseRowError::ExitCode(exit_code.to_string()))?,
        })
    }
}

/// Replaces characters that would break the one-row-per-execution format:
/// the field separator becomes `<replaced_comma>` and line breaks become
/// `<br>`.
pub fn sanitize_identifier(identifier: &str) -> String {
    identifier
        .replace(FIELD_SEPARATOR, "<replaced_comma>")
        .replace("\r\n", "<br>")
        .replace(['\r', '\n'], "<br>")
}

/// Errors from parsing a ledger row.
#[derive(Debug, Error)]
pub enum ParseRowError {
    #[error("ledger row does not have timestamp,project,script,exit_code fields")]
    MissingFields,
    #[error(transparent)]
    Timestamp(#[from] TimestampError),
    #[error("ledger row has a non-integer exit code: {0}")]
    ExitCode(String),
}
