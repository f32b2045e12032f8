//! Run log records
//!
//! One record is appended to a job's private run log for every event worth
//! keeping. The on-disk form is one pipe-delimited line per record, under a
//! single header line, so the file stays trivially greppable and parseable
//! by downstream tooling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::severity::{ParseSeverityError, Severity};
use crate::timestamp::{self, TimestampError};

/// Header line written once at the top of a fresh run log file.
pub const RUN_LOG_HEADER: &str = "timestamp|severity|message";

const FIELD_SEPARATOR: char = '|';

/// A single timestamped, leveled entry in a job's run log.
///
/// Immutable once written: the logger only ever appends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub message: String,
}

impl RunRecord {
    /// Creates a record stamped with the current UTC time.
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            timestamp: timestamp::now_utc(),
            severity,
            message: message.into(),
        }
    }

    /// Renders the record as exactly one log line (no trailing newline).
    ///
    /// The message is sanitized so embedded delimiters or line breaks can
    /// never split a record across lines or columns.
    pub fn to_line(&self) -> String {
        format!(
            "{}{FIELD_SEPARATOR}{}{FIELD_SEPARATOR}{}",
            timestamp::iso_utc(self.timestamp),
            self.severity,
            sanitize_message(&self.message),
        )
    }

    /// Parses one log line back into a record.
    pub fn parse_line(line: &str) -> Result<Self, ParseRecordError> {
        let mut fields = line.trim_end_matches(['\r', '\n']).splitn(3, FIELD_SEPARATOR);
        let timestamp = fields.next().ok_or(ParseRecordError::MissingFields)?;
        let severity = fields.next().ok_or(ParseRecordError::MissingFields)?;
        let message = fields.next().ok_or(ParseRecordError::MissingFields)?;
        Ok(Self {
            timestamp: timestamp::parse_iso_utc(timestamp)?,
            severity: severity.parse()?,
            message: message.to_string(),
        })
    }
}

/// Replaces characters that would break the one-line-per-record format:
/// the field separator becomes `<replaced_pipe>` and line breaks become
/// `<br>`.
pub fn sanitize_message(message: &str) -> String {
    message
        .replace(FIELD_SEPARATOR, "<replaced_pipe>")
        .replace("\r\n", "<br>")
        .replace(['\r', '\n'], "<br>")
}

/// Errors from parsing a run log line.
#[derive(Debug, Error)]
pub enum ParseRecordError {
    #[error("run log line does not have timestamp|severity|message fields")]
    MissingFields,
    #[error(transparent)]
    Timestamp(#[from] TimestampError),
    #[error(transparent)]
    Severity(#[from] ParseSeverityError),
}
