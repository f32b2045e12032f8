//! UTC timestamp helpers
//!
//! All date and time information in Vigil is explicitly UTC. ISO-8601
//! strings are the interchange form in every durable artifact; `DateTime`
//! values are used only where arithmetic is needed.

use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;

/// Error raised for timestamps that are not valid ISO-8601 with an explicit
/// offset. Naive timestamps are never accepted.
#[derive(Debug, Error)]
#[error("invalid ISO-8601 UTC timestamp: {0}")]
pub struct TimestampError(#[from] chrono::ParseError);

/// Current instant in UTC.
pub fn now_utc() -> DateTime<Utc> {
    Utc::now()
}

/// ISO-8601 string with millisecond precision and `Z` suffix.
pub fn iso_utc(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// ISO-8601 string for the present instant.
pub fn now_utc_iso() -> String {
    iso_utc(now_utc())
}

/// Parses an ISO-8601 timestamp, converting any explicit offset to UTC.
pub fn parse_iso_utc(value: &str) -> Result<DateTime<Utc>, TimestampError> {
    let parsed = DateTime::parse_from_rfc3339(value)?;
    Ok(parsed.with_timezone(&Utc))
}

/// Converts an ISO-8601 string to a filesystem-safe form
/// (`+00:00` becomes `Z`, colons become hyphens).
pub fn iso_for_filename(iso: &str) -> String {
    iso.replace("+00:00", "Z").replace(':', "-")
}

/// Inverse of [`iso_for_filename`]: restores colons in the time portion.
pub fn iso_from_filename(name: &str) -> String {
    let restored = name.replace('Z', "+00:00");
    match restored.split_once('T') {
        Some((date_part, time_part)) => {
            format!("{date_part}T{}", time_part.replace('-', ":"))
        }
        None => restored,
    }
}
