//! Timestamp utilities
//!
//! Crash markers and session envelopes carry ISO-8601 timestamps in UTC.

use chrono::{DateTime, SecondsFormat, Utc};

/// Format a timestamp as ISO-8601 with millisecond precision
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse an ISO-8601 timestamp written by a crash handler
///
/// Accepts any RFC 3339 offset and normalizes to UTC. Surrounding
/// whitespace (a trailing newline, typically) is ignored.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|at| at.with_timezone(&Utc))
}
