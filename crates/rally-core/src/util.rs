//! Shared utility functions used across multiple modules.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};

use crate::error::Result;

/// Current UTC time, truncated to the microsecond precision used for
/// persistence so records compare equal across a store round trip.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Normalize optional text by trimming whitespace and removing empties.
///
/// Returns `None` when the input is `None` or the trimmed value is empty.
pub fn normalize_text_option(value: Option<String>) -> Option<String> {
    let value = value?;
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Check if a string starts with `http://` or `https://`.
pub fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

/// Truncate text to at most 180 characters for error messages.
pub fn compact_text(value: &str) -> String {
    value.trim().chars().take(180).collect()
}

/// Render a timestamp as fixed-width RFC-3339 with microsecond precision
/// and a `Z` suffix (`2024-01-01T00:00:00.000000Z`).
///
/// Every timestamp persisted locally or sent to the remote uses this form so
/// string ordering matches chronological ordering, and so two consecutive
/// local mutations land on distinct values.
pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse an RFC-3339 timestamp back into UTC.
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)?.with_timezone(&Utc))
}
