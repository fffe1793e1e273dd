//! Datetime conversions for `DateTime` fields.
//!
//! Datetimes travel as ISO-8601 strings in UTC with millisecond precision
//! (`2021-03-04T05:06:07.089Z`). Numeric input is read as milliseconds
//! since the Unix epoch.

use chrono::{DateTime, SecondsFormat, Utc};

/// Converts epoch milliseconds to an ISO-8601 UTC string.
///
/// Returns `None` when the instant is outside the representable range.
#[must_use]
pub fn epoch_millis_to_iso(millis: i64) -> Option<String> {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
}

