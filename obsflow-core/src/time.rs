//! Timestamp handling at the adapter boundary
//!
//! Adapters stamp every batch with a wall-clock timestamp in UTC; the
//! pipeline itself never reads the clock, so filter decisions are a pure
//! function of the provided timestamps and tests stay deterministic.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::{PipelineError, PipelineResult};

/// Wall-clock timestamp carried by observations, nanosecond resolution
pub type Timestamp = DateTime<Utc>;

/// Parses an adapter-provided timestamp
///
/// Accepts ISO-8601 / RFC 3339 with millisecond precision or better
/// (`2024-01-15T09:30:00.123Z`, `2024-01-15T09:30:00.123456789+00:00`).
/// Timestamps with an offset are normalized to UTC.
pub fn parse_timestamp(input: &str) -> PipelineResult<Timestamp> {
    DateTime::parse_from_rfc3339(input)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| PipelineError::InvalidTimestamp {
            input: input.to_string(),
            reason: e.to_string(),
        })
}

/// Formats a timestamp the way adapters are expected to send it
pub fn format_timestamp(timestamp: &Timestamp) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}
