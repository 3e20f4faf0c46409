// SPDX-FileCopyrightText: 2026 Parlor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Timestamp helpers.
//!
//! All persisted timestamps are UTC RFC 3339 with millisecond precision,
//! matching SQLite's `strftime('%Y-%m-%dT%H:%M:%fZ', 'now')` output, so the
//! same instant formats identically whether it was written from Rust or SQL.

use chrono::{DateTime, Utc};

use crate::error::ParlorError;

const FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Current instant. Cutoffs and expiries are computed on this and persisted
/// through [`format`].
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Format an instant in the persisted format.
pub fn format(dt: DateTime<Utc>) -> String {
    dt.format(FORMAT).to_string()
}

/// Parse a persisted timestamp.
///
/// A stored timestamp that fails to parse indicates corrupted data, not bad
/// input, hence `Internal`.
pub fn parse(s: &str) -> Result<DateTime<Utc>, ParlorError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ParlorError::Internal(format!("malformed timestamp {s:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn format_matches_sqlite_strftime_shape() {
        let dt = Utc.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap();
        assert_eq!(format(dt), "2026-03-14T09:26:53.000Z");
    }

    #[test]
    fn round_trips_through_parse() {
        let s = format(now());
        let dt = parse(&s).unwrap();
        assert_eq!(format(dt), s);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(parse("yesterday").is_err());
        assert!(parse("").is_err());
    }

    #[test]
    fn epoch_sentinel_parses_and_sorts_first() {
        let epoch = parse(crate::types::EPOCH_SENTINEL).unwrap();
        let real = parse("2026-01-01T00:00:00.000Z").unwrap();
        assert!(epoch < real);
        // String comparison agrees with instant comparison in this format.
        assert!(crate::types::EPOCH_SENTINEL < "2026-01-01T00:00:00.000Z");
    }
}
