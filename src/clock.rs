//! Time helpers for the session subsystem.
//!
//! Watermarks and challenge timestamps are persisted as timezone-aware rows while
//! token claims carry unix seconds, so every comparison goes through UTC seconds.

use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, FixedOffset, Utc};

pub fn now_unix() -> usize {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs() as usize
}

pub fn now_fixed() -> DateTime<FixedOffset> {
    Utc::now().fixed_offset()
}

pub fn unix_from_datetime(dt: &DateTime<FixedOffset>) -> i64 {
    dt.with_timezone(&Utc).timestamp()
}

pub fn datetime_from_unix(secs: i64) -> DateTime<FixedOffset> {
    DateTime::<Utc>::from_timestamp(secs, 0)
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
        .fixed_offset()
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn same_instant_in_different_offsets_compares_equal() {
        let utc = Utc.with_ymd_and_hms(2026, 8, 25, 12, 0, 0).unwrap();
        let plus_five = utc.with_timezone(&FixedOffset::east_opt(5 * 3600).unwrap());

        assert_eq!(
            unix_from_datetime(&utc.fixed_offset()),
            unix_from_datetime(&plus_five)
        );
    }

    #[test]
    fn unix_roundtrip_preserves_seconds() {
        let now = now_unix() as i64;
        assert_eq!(unix_from_datetime(&datetime_from_unix(now)), now);
    }

    #[test]
    fn now_fixed_tracks_now_unix() {
        let fixed = now_fixed();
        let unix = now_unix() as i64;
        assert!((unix_from_datetime(&fixed) - unix).abs() <= 1);
    }
}
