//! Timestamp utilities

use crate::{Error, Result};
use chrono::{DateTime, Datelike, Utc};

/// Interpret milliseconds since the Unix epoch as a UTC instant
///
/// Millisecond precision is preserved.
pub fn from_epoch_millis(millis: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis).ok_or_else(|| {
        Error::InvalidInput(format!("epoch milliseconds out of range: {}", millis))
    })
}

/// Day of week with Monday = 0 ... Sunday = 6
pub fn weekday_from_monday(ts: &DateTime<Utc>) -> u32 {
    ts.weekday().num_days_from_monday()
}

/// Convert milliseconds to duration
pub fn millis_to_duration(millis: u64) -> std::time::Duration {
    std::time::Duration::from_millis(millis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;
    use std::time::Duration;

    #[test]
    fn test_from_epoch_millis_keeps_milliseconds() {
        let ts = from_epoch_millis(1_541_999_142_796).unwrap();
        assert_eq!(ts.to_rfc3339(), "2018-11-12T05:05:42.796+00:00");
        assert_eq!(ts.timestamp_subsec_millis(), 796);
        assert_eq!(ts.hour(), 5);
    }

    #[test]
    fn test_from_epoch_millis_epoch_zero() {
        let ts = from_epoch_millis(0).unwrap();
        assert_eq!(ts.timestamp(), 0);
        // 1970-01-01 was a Thursday
        assert_eq!(weekday_from_monday(&ts), 3);
    }

    #[test]
    fn test_from_epoch_millis_out_of_range() {
        let result = from_epoch_millis(i64::MAX);
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_weekday_monday_is_zero() {
        // 2018-11-12 was a Monday
        let ts = from_epoch_millis(1_541_999_142_796).unwrap();
        assert_eq!(weekday_from_monday(&ts), 0);
    }

    #[test]
    fn test_weekday_sunday_is_six() {
        // 2018-11-11 12:00:00 UTC, a Sunday
        let ts = from_epoch_millis(1_541_937_600_000).unwrap();
        assert_eq!(weekday_from_monday(&ts), 6);
    }

    #[test]
    fn test_millis_to_duration_one_second() {
        let duration = millis_to_duration(1000);
        assert_eq!(duration, Duration::from_secs(1));
        assert_eq!(duration.as_millis(), 1000);
    }
}
