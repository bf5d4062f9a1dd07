use chrono::{DateTime, NaiveDateTime, Utc};

use super::constants::TIMESTAMP_FORMAT;

/// Source of frame timestamps.
pub trait Clock: Send {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time in UTC.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Fixed-width text form with microsecond precision; lexical order matches
/// chronological order.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(micros: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 5, 7).unwrap() + Duration::microseconds(micros)
    }

    #[test]
    fn test_format_has_microsecond_precision() {
        assert_eq!(format_timestamp(&at(42)), "2024-03-01 09:05:07.000042");
    }

    #[test]
    fn test_parse_inverts_format() {
        let ts = at(123_456);
        assert_eq!(parse_timestamp(&format_timestamp(&ts)), Some(ts));
    }

    #[test]
    fn test_text_order_is_chronological() {
        let earlier = format_timestamp(&at(999_999));
        let later = format_timestamp(&at(1_000_000));
        assert!(earlier < later);
    }

    #[test]
    fn test_parse_rejects_other_formats() {
        assert!(parse_timestamp("2024-03-01T09:05:07Z").is_none());
    }

    #[test]
    fn test_system_clock_advances() {
        let clock = SystemClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
