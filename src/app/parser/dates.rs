//! Lenient feed date parsing
//!
//! Feeds are supposed to use RFC 2822 dates but frequently don't: wrong
//! weekdays, ISO timestamps, missing zones. Anything unreadable is `None`.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Utc};

const ZONED_FORMATS: [&str; 6] = [
    "%d %b %Y %H:%M:%S %z",
    "%d %b %Y %H:%M %z",
    "%d %B %Y %H:%M:%S %z",
    "%Y-%m-%d %H:%M:%S %z",
    "%Y-%m-%dT%H:%M:%S%z",
    "%d %b %Y %H:%M:%S %Z",
];

const NAIVE_FORMATS: [&str; 4] = [
    "%d %b %Y %H:%M:%S",
    "%d %b %Y %H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
];

/// Parse a feed date into UTC
pub fn parse_feed_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(date) = DateTime::parse_from_rfc2822(value) {
        return Some(date.with_timezone(&Utc));
    }
    if let Ok(date) = DateTime::parse_from_rfc3339(value) {
        return Some(date.with_timezone(&Utc));
    }

    // Drop a (possibly wrong) weekday and retry
    let without_weekday = match value.split_once(',') {
        Some((weekday, rest)) if weekday.trim().chars().all(|c| c.is_ascii_alphabetic()) => {
            rest.trim()
        }
        _ => value,
    };

    if let Ok(date) = DateTime::parse_from_rfc2822(without_weekday) {
        return Some(date.with_timezone(&Utc));
    }

    for format in ZONED_FORMATS {
        if let Ok(date) = DateTime::<FixedOffset>::parse_from_str(without_weekday, format) {
            return Some(date.with_timezone(&Utc));
        }
    }

    for format in NAIVE_FORMATS {
        if let Ok(date) = NaiveDateTime::parse_from_str(without_weekday, format) {
            return Some(date.and_utc());
        }
    }

    NaiveDate::parse_from_str(without_weekday, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|date| date.and_utc())
}
