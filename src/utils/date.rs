//! Front-matter date parsing.
//!
//! Accepts the three shapes that show up in blog front-matter:
//!
//! | Input | Interpretation |
//! |-------|----------------|
//! | `2024-01-15` | midnight UTC |
//! | `2024-01-15T08:30:00` | naive, taken as UTC |
//! | `2024-01-15T08:30:00+02:00` / `...Z` | RFC 3339, converted to UTC |

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Parse a front-matter date string into UTC.
pub fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Some(naive.and_utc());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// `YYYY-MM-DD`, used by the sitemap and page layouts.
pub fn format_ymd(date: &DateTime<Utc>) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Human-readable date for page layouts, e.g. `June 01, 2021`.
pub fn format_long(date: &DateTime<Utc>) -> String {
    date.format("%B %d, %Y").to_string()
}
