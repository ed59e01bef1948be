//! Lenient `Date:` header parsing.
//!
//! The archiver only needs the calendar date a message was written, so every
//! parser here returns the wall-clock [`NaiveDateTime`] found in the header
//! and ignores the time zone.

use std::sync::OnceLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;
use tracing::debug;

/// Naive formats tried once the day of week and the zone are stripped.
const FORMATS: [&str; 9] = [
    "%d %b %Y %H:%M:%S",
    "%d %b %Y %H:%M",
    "%d %b %y %H:%M:%S",
    "%b %d %H:%M:%S %Y",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
];

/// Three-letter zone abbreviation followed by a numeric offset fragment
/// inside a closing parenthesis, e.g. `EST-5)` or `(PST +8)`.
fn bad_zone_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?P<head>.*?)(?P<open>\(?)(?P<zone>[A-Z]{3})[+\- ][0-9]{0,2}\)")
            .expect("static regex")
    })
}

/// Trailing comment holding only a zone name, e.g. `(EST)` or `(Pacific Standard Time)`.
fn zone_comment_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s*\([A-Za-z][A-Za-z ]*\)\s*$").expect("static regex"))
}

/// Trailing zone token: numeric offset or alphabetic abbreviation.
fn zone_token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:[+-]\d{4}|[+-]\d{2}:\d{2}|[A-Za-z]{1,5})$").expect("static regex")
    })
}

/// Parse a `Date:` header, repairing a known malformation once on failure.
///
/// Returns `None` when neither the original nor the repaired value parses.
pub fn parse_date(date_str: &str) -> Option<NaiveDateTime> {
    if let Some(dt) = parse_date_lenient(date_str) {
        return Some(dt);
    }
    let repaired = repair_date(date_str)?;
    debug!(original = date_str, repaired = %repaired, "Retrying repaired date");
    parse_date_lenient(&repaired)
}

/// Rewrite `…EST-5)` to `…EST` and `…(EST-5)` to `…(EST)`.
///
/// Returns `None` if the value does not carry the malformation.
pub fn repair_date(date_str: &str) -> Option<String> {
    let caps = bad_zone_regex().captures(date_str)?;
    let whole = caps.get(0)?;
    let head = caps.name("head").map_or("", |m| m.as_str());
    let zone = caps.name("zone").map_or("", |m| m.as_str());
    let opened = caps.name("open").is_some_and(|m| !m.as_str().is_empty());

    let mut repaired = String::with_capacity(date_str.len());
    repaired.push_str(head);
    if opened {
        repaired.push('(');
        repaired.push_str(zone);
        repaired.push(')');
    } else {
        repaired.push_str(zone);
    }
    repaired.push_str(&date_str[whole.end()..]);
    Some(repaired)
}

/// Parse an email date string in various common formats, ignoring the zone.
///
/// Supports RFC 2822, ISO 8601, IMAP-style and several broken real-world variants.
pub fn parse_date_lenient(date_str: &str) -> Option<NaiveDateTime> {
    let trimmed = date_str.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(trimmed) {
        return Some(dt.naive_local());
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.naive_local());
    }

    let no_comment = zone_comment_regex().replace(trimmed, "");
    let collapsed = no_comment.split_whitespace().collect::<Vec<_>>().join(" ");
    let no_dow = strip_day_of_week(&collapsed);
    let normalized = normalize_imap_date(&no_dow);

    for candidate in [no_dow.as_str(), normalized.as_str()] {
        // "-0500 (EST)" leaves "-0500"; "+0000 GMT" leaves two zone tokens
        let mut remaining = candidate;
        for _ in 0..3 {
            if let Some(dt) = try_formats(remaining) {
                return Some(dt);
            }
            match remaining.rsplit_once(' ') {
                Some((rest, last)) if zone_token_regex().is_match(last) => remaining = rest,
                _ => break,
            }
        }
    }

    None
}

fn try_formats(s: &str) -> Option<NaiveDateTime> {
    for fmt in &FORMATS {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(ndt);
        }
    }
    // Date-only values
    NaiveDate::parse_from_str(s, "%d %b %Y")
        .ok()
        .or_else(|| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Normalize IMAP-style dates: `"16-JUL-2025 03:01:03"` → `"16 Jul 2025 03:01:03"`.
fn normalize_imap_date(s: &str) -> String {
    if !s.contains('-') {
        return s.to_string();
    }

    let months = [
        "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
    ];
    let title_months = [
        "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
    ];

    for (i, month) in months.iter().enumerate() {
        for pattern in [format!("-{month}-"), format!("-{}-", month.to_lowercase())] {
            if s.contains(&pattern) {
                return s.replacen(&pattern, &format!(" {} ", title_months[i]), 1);
            }
        }
    }

    s.to_string()
}

/// Strip leading day-of-week prefix (e.g. "Thu, " or "Thu ").
fn strip_day_of_week(s: &str) -> String {
    let days = [
        "Mon,", "Tue,", "Wed,", "Thu,", "Fri,", "Sat,", "Sun,", "Mon ", "Tue ", "Wed ", "Thu ",
        "Fri ", "Sat ", "Sun ",
    ];
    for day in &days {
        if let Some(rest) = s.strip_prefix(day) {
            return rest.trim().to_string();
        }
    }
    s.to_string()
}
