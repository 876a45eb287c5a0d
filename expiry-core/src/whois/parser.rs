//! Best-effort extraction of the expiry date from free-text WHOIS responses.
//!
//! Registries disagree on both the field label and the date format, so the
//! label match is a broad case-insensitive alternation and the value is tried
//! against every date layout seen in the wild until one parses.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

static EXPIRY_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?im)^[ \t]*(?:Registry Expiry Date|Registrar Registration Expiration Date|Expiration Date|Expiry Date|Expiration Time|expire-date|Expires On|Expires|paid-till|Record expires on|Valid Until|renewal date|validity|Expire Date|expire)[ \t]*:[ \t]*(.+)$",
    )
    .expect("expiry pattern is valid")
});

static REFERRAL_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?im)^[ \t]*(?:refer|Registrar WHOIS Server|Whois Server|ReferralServer)[ \t]*:[ \t]*(?:r?whois://)?([^\s/:]+)",
    )
    .expect("referral pattern is valid")
});

const NOT_FOUND_MARKERS: &[&str] = &[
    "no match",
    "not found",
    "no data found",
    "no entries found",
    "status: free",
    "status: available",
    "domain not found",
    "no object found",
];

// Tried as date-times first, then as bare dates.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.fZ",
    "%Y-%m-%dT%H:%M:%SZ",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
    "%Y.%m.%d %H:%M:%S",
    "%d.%m.%Y %H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
    "%d-%b-%Y %H:%M:%S",
    "%a %b %d %H:%M:%S %Y",
    "%Y-%m-%d",
    "%Y-%b-%d",
    "%d-%b-%Y",
    "%d-%B-%Y",
    "%Y.%m.%d",
    "%Y. %m. %d.",
    "%Y/%m/%d",
    "%d.%m.%Y",
    "%d/%m/%Y",
    "%b %d %Y",
    "%B %d %Y",
    "%Y%m%d",
];

// Layouts carrying an explicit UTC offset.
const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%#z",
    "%Y-%m-%d %H:%M:%S %#z",
    "%Y-%m-%dT%H:%M:%S%#z",
];

const TIMEZONE_SUFFIXES: &[&str] = &[" (UTC)", " UTC", " GMT", " (GMT)", " CLST", " CLT"];

/// Returns the first expiry date in `raw` that can be parsed.
pub fn extract_expiry(raw: &str) -> Option<DateTime<Utc>> {
    EXPIRY_LINE
        .captures_iter(raw)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .filter(|value| !value.is_empty() && !value.to_lowercase().contains("redacted"))
        .find_map(parse_date)
}

/// Returns the next WHOIS server named by `raw`, if any.
pub fn extract_referral(raw: &str) -> Option<String> {
    REFERRAL_LINE
        .captures_iter(raw)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_lowercase())
        .find(|server| server.contains('.'))
}

/// Whether the registry reports that the domain is not registered.
pub fn is_not_found(raw: &str) -> bool {
    let lower = raw.to_lowercase();
    NOT_FOUND_MARKERS.iter().any(|marker| lower.contains(marker))
}

pub fn parse_date(date_str: &str) -> Option<DateTime<Utc>> {
    let trimmed = date_str.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }

    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(trimmed, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }

    let cleaned = strip_timezone_name(trimmed);
    let cleaned = collapse_whitespace(cleaned);

    for fmt in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(&cleaned, fmt) {
            return Some(dt.and_utc());
        }
        if let Ok(d) = NaiveDate::parse_from_str(&cleaned, fmt) {
            return Some(d.and_hms_opt(0, 0, 0)?.and_utc());
        }
    }

    None
}

fn strip_timezone_name(value: &str) -> &str {
    TIMEZONE_SUFFIXES
        .iter()
        .find_map(|suffix| value.strip_suffix(suffix))
        .unwrap_or(value)
        .trim()
}

fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}
