//! Two-tier date parsing for publish-time strings.
//!
//! Listing pages are inconsistent about how they print publish times: ISO
//! stamps, `"2024-01-05T10:00:00 1704448800"`, `"Jan 5, 2024"`, `"3 hours
//! ago"`. [`parse_date_safe`] first tries a strict set of machine formats and
//! only then a permissive free-text reading.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%Y%m%d"];

const MONTH: &str = r"(jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?|sep(?:t(?:ember)?)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?)\.?";

static MONTH_DAY_YEAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)\b{MONTH}\s+(\d{{1,2}})(?:st|nd|rd|th)?,?\s+(\d{{4}})\b"
    ))
    .unwrap()
});
static DAY_MONTH_YEAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)\b(\d{{1,2}})(?:st|nd|rd|th)?\s+(?:of\s+)?{MONTH},?\s+(\d{{4}})\b"
    ))
    .unwrap()
});
static MONTH_YEAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"(?i)\b{MONTH},?\s+(\d{{4}})\b")).unwrap());
static ISO_FRAGMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{4})-(\d{1,2})-(\d{1,2})\b").unwrap());
static RELATIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(\d+|an?|one)\s+(second|minute|min|hour|hr|day|week|month|year)s?\s+ago$")
        .unwrap()
});
static EPOCH: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{9,11}$").unwrap());

/// Parse a publish-time value into a calendar date.
///
/// - blank or missing input is `None`;
/// - the strict tier accepts RFC 3339, RFC 2822 and fixed ISO-like layouts,
///   on the whole string or on its first whitespace-separated token;
/// - the permissive tier accepts month-name dates, bare Unix timestamps, and
///   relative phrases resolved against `reference`;
/// - anything else is `None`.
///
/// The time of day is discarded.
pub fn parse_date_safe(value: Option<&str>, reference: Option<NaiveDateTime>) -> Option<NaiveDate> {
    let value = value?.trim();
    if value.is_empty() {
        return None;
    }
    parse_datetime_strict(value)
        .map(|dt| dt.date())
        .or_else(|| parse_date_permissive(value, reference))
}

/// Strict tier. Also used to coerce `scraped_at`; date-only input becomes
/// midnight.
pub fn parse_datetime_strict(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Some(dt) = parse_exact(value) {
        return Some(dt);
    }
    // "2024-01-05T10:00:00 1704448800": ISO stamp followed by epoch seconds.
    let mut tokens = value.split_whitespace();
    match (tokens.next(), tokens.next()) {
        (Some(first), Some(_)) => parse_exact(first),
        _ => None,
    }
}

fn parse_exact(value: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_local());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(value) {
        return Some(dt.naive_local());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

fn parse_date_permissive(value: &str, reference: Option<NaiveDateTime>) -> Option<NaiveDate> {
    if EPOCH.is_match(value) {
        let secs: i64 = value.parse().ok()?;
        return DateTime::from_timestamp(secs, 0).map(|dt| dt.date_naive());
    }
    if let Some(date) = parse_relative(value, reference) {
        return Some(date);
    }
    if let Some(c) = MONTH_DAY_YEAR.captures(value) {
        return ymd(&c[3], month_number(&c[1])?, &c[2]);
    }
    if let Some(c) = DAY_MONTH_YEAR.captures(value) {
        return ymd(&c[3], month_number(&c[2])?, &c[1]);
    }
    if let Some(c) = MONTH_YEAR.captures(value) {
        return ymd(&c[2], month_number(&c[1])?, "1");
    }
    if let Some(c) = ISO_FRAGMENT.captures(value) {
        return ymd(&c[1], c[2].parse().ok()?, &c[3]);
    }
    None
}

fn parse_relative(value: &str, reference: Option<NaiveDateTime>) -> Option<NaiveDate> {
    let reference = reference?;
    let lower = value.to_ascii_lowercase();
    match lower.as_str() {
        "now" | "just now" | "today" => return Some(reference.date()),
        "yesterday" => return reference.date().pred_opt(),
        _ => {}
    }
    let c = RELATIVE.captures(&lower)?;
    let amount: i64 = match &c[1] {
        "a" | "an" | "one" => 1,
        n => n.parse().ok()?,
    };
    let span = match &c[2] {
        "second" => Duration::try_seconds(amount)?,
        "minute" | "min" => Duration::try_minutes(amount)?,
        "hour" | "hr" => Duration::try_hours(amount)?,
        "day" => Duration::try_days(amount)?,
        "week" => Duration::try_weeks(amount)?,
        "month" => Duration::try_days(amount.checked_mul(30)?)?,
        _ => Duration::try_days(amount.checked_mul(365)?)?,
    };
    reference.checked_sub_signed(span).map(|dt| dt.date())
}

fn month_number(name: &str) -> Option<u32> {
    let prefix = name.get(..3)?.to_ascii_lowercase();
    let month = match prefix.as_str() {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}

fn ymd(year: &str, month: u32, day: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year.parse().ok()?, month, day.parse().ok()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn reference() -> Option<NaiveDateTime> {
        NaiveDateTime::parse_from_str("2024-01-05 02:00:00", "%Y-%m-%d %H:%M:%S").ok()
    }

    #[test]
    fn test_blank_and_missing_are_absent() {
        assert_eq!(parse_date_safe(None, reference()), None);
        assert_eq!(parse_date_safe(Some(""), reference()), None);
        assert_eq!(parse_date_safe(Some("   "), reference()), None);
    }

    #[test]
    fn test_strict_formats() {
        for input in [
            "2024-01-05",
            "2024-01-05T10:00:00",
            "2024-01-05 10:00:00",
            "2024-01-05 10:00:00.123456",
            "2024-01-05T10:00:00Z",
            "2024-01-05T10:00:00+02:00",
            "Fri, 05 Jan 2024 10:00:00 +0000",
            "01/05/2024",
            "2024/01/05",
        ] {
            assert_eq!(parse_date_safe(Some(input), None), Some(date("2024-01-05")), "{input}");
        }
    }

    #[test]
    fn test_hacker_news_age_title() {
        assert_eq!(
            parse_date_safe(Some("2024-01-05T10:00:00 1704448800"), None),
            Some(date("2024-01-05"))
        );
    }

    #[test]
    fn test_free_text_month_names() {
        for input in ["Jan 5, 2024", "January 5th 2024", "5 January 2024", "Sept. 5, 2024"] {
            let parsed = parse_date_safe(Some(input), None).unwrap();
            assert_eq!(parsed.format("%d").to_string(), "05", "{input}");
        }
        assert_eq!(parse_date_safe(Some("March 2024"), None), Some(date("2024-03-01")));
    }

    #[test]
    fn test_relative_phrases_use_reference() {
        assert_eq!(parse_date_safe(Some("3 hours ago"), reference()), Some(date("2024-01-04")));
        assert_eq!(parse_date_safe(Some("an hour ago"), reference()), Some(date("2024-01-05")));
        assert_eq!(parse_date_safe(Some("2 days ago"), reference()), Some(date("2024-01-03")));
        assert_eq!(parse_date_safe(Some("Yesterday"), reference()), Some(date("2024-01-04")));
        assert_eq!(parse_date_safe(Some("3 hours ago"), None), None);
    }

    #[test]
    fn test_epoch_seconds() {
        assert_eq!(parse_date_safe(Some("1704448800"), None), Some(date("2024-01-05")));
    }

    #[test]
    fn test_garbage_is_absent() {
        assert_eq!(parse_date_safe(Some("not a date"), reference()), None);
        assert_eq!(parse_date_safe(Some("2024-13-45"), reference()), None);
        assert_eq!(parse_date_safe(Some("Feb 30, 2024"), reference()), None);
    }

    #[test]
    fn test_strict_datetime_keeps_time() {
        let dt = parse_datetime_strict("2024-01-05 10:00:00").unwrap();
        assert_eq!(dt.format("%H:%M:%S").to_string(), "10:00:00");
        let midnight = parse_datetime_strict("2024-01-05").unwrap();
        assert_eq!(midnight.format("%H:%M:%S").to_string(), "00:00:00");
    }
}
