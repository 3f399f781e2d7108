use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

static DAY_MONTH_YEAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(\d{1,2})\s+([a-z]{3})[a-z]*\.?\s+(\d{4})\b").expect("valid regex"));

static BARE_TIME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{1,2}):(\d{2})(?::(\d{2}))?\s*([+-])(\d{2}):?(\d{2})$").expect("valid regex")
});

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

const NAIVE_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%B %d, %Y", "%b %d, %Y"];

/// Normalizes a date string to ISO-8601 UTC with millisecond precision.
///
/// Unparseable input is returned unchanged with a warning.
pub fn normalize_date(input: &str) -> String {
    normalize_date_with_base(input, Utc::now().date_naive())
}

/// Like [`normalize_date`], with `today` supplying the date for bare `HH:MM ±hhmm` inputs.
pub fn normalize_date_with_base(input: &str, today: NaiveDate) -> String {
    match parse_date(input.trim(), today) {
        Some(dt) => format_utc(dt),
        None => {
            if !input.trim().is_empty() {
                warn!("Unparseable date '{}', keeping original value", input);
            }
            input.to_string()
        }
    }
}

fn format_utc(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_date(s: &str, today: NaiveDate) -> Option<DateTime<Utc>> {
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    for fmt in NAIVE_DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)));
        }
    }
    parse_day_month_year(s).or_else(|| parse_bare_time(s, today))
}

fn parse_day_month_year(s: &str) -> Option<DateTime<Utc>> {
    let caps = DAY_MONTH_YEAR.captures(s)?;
    let day: u32 = caps[1].parse().ok()?;
    let month = month_number(&caps[2])?;
    let year: i32 = caps[3].parse().ok()?;
    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    Some(Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)))
}

fn parse_bare_time(s: &str, today: NaiveDate) -> Option<DateTime<Utc>> {
    let caps = BARE_TIME.captures(s)?;
    let hour: u32 = caps[1].parse().ok()?;
    let minute: u32 = caps[2].parse().ok()?;
    let second: u32 = caps.get(3).map_or(Some(0), |m| m.as_str().parse().ok())?;
    let sign = if &caps[4] == "-" { -1 } else { 1 };
    let off_h: i32 = caps[5].parse().ok()?;
    let off_m: i32 = caps[6].parse().ok()?;
    let offset = FixedOffset::east_opt(sign * (off_h * 3600 + off_m * 60))?;
    let local = today.and_hms_opt(hour, minute, second)?;
    let dt = offset.from_local_datetime(&local).single()?;
    Some(dt.with_timezone(&Utc))
}

fn month_number(name: &str) -> Option<u32> {
    let idx = [
        "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
    ]
    .iter()
    .position(|m| name.eq_ignore_ascii_case(m))?;
    Some(idx as u32 + 1)
}
