//! Date tokens as they appear inside org text.
//!
//! The canonical form is `YYYY-MM-DD Ddd` with an optional 24h `HH:MM`
//! suffix. Human input may omit the weekday and zero padding (`2025-3-7`).

use crate::error::{CoreError, Result};
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Weekday};
use regex::Regex;
use std::sync::LazyLock;

/// Regex source for a canonical org date token, without anchors.
pub const DATETIME_PATTERN: &str =
    r"(\d{4})-(\d{2})-(\d{2}) (Mon|Tue|Wed|Thu|Fri|Sat|Sun)(?: (\d{2}):(\d{2}))?";

static DATETIME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!("^{DATETIME_PATTERN}")).expect("valid datetime regex"));

static DATE_ONLY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)-(\d+)-(\d+)").expect("valid date regex"));

/// Parse an org date token into a calendar date and time of day.
///
/// The weekday abbreviation is not cross-checked against the date. Returns
/// `None` when the token is neither canonical nor a bare `Y-M-D` date, or
/// names a day that does not exist.
#[must_use]
pub fn parse_datetime(token: &str) -> Option<NaiveDateTime> {
    let token = token.trim();

    if let Some(caps) = DATETIME_RE.captures(token) {
        let date = ymd(&caps[1], &caps[2], &caps[3])?;
        let time = match (caps.get(5), caps.get(6)) {
            (Some(hour), Some(minute)) => {
                let hour = hour.as_str().parse().ok()?;
                let minute = minute.as_str().parse().ok()?;
                NaiveTime::from_hms_opt(hour, minute, 0)?
            }
            _ => NaiveTime::MIN,
        };
        return Some(date.and_time(time));
    }

    let caps = DATE_ONLY_RE.captures(token)?;
    Some(ymd(&caps[1], &caps[2], &caps[3])?.and_time(NaiveTime::MIN))
}

/// Like [`parse_datetime`], but reports the rejected input.
///
/// # Errors
/// Returns `CoreError::InvalidDate` if the token does not parse.
pub fn parse_date_input(token: &str) -> Result<NaiveDateTime> {
    parse_datetime(token).ok_or_else(|| CoreError::InvalidDate(token.to_string()))
}

/// Returns true if the token parses as a date.
#[must_use]
pub fn is_valid_date(token: &str) -> bool {
    parse_datetime(token).is_some()
}

/// Render a value as a canonical org date token.
///
/// The time of day is omitted when it is exactly midnight.
#[must_use]
pub fn format_datetime(value: NaiveDateTime) -> String {
    let date = format!(
        "{:04}-{:02}-{:02} {}",
        value.year(),
        value.month(),
        value.day(),
        weekday_name(value.weekday())
    );

    if value.hour() == 0 && value.minute() == 0 {
        return date;
    }

    format!("{date} {:02}:{:02}", value.hour(), value.minute())
}

fn ymd(year: &str, month: &str, day: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, day.parse().ok()?)
}

const fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Mon",
        Weekday::Tue => "Tue",
        Weekday::Wed => "Wed",
        Weekday::Thu => "Thu",
        Weekday::Fri => "Fri",
        Weekday::Sat => "Sat",
        Weekday::Sun => "Sun",
    }
}
