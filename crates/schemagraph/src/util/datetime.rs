//! RFC 3339 date/time parsing and formatting.
//!
//! Timestamps are microseconds since the Unix epoch (UTC). The `date`
//! descriptor kind uses [`normalize_date`] to turn a date or datetime string
//! into its canonical UTC datetime form.

use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;

use crate::model::Timestamp;

const MICROS_PER_SECOND: i64 = 1_000_000;
const MICROS_PER_MINUTE: i64 = 60 * MICROS_PER_SECOND;
const MICROS_PER_HOUR: i64 = 60 * MICROS_PER_MINUTE;
const MICROS_PER_DAY: i64 = 24 * MICROS_PER_HOUR;

/// RFC 3339 parse failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct DateTimeParseError {
    pub message: String,
}

impl DateTimeParseError {
    fn new(what: &str, input: &str) -> Self {
        Self {
            message: format!("invalid {}: {}", what, input),
        }
    }
}

/// Returns the current time in microseconds since the Unix epoch.
pub fn now_micros() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as i64)
        .unwrap_or(0)
}

/// Parses a timezone suffix (Z, +HH:MM, -HH:MM) into minutes east of UTC.
fn parse_offset(offset: &str, input: &str) -> Result<i64, DateTimeParseError> {
    if offset == "Z" || offset == "z" {
        return Ok(0);
    }

    let bytes = offset.as_bytes();
    if !offset.is_ascii() || bytes.len() != 6 || bytes[3] != b':' {
        return Err(DateTimeParseError::new("timezone offset", input));
    }
    let sign = match bytes[0] {
        b'+' => 1,
        b'-' => -1,
        _ => return Err(DateTimeParseError::new("timezone offset", input)),
    };
    let hours = parse_digits(&offset[1..3], "timezone offset", input)?;
    let minutes = parse_digits(&offset[4..6], "timezone offset", input)?;

    if hours > 24 || (hours == 24 && minutes != 0) || minutes > 59 {
        return Err(DateTimeParseError::new("timezone offset", input));
    }

    Ok(sign * (hours * 60 + minutes))
}

fn parse_digits(s: &str, what: &str, input: &str) -> Result<i64, DateTimeParseError> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(DateTimeParseError::new(what, input));
    }
    s.parse().map_err(|_| DateTimeParseError::new(what, input))
}

fn is_leap_year(year: i64) -> bool {
    (year % 4 == 0 && year % 100 != 0) || (year % 400 == 0)
}

fn days_in_month(year: i64, month: i64) -> i64 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 if is_leap_year(year) => 29,
        2 => 28,
        _ => 0,
    }
}

/// Days since 1970-01-01 for a civil date (Howard Hinnant's algorithm).
fn date_to_days(year: i64, month: i64, day: i64) -> i64 {
    let y = if month <= 2 { year - 1 } else { year };
    let m = if month <= 2 { month + 9 } else { month - 3 };
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = y - era * 400;
    let doy = (153 * m + 2) / 5 + day - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

/// Inverse of [`date_to_days`].
fn days_to_date(days: i64) -> (i64, i64, i64) {
    let z = days + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    (if m <= 2 { y + 1 } else { y }, m, d)
}

/// Parses the `YYYY-MM-DD` prefix and returns days since the epoch.
fn parse_ymd(s: &str, input: &str) -> Result<i64, DateTimeParseError> {
    let bytes = s.as_bytes();
    if !s.is_ascii() || bytes.len() != 10 || bytes[4] != b'-' || bytes[7] != b'-' {
        return Err(DateTimeParseError::new("date", input));
    }
    let year = parse_digits(&s[..4], "year", input)?;
    let month = parse_digits(&s[5..7], "month", input)?;
    let day = parse_digits(&s[8..10], "day", input)?;

    if !(1..=12).contains(&month) {
        return Err(DateTimeParseError::new("month", input));
    }
    if day < 1 || day > days_in_month(year, month) {
        return Err(DateTimeParseError::new("day", input));
    }
    Ok(date_to_days(year, month, day))
}

/// Splits `.ffffff` fractional seconds from a trailing timezone suffix.
fn split_fraction(rest: &str) -> (Option<&str>, &str) {
    match rest.strip_prefix('.') {
        Some(after) => {
            let end = after
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(after.len());
            (Some(&after[..end]), &after[end..])
        }
        None => (None, rest),
    }
}

/// Pads or truncates fractional digits to microseconds.
fn fraction_micros(frac: Option<&str>) -> i64 {
    match frac {
        None | Some("") => 0,
        Some(s) => {
            let mut padded: String = s.chars().take(6).collect();
            while padded.len() < 6 {
                padded.push('0');
            }
            padded.parse().unwrap_or(0)
        }
    }
}

/// Parses an RFC 3339 date (`YYYY-MM-DD` with optional offset) and returns
/// days since the epoch and the offset in minutes.
pub fn parse_date_rfc3339(input: &str) -> Result<(i64, i64), DateTimeParseError> {
    if input.len() < 10 || !input.is_char_boundary(10) {
        return Err(DateTimeParseError::new("date", input));
    }
    let days = parse_ymd(&input[..10], input)?;
    let offset = match &input[10..] {
        "" => 0,
        suffix => parse_offset(suffix, input)?,
    };
    Ok((days, offset))
}

/// Parses an RFC 3339 datetime and returns UTC microseconds since the epoch
/// and the original offset in minutes.
pub fn parse_datetime_rfc3339(input: &str) -> Result<(Timestamp, i64), DateTimeParseError> {
    if input.len() < 19 || !input.is_char_boundary(19) {
        return Err(DateTimeParseError::new("datetime", input));
    }
    let bytes = input.as_bytes();
    if bytes[10] != b'T' && bytes[10] != b't' && bytes[10] != b' ' {
        return Err(DateTimeParseError::new("datetime", input));
    }
    let days = parse_ymd(&input[..10], input)?;

    let clock = &input[11..19];
    let cb = clock.as_bytes();
    if !clock.is_ascii() || cb[2] != b':' || cb[5] != b':' {
        return Err(DateTimeParseError::new("datetime", input));
    }
    let hours = parse_digits(&clock[..2], "hours", input)?;
    let minutes = parse_digits(&clock[3..5], "minutes", input)?;
    let seconds = parse_digits(&clock[6..8], "seconds", input)?;
    if hours > 23 || minutes > 59 || seconds > 59 {
        return Err(DateTimeParseError::new("time of day", input));
    }

    let (frac, suffix) = split_fraction(&input[19..]);
    let offset = match suffix {
        "" => 0,
        s => parse_offset(s, input)?,
    };

    let local = days * MICROS_PER_DAY
        + hours * MICROS_PER_HOUR
        + minutes * MICROS_PER_MINUTE
        + seconds * MICROS_PER_SECOND
        + fraction_micros(frac);

    // local = UTC + offset
    Ok((local - offset * MICROS_PER_MINUTE, offset))
}

/// Formats UTC microseconds as `YYYY-MM-DDTHH:MM:SS[.ffffff]Z`.
pub fn format_datetime_rfc3339(epoch_micros: Timestamp) -> String {
    let days = epoch_micros.div_euclid(MICROS_PER_DAY);
    let time = epoch_micros.rem_euclid(MICROS_PER_DAY);
    let (year, month, day) = days_to_date(days);

    let hours = time / MICROS_PER_HOUR;
    let minutes = (time % MICROS_PER_HOUR) / MICROS_PER_MINUTE;
    let seconds = (time % MICROS_PER_MINUTE) / MICROS_PER_SECOND;
    let micros = time % MICROS_PER_SECOND;

    let frac = if micros == 0 {
        String::new()
    } else {
        format!(".{}", format!("{:06}", micros).trim_end_matches('0'))
    };

    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}{}Z",
        year, month, day, hours, minutes, seconds, frac
    )
}

/// Accepts an RFC 3339 date or datetime and returns the canonical UTC
/// datetime string. A bare date means midnight at its offset.
pub fn normalize_date(input: &str) -> Result<String, DateTimeParseError> {
    if input.len() > 10 && matches!(input.as_bytes()[10], b'T' | b't' | b' ') {
        let (micros, _) = parse_datetime_rfc3339(input)?;
        return Ok(format_datetime_rfc3339(micros));
    }
    let (days, offset) = parse_date_rfc3339(input)?;
    Ok(format_datetime_rfc3339(
        days * MICROS_PER_DAY - offset * MICROS_PER_MINUTE,
    ))
}
