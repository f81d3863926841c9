//! Functions for parsing and formatting the timestamps on `---`/`+++` lines.
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone};
use lazy_static::lazy_static;
use thiserror::Error;

/// Error parsing a diff timestamp.
#[derive(Debug, PartialEq, Eq, Error)]
pub enum ParseDiffTimeError {
    /// The date string is invalid.
    #[error("invalid date: {0}")]
    InvalidDate(String),

    /// The timezone offset is invalid.
    #[error("invalid timezone offset: {0}")]
    InvalidTimezoneOffset(String),
}

/// Format a timestamp the way GNU diff writes it.
pub fn format_diff_time(time: &DateTime<FixedOffset>) -> String {
    time.format("%Y-%m-%d %H:%M:%S%.9f %z").to_string()
}

/// Parse a diff timestamp.
///
/// Accepts `%Y-%m-%d %H:%M:%S[.fraction] [+-]%H%M`, the same without an
/// offset (taken as UTC), and the ctime form `%a %b %d %H:%M:%S %Y` (UTC).
pub fn parse_diff_time(date_str: &str) -> Result<DateTime<FixedOffset>, ParseDiffTimeError> {
    lazy_static! {
        // Groups: 1 = %Y-%m-%d %H:%M:%S[.frac]; 2 = sign; 3 = %H; 4 = %M
        static ref RE_DIFFTIME: regex::Regex = regex::Regex::new(
            r"^(\d+-\d+-\d+\s+\d+:\d+:\d+(?:\.\d+)?)(?:\s+([+-])(\d\d)(\d\d))?$"
        )
        .unwrap();
        static ref RE_CTIME: regex::Regex =
            regex::Regex::new(r"^[A-Z][a-z]{2}\s+[A-Z][a-z]{2}\s+\d+\s+\d+:\d+:\d+\s+\d{4}$").unwrap();
    }

    let date_str = date_str.trim();
    let invalid = || ParseDiffTimeError::InvalidDate(date_str.to_string());

    if let Some(m) = RE_DIFFTIME.captures(date_str) {
        let local = normalize_spaces(&m[1]);
        let format = if local.contains('.') {
            "%Y-%m-%d %H:%M:%S%.f"
        } else {
            "%Y-%m-%d %H:%M:%S"
        };
        let naive = NaiveDateTime::parse_from_str(&local, format).map_err(|_| invalid())?;

        let offset = match (m.get(2), m.get(3), m.get(4)) {
            (Some(sign), Some(hours), Some(minutes)) => {
                let bad_offset = || ParseDiffTimeError::InvalidTimezoneOffset(date_str.to_string());
                let hours = hours.as_str().parse::<i32>().map_err(|_| bad_offset())?;
                let minutes = minutes.as_str().parse::<i32>().map_err(|_| bad_offset())?;
                if hours >= 24 || minutes >= 60 {
                    return Err(bad_offset());
                }
                let secs = hours * 3600 + minutes * 60;
                let secs = if sign.as_str() == "-" { -secs } else { secs };
                FixedOffset::east_opt(secs).ok_or_else(bad_offset)?
            }
            _ => utc(),
        };
        return offset
            .from_local_datetime(&naive)
            .single()
            .ok_or_else(invalid);
    }

    if RE_CTIME.is_match(date_str) {
        let naive = NaiveDateTime::parse_from_str(&normalize_spaces(date_str), "%a %b %d %H:%M:%S %Y")
            .map_err(|_| invalid())?;
        return utc().from_local_datetime(&naive).single().ok_or_else(invalid);
    }

    Err(invalid())
}

fn utc() -> FixedOffset {
    FixedOffset::east_opt(0).unwrap()
}

fn normalize_spaces(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_diff_time() {
        let time = parse_diff_time("2019-01-01 00:00:00 +0000").unwrap();
        assert_eq!(time.timestamp(), 1546300800);
        assert_eq!(time.offset().local_minus_utc(), 0);
    }

    #[test]
    fn test_parse_with_fraction_and_negative_offset() {
        let time = parse_diff_time("2005-09-23 16:23:20.000000000 -0530").unwrap();
        assert_eq!(time.offset().local_minus_utc(), -(5 * 3600 + 30 * 60));
        assert_eq!(
            time,
            FixedOffset::west_opt(5 * 3600 + 30 * 60)
                .unwrap()
                .with_ymd_and_hms(2005, 9, 23, 16, 23, 20)
                .unwrap()
        );
    }

    #[test]
    fn test_parse_without_offset_is_utc() {
        let time = parse_diff_time("2019-01-01 00:00:00").unwrap();
        assert_eq!(time.timestamp(), 1546300800);
    }

    #[test]
    fn test_parse_ctime() {
        let time = parse_diff_time("Tue Jan  1 00:00:00 2019").unwrap();
        assert_eq!(time.timestamp(), 1546300800);
    }

    #[test]
    fn test_invalid() {
        assert_eq!(
            parse_diff_time("yesterday"),
            Err(ParseDiffTimeError::InvalidDate("yesterday".to_string()))
        );
        assert!(matches!(
            parse_diff_time("2019-01-01 00:00:00 +2500"),
            Err(ParseDiffTimeError::InvalidTimezoneOffset(_))
        ));
    }

    #[test]
    fn test_format_diff_time() {
        let time = parse_diff_time("2009-10-14 19:49:59 +0000").unwrap();
        assert_eq!(format_diff_time(&time), "2009-10-14 19:49:59.000000000 +0000");
        assert_eq!(parse_diff_time(&format_diff_time(&time)).unwrap(), time);
    }
}
