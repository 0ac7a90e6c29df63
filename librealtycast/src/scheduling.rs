//! Parsing of `scheduledAt` values
//!
//! Clients may send an absolute RFC 3339 timestamp, a relative duration
//! (`"30m"`, `"2h 15m"`, `"in 1 day"`), or a natural-language time
//! (`"tomorrow 9am"`). All of them resolve to a Unix timestamp.

use chrono::{DateTime, Duration, Utc};

use crate::error::{RealtycastError, Result};

/// Resolve a schedule string relative to `now`
///
/// # Errors
///
/// Returns a validation error if the string is empty or matches none of the
/// supported formats.
pub fn parse_schedule(input: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let input = input.trim();
    if input.is_empty() {
        return Err(RealtycastError::Validation(
            "scheduledAt cannot be empty".to_string(),
        ));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.with_timezone(&Utc));
    }

    let relative = input.strip_prefix("in ").unwrap_or(input);
    if let Ok(duration) = parse_duration(relative) {
        return Ok(now + duration);
    }

    if let Ok(dt) = chrono_english::parse_date_string(input, now, chrono_english::Dialect::Us) {
        return Ok(dt);
    }

    Err(RealtycastError::Validation(format!(
        "Could not parse scheduledAt: {}",
        input
    )))
}

/// Resolve a schedule string into a Unix timestamp
pub fn parse_schedule_ts(input: &str, now: i64) -> Result<i64> {
    let now = DateTime::from_timestamp(now, 0).ok_or_else(|| {
        RealtycastError::Validation(format!("timestamp out of range: {}", now))
    })?;
    parse_schedule(input, now).map(|dt| dt.timestamp())
}

fn parse_duration(input: &str) -> Result<Duration> {
    let std_duration = humantime::parse_duration(input)
        .map_err(|e| RealtycastError::Validation(format!("Could not parse duration: {}", e)))?;

    let seconds = i64::try_from(std_duration.as_secs())
        .map_err(|_| RealtycastError::Validation("Duration out of range".to_string()))?;
    Duration::try_seconds(seconds)
        .ok_or_else(|| RealtycastError::Validation("Duration out of range".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_parse_rfc3339() {
        let dt = parse_schedule("2026-03-11T09:30:00Z", fixed_now()).unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2026, 3, 11, 9, 30, 0).unwrap());
    }

    #[test]
    fn test_parse_rfc3339_with_offset() {
        let dt = parse_schedule("2026-03-11T09:30:00-05:00", fixed_now()).unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2026, 3, 11, 14, 30, 0).unwrap());
    }

    #[test]
    fn test_parse_past_timestamp_is_allowed() {
        let dt = parse_schedule("2020-01-01T00:00:00Z", fixed_now()).unwrap();
        assert!(dt < fixed_now());
    }

    #[test]
    fn test_parse_relative_minutes() {
        let dt = parse_schedule("30m", fixed_now()).unwrap();
        assert_eq!((dt - fixed_now()).num_minutes(), 30);
    }

    #[test]
    fn test_parse_relative_with_in_prefix() {
        let dt = parse_schedule("in 2h", fixed_now()).unwrap();
        assert_eq!((dt - fixed_now()).num_hours(), 2);
    }

    #[test]
    fn test_parse_compound_duration() {
        let dt = parse_schedule("1h 15m", fixed_now()).unwrap();
        assert_eq!((dt - fixed_now()).num_minutes(), 75);
    }

    #[test]
    fn test_parse_tomorrow() {
        let dt = parse_schedule("tomorrow", fixed_now()).unwrap();
        let hours = (dt - fixed_now()).num_hours();
        assert!((12..=36).contains(&hours), "expected about a day, got {}h", hours);
    }

    #[test]
    fn test_parse_timestamp_helper() {
        let now = fixed_now().timestamp();
        assert_eq!(parse_schedule_ts("10m", now).unwrap(), now + 600);
    }

    #[test]
    fn test_parse_empty_string() {
        assert!(parse_schedule("   ", fixed_now()).is_err());
    }

    #[test]
    fn test_parse_garbage() {
        let err = parse_schedule("whenever you feel like it", fixed_now()).unwrap_err();
        assert!(matches!(err, RealtycastError::Validation(_)));
    }
}
