//! Normalization of platform timestamps and duration tokens.

use chrono::{DateTime, Duration};

/// Rewrite an RFC 3339 timestamp (`2023-01-01T00:00:00Z`) into the
/// space-joined form stored in the schema (`2023-01-01 00:00:00`).
///
/// Already-normalized input passes through unchanged, so the table-specific
/// add operations can re-apply this safely.
pub fn normalize_timestamp(raw: &str) -> String {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(ts) => ts.format("%Y-%m-%d %H:%M:%S").to_string(),
        Err(_) => raw.trim_end_matches('Z').replacen('T', " ", 1),
    }
}

/// Parse a compact ISO-8601 duration token (`PT1H2M3S`, optionally with a
/// day component as in `P1DT2H`) into a time span.
///
/// Unrecognized tokens come back as a zero span, matching the policy that
/// missing or malformed numeric fields default to zero.
pub fn parse_duration(token: &str) -> Duration {
    let Some(rest) = token.strip_prefix('P') else {
        return Duration::zero();
    };

    let mut days = 0i64;
    let mut hours = 0i64;
    let mut minutes = 0i64;
    let mut seconds = 0i64;
    let mut in_time = false;
    let mut digits = String::new();

    for ch in rest.chars() {
        match ch {
            'T' => in_time = true,
            '0'..='9' => digits.push(ch),
            'D' if !in_time => days = take(&mut digits),
            'H' if in_time => hours = take(&mut digits),
            'M' if in_time => minutes = take(&mut digits),
            'S' if in_time => seconds = take(&mut digits),
            // Year/month designators never show up in video durations.
            _ => return Duration::zero(),
        }
    }

    Duration::days(days)
        + Duration::hours(hours)
        + Duration::minutes(minutes)
        + Duration::seconds(seconds)
}

/// Format a time span as `HH:MM:SS`; any day component is absorbed into the
/// hour field.
pub fn format_duration(span: Duration) -> String {
    let total = span.num_seconds().max(0);
    format!("{:02}:{:02}:{:02}", total / 3600, (total % 3600) / 60, total % 60)
}

fn take(digits: &mut String) -> i64 {
    let value = digits.parse().unwrap_or(0);
    digits.clear();
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_strips_offset_and_joins_components() {
        assert_eq!(
            normalize_timestamp("2023-01-01T00:00:00Z"),
            "2023-01-01 00:00:00"
        );
        assert_eq!(
            normalize_timestamp("2019-06-15T08:30:45Z"),
            "2019-06-15 08:30:45"
        );
    }

    #[test]
    fn timestamp_normalization_is_idempotent() {
        let once = normalize_timestamp("2023-01-01T00:00:00Z");
        assert_eq!(normalize_timestamp(&once), once);
    }

    #[test]
    fn duration_hours_minutes_seconds() {
        assert_eq!(
            parse_duration("PT1H2M3S"),
            Duration::hours(1) + Duration::minutes(2) + Duration::seconds(3)
        );
        assert_eq!(format_duration(parse_duration("PT1H2M3S")), "01:02:03");
    }

    #[test]
    fn duration_partial_components() {
        assert_eq!(parse_duration("PT15S"), Duration::seconds(15));
        assert_eq!(parse_duration("PT4M"), Duration::minutes(4));
        assert_eq!(format_duration(parse_duration("PT4M")), "00:04:00");
    }

    #[test]
    fn duration_with_days_rolls_into_hours() {
        assert_eq!(
            parse_duration("P1DT2H"),
            Duration::days(1) + Duration::hours(2)
        );
        assert_eq!(format_duration(parse_duration("P1DT2H")), "26:00:00");
    }

    #[test]
    fn malformed_duration_is_zero() {
        assert_eq!(parse_duration(""), Duration::zero());
        assert_eq!(parse_duration("1H2M"), Duration::zero());
        assert_eq!(parse_duration("P1Y"), Duration::zero());
        assert_eq!(format_duration(Duration::zero()), "00:00:00");
    }
}
