//! Date-string tooling shared by every pipeline stage.
//!
//! All intermediate files carry dates as formatted strings; these helpers
//! convert between the formats of the various upstream exports and the
//! pipeline's standard day/month keys.

use anyhow::{Result, anyhow};
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use std::fmt::Write;
use tracing::debug;

/// e.g. `01/01/2013 12:00:20 AM` — raw incident export timestamps.
pub const INCIDENT_FORMAT: &str = "%m/%d/%Y %I:%M:%S %p";
/// e.g. `01-01-2013` — the pipeline's standard day key.
pub const DAY_FORMAT: &str = "%d-%m-%Y";
/// e.g. `01-2013` — the pipeline's standard month key.
pub const MONTH_FORMAT: &str = "%m-%Y";
/// e.g. `06/08/2011` — complaint "Date Entered" values.
pub const COMPLAINT_FORMAT: &str = "%m/%d/%Y";
/// e.g. `20110806` — violation issue dates.
pub const VIOLATION_FORMAT: &str = "%Y%m%d";

/// Marker written where a source value is absent or unparseable.
pub const NULL_MARKER: &str = "null";

/// Parses `value` under `fmt`, accepting either a full datetime or a bare
/// date (midnight-extended).
fn parse_dt(value: &str, fmt: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, fmt) {
        return Some(dt);
    }
    NaiveDate::parse_from_str(value, fmt)
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

fn render(dt: NaiveDateTime, fmt: &str) -> Option<String> {
    let mut out = String::new();
    write!(out, "{}", dt.format(fmt)).ok()?;
    Some(out)
}

/// Re-renders a date string from `from_fmt` into `to_fmt`.
///
/// Returns `None` (and logs) when the input does not parse; malformed dates
/// flow through later joins as missing values rather than aborting the run.
pub fn normalize_dt(value: &str, from_fmt: &str, to_fmt: &str) -> Option<String> {
    match parse_dt(value, from_fmt) {
        Some(dt) => render(dt, to_fmt),
        None => {
            debug!(value, from_fmt, "date did not parse");
            None
        }
    }
}

/// Every calendar day in the half-open interval `[from, to)`, rendered under
/// `out_fmt`. Empty when `to <= from`.
pub fn generate_dates(from: &str, to: &str, fmt: &str, out_fmt: &str) -> Result<Vec<String>> {
    let from_dt = parse_dt(from, fmt).ok_or_else(|| anyhow!("invalid start date '{from}'"))?;
    let to_dt = parse_dt(to, fmt).ok_or_else(|| anyhow!("invalid end date '{to}'"))?;

    let days = (to_dt - from_dt).num_seconds() / 86_400;
    let mut dates = Vec::new();
    for offset in 0..days.max(0) {
        let day = from_dt + Duration::days(offset);
        dates.push(render(day, out_fmt).ok_or_else(|| anyhow!("invalid output format '{out_fmt}'"))?);
    }
    Ok(dates)
}

/// Weekday index of a date string, 0 = Monday. `None` when unparseable.
pub fn weekday(value: &str, fmt: &str) -> Option<u32> {
    parse_dt(value, fmt).map(|dt| dt.weekday().num_days_from_monday())
}

/// Month of a date string, 1..=12. `None` when unparseable.
pub fn month(value: &str, fmt: &str) -> Option<u32> {
    parse_dt(value, fmt).map(|dt| dt.month())
}

/// Whole days from `b` to `a` (negative when `a` precedes `b`).
pub fn days_between(a: &str, b: &str, fmt: &str) -> Option<i64> {
    let a = parse_dt(a, fmt)?;
    let b = parse_dt(b, fmt)?;
    Some((a - b).num_days())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_dt_reformats() {
        assert_eq!(
            normalize_dt("01/15/2014", "%m/%d/%Y", "%d-%m-%Y"),
            Some("15-01-2014".to_string())
        );
    }

    #[test]
    fn test_normalize_dt_datetime_to_day() {
        assert_eq!(
            normalize_dt("03/07/2013 11:59:00 PM", INCIDENT_FORMAT, DAY_FORMAT),
            Some("07-03-2013".to_string())
        );
    }

    #[test]
    fn test_normalize_dt_day_to_month() {
        assert_eq!(
            normalize_dt("25-12-2014", DAY_FORMAT, MONTH_FORMAT),
            Some("12-2014".to_string())
        );
    }

    #[test]
    fn test_normalize_dt_invalid_returns_none() {
        assert_eq!(normalize_dt("not-a-date", "%m/%d/%Y", "%d-%m-%Y"), None);
        assert_eq!(normalize_dt("13/45/2014", "%m/%d/%Y", "%d-%m-%Y"), None);
    }

    #[test]
    fn test_generate_dates_half_open() {
        let dates = generate_dates("01-01-2014", "05-01-2014", DAY_FORMAT, DAY_FORMAT).unwrap();
        assert_eq!(
            dates,
            vec!["01-01-2014", "02-01-2014", "03-01-2014", "04-01-2014"]
        );
    }

    #[test]
    fn test_generate_dates_count_matches_day_diff() {
        let dates = generate_dates("01-01-2013", "01-01-2014", DAY_FORMAT, DAY_FORMAT).unwrap();
        assert_eq!(dates.len(), 365);
        // strictly increasing
        for pair in dates.windows(2) {
            let a = days_between(&pair[1], &pair[0], DAY_FORMAT).unwrap();
            assert_eq!(a, 1);
        }
    }

    #[test]
    fn test_generate_dates_empty_when_reversed() {
        let dates = generate_dates("05-01-2014", "01-01-2014", DAY_FORMAT, DAY_FORMAT).unwrap();
        assert!(dates.is_empty());
        let same = generate_dates("05-01-2014", "05-01-2014", DAY_FORMAT, DAY_FORMAT).unwrap();
        assert!(same.is_empty());
    }

    #[test]
    fn test_generate_dates_from_incident_timestamps() {
        let dates = generate_dates(
            "01/01/2014 08:30:00 AM",
            "01/03/2014 09:00:00 PM",
            INCIDENT_FORMAT,
            DAY_FORMAT,
        )
        .unwrap();
        assert_eq!(dates, vec!["01-01-2014", "02-01-2014"]);
    }

    #[test]
    fn test_weekday_and_month() {
        // 2014-01-01 was a Wednesday
        assert_eq!(weekday("01-01-2014", DAY_FORMAT), Some(2));
        assert_eq!(month("01-12-2014", DAY_FORMAT), Some(12));
        assert_eq!(weekday("junk", DAY_FORMAT), None);
    }

    #[test]
    fn test_days_between() {
        assert_eq!(days_between("05-01-2014", "01-01-2014", DAY_FORMAT), Some(4));
        assert_eq!(days_between("01-01-2014", "05-01-2014", DAY_FORMAT), Some(-4));
    }
}
