//! Weekly schedule to concrete timestamp conversion
//!
//! The organisation runs in a single fixed timezone (UTC+8, no DST). A
//! schedule is a day of week (0 = Monday ... 6 = Sunday) plus a local
//! `HH:MM`. The scheduling cycle is the Monday-to-Sunday week, in local
//! time, that contains the reference instant.

use crate::error::TimeWindowError;
use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveTime, TimeZone, Utc};

/// Offset of the organisational timezone from UTC, in seconds
pub const TARGET_UTC_OFFSET_SECS: i32 = 8 * 3600;

/// The organisational timezone
pub fn target_timezone() -> FixedOffset {
    FixedOffset::east_opt(TARGET_UTC_OFFSET_SECS).expect("UTC+8 is within offset bounds")
}

/// Parse a local wall-clock time. `HH:MM:SS` is accepted as well since
/// PostgreSQL renders `TIME` columns that way.
pub fn parse_time_of_day(value: &str) -> Result<NaiveTime, TimeWindowError> {
    let trimmed = value.trim();
    NaiveTime::parse_from_str(trimmed, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M:%S"))
        .map_err(|_| TimeWindowError::InvalidTime(value.to_string()))
}

/// Occurrence of `day_of_week` at `time` within the week containing
/// `reference`.
///
/// The result may lie in the past relative to `reference`; callers decide
/// what to do with occurrences that already happened.
pub fn occurrence(
    day_of_week: i32,
    time: &str,
    reference: DateTime<Utc>,
) -> Result<DateTime<Utc>, TimeWindowError> {
    if !(0..=6).contains(&day_of_week) {
        return Err(TimeWindowError::InvalidDayOfWeek(day_of_week));
    }
    let time = parse_time_of_day(time)?;

    let tz = target_timezone();
    let local = reference.with_timezone(&tz);
    let monday =
        local.date_naive() - Duration::days(i64::from(local.weekday().num_days_from_monday()));
    let date = monday + Duration::days(i64::from(day_of_week));

    tz.from_local_datetime(&date.and_time(time))
        .single()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or(TimeWindowError::Unrepresentable)
}

/// Start and end of a service's occurrence in the week containing
/// `reference`. An end at or before the start belongs to the following day.
pub fn session_window(
    day_of_week: i32,
    start_time: &str,
    end_time: &str,
    reference: DateTime<Utc>,
) -> Result<(DateTime<Utc>, DateTime<Utc>), TimeWindowError> {
    let start = occurrence(day_of_week, start_time, reference)?;
    let mut end = occurrence(day_of_week, end_time, reference)?;
    if end <= start {
        end += Duration::days(1);
    }
    Ok((start, end))
}
