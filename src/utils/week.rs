//! Week bucketing shared by every call site.
//!
//! A week starts on Monday 00:00 UTC. Timestamps are converted to their UTC
//! calendar date first, so a completion logged late on Sunday in a western
//! timezone may already belong to the following week.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde_json::json;

use crate::error::{AppError, AppResult};

pub const WEEK_DATE_FORMAT: &str = "%Y-%m-%d";

/// Monday of the ISO week containing `date`.
pub fn week_start_of(date: NaiveDate) -> NaiveDate {
    let offset = date.weekday().num_days_from_monday() as i64;
    date - Duration::days(offset)
}

pub fn week_start_of_timestamp(timestamp: DateTime<Utc>) -> NaiveDate {
    week_start_of(timestamp.date_naive())
}

pub fn previous_week(week_start: NaiveDate) -> NaiveDate {
    week_start - Duration::days(7)
}

pub fn weeks_before(week_start: NaiveDate, weeks: i64) -> NaiveDate {
    week_start - Duration::days(7 * weeks)
}

pub fn is_week_start(date: NaiveDate) -> bool {
    week_start_of(date) == date
}

/// Rejects dates that are not a Monday. Callers pass week keys around, so a
/// mid-week date almost always means a caller bug.
pub fn ensure_week_start(date: NaiveDate) -> AppResult<NaiveDate> {
    if is_week_start(date) {
        Ok(date)
    } else {
        Err(AppError::validation_with_details(
            "week start date must be a Monday",
            json!({"value": date.format(WEEK_DATE_FORMAT).to_string()}),
        ))
    }
}

pub fn format_week(date: NaiveDate) -> String {
    date.format(WEEK_DATE_FORMAT).to_string()
}
