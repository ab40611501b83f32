pub mod achievement_repository;
pub mod completion_repository;
pub mod custom_task_repository;
pub mod settings_repository;
pub mod weekly_history_repository;
pub mod weekly_stat_repository;

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::json;

use crate::error::{AppError, AppResult};
use crate::utils::week::WEEK_DATE_FORMAT;

pub(crate) fn parse_timestamp(column: &str, value: &str) -> AppResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| {
            AppError::database(format!(
                "corrupt timestamp in column {column}: {}",
                json!({"value": value, "error": err.to_string()})
            ))
        })
}

pub(crate) fn parse_date(column: &str, value: &str) -> AppResult<NaiveDate> {
    NaiveDate::parse_from_str(value, WEEK_DATE_FORMAT).map_err(|err| {
        AppError::database(format!(
            "corrupt date in column {column}: {}",
            json!({"value": value, "error": err.to_string()})
        ))
    })
}
