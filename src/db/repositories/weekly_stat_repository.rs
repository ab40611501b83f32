use std::convert::TryFrom;

use chrono::NaiveDate;
use rusqlite::{named_params, Connection, OptionalExtension, Row};

use crate::db::repositories::{parse_date, parse_timestamp};
use crate::error::{AppError, AppResult};
use crate::models::weekly_stat::TaskWeeklyStatRecord;
use crate::utils::week::format_week;

#[derive(Debug, Clone)]
pub struct TaskWeeklyStatRow {
    pub user_id: String,
    pub task_id: String,
    pub week_start_date: String,
    pub display_name: String,
    pub base_points: f64,
    pub current_value: f64,
    pub times_this_week: i64,
    pub last_completed_at: Option<String>,
}

impl TaskWeeklyStatRow {
    pub fn from_record(record: &TaskWeeklyStatRecord) -> Self {
        Self {
            user_id: record.user_id.clone(),
            task_id: record.task_id.clone(),
            week_start_date: format_week(record.week_start_date),
            display_name: record.display_name.clone(),
            base_points: record.base_points,
            current_value: record.current_value,
            times_this_week: record.times_this_week,
            last_completed_at: record.last_completed_at.map(|dt| dt.to_rfc3339()),
        }
    }

    pub fn into_record(self) -> AppResult<TaskWeeklyStatRecord> {
        let last_completed_at = match self.last_completed_at.as_deref() {
            Some(value) => Some(parse_timestamp("last_completed_at", value)?),
            None => None,
        };

        Ok(TaskWeeklyStatRecord {
            week_start_date: parse_date("week_start_date", &self.week_start_date)?,
            user_id: self.user_id,
            task_id: self.task_id,
            display_name: self.display_name,
            base_points: self.base_points,
            current_value: self.current_value,
            times_this_week: self.times_this_week,
            last_completed_at,
        })
    }
}

impl TryFrom<&Row<'_>> for TaskWeeklyStatRow {
    type Error = rusqlite::Error;

    fn try_from(row: &Row<'_>) -> Result<Self, Self::Error> {
        Ok(Self {
            user_id: row.get("user_id")?,
            task_id: row.get("task_id")?,
            week_start_date: row.get("week_start_date")?,
            display_name: row.get("display_name")?,
            base_points: row.get("base_points")?,
            current_value: row.get("current_value")?,
            times_this_week: row.get("times_this_week")?,
            last_completed_at: row.get("last_completed_at")?,
        })
    }
}

pub struct WeeklyStatRepository;

impl WeeklyStatRepository {
    pub fn find(
        conn: &Connection,
        user_id: &str,
        task_id: &str,
        week_start: NaiveDate,
    ) -> AppResult<Option<TaskWeeklyStatRecord>> {
        let mut stmt = conn.prepare(
            r#"
                SELECT
                    user_id,
                    task_id,
                    week_start_date,
                    display_name,
                    base_points,
                    current_value,
                    times_this_week,
                    last_completed_at
                FROM task_weekly_stats
                WHERE user_id = :user_id
                  AND task_id = :task_id
                  AND week_start_date = :week_start_date
            "#,
        )?;

        let row = stmt
            .query_row(
                named_params! {
                    ":user_id": user_id,
                    ":task_id": task_id,
                    ":week_start_date": format_week(week_start),
                },
                |row| TaskWeeklyStatRow::try_from(row),
            )
            .optional()?;

        row.map(|row| row.into_record()).transpose()
    }

    pub fn list_by_week(
        conn: &Connection,
        user_id: &str,
        week_start: NaiveDate,
    ) -> AppResult<Vec<TaskWeeklyStatRecord>> {
        let mut stmt = conn.prepare(
            r#"
                SELECT
                    user_id,
                    task_id,
                    week_start_date,
                    display_name,
                    base_points,
                    current_value,
                    times_this_week,
                    last_completed_at
                FROM task_weekly_stats
                WHERE user_id = :user_id AND week_start_date = :week_start_date
                ORDER BY task_id ASC
            "#,
        )?;

        let records = stmt
            .query_map(
                named_params! {
                    ":user_id": user_id,
                    ":week_start_date": format_week(week_start),
                },
                |row| TaskWeeklyStatRow::try_from(row),
            )?
            .map(|row| {
                row.map_err(AppError::from)
                    .and_then(|row| row.into_record())
            })
            .collect::<AppResult<Vec<_>>>()?;

        Ok(records)
    }

    pub fn upsert(conn: &Connection, record: &TaskWeeklyStatRecord) -> AppResult<()> {
        let row = TaskWeeklyStatRow::from_record(record);

        conn.execute(
            r#"
                INSERT INTO task_weekly_stats (
                    user_id,
                    task_id,
                    week_start_date,
                    display_name,
                    base_points,
                    current_value,
                    times_this_week,
                    last_completed_at
                ) VALUES (
                    :user_id,
                    :task_id,
                    :week_start_date,
                    :display_name,
                    :base_points,
                    :current_value,
                    :times_this_week,
                    :last_completed_at
                )
                ON CONFLICT(user_id, task_id, week_start_date) DO UPDATE SET
                    display_name = excluded.display_name,
                    base_points = excluded.base_points,
                    current_value = excluded.current_value,
                    times_this_week = excluded.times_this_week,
                    last_completed_at = excluded.last_completed_at
            "#,
            named_params! {
                ":user_id": &row.user_id,
                ":task_id": &row.task_id,
                ":week_start_date": &row.week_start_date,
                ":display_name": &row.display_name,
                ":base_points": &row.base_points,
                ":current_value": &row.current_value,
                ":times_this_week": &row.times_this_week,
                ":last_completed_at": &row.last_completed_at,
            },
        )?;

        Ok(())
    }

    /// Resets every stat of a user-week without deleting the rows.
    pub fn reset_week(conn: &Connection, user_id: &str, week_start: NaiveDate) -> AppResult<usize> {
        let updated = conn.execute(
            r#"
                UPDATE task_weekly_stats SET
                    times_this_week = 0,
                    current_value = base_points,
                    last_completed_at = NULL
                WHERE user_id = :user_id AND week_start_date = :week_start_date
            "#,
            named_params! {
                ":user_id": user_id,
                ":week_start_date": format_week(week_start),
            },
        )?;

        Ok(updated)
    }
}
