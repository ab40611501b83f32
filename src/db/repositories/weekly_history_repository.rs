use std::convert::TryFrom;

use chrono::{NaiveDate, Utc};
use rusqlite::{named_params, Connection, OptionalExtension, Row};

use crate::db::repositories::{parse_date, parse_timestamp};
use crate::error::{AppError, AppResult};
use crate::models::weekly_history::{WeeklyHistoryRecord, WeeklyHistoryUpsert};
use crate::utils::week::format_week;

#[derive(Debug, Clone)]
pub struct WeeklyHistoryRow {
    pub user_id: String,
    pub week_start_date: String,
    pub total_points: f64,
    pub tasks_completed: i64,
    pub weekly_goal: i64,
    pub goal_achieved: bool,
    pub updated_at: String,
}

impl WeeklyHistoryRow {
    pub fn into_record(self) -> AppResult<WeeklyHistoryRecord> {
        Ok(WeeklyHistoryRecord {
            week_start_date: parse_date("week_start_date", &self.week_start_date)?,
            updated_at: parse_timestamp("updated_at", &self.updated_at)?,
            user_id: self.user_id,
            total_points: self.total_points,
            tasks_completed: self.tasks_completed,
            weekly_goal: self.weekly_goal,
            goal_achieved: self.goal_achieved,
        })
    }
}

impl TryFrom<&Row<'_>> for WeeklyHistoryRow {
    type Error = rusqlite::Error;

    fn try_from(row: &Row<'_>) -> Result<Self, Self::Error> {
        Ok(Self {
            user_id: row.get("user_id")?,
            week_start_date: row.get("week_start_date")?,
            total_points: row.get("total_points")?,
            tasks_completed: row.get("tasks_completed")?,
            weekly_goal: row.get("weekly_goal")?,
            goal_achieved: row.get::<_, i64>("goal_achieved")? != 0,
            updated_at: row.get("updated_at")?,
        })
    }
}

pub struct WeeklyHistoryRepository;

impl WeeklyHistoryRepository {
    pub fn upsert(conn: &Connection, input: &WeeklyHistoryUpsert) -> AppResult<()> {
        let updated_at = Utc::now().to_rfc3339();

        conn.execute(
            r#"
                INSERT INTO weekly_history (
                    user_id,
                    week_start_date,
                    total_points,
                    tasks_completed,
                    weekly_goal,
                    goal_achieved,
                    updated_at
                ) VALUES (
                    :user_id,
                    :week_start_date,
                    :total_points,
                    :tasks_completed,
                    :weekly_goal,
                    :goal_achieved,
                    :updated_at
                )
                ON CONFLICT(user_id, week_start_date) DO UPDATE SET
                    total_points = excluded.total_points,
                    tasks_completed = excluded.tasks_completed,
                    weekly_goal = excluded.weekly_goal,
                    goal_achieved = excluded.goal_achieved,
                    updated_at = excluded.updated_at
            "#,
            named_params! {
                ":user_id": &input.user_id,
                ":week_start_date": format_week(input.week_start_date),
                ":total_points": input.total_points,
                ":tasks_completed": input.tasks_completed,
                ":weekly_goal": input.weekly_goal,
                ":goal_achieved": input.goal_achieved() as i64,
                ":updated_at": &updated_at,
            },
        )?;

        Ok(())
    }

    pub fn find(
        conn: &Connection,
        user_id: &str,
        week_start: NaiveDate,
    ) -> AppResult<Option<WeeklyHistoryRecord>> {
        let mut stmt = conn.prepare(
            r#"
                SELECT
                    user_id,
                    week_start_date,
                    total_points,
                    tasks_completed,
                    weekly_goal,
                    goal_achieved,
                    updated_at
                FROM weekly_history
                WHERE user_id = :user_id AND week_start_date = :week_start_date
            "#,
        )?;

        let row = stmt
            .query_row(
                named_params! {
                    ":user_id": user_id,
                    ":week_start_date": format_week(week_start),
                },
                |row| WeeklyHistoryRow::try_from(row),
            )
            .optional()?;

        row.map(|row| row.into_record()).transpose()
    }

    /// Weeks in `[from, before)`, oldest first. The upper bound is exclusive so
    /// a goal never sees its own week.
    pub fn list_range(
        conn: &Connection,
        user_id: &str,
        from: NaiveDate,
        before: NaiveDate,
    ) -> AppResult<Vec<WeeklyHistoryRecord>> {
        let mut stmt = conn.prepare(
            r#"
                SELECT
                    user_id,
                    week_start_date,
                    total_points,
                    tasks_completed,
                    weekly_goal,
                    goal_achieved,
                    updated_at
                FROM weekly_history
                WHERE user_id = :user_id
                  AND week_start_date >= :from
                  AND week_start_date < :before
                ORDER BY week_start_date ASC
            "#,
        )?;

        let records = stmt
            .query_map(
                named_params! {
                    ":user_id": user_id,
                    ":from": format_week(from),
                    ":before": format_week(before),
                },
                |row| WeeklyHistoryRow::try_from(row),
            )?
            .map(|row| {
                row.map_err(AppError::from)
                    .and_then(|row| row.into_record())
            })
            .collect::<AppResult<Vec<_>>>()?;

        Ok(records)
    }

    pub fn list_recent(
        conn: &Connection,
        user_id: &str,
        limit: usize,
    ) -> AppResult<Vec<WeeklyHistoryRecord>> {
        let mut stmt = conn.prepare(
            r#"
                SELECT
                    user_id,
                    week_start_date,
                    total_points,
                    tasks_completed,
                    weekly_goal,
                    goal_achieved,
                    updated_at
                FROM weekly_history
                WHERE user_id = :user_id
                ORDER BY week_start_date DESC
                LIMIT :limit
            "#,
        )?;

        let records = stmt
            .query_map(
                named_params! {":user_id": user_id, ":limit": limit as i64},
                |row| WeeklyHistoryRow::try_from(row),
            )?
            .map(|row| {
                row.map_err(AppError::from)
                    .and_then(|row| row.into_record())
            })
            .collect::<AppResult<Vec<_>>>()?;

        Ok(records)
    }
}
