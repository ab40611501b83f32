use std::convert::TryFrom;

use chrono::NaiveDate;
use rusqlite::{named_params, Connection, OptionalExtension, Row};

use crate::db::repositories::{parse_date, parse_timestamp};
use crate::error::{AppError, AppResult};
use crate::models::completion::TaskCompletionRecord;
use crate::utils::week::format_week;

const COMPLETION_COLUMNS: &str = r#"
    id,
    user_id,
    task_id,
    display_name,
    base_points,
    multiplier,
    awarded_points,
    note,
    completed_at,
    week_start_date
"#;

#[derive(Debug, Clone)]
pub struct TaskCompletionRow {
    pub id: String,
    pub user_id: String,
    pub task_id: String,
    pub display_name: String,
    pub base_points: f64,
    pub multiplier: f64,
    pub awarded_points: f64,
    pub note: Option<String>,
    pub completed_at: String,
    pub week_start_date: String,
}

impl TaskCompletionRow {
    pub fn from_record(record: &TaskCompletionRecord) -> Self {
        Self {
            id: record.id.clone(),
            user_id: record.user_id.clone(),
            task_id: record.task_id.clone(),
            display_name: record.display_name.clone(),
            base_points: record.base_points,
            multiplier: record.multiplier,
            awarded_points: record.awarded_points,
            note: record
                .note
                .as_ref()
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty()),
            completed_at: record.completed_at.to_rfc3339(),
            week_start_date: format_week(record.week_start_date),
        }
    }

    pub fn into_record(self) -> AppResult<TaskCompletionRecord> {
        Ok(TaskCompletionRecord {
            completed_at: parse_timestamp("completed_at", &self.completed_at)?,
            week_start_date: parse_date("week_start_date", &self.week_start_date)?,
            id: self.id,
            user_id: self.user_id,
            task_id: self.task_id,
            display_name: self.display_name,
            base_points: self.base_points,
            multiplier: self.multiplier,
            awarded_points: self.awarded_points,
            note: self.note,
        })
    }
}

impl TryFrom<&Row<'_>> for TaskCompletionRow {
    type Error = rusqlite::Error;

    fn try_from(row: &Row<'_>) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            task_id: row.get("task_id")?,
            display_name: row.get("display_name")?,
            base_points: row.get("base_points")?,
            multiplier: row.get("multiplier")?,
            awarded_points: row.get("awarded_points")?,
            note: row.get("note")?,
            completed_at: row.get("completed_at")?,
            week_start_date: row.get("week_start_date")?,
        })
    }
}

/// Totals of one user-week as stored in the completion rows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletionTotals {
    pub total_points: f64,
    pub tasks_completed: i64,
}

pub struct CompletionRepository;

impl CompletionRepository {
    pub fn insert(conn: &Connection, record: &TaskCompletionRecord) -> AppResult<()> {
        let row = TaskCompletionRow::from_record(record);

        conn.execute(
            r#"
                INSERT INTO task_completions (
                    id,
                    user_id,
                    task_id,
                    display_name,
                    base_points,
                    multiplier,
                    awarded_points,
                    note,
                    completed_at,
                    week_start_date
                ) VALUES (
                    :id,
                    :user_id,
                    :task_id,
                    :display_name,
                    :base_points,
                    :multiplier,
                    :awarded_points,
                    :note,
                    :completed_at,
                    :week_start_date
                )
            "#,
            named_params! {
                ":id": &row.id,
                ":user_id": &row.user_id,
                ":task_id": &row.task_id,
                ":display_name": &row.display_name,
                ":base_points": &row.base_points,
                ":multiplier": &row.multiplier,
                ":awarded_points": &row.awarded_points,
                ":note": &row.note,
                ":completed_at": &row.completed_at,
                ":week_start_date": &row.week_start_date,
            },
        )?;

        Ok(())
    }

    /// Looks a completion up within the owner's rows only.
    pub fn find_for_user(
        conn: &Connection,
        user_id: &str,
        id: &str,
    ) -> AppResult<Option<TaskCompletionRecord>> {
        let sql = format!(
            "SELECT {COMPLETION_COLUMNS} FROM task_completions WHERE id = :id AND user_id = :user_id"
        );
        let mut stmt = conn.prepare(&sql)?;

        let row = stmt
            .query_row(named_params! {":id": id, ":user_id": user_id}, |row| {
                TaskCompletionRow::try_from(row)
            })
            .optional()?;

        row.map(|row| row.into_record()).transpose()
    }

    pub fn list_by_week(
        conn: &Connection,
        user_id: &str,
        week_start: NaiveDate,
    ) -> AppResult<Vec<TaskCompletionRecord>> {
        let sql = format!(
            r#"
                SELECT {COMPLETION_COLUMNS}
                FROM task_completions
                WHERE user_id = :user_id AND week_start_date = :week_start_date
                ORDER BY completed_at ASC, id ASC
            "#
        );
        let mut stmt = conn.prepare(&sql)?;

        let records = stmt
            .query_map(
                named_params! {
                    ":user_id": user_id,
                    ":week_start_date": format_week(week_start),
                },
                |row| TaskCompletionRow::try_from(row),
            )?
            .map(|row| {
                row.map_err(AppError::from)
                    .and_then(|row| row.into_record())
            })
            .collect::<AppResult<Vec<_>>>()?;

        Ok(records)
    }

    pub fn list_by_task_week(
        conn: &Connection,
        user_id: &str,
        task_id: &str,
        week_start: NaiveDate,
    ) -> AppResult<Vec<TaskCompletionRecord>> {
        let sql = format!(
            r#"
                SELECT {COMPLETION_COLUMNS}
                FROM task_completions
                WHERE user_id = :user_id
                  AND task_id = :task_id
                  AND week_start_date = :week_start_date
                ORDER BY completed_at ASC, id ASC
            "#
        );
        let mut stmt = conn.prepare(&sql)?;

        let records = stmt
            .query_map(
                named_params! {
                    ":user_id": user_id,
                    ":task_id": task_id,
                    ":week_start_date": format_week(week_start),
                },
                |row| TaskCompletionRow::try_from(row),
            )?
            .map(|row| {
                row.map_err(AppError::from)
                    .and_then(|row| row.into_record())
            })
            .collect::<AppResult<Vec<_>>>()?;

        Ok(records)
    }

    pub fn count_by_task_week(
        conn: &Connection,
        user_id: &str,
        task_id: &str,
        week_start: NaiveDate,
    ) -> AppResult<i64> {
        let count = conn.query_row(
            r#"
                SELECT COUNT(*)
                FROM task_completions
                WHERE user_id = :user_id
                  AND task_id = :task_id
                  AND week_start_date = :week_start_date
            "#,
            named_params! {
                ":user_id": user_id,
                ":task_id": task_id,
                ":week_start_date": format_week(week_start),
            },
            |row| row.get(0),
        )?;

        Ok(count)
    }

    /// Completion count per task for one user-week.
    pub fn counts_by_task(
        conn: &Connection,
        user_id: &str,
        week_start: NaiveDate,
    ) -> AppResult<Vec<(String, i64)>> {
        let mut stmt = conn.prepare(
            r#"
                SELECT task_id, COUNT(*)
                FROM task_completions
                WHERE user_id = :user_id AND week_start_date = :week_start_date
                GROUP BY task_id
                ORDER BY task_id ASC
            "#,
        )?;

        let counts = stmt
            .query_map(
                named_params! {
                    ":user_id": user_id,
                    ":week_start_date": format_week(week_start),
                },
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
            )?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(counts)
    }

    pub fn totals_by_week(
        conn: &Connection,
        user_id: &str,
        week_start: NaiveDate,
    ) -> AppResult<CompletionTotals> {
        let (total_points, tasks_completed) = conn.query_row(
            r#"
                SELECT COALESCE(SUM(awarded_points), 0.0), COUNT(*)
                FROM task_completions
                WHERE user_id = :user_id AND week_start_date = :week_start_date
            "#,
            named_params! {
                ":user_id": user_id,
                ":week_start_date": format_week(week_start),
            },
            |row| Ok((row.get::<_, f64>(0)?, row.get::<_, i64>(1)?)),
        )?;

        Ok(CompletionTotals {
            total_points,
            tasks_completed,
        })
    }

    pub fn update_note(
        conn: &Connection,
        user_id: &str,
        id: &str,
        note: Option<&str>,
    ) -> AppResult<()> {
        let note = note
            .map(|value| value.trim())
            .filter(|value| !value.is_empty());

        let affected = conn.execute(
            r#"
                UPDATE task_completions SET note = :note
                WHERE id = :id AND user_id = :user_id
            "#,
            named_params! {":note": note, ":id": id, ":user_id": user_id},
        )?;

        if affected == 0 {
            return Err(AppError::not_found());
        }

        Ok(())
    }

    pub fn delete(conn: &Connection, user_id: &str, id: &str) -> AppResult<usize> {
        let deleted = conn.execute(
            "DELETE FROM task_completions WHERE id = :id AND user_id = :user_id",
            named_params! {":id": id, ":user_id": user_id},
        )?;

        Ok(deleted)
    }

    pub fn delete_by_week(
        conn: &Connection,
        user_id: &str,
        week_start: NaiveDate,
    ) -> AppResult<usize> {
        let deleted = conn.execute(
            r#"
                DELETE FROM task_completions
                WHERE user_id = :user_id AND week_start_date = :week_start_date
            "#,
            named_params! {
                ":user_id": user_id,
                ":week_start_date": format_week(week_start),
            },
        )?;

        Ok(deleted)
    }
}
