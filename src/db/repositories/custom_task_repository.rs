use std::convert::TryFrom;

use rusqlite::{named_params, Connection, OptionalExtension, Row};

use crate::db::repositories::parse_timestamp;
use crate::error::{AppError, AppResult};
use crate::models::task_definition::{CustomTaskRecord, TaskCategory};

#[derive(Debug, Clone)]
pub struct CustomTaskRow {
    pub user_id: String,
    pub task_id: String,
    pub display_name: String,
    pub base_points: f64,
    pub category: String,
    pub created_at: String,
}

impl CustomTaskRow {
    pub fn from_record(record: &CustomTaskRecord) -> Self {
        Self {
            user_id: record.user_id.clone(),
            task_id: record.task_id.clone(),
            display_name: record.display_name.clone(),
            base_points: record.base_points,
            category: record.category.as_str().to_string(),
            created_at: record.created_at.to_rfc3339(),
        }
    }

    pub fn into_record(self) -> AppResult<CustomTaskRecord> {
        let category =
            TaskCategory::try_from(self.category.as_str()).map_err(AppError::validation)?;

        Ok(CustomTaskRecord {
            created_at: parse_timestamp("created_at", &self.created_at)?,
            user_id: self.user_id,
            task_id: self.task_id,
            display_name: self.display_name,
            base_points: self.base_points,
            category,
        })
    }
}

impl TryFrom<&Row<'_>> for CustomTaskRow {
    type Error = rusqlite::Error;

    fn try_from(row: &Row<'_>) -> Result<Self, Self::Error> {
        Ok(Self {
            user_id: row.get("user_id")?,
            task_id: row.get("task_id")?,
            display_name: row.get("display_name")?,
            base_points: row.get("base_points")?,
            category: row.get("category")?,
            created_at: row.get("created_at")?,
        })
    }
}

pub struct CustomTaskRepository;

impl CustomTaskRepository {
    pub fn insert(conn: &Connection, record: &CustomTaskRecord) -> AppResult<()> {
        let row = CustomTaskRow::from_record(record);

        conn.execute(
            r#"
                INSERT INTO custom_tasks (
                    user_id,
                    task_id,
                    display_name,
                    base_points,
                    category,
                    created_at
                ) VALUES (
                    :user_id,
                    :task_id,
                    :display_name,
                    :base_points,
                    :category,
                    :created_at
                )
            "#,
            named_params! {
                ":user_id": &row.user_id,
                ":task_id": &row.task_id,
                ":display_name": &row.display_name,
                ":base_points": &row.base_points,
                ":category": &row.category,
                ":created_at": &row.created_at,
            },
        )?;

        Ok(())
    }

    pub fn find(
        conn: &Connection,
        user_id: &str,
        task_id: &str,
    ) -> AppResult<Option<CustomTaskRecord>> {
        let mut stmt = conn.prepare(
            r#"
                SELECT user_id, task_id, display_name, base_points, category, created_at
                FROM custom_tasks
                WHERE user_id = :user_id AND task_id = :task_id
            "#,
        )?;

        let row = stmt
            .query_row(
                named_params! {":user_id": user_id, ":task_id": task_id},
                |row| CustomTaskRow::try_from(row),
            )
            .optional()?;

        row.map(|row| row.into_record()).transpose()
    }

    pub fn list_for_user(conn: &Connection, user_id: &str) -> AppResult<Vec<CustomTaskRecord>> {
        let mut stmt = conn.prepare(
            r#"
                SELECT user_id, task_id, display_name, base_points, category, created_at
                FROM custom_tasks
                WHERE user_id = :user_id
                ORDER BY display_name COLLATE NOCASE ASC
            "#,
        )?;

        let records = stmt
            .query_map(named_params! {":user_id": user_id}, |row| {
                CustomTaskRow::try_from(row)
            })?
            .map(|row| {
                row.map_err(AppError::from)
                    .and_then(|row| row.into_record())
            })
            .collect::<AppResult<Vec<_>>>()?;

        Ok(records)
    }

    pub fn delete(conn: &Connection, user_id: &str, task_id: &str) -> AppResult<()> {
        let affected = conn.execute(
            "DELETE FROM custom_tasks WHERE user_id = :user_id AND task_id = :task_id",
            named_params! {":user_id": user_id, ":task_id": task_id},
        )?;

        if affected == 0 {
            return Err(AppError::not_found());
        }

        Ok(())
    }
}
