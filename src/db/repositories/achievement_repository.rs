use std::convert::TryFrom;

use chrono::NaiveDate;
use rusqlite::{named_params, Connection, OptionalExtension, Row};

use crate::db::repositories::{parse_date, parse_timestamp};
use crate::error::{AppError, AppResult};
use crate::models::achievement::{AchievementRecord, TextSource};
use crate::utils::week::format_week;

#[derive(Debug, Clone)]
pub struct AchievementRow {
    pub id: String,
    pub user_id: String,
    pub week_start_date: String,
    pub title: String,
    pub description: String,
    pub points_at_award: f64,
    pub weekly_goal: i64,
    pub source: String,
    pub created_at: String,
}

impl AchievementRow {
    pub fn from_record(record: &AchievementRecord) -> Self {
        Self {
            id: record.id.clone(),
            user_id: record.user_id.clone(),
            week_start_date: format_week(record.week_start_date),
            title: record.title.clone(),
            description: record.description.clone(),
            points_at_award: record.points_at_award,
            weekly_goal: record.weekly_goal,
            source: record.source.as_str().to_string(),
            created_at: record.created_at.to_rfc3339(),
        }
    }

    pub fn into_record(self) -> AppResult<AchievementRecord> {
        let source = TextSource::try_from(self.source.as_str()).map_err(AppError::validation)?;

        Ok(AchievementRecord {
            week_start_date: parse_date("week_start_date", &self.week_start_date)?,
            created_at: parse_timestamp("created_at", &self.created_at)?,
            id: self.id,
            user_id: self.user_id,
            title: self.title,
            description: self.description,
            points_at_award: self.points_at_award,
            weekly_goal: self.weekly_goal,
            source,
        })
    }
}

impl TryFrom<&Row<'_>> for AchievementRow {
    type Error = rusqlite::Error;

    fn try_from(row: &Row<'_>) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            week_start_date: row.get("week_start_date")?,
            title: row.get("title")?,
            description: row.get("description")?,
            points_at_award: row.get("points_at_award")?,
            weekly_goal: row.get("weekly_goal")?,
            source: row.get("source")?,
            created_at: row.get("created_at")?,
        })
    }
}

pub struct AchievementRepository;

impl AchievementRepository {
    pub fn insert(conn: &Connection, record: &AchievementRecord) -> AppResult<()> {
        let row = AchievementRow::from_record(record);

        conn.execute(
            r#"
                INSERT INTO achievements (
                    id,
                    user_id,
                    week_start_date,
                    title,
                    description,
                    points_at_award,
                    weekly_goal,
                    source,
                    created_at
                ) VALUES (
                    :id,
                    :user_id,
                    :week_start_date,
                    :title,
                    :description,
                    :points_at_award,
                    :weekly_goal,
                    :source,
                    :created_at
                )
            "#,
            named_params! {
                ":id": &row.id,
                ":user_id": &row.user_id,
                ":week_start_date": &row.week_start_date,
                ":title": &row.title,
                ":description": &row.description,
                ":points_at_award": &row.points_at_award,
                ":weekly_goal": &row.weekly_goal,
                ":source": &row.source,
                ":created_at": &row.created_at,
            },
        )?;

        Ok(())
    }

    pub fn find_by_week(
        conn: &Connection,
        user_id: &str,
        week_start: NaiveDate,
    ) -> AppResult<Option<AchievementRecord>> {
        let mut stmt = conn.prepare(
            r#"
                SELECT
                    id,
                    user_id,
                    week_start_date,
                    title,
                    description,
                    points_at_award,
                    weekly_goal,
                    source,
                    created_at
                FROM achievements
                WHERE user_id = :user_id AND week_start_date = :week_start_date
            "#,
        )?;

        let row = stmt
            .query_row(
                named_params! {
                    ":user_id": user_id,
                    ":week_start_date": format_week(week_start),
                },
                |row| AchievementRow::try_from(row),
            )
            .optional()?;

        row.map(|row| row.into_record()).transpose()
    }

    pub fn list_for_user(conn: &Connection, user_id: &str) -> AppResult<Vec<AchievementRecord>> {
        let mut stmt = conn.prepare(
            r#"
                SELECT
                    id,
                    user_id,
                    week_start_date,
                    title,
                    description,
                    points_at_award,
                    weekly_goal,
                    source,
                    created_at
                FROM achievements
                WHERE user_id = :user_id
                ORDER BY week_start_date DESC
            "#,
        )?;

        let records = stmt
            .query_map(named_params! {":user_id": user_id}, |row| {
                AchievementRow::try_from(row)
            })?
            .map(|row| {
                row.map_err(AppError::from)
                    .and_then(|row| row.into_record())
            })
            .collect::<AppResult<Vec<_>>>()?;

        Ok(records)
    }
}
