use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{info, warn};

use crate::db::repositories::achievement_repository::AchievementRepository;
use crate::db::DbPool;
use crate::error::{AppError, AppResult, TextGenErrorCode};
use crate::models::achievement::{AchievementRecord, MotivationalMessage, TextSource};
use crate::models::progress::ProgressSnapshot;
use crate::services::progress_service::ProgressService;
use crate::services::prompt_templates::{badge_prompt, motivation_prompt};
use crate::services::text_generation::{parse_json_content, TextGenerator};
use crate::utils::clock::Clock;
use crate::utils::ids::normalize_user_id;

pub const FALLBACK_BADGE_TITLE: &str = "Goal Crusher";

const MAX_TITLE_CHARS: usize = 60;
const MAX_DESCRIPTION_CHARS: usize = 280;
const MAX_MESSAGE_CHARS: usize = 400;

/// Weekly badges and encouragement. Generated text is optional; every path
/// has a static fallback.
pub struct AchievementService {
    db: DbPool,
    progress: Arc<ProgressService>,
    generator: Arc<dyn TextGenerator>,
    clock: Arc<dyn Clock>,
}

impl AchievementService {
    pub fn new(
        db: DbPool,
        progress: Arc<ProgressService>,
        generator: Arc<dyn TextGenerator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            db,
            progress,
            generator,
            clock,
        }
    }

    /// Awards the week's badge once the goal is reached. Returns the existing
    /// badge if one was already awarded and `None` while the goal is open.
    pub async fn evaluate_week(
        &self,
        user_id: &str,
        week_start: NaiveDate,
    ) -> AppResult<Option<AchievementRecord>> {
        let user_id = normalize_user_id(user_id)?;
        let snapshot = self.progress.build_progress(user_id, week_start)?;
        if !snapshot.goal_achieved {
            return Ok(None);
        }

        let week_start = snapshot.week_start_date;
        if let Some(existing) = self
            .db
            .with_connection(|conn| AchievementRepository::find_by_week(conn, user_id, week_start))?
        {
            return Ok(Some(existing));
        }

        let (title, description, source) = match self.generate_badge(&snapshot).await {
            Ok((title, description)) => (title, description, TextSource::Generated),
            Err(err) => {
                warn!(
                    target: "app::achievements",
                    user_id,
                    week = %week_start,
                    error = %err,
                    "badge generation failed, using fallback"
                );
                let (title, description) = fallback_badge(&snapshot);
                (title, description, TextSource::Fallback)
            }
        };

        let record = AchievementRecord {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            week_start_date: week_start,
            title,
            description,
            points_at_award: snapshot.points,
            weekly_goal: snapshot.goal,
            source,
            created_at: self.clock.now(),
        };

        match self
            .db
            .with_connection(|conn| AchievementRepository::insert(conn, &record))
        {
            Ok(()) => {}
            Err(AppError::Conflict { .. }) => {
                // awarded concurrently; keep the first badge
                return self
                    .db
                    .with_connection(|conn| {
                        AchievementRepository::find_by_week(conn, user_id, week_start)
                    });
            }
            Err(err) => return Err(err),
        }

        info!(
            target: "app::achievements",
            user_id,
            week = %week_start,
            title = %record.title,
            source = %record.source,
            "weekly badge awarded"
        );

        Ok(Some(record))
    }

    pub async fn motivational_message(
        &self,
        user_id: &str,
        week_start: NaiveDate,
    ) -> AppResult<MotivationalMessage> {
        let user_id = normalize_user_id(user_id)?;
        let snapshot = self.progress.build_progress(user_id, week_start)?;

        let (message, source) = match self.generate_message(&snapshot).await {
            Ok(message) => (message, TextSource::Generated),
            Err(err) => {
                warn!(
                    target: "app::achievements",
                    user_id,
                    week = %snapshot.week_start_date,
                    error = %err,
                    "motivational message generation failed, using fallback"
                );
                (fallback_message(&snapshot), TextSource::Fallback)
            }
        };

        Ok(MotivationalMessage {
            week_start_date: snapshot.week_start_date,
            message,
            source,
        })
    }

    pub fn list_achievements(&self, user_id: &str) -> AppResult<Vec<AchievementRecord>> {
        let user_id = normalize_user_id(user_id)?;
        self.db
            .with_connection(|conn| AchievementRepository::list_for_user(conn, user_id))
    }

    async fn generate_badge(&self, snapshot: &ProgressSnapshot) -> AppResult<(String, String)> {
        let content = self.generator.generate_text(&badge_prompt(snapshot)).await?;
        let value = parse_json_content(&content)?;

        let title = text_field(&value, "title", MAX_TITLE_CHARS)?;
        let description = match text_field(&value, "description", MAX_DESCRIPTION_CHARS) {
            Ok(description) => description,
            Err(_) => fallback_badge(snapshot).1,
        };
        Ok((title, description))
    }

    async fn generate_message(&self, snapshot: &ProgressSnapshot) -> AppResult<String> {
        let content = self
            .generator
            .generate_text(&motivation_prompt(snapshot))
            .await?;
        let value = parse_json_content(&content)?;
        text_field(&value, "message", MAX_MESSAGE_CHARS)
    }
}

fn text_field(value: &serde_json::Value, field: &str, max_chars: usize) -> AppResult<String> {
    let text = value
        .get(field)
        .and_then(|item| item.as_str())
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .ok_or_else(|| {
            AppError::text_generation(
                TextGenErrorCode::InvalidResponse,
                format!("generated content is missing '{field}'"),
            )
        })?;
    Ok(text.chars().take(max_chars).collect())
}

pub fn fallback_badge(snapshot: &ProgressSnapshot) -> (String, String) {
    let description = format!(
        "Reached {:.0} of {} points in the week of {} across {} completed tasks.",
        snapshot.points, snapshot.goal, snapshot.week_start_date, snapshot.tasks_completed
    );
    (FALLBACK_BADGE_TITLE.to_string(), description)
}

pub fn fallback_message(snapshot: &ProgressSnapshot) -> String {
    let remaining = (snapshot.goal as f64 - snapshot.points).max(0.0);

    if snapshot.goal_achieved {
        return format!(
            "Weekly goal reached with {:.0} points. Keep the momentum going!",
            snapshot.points
        );
    }
    if snapshot.tasks_completed == 0 {
        return format!(
            "A fresh week. Log one activity today to start working toward {} points.",
            snapshot.goal
        );
    }

    let ratio = snapshot.goal_ratio();
    if ratio >= 0.75 {
        format!("Almost there: {remaining:.0} points to go this week.")
    } else if ratio >= 0.25 {
        format!(
            "Solid progress. {remaining:.0} more points will reach this week's goal of {}.",
            snapshot.goal
        )
    } else {
        format!("Every application counts. {remaining:.0} points to reach your goal.")
    }
}
