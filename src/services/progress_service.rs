use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::debug;

use crate::db::repositories::completion_repository::CompletionRepository;
use crate::db::repositories::weekly_history_repository::WeeklyHistoryRepository;
use crate::db::DbPool;
use crate::error::AppResult;
use crate::models::completion::TaskCompletionRecord;
use crate::models::progress::{CompletionDetail, ProgressSnapshot, TopTask};
use crate::services::goal_calculator::calculate_goal_in;
use crate::services::settings_service::SettingsService;
use crate::utils::clock::Clock;
use crate::utils::ids::normalize_user_id;
use crate::utils::week::{ensure_week_start, week_start_of_timestamp};

pub const TOP_TASK_LIMIT: usize = 5;

/// Read-only weekly snapshot. Nothing here writes stats or history.
pub struct ProgressService {
    db: DbPool,
    clock: Arc<dyn Clock>,
    settings: Arc<SettingsService>,
}

impl ProgressService {
    pub fn new(db: DbPool, clock: Arc<dyn Clock>, settings: Arc<SettingsService>) -> Self {
        Self {
            db,
            clock,
            settings,
        }
    }

    pub fn current_progress(&self, user_id: &str) -> AppResult<ProgressSnapshot> {
        let week_start = week_start_of_timestamp(self.clock.now());
        self.build_progress(user_id, week_start)
    }

    pub fn build_progress(
        &self,
        user_id: &str,
        week_start: NaiveDate,
    ) -> AppResult<ProgressSnapshot> {
        let user_id = normalize_user_id(user_id)?;
        let week_start = ensure_week_start(week_start)?;
        let policy = self.settings.goal_policy()?;

        let snapshot = self.db.with_connection(|conn| {
            let completions = CompletionRepository::list_by_week(conn, user_id, week_start)?;
            let goal = match WeeklyHistoryRepository::find(conn, user_id, week_start)? {
                Some(history) => history.weekly_goal,
                None => calculate_goal_in(conn, user_id, week_start, &policy)?,
            };

            let points = completions
                .iter()
                .fold(0.0, |total, item| total + item.awarded_points);
            let details = completions.iter().map(completion_detail).collect();

            Ok(ProgressSnapshot {
                user_id: user_id.to_string(),
                week_start_date: week_start,
                points,
                goal,
                goal_achieved: points >= goal as f64,
                tasks_completed: completions.len() as i64,
                top_tasks: rank_top_tasks(&completions, TOP_TASK_LIMIT),
                completions: details,
            })
        })?;

        debug!(
            target: "app::progress",
            user_id,
            week = %week_start,
            points = snapshot.points,
            goal = snapshot.goal,
            "progress snapshot built"
        );

        Ok(snapshot)
    }
}

fn completion_detail(record: &TaskCompletionRecord) -> CompletionDetail {
    CompletionDetail {
        id: record.id.clone(),
        task_id: record.task_id.clone(),
        display_name: record.display_name.clone(),
        awarded_points: record.awarded_points,
        base_points: record.base_points,
        applied_multiplier: record.multiplier,
        note: record.note.clone(),
        completed_at: record.completed_at,
    }
}

/// Groups completions by task and ranks them by points, then completion count,
/// then task id.
pub fn rank_top_tasks(completions: &[TaskCompletionRecord], limit: usize) -> Vec<TopTask> {
    let mut grouped: HashMap<&str, TopTask> = HashMap::new();
    for completion in completions {
        let entry = grouped
            .entry(completion.task_id.as_str())
            .or_insert_with(|| TopTask {
                task_id: completion.task_id.clone(),
                display_name: completion.display_name.clone(),
                points: 0.0,
                completions: 0,
            });
        entry.points += completion.awarded_points;
        entry.completions += 1;
        entry.display_name = completion.display_name.clone();
    }

    let mut ranked: Vec<TopTask> = grouped.into_values().collect();
    ranked.sort_by(|a, b| {
        b.points
            .total_cmp(&a.points)
            .then_with(|| b.completions.cmp(&a.completions))
            .then_with(|| a.task_id.cmp(&b.task_id))
    });
    ranked.truncate(limit);
    ranked
}
