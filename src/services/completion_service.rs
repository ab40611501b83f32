use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::db::repositories::completion_repository::CompletionRepository;
use crate::db::repositories::weekly_stat_repository::WeeklyStatRepository;
use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::completion::{
    DeletionOutcome, ScoreCompletionInput, ScoreOutcome, TaskCompletionRecord,
};
use crate::models::weekly_stat::TaskWeeklyStatRecord;
use crate::services::goal_calculator::GoalPolicy;
use crate::services::multiplier::{award_points, multiplier, round_points};
use crate::services::settings_service::SettingsService;
use crate::services::task_catalog_service::TaskCatalogService;
use crate::services::weekly_aggregator::recompute_week_in;
use crate::utils::clock::Clock;
use crate::utils::ids::normalize_user_id;
use crate::utils::week::{ensure_week_start, week_start_of_timestamp};

const MAX_NOTE_CHARS: usize = 2_000;
const MAX_BULK_DELETE: usize = 500;

/// Records task completions and keeps the per-task weekly stats and weekly
/// history in step with them.
#[derive(Clone)]
pub struct CompletionService {
    db: DbPool,
    clock: Arc<dyn Clock>,
    settings: Arc<SettingsService>,
    catalog: Arc<TaskCatalogService>,
}

impl CompletionService {
    pub fn new(
        db: DbPool,
        clock: Arc<dyn Clock>,
        settings: Arc<SettingsService>,
        catalog: Arc<TaskCatalogService>,
    ) -> Self {
        Self {
            db,
            clock,
            settings,
            catalog,
        }
    }

    /// Resolves the task in the user's catalog and scores one completion of it.
    pub fn complete_task(
        &self,
        user_id: &str,
        task_id: &str,
        note: Option<String>,
    ) -> AppResult<ScoreOutcome> {
        let user_id = normalize_user_id(user_id)?;
        let definition = self.catalog.resolve(user_id, task_id)?;
        self.score_completion(ScoreCompletionInput {
            user_id: user_id.to_string(),
            task_id: definition.task_id,
            display_name: definition.display_name,
            base_points: definition.base_points,
            note,
        })
    }

    /// Scores a completion at the current clock time. The stat update, the
    /// completion row and the history recompute commit together or not at all.
    pub fn score_completion(&self, input: ScoreCompletionInput) -> AppResult<ScoreOutcome> {
        let input = validate_score_input(input)?;
        let now = self.clock.now();
        let week_start = week_start_of_timestamp(now);
        let policy = self.settings.goal_policy()?;

        let outcome = self
            .db
            .with_transaction(|tx| score_in(tx, &input, now, week_start, &policy))?;

        info!(
            target: "app::scoring",
            user_id = %outcome.completion.user_id,
            task_id = %outcome.completion.task_id,
            week = %week_start,
            count = outcome.stat.times_this_week,
            multiplier = outcome.multiplier,
            awarded = outcome.awarded_points,
            total = outcome.history.total_points,
            "completion scored"
        );

        Ok(outcome)
    }

    pub fn update_note(
        &self,
        user_id: &str,
        completion_id: &str,
        note: Option<String>,
    ) -> AppResult<TaskCompletionRecord> {
        let user_id = normalize_user_id(user_id)?;
        ensure_non_empty("completion id", completion_id)?;
        let note = normalize_note(note)?;
        let policy = self.settings.goal_policy()?;

        let updated = self.db.with_transaction(|tx| {
            let existing = CompletionRepository::find_for_user(tx, user_id, completion_id)?
                .ok_or_else(AppError::not_found)?;
            CompletionRepository::update_note(tx, user_id, completion_id, note.as_deref())?;
            recompute_week_in(tx, user_id, existing.week_start_date, &policy)?;
            CompletionRepository::find_for_user(tx, user_id, completion_id)?
                .ok_or_else(AppError::not_found)
        })?;

        debug!(target: "app::scoring", user_id, completion_id, "completion note updated");
        Ok(updated)
    }

    /// Removes one completion, rebuilds its task's weekly stat from the
    /// remaining rows and recomputes the week.
    pub fn delete_completion(
        &self,
        user_id: &str,
        completion_id: &str,
    ) -> AppResult<DeletionOutcome> {
        let user_id = normalize_user_id(user_id)?;
        ensure_non_empty("completion id", completion_id)?;
        let policy = self.settings.goal_policy()?;

        let outcome = self.db.with_transaction(|tx| {
            let existing = CompletionRepository::find_for_user(tx, user_id, completion_id)?
                .ok_or_else(AppError::not_found)?;
            CompletionRepository::delete(tx, user_id, completion_id)?;
            repair_stat_in(tx, user_id, &existing.task_id, existing.week_start_date)?;
            let history = recompute_week_in(tx, user_id, existing.week_start_date, &policy)?;
            Ok(DeletionOutcome {
                deleted: 1,
                history: vec![history],
            })
        })?;

        info!(target: "app::scoring", user_id, completion_id, "completion deleted");
        Ok(outcome)
    }

    /// Bulk variant of [`Self::delete_completion`]. Ids that do not belong to
    /// the user are skipped; every affected week is recomputed once.
    pub fn delete_completions(
        &self,
        user_id: &str,
        completion_ids: &[String],
    ) -> AppResult<DeletionOutcome> {
        let user_id = normalize_user_id(user_id)?;
        if completion_ids.len() > MAX_BULK_DELETE {
            return Err(AppError::validation(format!(
                "cannot delete more than {MAX_BULK_DELETE} completions at once"
            )));
        }
        let policy = self.settings.goal_policy()?;

        let outcome = self.db.with_transaction(|tx| {
            let mut seen = HashSet::new();
            let mut touched_stats = BTreeSet::new();
            let mut touched_weeks = BTreeSet::new();
            let mut deleted = 0;

            for id in completion_ids.iter().map(|id| id.trim()) {
                if id.is_empty() || !seen.insert(id) {
                    continue;
                }
                let Some(existing) = CompletionRepository::find_for_user(tx, user_id, id)? else {
                    debug!(target: "app::scoring", user_id, completion_id = id, "bulk delete skipped unknown id");
                    continue;
                };
                deleted += CompletionRepository::delete(tx, user_id, id)?;
                touched_stats.insert((existing.task_id, existing.week_start_date));
                touched_weeks.insert(existing.week_start_date);
            }

            for (task_id, week_start) in &touched_stats {
                repair_stat_in(tx, user_id, task_id, *week_start)?;
            }
            let history = touched_weeks
                .into_iter()
                .map(|week_start| recompute_week_in(tx, user_id, week_start, &policy))
                .collect::<AppResult<Vec<_>>>()?;

            Ok(DeletionOutcome { deleted, history })
        })?;

        info!(
            target: "app::scoring",
            user_id,
            requested = completion_ids.len(),
            deleted = outcome.deleted,
            weeks = outcome.history.len(),
            "completions deleted"
        );
        Ok(outcome)
    }

    /// Deletes every completion of a week and resets its stats in place.
    pub fn clear_week(&self, user_id: &str, week_start: NaiveDate) -> AppResult<DeletionOutcome> {
        let user_id = normalize_user_id(user_id)?;
        let week_start = ensure_week_start(week_start)?;
        let policy = self.settings.goal_policy()?;

        let outcome = self.db.with_transaction(|tx| {
            let deleted = CompletionRepository::delete_by_week(tx, user_id, week_start)?;
            let reset = WeeklyStatRepository::reset_week(tx, user_id, week_start)?;
            let history = recompute_week_in(tx, user_id, week_start, &policy)?;
            debug!(target: "app::scoring", user_id, week = %week_start, reset, "weekly stats reset");
            Ok(DeletionOutcome {
                deleted,
                history: vec![history],
            })
        })?;

        info!(
            target: "app::scoring",
            user_id,
            week = %week_start,
            deleted = outcome.deleted,
            "week cleared"
        );
        Ok(outcome)
    }

    pub fn list_completions(
        &self,
        user_id: &str,
        week_start: NaiveDate,
    ) -> AppResult<Vec<TaskCompletionRecord>> {
        let user_id = normalize_user_id(user_id)?;
        let week_start = ensure_week_start(week_start)?;
        self.db
            .with_connection(|conn| CompletionRepository::list_by_week(conn, user_id, week_start))
    }

    pub fn get_completion(
        &self,
        user_id: &str,
        completion_id: &str,
    ) -> AppResult<TaskCompletionRecord> {
        let user_id = normalize_user_id(user_id)?;
        self.db
            .with_connection(|conn| {
                CompletionRepository::find_for_user(conn, user_id, completion_id)
            })?
            .ok_or_else(AppError::not_found)
    }

    pub fn find_stat(
        &self,
        user_id: &str,
        task_id: &str,
        week_start: NaiveDate,
    ) -> AppResult<Option<TaskWeeklyStatRecord>> {
        let user_id = normalize_user_id(user_id)?;
        let week_start = ensure_week_start(week_start)?;
        self.db
            .with_connection(|conn| WeeklyStatRepository::find(conn, user_id, task_id, week_start))
    }
}

fn score_in(
    conn: &Connection,
    input: &ScoreCompletionInput,
    now: DateTime<Utc>,
    week_start: NaiveDate,
    policy: &GoalPolicy,
) -> AppResult<ScoreOutcome> {
    let existing = WeeklyStatRepository::find(conn, &input.user_id, &input.task_id, week_start)?;
    let actual =
        CompletionRepository::count_by_task_week(conn, &input.user_id, &input.task_id, week_start)?;

    if let Some(stat) = &existing {
        if stat.times_this_week != actual {
            warn!(
                target: "app::scoring",
                user_id = %input.user_id,
                task_id = %input.task_id,
                week = %week_start,
                recorded = stat.times_this_week,
                actual,
                "weekly stat diverged from completion rows, using row count"
            );
        }
    }

    let count = actual + 1;
    let applied = multiplier(count)?;
    let awarded = round_points(input.base_points * applied);

    let stat = match existing {
        Some(mut stat) => {
            stat.display_name = input.display_name.clone();
            stat.base_points = input.base_points;
            stat.current_value = awarded;
            stat.times_this_week = count;
            stat.last_completed_at = Some(now);
            stat
        }
        None => TaskWeeklyStatRecord {
            user_id: input.user_id.clone(),
            task_id: input.task_id.clone(),
            display_name: input.display_name.clone(),
            base_points: input.base_points,
            current_value: awarded,
            times_this_week: count,
            last_completed_at: Some(now),
            week_start_date: week_start,
        },
    };
    WeeklyStatRepository::upsert(conn, &stat)?;

    let completion = TaskCompletionRecord {
        id: uuid::Uuid::new_v4().to_string(),
        user_id: input.user_id.clone(),
        task_id: input.task_id.clone(),
        display_name: input.display_name.clone(),
        base_points: input.base_points,
        multiplier: applied,
        awarded_points: awarded,
        note: input.note.clone(),
        completed_at: now,
        week_start_date: week_start,
    };
    CompletionRepository::insert(conn, &completion)?;

    let history = recompute_week_in(conn, &input.user_id, week_start, policy)?;

    Ok(ScoreOutcome {
        awarded_points: awarded,
        multiplier: applied,
        completion,
        stat,
        history,
    })
}

/// Rebuilds a task's weekly stat from the completion rows that remain. A stat
/// with no rows left is reset rather than deleted. The base of the most
/// recent remaining completion becomes the stat's base.
pub fn repair_stat_in(
    conn: &Connection,
    user_id: &str,
    task_id: &str,
    week_start: NaiveDate,
) -> AppResult<Option<TaskWeeklyStatRecord>> {
    let Some(mut stat) = WeeklyStatRepository::find(conn, user_id, task_id, week_start)? else {
        return Ok(None);
    };

    let remaining = CompletionRepository::list_by_task_week(conn, user_id, task_id, week_start)?;
    let count = remaining.len() as i64;
    match remaining.iter().max_by_key(|item| item.completed_at) {
        None => stat.reset(),
        Some(latest) => {
            stat.display_name = latest.display_name.clone();
            stat.base_points = latest.base_points;
            stat.times_this_week = count;
            stat.current_value = award_points(latest.base_points, count)?;
            stat.last_completed_at = Some(latest.completed_at);
        }
    }
    WeeklyStatRepository::upsert(conn, &stat)?;

    debug!(
        target: "app::scoring",
        user_id,
        task_id,
        week = %week_start,
        times = stat.times_this_week,
        current_value = stat.current_value,
        "weekly stat rebuilt"
    );

    Ok(Some(stat))
}

fn validate_score_input(mut input: ScoreCompletionInput) -> AppResult<ScoreCompletionInput> {
    input.user_id = normalize_user_id(&input.user_id)?.to_string();
    input.task_id = ensure_non_empty("task id", &input.task_id)?;
    input.display_name = ensure_non_empty("display name", &input.display_name)?;
    if !input.base_points.is_finite() || input.base_points <= 0.0 {
        return Err(AppError::validation_with_details(
            "base points must be a positive number",
            serde_json::json!({ "field": "basePoints", "value": input.base_points }),
        ));
    }
    input.note = normalize_note(input.note.take())?;
    Ok(input)
}

fn ensure_non_empty(field: &str, value: &str) -> AppResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::validation(format!("{field} cannot be empty")));
    }
    Ok(trimmed.to_string())
}

fn normalize_note(note: Option<String>) -> AppResult<Option<String>> {
    let Some(note) = note else {
        return Ok(None);
    };
    let trimmed = note.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if trimmed.chars().count() > MAX_NOTE_CHARS {
        return Err(AppError::validation(format!(
            "note cannot exceed {MAX_NOTE_CHARS} characters"
        )));
    }
    Ok(Some(trimmed.to_string()))
}
