use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use rusqlite::Connection;
use tracing::{debug, warn};

use crate::db::repositories::completion_repository::CompletionRepository;
use crate::db::repositories::weekly_history_repository::WeeklyHistoryRepository;
use crate::db::repositories::weekly_stat_repository::WeeklyStatRepository;
use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::weekly_history::{WeeklyHistoryRecord, WeeklyHistoryUpsert};
use crate::models::weekly_stat::StatDivergence;
use crate::services::goal_calculator::{resolve_goal_in, GoalPolicy};
use crate::services::settings_service::SettingsService;
use crate::utils::ids::normalize_user_id;
use crate::utils::week::ensure_week_start;

const MAX_HISTORY_LIMIT: usize = 520;

/// Re-sums the completions of a user-week into its history row. The stored
/// goal is kept when the row exists; otherwise the goal is derived now and
/// frozen with the row.
pub fn recompute_week_in(
    conn: &Connection,
    user_id: &str,
    week_start: NaiveDate,
    policy: &GoalPolicy,
) -> AppResult<WeeklyHistoryRecord> {
    let totals = CompletionRepository::totals_by_week(conn, user_id, week_start)?;
    let weekly_goal = resolve_goal_in(conn, user_id, week_start, policy)?;

    let upsert = WeeklyHistoryUpsert {
        user_id: user_id.to_string(),
        week_start_date: week_start,
        total_points: totals.total_points,
        tasks_completed: totals.tasks_completed,
        weekly_goal,
    };
    WeeklyHistoryRepository::upsert(conn, &upsert)?;

    for divergence in detect_divergences_in(conn, user_id, week_start)? {
        warn!(
            target: "app::aggregator",
            user_id,
            week = %week_start,
            task_id = %divergence.task_id,
            recorded = divergence.recorded_times,
            actual = divergence.actual_completions,
            "weekly stat disagrees with completion rows"
        );
    }

    debug!(
        target: "app::aggregator",
        user_id,
        week = %week_start,
        total_points = totals.total_points,
        tasks_completed = totals.tasks_completed,
        weekly_goal,
        "weekly history recomputed"
    );

    WeeklyHistoryRepository::find(conn, user_id, week_start)?.ok_or_else(AppError::not_found)
}

/// Stats whose repetition count differs from the number of completion rows,
/// including completions that have no stat row at all.
pub fn detect_divergences_in(
    conn: &Connection,
    user_id: &str,
    week_start: NaiveDate,
) -> AppResult<Vec<StatDivergence>> {
    let mut counts: BTreeMap<String, i64> = CompletionRepository::counts_by_task(
        conn, user_id, week_start,
    )?
    .into_iter()
    .collect();

    let mut divergences = Vec::new();
    for stat in WeeklyStatRepository::list_by_week(conn, user_id, week_start)? {
        let actual = counts.remove(&stat.task_id).unwrap_or(0);
        if actual != stat.times_this_week {
            divergences.push(StatDivergence {
                task_id: stat.task_id,
                recorded_times: stat.times_this_week,
                actual_completions: actual,
            });
        }
    }
    divergences.extend(counts.into_iter().map(|(task_id, actual)| StatDivergence {
        task_id,
        recorded_times: 0,
        actual_completions: actual,
    }));
    divergences.sort_by(|a, b| a.task_id.cmp(&b.task_id));

    Ok(divergences)
}

pub struct WeeklyAggregator {
    db: DbPool,
    settings: Arc<SettingsService>,
}

impl WeeklyAggregator {
    pub fn new(db: DbPool, settings: Arc<SettingsService>) -> Self {
        Self { db, settings }
    }

    pub fn recompute_week(
        &self,
        user_id: &str,
        week_start: NaiveDate,
    ) -> AppResult<WeeklyHistoryRecord> {
        let user_id = normalize_user_id(user_id)?;
        let week_start = ensure_week_start(week_start)?;
        let policy = self.settings.goal_policy()?;
        self.db
            .with_transaction(|tx| recompute_week_in(tx, user_id, week_start, &policy))
    }

    pub fn check_consistency(
        &self,
        user_id: &str,
        week_start: NaiveDate,
    ) -> AppResult<Vec<StatDivergence>> {
        let user_id = normalize_user_id(user_id)?;
        let week_start = ensure_week_start(week_start)?;
        self.db
            .with_connection(|conn| detect_divergences_in(conn, user_id, week_start))
    }

    pub fn ensure_consistent(&self, user_id: &str, week_start: NaiveDate) -> AppResult<()> {
        let divergences = self.check_consistency(user_id, week_start)?;
        if divergences.is_empty() {
            return Ok(());
        }

        let tasks = divergences
            .iter()
            .map(|item| {
                format!(
                    "{} (stat {}, rows {})",
                    item.task_id, item.recorded_times, item.actual_completions
                )
            })
            .collect::<Vec<_>>()
            .join(", ");
        Err(AppError::consistency(format!(
            "weekly stats diverge from completions for week {week_start}: {tasks}"
        )))
    }

    /// Most recent weeks first.
    pub fn list_history(&self, user_id: &str, limit: usize) -> AppResult<Vec<WeeklyHistoryRecord>> {
        let user_id = normalize_user_id(user_id)?;
        if limit == 0 {
            return Err(AppError::validation("history limit must be positive"));
        }
        let limit = limit.min(MAX_HISTORY_LIMIT);
        self.db
            .with_connection(|conn| WeeklyHistoryRepository::list_recent(conn, user_id, limit))
    }

    pub fn find_week(
        &self,
        user_id: &str,
        week_start: NaiveDate,
    ) -> AppResult<WeeklyHistoryRecord> {
        let user_id = normalize_user_id(user_id)?;
        let week_start = ensure_week_start(week_start)?;
        self.db
            .with_connection(|conn| WeeklyHistoryRepository::find(conn, user_id, week_start))?
            .ok_or_else(AppError::not_found)
    }
}
