//! Adaptive weekly point target.
//!
//! A week's goal is derived from the weekly totals of the four calendar weeks
//! before it:
//!
//! 1. each total is capped at `max(2 × median, GOAL_FLOOR)` of the window,
//! 2. the capped totals are averaged with weights 4, 3, 2, 1 (most recent
//!    first, missing weeks dropped and the weights renormalised),
//! 3. the average grows by the configured percentage,
//! 4. when the previous week has a stored goal the result stays within
//!    `[0.8×, 1.25×]` of it,
//! 5. the result is rounded half-up and clamped to `[GOAL_FLOOR, cap]`.
//!
//! Once a goal is stored in a week's history row it is never recomputed.

use std::sync::Arc;

use chrono::NaiveDate;
use rusqlite::Connection;
use tracing::debug;

use crate::db::repositories::weekly_history_repository::WeeklyHistoryRepository;
use crate::db::DbPool;
use crate::error::AppResult;
use crate::models::weekly_history::WeeklyHistoryRecord;
use crate::services::multiplier::round_points;
use crate::services::settings_service::SettingsService;
use crate::utils::ids::normalize_user_id;
use crate::utils::week::{ensure_week_start, previous_week, weeks_before};

pub const GOAL_FLOOR: i64 = 15;
pub const DEFAULT_LOOKBACK_WEEKS: i64 = 4;

const OUTLIER_MEDIAN_FACTOR: f64 = 2.0;
const STEP_DOWN_LIMIT: f64 = 0.8;
const STEP_UP_LIMIT: f64 = 1.25;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GoalPolicy {
    pub cap: i64,
    /// Fractional growth, `0.10` for ten percent.
    pub growth: f64,
    pub lookback_weeks: i64,
}

impl GoalPolicy {
    pub fn new(cap: i64, growth: f64) -> Self {
        Self {
            cap: cap.max(GOAL_FLOOR),
            growth: growth.max(0.0),
            lookback_weeks: DEFAULT_LOOKBACK_WEEKS,
        }
    }
}

impl Default for GoalPolicy {
    fn default() -> Self {
        Self::new(500, 0.10)
    }
}

/// Goal for `target_week` given the user's history. Rows outside the lookback
/// window (including the target week itself) are ignored.
pub fn derive_goal(
    history: &[WeeklyHistoryRecord],
    target_week: NaiveDate,
    policy: &GoalPolicy,
) -> i64 {
    let window_start = weeks_before(target_week, policy.lookback_weeks);
    let previous = previous_week(target_week);

    let mut window: Vec<(i64, f64)> = Vec::new();
    let mut previous_goal: Option<i64> = None;
    for record in history {
        let week = record.week_start_date;
        if week < window_start || week >= target_week {
            continue;
        }
        window.push((
            (target_week - week).num_weeks(),
            record.total_points.max(0.0),
        ));
        if week == previous {
            previous_goal = Some(record.weekly_goal);
        }
    }

    if window.is_empty() {
        return GOAL_FLOOR.min(policy.cap);
    }

    let outlier_cap = (OUTLIER_MEDIAN_FACTOR * median(window.iter().map(|(_, total)| *total)))
        .max(GOAL_FLOOR as f64);

    let (weighted_sum, weight_sum) =
        window
            .iter()
            .fold((0.0, 0.0), |(sum, weights), (weeks_back, total)| {
                let weight = (policy.lookback_weeks + 1 - weeks_back) as f64;
                (sum + weight * total.min(outlier_cap), weights + weight)
            });
    let average = weighted_sum / weight_sum;

    let mut goal = average * (1.0 + policy.growth);
    if let Some(previous_goal) = previous_goal.filter(|value| *value > 0) {
        let previous_goal = previous_goal as f64;
        goal = goal.clamp(previous_goal * STEP_DOWN_LIMIT, previous_goal * STEP_UP_LIMIT);
    }

    let goal = (round_points(goal) as i64).clamp(GOAL_FLOOR, policy.cap);

    debug!(
        target: "app::goal",
        target_week = %target_week,
        weeks_used = window.len(),
        average,
        outlier_cap,
        goal,
        "derived weekly goal"
    );

    goal
}

fn median(values: impl Iterator<Item = f64>) -> f64 {
    let mut sorted: Vec<f64> = values.collect();
    if sorted.is_empty() {
        return 0.0;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Freshly derived goal for a week, ignoring any goal already stored for it.
pub fn calculate_goal_in(
    conn: &Connection,
    user_id: &str,
    week_start: NaiveDate,
    policy: &GoalPolicy,
) -> AppResult<i64> {
    let history = WeeklyHistoryRepository::list_range(
        conn,
        user_id,
        weeks_before(week_start, policy.lookback_weeks),
        week_start,
    )?;
    Ok(derive_goal(&history, week_start, policy))
}

/// The stored goal of a week when its history row exists, otherwise a freshly
/// derived one. Never writes.
pub fn resolve_goal_in(
    conn: &Connection,
    user_id: &str,
    week_start: NaiveDate,
    policy: &GoalPolicy,
) -> AppResult<i64> {
    match WeeklyHistoryRepository::find(conn, user_id, week_start)? {
        Some(record) => Ok(record.weekly_goal),
        None => calculate_goal_in(conn, user_id, week_start, policy),
    }
}

pub struct GoalCalculator {
    db: DbPool,
    settings: Arc<SettingsService>,
}

impl GoalCalculator {
    pub fn new(db: DbPool, settings: Arc<SettingsService>) -> Self {
        Self { db, settings }
    }

    pub fn calculate_goal(&self, user_id: &str, week_start: NaiveDate) -> AppResult<i64> {
        let user_id = normalize_user_id(user_id)?;
        let week_start = ensure_week_start(week_start)?;
        let policy = self.settings.goal_policy()?;
        self.db
            .with_connection(|conn| calculate_goal_in(conn, user_id, week_start, &policy))
    }

    pub fn goal_for_week(&self, user_id: &str, week_start: NaiveDate) -> AppResult<i64> {
        let user_id = normalize_user_id(user_id)?;
        let week_start = ensure_week_start(week_start)?;
        let policy = self.settings.goal_policy()?;
        self.db
            .with_connection(|conn| resolve_goal_in(conn, user_id, week_start, &policy))
    }
}
