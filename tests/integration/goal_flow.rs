use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, TimeZone, Utc};
use jobquest_core::db::DbPool;
use jobquest_core::error::{AppError, AppResult, TextGenErrorCode};
use jobquest_core::services::prompt_templates::TextPrompt;
use jobquest_core::services::settings_service::SettingsUpdateInput;
use jobquest_core::services::text_generation::TextGenerator;
use jobquest_core::utils::clock::FixedClock;
use jobquest_core::AppState;
use tempfile::{tempdir, TempDir};

struct OfflineGenerator;

#[async_trait]
impl TextGenerator for OfflineGenerator {
    async fn generate_text(&self, _prompt: &TextPrompt) -> AppResult<String> {
        Err(AppError::text_generation(
            TextGenErrorCode::ProviderUnavailable,
            "offline",
        ))
    }
}

fn week_a() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
}

fn week_b() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 8).unwrap()
}

fn setup() -> (AppState, Arc<FixedClock>, TempDir) {
    let dir = tempdir().expect("temp dir");
    let pool = DbPool::new(dir.path().join("goals.sqlite")).expect("db pool");
    let clock = Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap(),
    ));
    let state = AppState::with_collaborators(pool, clock.clone(), Arc::new(OfflineGenerator))
        .expect("app state");
    (state, clock, dir)
}

/// Five job applications in week A: 3 + 4 + 4 + 5 + 5 = 21 points.
fn fill_week_a(state: &AppState, clock: &FixedClock) {
    clock.set(Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap());
    for _ in 0..5 {
        clock.advance(Duration::minutes(30));
        state
            .completions()
            .complete_task("carol", "job_application", None)
            .expect("complete");
    }
}

#[test]
fn no_history_yields_floor_goal() {
    let (state, _clock, _dir) = setup();
    assert_eq!(state.goals().calculate_goal("carol", week_a()).expect("goal"), 15);
    assert_eq!(state.goals().goal_for_week("carol", week_a()).expect("goal"), 15);
}

#[test]
fn next_week_goal_follows_prior_total() {
    let (state, clock, _dir) = setup();
    fill_week_a(&state, &clock);

    let history = state.aggregator().find_week("carol", week_a()).expect("week a");
    assert_eq!(history.total_points, 21.0);
    assert_eq!(history.weekly_goal, 15);
    assert!(history.goal_achieved);

    // 21 * 1.1 = 23.1, bounded by 1.25 * 15 = 18.75, rounded to 19
    let goals = state.goals();
    let first = goals.calculate_goal("carol", week_b()).expect("goal");
    let second = goals.calculate_goal("carol", week_b()).expect("goal again");
    assert_eq!(first, 19);
    assert_eq!(first, second);
}

#[test]
fn stored_goal_is_never_recomputed() {
    let (state, clock, _dir) = setup();
    fill_week_a(&state, &clock);

    clock.set(Utc.with_ymd_and_hms(2024, 1, 9, 10, 0, 0).unwrap());
    let outcome = state
        .completions()
        .complete_task("carol", "coding_practice", None)
        .expect("week b completion");
    assert_eq!(outcome.history.weekly_goal, 19);

    // a late entry back in week A raises its total but must not move B's goal
    clock.set(Utc.with_ymd_and_hms(2024, 1, 7, 20, 0, 0).unwrap());
    for _ in 0..4 {
        clock.advance(Duration::minutes(5));
        state
            .completions()
            .complete_task("carol", "networking_event", None)
            .expect("late week a completion");
    }

    assert_eq!(state.goals().goal_for_week("carol", week_b()).expect("stored"), 19);

    clock.set(Utc.with_ymd_and_hms(2024, 1, 10, 10, 0, 0).unwrap());
    let outcome = state
        .completions()
        .complete_task("carol", "coding_practice", None)
        .expect("week b again");
    assert_eq!(outcome.history.weekly_goal, 19);
}

#[test]
fn settings_bound_new_goals() {
    let (state, clock, _dir) = setup();
    fill_week_a(&state, &clock);

    state
        .settings()
        .update(SettingsUpdateInput {
            goal_cap: Some(16),
            goal_growth_percent: Some(0),
            ..Default::default()
        })
        .expect("update settings");

    assert_eq!(state.goals().calculate_goal("carol", week_b()).expect("goal"), 16);
}

#[test]
fn goal_is_never_below_floor_after_idle_weeks() {
    let (state, clock, _dir) = setup();
    fill_week_a(&state, &clock);
    state.completions().clear_week("carol", week_a()).expect("clear");

    let goal = state.goals().calculate_goal("carol", week_b()).expect("goal");
    assert_eq!(goal, 15);

    let far_future = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap();
    assert_eq!(state.goals().calculate_goal("carol", far_future).expect("goal"), 15);
}

#[test]
fn goal_requires_monday() {
    let (state, _clock, _dir) = setup();
    let err = state
        .goals()
        .calculate_goal("carol", NaiveDate::from_ymd_opt(2024, 1, 3).unwrap())
        .expect_err("wednesday");
    assert!(matches!(err, AppError::Validation { .. }));
}
