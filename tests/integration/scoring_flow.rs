use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, TimeZone, Utc};
use jobquest_core::db::DbPool;
use jobquest_core::error::{AppError, AppResult, TextGenErrorCode};
use jobquest_core::models::completion::ScoreCompletionInput;
use jobquest_core::services::prompt_templates::TextPrompt;
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

fn setup() -> (AppState, Arc<FixedClock>, TempDir) {
    let dir = tempdir().expect("temp dir");
    let pool = DbPool::new(dir.path().join("scoring.sqlite")).expect("db pool");
    // Wednesday
    let clock = Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2024, 9, 11, 14, 0, 0).unwrap(),
    ));
    let state = AppState::with_collaborators(pool, clock.clone(), Arc::new(OfflineGenerator))
        .expect("app state");
    (state, clock, dir)
}

fn week() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 9, 9).unwrap()
}

fn input(task_id: &str, base: f64) -> ScoreCompletionInput {
    ScoreCompletionInput {
        user_id: "alice".into(),
        task_id: task_id.into(),
        display_name: format!("Task {task_id}"),
        base_points: base,
        note: None,
    }
}

fn stored_sum(state: &AppState) -> f64 {
    state
        .completions()
        .list_completions("alice", week())
        .expect("list completions")
        .iter()
        .map(|item| item.awarded_points)
        .sum()
}

#[test]
fn base_two_three_times_totals_eight() {
    let (state, clock, _dir) = setup();
    let completions = state.completions();

    let mut awards = Vec::new();
    let mut last = None;
    for _ in 0..3 {
        clock.advance(Duration::minutes(10));
        let outcome = completions
            .score_completion(input("coding_practice", 2.0))
            .expect("score");
        awards.push(outcome.awarded_points);
        last = Some(outcome);
    }

    assert_eq!(awards, vec![2.0, 3.0, 3.0]);
    let last = last.expect("outcome");
    assert_eq!(last.stat.times_this_week, 3);
    assert_eq!(last.stat.current_value, 3.0);
    assert_eq!(last.history.total_points, 8.0);
    assert_eq!(last.history.tasks_completed, 3);

    let history = state.aggregator().find_week("alice", week()).expect("history");
    assert_eq!(history.total_points, 8.0);
    assert_eq!(history.weekly_goal, 15);
    assert!(!history.goal_achieved);
}

#[test]
fn single_completion_awards_base() {
    let (state, _clock, _dir) = setup();
    let outcome = state
        .completions()
        .score_completion(input("job_application", 3.0))
        .expect("score");

    assert_eq!(outcome.awarded_points, 3.0);
    assert_eq!(outcome.stat.times_this_week, 1);
    assert_eq!(outcome.stat.current_value, 3.0);
    assert_eq!(outcome.completion.week_start_date, week());
}

#[test]
fn catalog_resolution_feeds_scoring() {
    let (state, _clock, _dir) = setup();
    let outcome = state
        .completions()
        .complete_task("alice", "informational_interview", Some("met a hiring manager".into()))
        .expect("complete task");

    assert_eq!(outcome.awarded_points, 5.0);
    assert_eq!(outcome.completion.display_name, "Informational interview");
    assert_eq!(outcome.completion.note.as_deref(), Some("met a hiring manager"));

    let err = state
        .completions()
        .complete_task("alice", "not_a_task", None)
        .expect_err("unknown task");
    assert!(err.is_not_found());
}

#[test]
fn week_boundary_restarts_repetition_count() {
    let (state, clock, _dir) = setup();
    let completions = state.completions();

    clock.set(Utc.with_ymd_and_hms(2024, 9, 15, 23, 59, 0).unwrap());
    completions.score_completion(input("mock_interview", 4.0)).expect("sunday");
    let sunday_second = completions
        .score_completion(input("mock_interview", 4.0))
        .expect("sunday again");
    assert_eq!(sunday_second.awarded_points, 5.0);
    assert_eq!(sunday_second.completion.week_start_date, week());

    clock.set(Utc.with_ymd_and_hms(2024, 9, 16, 0, 0, 0).unwrap());
    let monday = completions
        .score_completion(input("mock_interview", 4.0))
        .expect("monday");
    assert_eq!(monday.awarded_points, 4.0);
    assert_eq!(monday.stat.times_this_week, 1);
    assert_eq!(
        monday.completion.week_start_date,
        NaiveDate::from_ymd_opt(2024, 9, 16).unwrap()
    );
}

#[test]
fn history_matches_completions_through_deletes() {
    let (state, clock, _dir) = setup();
    let completions = state.completions();

    let mut ids = Vec::new();
    for (task, base) in [
        ("job_application", 3.0),
        ("job_application", 3.0),
        ("job_application", 3.0),
        ("linkedin_outreach", 1.0),
        ("portfolio_project", 3.0),
    ] {
        clock.advance(Duration::minutes(1));
        ids.push(
            completions
                .score_completion(input(task, base))
                .expect("score")
                .completion
                .id,
        );
    }

    let history = state.aggregator().find_week("alice", week()).expect("history");
    assert_eq!(history.total_points, stored_sum(&state));

    let outcome = completions.delete_completion("alice", &ids[1]).expect("delete");
    assert_eq!(outcome.history[0].total_points, stored_sum(&state));
    assert_eq!(outcome.history[0].tasks_completed, 4);

    let stat = completions
        .find_stat("alice", "job_application", week())
        .expect("stat lookup")
        .expect("stat");
    assert_eq!(stat.times_this_week, 2);
    assert!(state.aggregator().check_consistency("alice", week()).expect("check").is_empty());

    let outcome = completions
        .delete_completions(
            "alice",
            &[ids[3].clone(), "missing".to_string(), ids[3].clone(), ids[4].clone()],
        )
        .expect("bulk delete");
    assert_eq!(outcome.deleted, 2);
    assert_eq!(outcome.history.len(), 1);
    assert_eq!(outcome.history[0].total_points, stored_sum(&state));
    assert!(outcome.history[0].total_points >= 0.0);

    state
        .aggregator()
        .ensure_consistent("alice", week())
        .expect("consistent after deletes");
}

#[test]
fn clear_week_resets_stats_in_place() {
    let (state, clock, _dir) = setup();
    let completions = state.completions();
    for _ in 0..2 {
        clock.advance(Duration::minutes(1));
        completions.score_completion(input("resume_update", 2.0)).expect("score");
    }

    let outcome = completions.clear_week("alice", week()).expect("clear");
    assert_eq!(outcome.deleted, 2);
    assert_eq!(outcome.history[0].total_points, 0.0);
    assert_eq!(outcome.history[0].tasks_completed, 0);

    let stat = completions
        .find_stat("alice", "resume_update", week())
        .expect("stat lookup")
        .expect("stat kept");
    assert_eq!(stat.times_this_week, 0);
    assert_eq!(stat.current_value, 2.0);
    assert!(stat.last_completed_at.is_none());

    let next = completions.score_completion(input("resume_update", 2.0)).expect("score");
    assert_eq!(next.awarded_points, 2.0);
    assert_eq!(next.stat.times_this_week, 1);
}

#[test]
fn failed_recompute_rolls_back_the_whole_completion() {
    let (state, _clock, _dir) = setup();
    state
        .db()
        .with_connection(|conn| {
            conn.execute_batch(
                r#"
                CREATE TRIGGER reject_history BEFORE INSERT ON weekly_history
                BEGIN
                    SELECT RAISE(ABORT, 'history writes disabled');
                END;
                "#,
            )?;
            Ok(())
        })
        .expect("install trigger");

    let result = state
        .completions()
        .score_completion(input("networking_event", 4.0));
    assert!(result.is_err());

    assert!(state
        .completions()
        .list_completions("alice", week())
        .expect("list")
        .is_empty());
    assert!(state
        .completions()
        .find_stat("alice", "networking_event", week())
        .expect("stat lookup")
        .is_none());
}

#[test]
fn users_are_isolated() {
    let (state, _clock, _dir) = setup();
    let completions = state.completions();
    let outcome = completions
        .score_completion(input("company_research", 1.0))
        .expect("score");

    let bob = ScoreCompletionInput {
        user_id: "bob".into(),
        ..input("company_research", 1.0)
    };
    let bob_outcome = completions.score_completion(bob).expect("score bob");
    assert_eq!(bob_outcome.stat.times_this_week, 1);

    let err = completions
        .delete_completion("bob", &outcome.completion.id)
        .expect_err("cannot delete another user's completion");
    assert!(err.is_not_found());
}
