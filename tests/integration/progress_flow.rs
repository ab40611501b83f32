use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, TimeZone, Utc};
use jobquest_core::db::DbPool;
use jobquest_core::error::{AppError, AppResult, TextGenErrorCode};
use jobquest_core::models::task_definition::CustomTaskInput;
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
    let pool = DbPool::new(dir.path().join("progress.sqlite")).expect("db pool");
    let clock = Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2024, 2, 6, 8, 0, 0).unwrap(),
    ));
    let state = AppState::with_collaborators(pool, clock.clone(), Arc::new(OfflineGenerator))
        .expect("app state");
    (state, clock, dir)
}

fn week() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 2, 5).unwrap()
}

#[test]
fn empty_week_is_read_only() {
    let (state, _clock, _dir) = setup();
    let snapshot = state.progress().build_progress("dana", week()).expect("progress");

    assert_eq!(snapshot.points, 0.0);
    assert_eq!(snapshot.goal, 15);
    assert!(!snapshot.goal_achieved);
    assert_eq!(snapshot.tasks_completed, 0);
    assert!(snapshot.top_tasks.is_empty());
    assert!(snapshot.completions.is_empty());
    assert_eq!(snapshot.goal_ratio(), 0.0);
    assert!(snapshot.points.is_sign_positive());
    let json = serde_json::to_string(&snapshot).expect("serialize");
    assert!(json.contains("\"points\":0.0"), "{json}");

    let err = state
        .aggregator()
        .find_week("dana", week())
        .expect_err("progress must not create history");
    assert!(err.is_not_found());
}

#[test]
fn snapshot_ranks_tasks_and_reports_multipliers() {
    let (state, clock, _dir) = setup();
    let completions = state.completions();

    for task in [
        "mock_interview",
        "mock_interview",
        "job_application",
        "follow_up_email",
        "follow_up_email",
        "follow_up_email",
    ] {
        clock.advance(Duration::minutes(15));
        completions.complete_task("dana", task, None).expect("complete");
    }

    let snapshot = state.progress().current_progress("dana").expect("progress");
    assert_eq!(snapshot.week_start_date, week());
    // mock 4 + 5, job 3, follow-up 1 + 1 + 1
    assert_eq!(snapshot.points, 15.0);
    assert_eq!(snapshot.tasks_completed, 6);
    assert!(snapshot.goal_achieved);
    assert_eq!(snapshot.goal_ratio(), 1.0);

    let order: Vec<&str> = snapshot
        .top_tasks
        .iter()
        .map(|task| task.task_id.as_str())
        .collect();
    // job_application and follow_up_email tie on 3 points; more completions wins
    assert_eq!(order, vec!["mock_interview", "follow_up_email", "job_application"]);
    assert_eq!(snapshot.top_tasks[0].points, 9.0);
    assert_eq!(snapshot.top_tasks[1].completions, 3);

    let second_mock = &snapshot.completions[1];
    assert_eq!(second_mock.task_id, "mock_interview");
    assert_eq!(second_mock.base_points, 4.0);
    assert_eq!(second_mock.applied_multiplier, 1.25);

    let history = state.aggregator().find_week("dana", week()).expect("history");
    assert_eq!(history.total_points, snapshot.points);
    assert_eq!(history.weekly_goal, snapshot.goal);
}

#[test]
fn top_tasks_are_limited_to_five() {
    let (state, clock, _dir) = setup();
    for task in [
        "job_application",
        "networking_event",
        "coding_practice",
        "informational_interview",
        "linkedin_outreach",
        "resume_update",
        "company_research",
    ] {
        clock.advance(Duration::minutes(5));
        state
            .completions()
            .complete_task("dana", task, None)
            .expect("complete");
    }

    let snapshot = state.progress().build_progress("dana", week()).expect("progress");
    assert_eq!(snapshot.tasks_completed, 7);
    assert_eq!(snapshot.top_tasks.len(), 5);
    assert_eq!(snapshot.top_tasks[0].task_id, "informational_interview");
    // linkedin_outreach and company_research tie on everything but id
    assert!(snapshot
        .top_tasks
        .iter()
        .all(|task| task.task_id != "linkedin_outreach" && task.task_id != "company_research"));
}

#[test]
fn padded_user_ids_reach_the_same_rows() {
    let (state, clock, _dir) = setup();
    let completions = state.completions();

    clock.advance(Duration::minutes(5));
    let outcome = completions
        .complete_task(" alice ", "job_application", None)
        .expect("complete");
    assert_eq!(outcome.completion.user_id, "alice");

    let snapshot = state
        .progress()
        .build_progress(" alice ", week())
        .expect("progress");
    assert_eq!(snapshot.user_id, "alice");
    assert_eq!(snapshot.points, 3.0);
    assert_eq!(snapshot.tasks_completed, 1);
    assert_eq!(
        state.progress().build_progress("alice", week()).expect("progress"),
        snapshot
    );

    state
        .catalog()
        .create_custom_task(
            "alice\t",
            CustomTaskInput {
                task_id: "meetup".into(),
                display_name: "Meetup".into(),
                base_points: 2.0,
                category: Some("networking".into()),
            },
        )
        .expect("custom task");
    clock.advance(Duration::minutes(5));
    completions
        .complete_task("alice", "meetup", None)
        .expect("padded owner still resolves");

    let deleted = completions
        .delete_completion("  alice", &outcome.completion.id)
        .expect("delete");
    assert_eq!(deleted.deleted, 1);
    assert_eq!(deleted.history[0].total_points, 2.0);

    assert!(completions
        .complete_task("   ", "job_application", None)
        .is_err());
}

#[test]
fn base_change_mid_week_keeps_recorded_multipliers() {
    let (state, clock, _dir) = setup();
    let catalog = state.catalog();
    let completions = state.completions();
    let meetup = |base: f64| CustomTaskInput {
        task_id: "meetup".into(),
        display_name: "Meetup".into(),
        base_points: base,
        category: Some("networking".into()),
    };

    catalog.create_custom_task("dana", meetup(4.0)).expect("create");
    for expected in [4.0, 5.0] {
        clock.advance(Duration::minutes(10));
        let outcome = completions
            .complete_task("dana", "meetup", None)
            .expect("complete");
        assert_eq!(outcome.awarded_points, expected);
    }

    catalog.delete_custom_task("dana", "meetup").expect("delete task");
    catalog.create_custom_task("dana", meetup(10.0)).expect("re-create");
    clock.advance(Duration::minutes(10));
    let third = completions
        .complete_task("dana", "meetup", None)
        .expect("complete");
    assert_eq!(third.awarded_points, 14.0);

    let snapshot = state.progress().build_progress("dana", week()).expect("progress");
    let bases: Vec<f64> = snapshot.completions.iter().map(|c| c.base_points).collect();
    assert_eq!(bases, vec![4.0, 4.0, 10.0]);
    assert_eq!(snapshot.completions[0].applied_multiplier, 1.0);
    assert_eq!(snapshot.completions[1].applied_multiplier, 1.25);
    let third_multiplier = snapshot.completions[2].applied_multiplier;
    assert!((third_multiplier - 1.396).abs() < 1e-3, "{third_multiplier}");
    assert!(snapshot
        .completions
        .iter()
        .all(|c| (1.0..=1.5).contains(&c.applied_multiplier)));

    // the stat falls back to the base of the latest remaining completion
    completions
        .delete_completion("dana", &third.completion.id)
        .expect("delete");
    let stat = completions
        .find_stat("dana", "meetup", week())
        .expect("stat")
        .expect("stat row kept");
    assert_eq!(stat.times_this_week, 2);
    assert_eq!(stat.base_points, 4.0);
    assert_eq!(stat.current_value, 5.0);

    let history = state.aggregator().find_week("dana", week()).expect("history");
    assert_eq!(history.total_points, 9.0);
}
