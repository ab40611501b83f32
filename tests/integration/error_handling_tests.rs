// Error handling and edge case tests

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use jobquest_core::db::DbPool;
use jobquest_core::error::{AppError, AppResult, TextGenErrorCode};
use jobquest_core::models::completion::ScoreCompletionInput;
use jobquest_core::models::task_definition::CustomTaskInput;
use jobquest_core::services::prompt_templates::TextPrompt;
use jobquest_core::services::settings_service::SettingsUpdateInput;
use jobquest_core::services::text_generation::TextGenerator;
use jobquest_core::state::ErrorPayload;
use jobquest_core::utils::clock::FixedClock;
use jobquest_core::AppState;
use tempfile::{tempdir, TempDir};

struct OfflineGenerator;

#[async_trait]
impl TextGenerator for OfflineGenerator {
    async fn generate_text(&self, _prompt: &TextPrompt) -> AppResult<String> {
        Err(AppError::text_generation(
            TextGenErrorCode::MissingApiKey,
            "not configured",
        ))
    }
}

fn setup_test_environment() -> (AppState, TempDir) {
    let dir = tempdir().expect("temp dir");
    let pool = DbPool::new(dir.path().join("errors.sqlite")).expect("db pool");
    let clock = Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2024, 11, 20, 9, 0, 0).unwrap(),
    ));
    let state =
        AppState::with_collaborators(pool, clock, Arc::new(OfflineGenerator)).expect("state");
    (state, dir)
}

fn week() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 11, 18).unwrap()
}

#[test]
fn test_invalid_score_input_is_rejected() {
    let (state, _dir) = setup_test_environment();

    let err = state
        .completions()
        .score_completion(ScoreCompletionInput {
            user_id: "frank".into(),
            task_id: "job_application".into(),
            display_name: "Apply".into(),
            base_points: f64::INFINITY,
            note: None,
        })
        .expect_err("infinite base");
    let payload = ErrorPayload::from(err);
    assert_eq!(payload.code, "VALIDATION_ERROR");
    assert!(payload.details.is_some());

    let err = state
        .completions()
        .score_completion(ScoreCompletionInput::default())
        .expect_err("empty input");
    assert!(matches!(err, AppError::Validation { .. }));
}

#[test]
fn test_unknown_completion_is_not_found() {
    let (state, _dir) = setup_test_environment();
    let err = state
        .completions()
        .delete_completion("frank", "no-such-id")
        .expect_err("missing completion");
    assert_eq!(ErrorPayload::from(err).code, "NOT_FOUND");

    let err = state
        .completions()
        .update_note("frank", "no-such-id", Some("note".into()))
        .expect_err("missing completion");
    assert!(err.is_not_found());

    // no aggregate was written by the failed delete
    assert!(state
        .aggregator()
        .find_week("frank", week())
        .expect_err("no history")
        .is_not_found());
}

#[test]
fn test_custom_task_conflicts() {
    let (state, _dir) = setup_test_environment();
    let catalog = state.catalog();
    let input = CustomTaskInput {
        task_id: "career_fair".into(),
        display_name: "Career fair".into(),
        base_points: 6.0,
        category: Some("networking".into()),
    };

    catalog
        .create_custom_task("frank", input.clone())
        .expect("create");
    let err = catalog
        .create_custom_task("frank", input.clone())
        .expect_err("duplicate");
    assert_eq!(ErrorPayload::from(err).code, "CONFLICT");

    // another user may reuse the id
    catalog
        .create_custom_task("gina", input)
        .expect("other user");

    let err = catalog
        .create_custom_task(
            "frank",
            CustomTaskInput {
                task_id: "meetup".into(),
                display_name: "Meetup".into(),
                base_points: 2.0,
                category: Some("parties".into()),
            },
        )
        .expect_err("unknown category");
    assert!(matches!(err, AppError::Validation { .. }));
}

#[test]
fn test_tampered_stat_is_reported_and_outvoted() {
    let (state, _dir) = setup_test_environment();
    let completions = state.completions();
    completions
        .complete_task("frank", "networking_event", None)
        .expect("complete");

    state
        .db()
        .with_connection(|conn| {
            conn.execute(
                "UPDATE task_weekly_stats SET times_this_week = 7 WHERE user_id = 'frank'",
                [],
            )?;
            Ok(())
        })
        .expect("tamper");

    let err = state
        .aggregator()
        .ensure_consistent("frank", week())
        .expect_err("divergence");
    assert!(matches!(err, AppError::Consistency { .. }));
    assert_eq!(ErrorPayload::from(err).code, "CONSISTENCY");

    // the row count wins: this is the second completion, not the eighth
    let outcome = completions
        .complete_task("frank", "networking_event", None)
        .expect("complete again");
    assert_eq!(outcome.stat.times_this_week, 2);
    assert_eq!(outcome.awarded_points, 5.0);

    state
        .aggregator()
        .ensure_consistent("frank", week())
        .expect("repaired by scoring");
}

#[test]
fn test_invalid_settings_are_rejected() {
    let (state, _dir) = setup_test_environment();
    let settings = state.settings();

    for input in [
        SettingsUpdateInput {
            goal_cap: Some(10_001),
            ..Default::default()
        },
        SettingsUpdateInput {
            goal_growth_percent: Some(-1),
            ..Default::default()
        },
        SettingsUpdateInput {
            text_generation_model: Some("   ".into()),
            ..Default::default()
        },
        SettingsUpdateInput {
            text_generation_api_key: Some(Some(" ".into())),
            ..Default::default()
        },
    ] {
        let err = settings.update(input).expect_err("invalid settings");
        assert!(matches!(err, AppError::Validation { .. }));
    }
}

#[test]
fn test_corrupt_rows_surface_database_errors() {
    let (state, _dir) = setup_test_environment();
    state
        .completions()
        .complete_task("frank", "resume_update", None)
        .expect("complete");

    state
        .db()
        .with_connection(|conn| {
            conn.execute(
                "UPDATE task_completions SET completed_at = 'yesterday' WHERE user_id = 'frank'",
                [],
            )?;
            Ok(())
        })
        .expect("corrupt");

    let err = state
        .completions()
        .list_completions("frank", week())
        .expect_err("corrupt timestamp");
    assert!(matches!(err, AppError::Database { .. }));
    assert_eq!(ErrorPayload::from(err).message, "database error");
}

#[test]
fn test_bulk_delete_limit() {
    let (state, _dir) = setup_test_environment();
    let ids: Vec<String> = (0..501).map(|i| format!("id-{i}")).collect();
    let err = state
        .completions()
        .delete_completions("frank", &ids)
        .expect_err("too many ids");
    assert!(matches!(err, AppError::Validation { .. }));

    let outcome = state
        .completions()
        .delete_completions("frank", &ids[..3])
        .expect("unknown ids are skipped");
    assert_eq!(outcome.deleted, 0);
    assert!(outcome.history.is_empty());
}
