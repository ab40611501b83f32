use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, TimeZone, Utc};
use jobquest_core::db::DbPool;
use jobquest_core::error::{AppError, AppResult, TextGenErrorCode};
use jobquest_core::models::achievement::TextSource;
use jobquest_core::services::achievement_service::FALLBACK_BADGE_TITLE;
use jobquest_core::services::prompt_templates::TextPrompt;
use jobquest_core::services::text_generation::TextGenerator;
use jobquest_core::utils::clock::FixedClock;
use jobquest_core::AppState;
use serde_json::Value as JsonValue;
use tempfile::{tempdir, TempDir};

/// Replies with a fixed string (or fails) and records every prompt it sees.
struct ScriptedGenerator {
    reply: Option<String>,
    prompts: Mutex<Vec<(String, JsonValue)>>,
}

impl ScriptedGenerator {
    fn replying(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn failing() -> Self {
        Self {
            reply: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<(String, JsonValue)> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate_text(&self, prompt: &TextPrompt) -> AppResult<String> {
        self.prompts
            .lock()
            .unwrap()
            .push((prompt.operation.to_string(), prompt.payload.clone()));
        match &self.reply {
            Some(reply) => Ok(reply.clone()),
            None => Err(AppError::text_generation(
                TextGenErrorCode::HttpTimeout,
                "generator timed out",
            )),
        }
    }
}

fn week() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 7, 1).unwrap()
}

fn setup(generator: Arc<ScriptedGenerator>) -> (AppState, Arc<FixedClock>, TempDir) {
    let dir = tempdir().expect("temp dir");
    let pool = DbPool::new(dir.path().join("achievements.sqlite")).expect("db pool");
    let clock = Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2024, 7, 2, 12, 0, 0).unwrap(),
    ));
    let state =
        AppState::with_collaborators(pool, clock.clone(), generator).expect("app state");
    (state, clock, dir)
}

/// informational interview x3: 5 + 6 + 7 = 18 points, above the floor goal.
fn reach_goal(state: &AppState, clock: &FixedClock) {
    for _ in 0..3 {
        clock.advance(Duration::minutes(20));
        state
            .completions()
            .complete_task("erin", "informational_interview", None)
            .expect("complete");
    }
}

#[tokio::test]
async fn no_badge_before_goal_is_reached() {
    let generator = Arc::new(ScriptedGenerator::replying(r#"{"title":"x","description":"y"}"#));
    let (state, _clock, _dir) = setup(generator.clone());

    state
        .completions()
        .complete_task("erin", "job_application", None)
        .expect("complete");

    let badge = state
        .achievements()
        .evaluate_week("erin", week())
        .await
        .expect("evaluate");
    assert!(badge.is_none());
    assert!(generator.calls().is_empty());
}

#[tokio::test]
async fn generated_badge_is_stored_once() {
    let generator = Arc::new(ScriptedGenerator::replying(
        "```json\n{\"title\": \"Interview Insider\", \"description\": \"Three conversations with people on the inside.\"}\n```",
    ));
    let (state, clock, _dir) = setup(generator.clone());
    reach_goal(&state, &clock);

    let badge = state
        .achievements()
        .evaluate_week("erin", week())
        .await
        .expect("evaluate")
        .expect("badge");
    assert_eq!(badge.title, "Interview Insider");
    assert_eq!(badge.source, TextSource::Generated);
    assert_eq!(badge.points_at_award, 18.0);
    assert_eq!(badge.weekly_goal, 15);

    let calls = generator.calls();
    assert_eq!(calls.len(), 1);
    let (operation, payload) = &calls[0];
    assert_eq!(operation, "badgeTitle");
    assert_eq!(payload["context"]["points"], 18.0);
    assert_eq!(payload["context"]["goal"], 15);
    assert_eq!(payload["context"]["tasksCompleted"], 3);
    assert_eq!(
        payload["context"]["topTasks"][0]["name"],
        "Informational interview"
    );

    let again = state
        .achievements()
        .evaluate_week("erin", week())
        .await
        .expect("evaluate again")
        .expect("badge");
    assert_eq!(again.id, badge.id);
    assert_eq!(generator.calls().len(), 1);

    let listed = state.achievements().list_achievements("erin").expect("list");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, badge.id);
}

#[tokio::test]
async fn failing_generator_falls_back() {
    let generator = Arc::new(ScriptedGenerator::failing());
    let (state, clock, _dir) = setup(generator.clone());
    reach_goal(&state, &clock);

    let badge = state
        .achievements()
        .evaluate_week("erin", week())
        .await
        .expect("evaluate")
        .expect("badge");
    assert_eq!(badge.title, FALLBACK_BADGE_TITLE);
    assert_eq!(badge.source, TextSource::Fallback);
    assert!(badge.description.contains("18 of 15 points"));

    let message = state
        .achievements()
        .motivational_message("erin", week())
        .await
        .expect("message");
    assert_eq!(message.source, TextSource::Fallback);
    assert!(message.message.starts_with("Weekly goal reached with 18 points"));
}

#[tokio::test]
async fn malformed_generation_falls_back() {
    let generator = Arc::new(ScriptedGenerator::replying("Great job!"));
    let (state, clock, _dir) = setup(generator.clone());
    reach_goal(&state, &clock);

    let badge = state
        .achievements()
        .evaluate_week("erin", week())
        .await
        .expect("evaluate")
        .expect("badge");
    assert_eq!(badge.title, FALLBACK_BADGE_TITLE);
    assert_eq!(badge.source, TextSource::Fallback);
}

#[tokio::test]
async fn generated_message_is_used_when_valid() {
    let generator = Arc::new(ScriptedGenerator::replying(
        r#"{"message": "Two more applications and the week is yours."}"#,
    ));
    let (state, _clock, _dir) = setup(generator.clone());

    state
        .completions()
        .complete_task("erin", "job_application", None)
        .expect("complete");

    let message = state
        .achievements()
        .motivational_message("erin", week())
        .await
        .expect("message");
    assert_eq!(message.source, TextSource::Generated);
    assert_eq!(message.message, "Two more applications and the week is yours.");

    let calls = generator.calls();
    assert_eq!(calls[0].0, "motivationalMessage");
    assert_eq!(calls[0].1["context"]["remainingPoints"], 12.0);
}
