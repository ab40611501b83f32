use serde_json::{json, Value as JsonValue};

use crate::models::progress::ProgressSnapshot;

/// One structured request for the text generator. The payload is sent as the
/// user message, serialized as JSON.
#[derive(Debug, Clone, PartialEq)]
pub struct TextPrompt {
    pub operation: &'static str,
    pub system_prompt: &'static str,
    pub payload: JsonValue,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// System prompt for weekly badge naming.
pub fn badge_system_prompt() -> &'static str {
    r#"You are JobQuest's achievement writer. A job seeker just reached their weekly point goal.
Read the JSON context and answer with JSON only, no markdown fences, matching:
{
  "title": string,
  "description": string
}
The title is at most five words. The description is one upbeat sentence that mentions what
the user actually did this week. Never invent numbers that are not in the context."#
}

/// System prompt for progress-aware encouragement.
pub fn motivation_system_prompt() -> &'static str {
    r#"You are JobQuest's coach for people looking for work. Read the JSON context describing
this week's progress and answer with JSON only, no markdown fences, matching:
{
  "message": string
}
Keep the message under 40 words, warm and concrete. If the goal is already reached, celebrate
and suggest keeping momentum; otherwise name how many points remain."#
}

fn progress_context(snapshot: &ProgressSnapshot) -> JsonValue {
    let remaining = (snapshot.goal as f64 - snapshot.points).max(0.0);
    json!({
        "weekStartDate": snapshot.week_start_date.to_string(),
        "points": snapshot.points,
        "goal": snapshot.goal,
        "goalAchieved": snapshot.goal_achieved,
        "remainingPoints": remaining,
        "tasksCompleted": snapshot.tasks_completed,
        "topTasks": snapshot
            .top_tasks
            .iter()
            .map(|task| json!({
                "name": task.display_name,
                "points": task.points,
                "completions": task.completions,
            }))
            .collect::<Vec<_>>(),
    })
}

/// Build the user payload for a badge title request.
pub fn build_badge_payload(snapshot: &ProgressSnapshot) -> JsonValue {
    json!({
        "operation": "badgeTitle",
        "context": progress_context(snapshot),
        "expectations": {
            "maxTitleWords": 5,
            "tone": "celebratory"
        }
    })
}

/// Build the user payload for a motivational message request.
pub fn build_motivation_payload(snapshot: &ProgressSnapshot) -> JsonValue {
    json!({
        "operation": "motivationalMessage",
        "context": progress_context(snapshot),
        "expectations": {
            "maxWords": 40,
            "tone": "encouraging"
        }
    })
}

pub fn badge_prompt(snapshot: &ProgressSnapshot) -> TextPrompt {
    TextPrompt {
        operation: "badgeTitle",
        system_prompt: badge_system_prompt(),
        payload: build_badge_payload(snapshot),
        temperature: 0.7,
        max_tokens: 200,
    }
}

pub fn motivation_prompt(snapshot: &ProgressSnapshot) -> TextPrompt {
    TextPrompt {
        operation: "motivationalMessage",
        system_prompt: motivation_system_prompt(),
        payload: build_motivation_payload(snapshot),
        temperature: 0.8,
        max_tokens: 200,
    }
}
