use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    pub user_id: String,
    pub week_start_date: NaiveDate,
    pub points: f64,
    pub goal: i64,
    pub goal_achieved: bool,
    pub tasks_completed: i64,
    pub top_tasks: Vec<TopTask>,
    pub completions: Vec<CompletionDetail>,
}

impl ProgressSnapshot {
    /// Share of the goal reached, capped at 1.0.
    pub fn goal_ratio(&self) -> f64 {
        if self.goal <= 0 {
            return 0.0;
        }
        (self.points / self.goal as f64).clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TopTask {
    pub task_id: String,
    pub display_name: String,
    pub points: f64,
    pub completions: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CompletionDetail {
    pub id: String,
    pub task_id: String,
    pub display_name: String,
    pub awarded_points: f64,
    /// Base value recorded on the completion at award time.
    pub base_points: f64,
    pub applied_multiplier: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub completed_at: DateTime<Utc>,
}
