use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::models::weekly_history::WeeklyHistoryRecord;
use crate::models::weekly_stat::TaskWeeklyStatRecord;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskCompletionRecord {
    pub id: String,
    pub user_id: String,
    pub task_id: String,
    pub display_name: String,
    /// Base value of the task definition at award time.
    pub base_points: f64,
    /// Repetition multiplier applied to `base_points` for this completion.
    pub multiplier: f64,
    pub awarded_points: f64,
    pub note: Option<String>,
    pub completed_at: DateTime<Utc>,
    pub week_start_date: NaiveDate,
}

/// A scoring request. `base_points` comes from the task definition the caller
/// resolved; the scorer treats it as opaque.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScoreCompletionInput {
    pub user_id: String,
    pub task_id: String,
    pub display_name: String,
    pub base_points: f64,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScoreOutcome {
    pub awarded_points: f64,
    pub multiplier: f64,
    pub completion: TaskCompletionRecord,
    pub stat: TaskWeeklyStatRecord,
    pub history: WeeklyHistoryRecord,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeletionOutcome {
    pub deleted: usize,
    pub history: Vec<WeeklyHistoryRecord>,
}
