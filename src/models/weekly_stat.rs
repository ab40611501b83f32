use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskWeeklyStatRecord {
    pub user_id: String,
    pub task_id: String,
    pub display_name: String,
    pub base_points: f64,
    /// Awarded value of the most recent completion; a cache, not re-derived on read.
    pub current_value: f64,
    pub times_this_week: i64,
    pub last_completed_at: Option<DateTime<Utc>>,
    pub week_start_date: NaiveDate,
}

impl TaskWeeklyStatRecord {
    /// State of a stat with no completions left in its week.
    pub fn reset(&mut self) {
        self.times_this_week = 0;
        self.current_value = self.base_points;
        self.last_completed_at = None;
    }
}

/// A stat whose repetition count disagrees with the completion rows.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StatDivergence {
    pub task_id: String,
    pub recorded_times: i64,
    pub actual_completions: i64,
}
