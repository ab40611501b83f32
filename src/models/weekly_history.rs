use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyHistoryRecord {
    pub user_id: String,
    pub week_start_date: NaiveDate,
    pub total_points: f64,
    pub tasks_completed: i64,
    pub weekly_goal: i64,
    pub goal_achieved: bool,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeeklyHistoryUpsert {
    pub user_id: String,
    pub week_start_date: NaiveDate,
    pub total_points: f64,
    pub tasks_completed: i64,
    pub weekly_goal: i64,
}

impl WeeklyHistoryUpsert {
    pub fn goal_achieved(&self) -> bool {
        self.total_points >= self.weekly_goal as f64
    }
}
