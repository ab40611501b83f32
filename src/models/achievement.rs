use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Where a piece of narrative text came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TextSource {
    Generated,
    Fallback,
}

impl TextSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TextSource::Generated => "generated",
            TextSource::Fallback => "fallback",
        }
    }
}

impl fmt::Display for TextSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for TextSource {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "generated" => Ok(TextSource::Generated),
            "fallback" => Ok(TextSource::Fallback),
            other => Err(format!("unsupported text source: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AchievementRecord {
    pub id: String,
    pub user_id: String,
    pub week_start_date: NaiveDate,
    pub title: String,
    pub description: String,
    pub points_at_award: f64,
    pub weekly_goal: i64,
    pub source: TextSource,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MotivationalMessage {
    pub week_start_date: NaiveDate,
    pub message: String,
    pub source: TextSource,
}
