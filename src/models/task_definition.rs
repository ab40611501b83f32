use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskCategory {
    Applications,
    Networking,
    Skills,
    Materials,
    Research,
    Custom,
}

impl TaskCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskCategory::Applications => "applications",
            TaskCategory::Networking => "networking",
            TaskCategory::Skills => "skills",
            TaskCategory::Materials => "materials",
            TaskCategory::Research => "research",
            TaskCategory::Custom => "custom",
        }
    }
}

impl fmt::Display for TaskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for TaskCategory {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "applications" => Ok(TaskCategory::Applications),
            "networking" => Ok(TaskCategory::Networking),
            "skills" => Ok(TaskCategory::Skills),
            "materials" => Ok(TaskCategory::Materials),
            "research" => Ok(TaskCategory::Research),
            "custom" => Ok(TaskCategory::Custom),
            other => Err(format!("unsupported task category: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TaskSource {
    BuiltIn,
    Custom,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskDefinition {
    pub task_id: String,
    pub display_name: String,
    pub base_points: f64,
    pub category: TaskCategory,
    pub source: TaskSource,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CustomTaskRecord {
    pub user_id: String,
    pub task_id: String,
    pub display_name: String,
    pub base_points: f64,
    pub category: TaskCategory,
    pub created_at: DateTime<Utc>,
}

impl CustomTaskRecord {
    pub fn to_definition(&self) -> TaskDefinition {
        TaskDefinition {
            task_id: self.task_id.clone(),
            display_name: self.display_name.clone(),
            base_points: self.base_points,
            category: self.category,
            source: TaskSource::Custom,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CustomTaskInput {
    pub task_id: String,
    pub display_name: String,
    pub base_points: f64,
    #[serde(default)]
    pub category: Option<String>,
}
