use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::info;

use crate::db::repositories::custom_task_repository::CustomTaskRepository;
use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::task_definition::{
    CustomTaskInput, CustomTaskRecord, TaskCategory, TaskDefinition, TaskSource,
};
use crate::utils::ids::normalize_user_id;

const MAX_CUSTOM_BASE_POINTS: f64 = 100.0;
const MAX_DISPLAY_NAME_CHARS: usize = 120;

static TASK_ID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9][a-z0-9_-]{0,63}$").expect("task id regex must compile")
});

struct BuiltInTask {
    task_id: &'static str,
    display_name: &'static str,
    base_points: f64,
    category: TaskCategory,
}

const BUILT_IN_TASKS: &[BuiltInTask] = &[
    BuiltInTask {
        task_id: "job_application",
        display_name: "Submit a job application",
        base_points: 3.0,
        category: TaskCategory::Applications,
    },
    BuiltInTask {
        task_id: "networking_event",
        display_name: "Attend a networking event",
        base_points: 4.0,
        category: TaskCategory::Networking,
    },
    BuiltInTask {
        task_id: "coding_practice",
        display_name: "Coding practice session",
        base_points: 2.0,
        category: TaskCategory::Skills,
    },
    BuiltInTask {
        task_id: "informational_interview",
        display_name: "Informational interview",
        base_points: 5.0,
        category: TaskCategory::Networking,
    },
    BuiltInTask {
        task_id: "linkedin_outreach",
        display_name: "LinkedIn outreach message",
        base_points: 1.0,
        category: TaskCategory::Networking,
    },
    BuiltInTask {
        task_id: "resume_update",
        display_name: "Update resume",
        base_points: 2.0,
        category: TaskCategory::Materials,
    },
    BuiltInTask {
        task_id: "mock_interview",
        display_name: "Mock interview",
        base_points: 4.0,
        category: TaskCategory::Skills,
    },
    BuiltInTask {
        task_id: "follow_up_email",
        display_name: "Send a follow-up email",
        base_points: 1.0,
        category: TaskCategory::Applications,
    },
    BuiltInTask {
        task_id: "portfolio_project",
        display_name: "Work on a portfolio project",
        base_points: 3.0,
        category: TaskCategory::Materials,
    },
    BuiltInTask {
        task_id: "company_research",
        display_name: "Research a company",
        base_points: 1.0,
        category: TaskCategory::Research,
    },
];

impl BuiltInTask {
    fn to_definition(&self) -> TaskDefinition {
        TaskDefinition {
            task_id: self.task_id.to_string(),
            display_name: self.display_name.to_string(),
            base_points: self.base_points,
            category: self.category,
            source: TaskSource::BuiltIn,
        }
    }
}

pub fn built_in_tasks() -> Vec<TaskDefinition> {
    BUILT_IN_TASKS.iter().map(BuiltInTask::to_definition).collect()
}

pub fn find_built_in(task_id: &str) -> Option<TaskDefinition> {
    BUILT_IN_TASKS
        .iter()
        .find(|task| task.task_id == task_id)
        .map(BuiltInTask::to_definition)
}

/// Built-in job-search activities plus the tasks each user defines.
pub struct TaskCatalogService {
    db: DbPool,
}

impl TaskCatalogService {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    /// Custom definitions take precedence over built-ins.
    pub fn resolve(&self, user_id: &str, task_id: &str) -> AppResult<TaskDefinition> {
        let user_id = normalize_user_id(user_id)?;
        let task_id = task_id.trim();
        if task_id.is_empty() {
            return Err(AppError::validation("task id cannot be empty"));
        }

        if let Some(custom) = self
            .db
            .with_connection(|conn| CustomTaskRepository::find(conn, user_id, task_id))?
        {
            return Ok(custom.to_definition());
        }

        find_built_in(task_id).ok_or_else(AppError::not_found)
    }

    /// Built-ins in catalog order followed by the user's custom tasks.
    pub fn list_tasks(&self, user_id: &str) -> AppResult<Vec<TaskDefinition>> {
        let user_id = normalize_user_id(user_id)?;
        let mut tasks = built_in_tasks();
        let custom = self
            .db
            .with_connection(|conn| CustomTaskRepository::list_for_user(conn, user_id))?;
        tasks.extend(custom.iter().map(CustomTaskRecord::to_definition));
        Ok(tasks)
    }

    pub fn create_custom_task(
        &self,
        user_id: &str,
        input: CustomTaskInput,
    ) -> AppResult<TaskDefinition> {
        let user_id = normalize_user_id(user_id)?;
        let record = validate_custom_task(user_id, input)?;

        self.db
            .with_connection(|conn| CustomTaskRepository::insert(conn, &record))
            .map_err(|err| match err {
                AppError::Conflict { .. } => AppError::conflict(format!(
                    "custom task '{}' already exists",
                    record.task_id
                )),
                other => other,
            })?;

        info!(
            target: "app::catalog",
            user_id,
            task_id = %record.task_id,
            base_points = record.base_points,
            "custom task created"
        );

        Ok(record.to_definition())
    }

    pub fn list_custom_tasks(&self, user_id: &str) -> AppResult<Vec<CustomTaskRecord>> {
        let user_id = normalize_user_id(user_id)?;
        self.db
            .with_connection(|conn| CustomTaskRepository::list_for_user(conn, user_id))
    }

    /// Past completions of the task keep their awarded points.
    pub fn delete_custom_task(&self, user_id: &str, task_id: &str) -> AppResult<()> {
        let user_id = normalize_user_id(user_id)?;
        let task_id = task_id.trim();
        self.db
            .with_connection(|conn| CustomTaskRepository::delete(conn, user_id, task_id))?;
        info!(target: "app::catalog", user_id, task_id, "custom task deleted");
        Ok(())
    }
}

fn validate_custom_task(user_id: &str, input: CustomTaskInput) -> AppResult<CustomTaskRecord> {
    let user_id = normalize_user_id(user_id)?;

    let task_id = input.task_id.trim().to_string();
    if !TASK_ID_RE.is_match(&task_id) {
        return Err(AppError::validation_with_details(
            "task id must be a lowercase slug",
            serde_json::json!({ "field": "taskId", "pattern": TASK_ID_RE.as_str() }),
        ));
    }
    if find_built_in(&task_id).is_some() {
        return Err(AppError::conflict(format!(
            "task id '{task_id}' is reserved by the built-in catalog"
        )));
    }

    let display_name = input.display_name.trim().to_string();
    if display_name.is_empty() {
        return Err(AppError::validation("display name cannot be empty"));
    }
    if display_name.chars().count() > MAX_DISPLAY_NAME_CHARS {
        return Err(AppError::validation(format!(
            "display name cannot exceed {MAX_DISPLAY_NAME_CHARS} characters"
        )));
    }

    if !input.base_points.is_finite()
        || input.base_points <= 0.0
        || input.base_points > MAX_CUSTOM_BASE_POINTS
    {
        return Err(AppError::validation_with_details(
            "base points must be greater than 0 and at most 100",
            serde_json::json!({ "field": "basePoints", "value": input.base_points }),
        ));
    }

    let category = match input.category.as_deref().map(str::trim) {
        None | Some("") => TaskCategory::Custom,
        Some(value) => TaskCategory::try_from(value).map_err(AppError::validation)?,
    };

    Ok(CustomTaskRecord {
        user_id: user_id.to_string(),
        task_id,
        display_name,
        base_points: input.base_points,
        category,
        created_at: Utc::now(),
    })
}
