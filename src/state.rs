use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value as JsonValue};
use tracing::error;

use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::services::achievement_service::AchievementService;
use crate::services::completion_service::CompletionService;
use crate::services::goal_calculator::GoalCalculator;
use crate::services::progress_service::ProgressService;
use crate::services::settings_service::SettingsService;
use crate::services::task_catalog_service::TaskCatalogService;
use crate::services::text_generation::{SettingsTextGenerator, TextGenerator};
use crate::services::weekly_aggregator::WeeklyAggregator;
use crate::utils::clock::{Clock, SystemClock};

/// Every service wired against one database. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    db_pool: DbPool,
    settings_service: Arc<SettingsService>,
    catalog_service: Arc<TaskCatalogService>,
    completion_service: Arc<CompletionService>,
    aggregator: Arc<WeeklyAggregator>,
    goal_calculator: Arc<GoalCalculator>,
    progress_service: Arc<ProgressService>,
    achievement_service: Arc<AchievementService>,
}

impl AppState {
    pub fn new(db_pool: DbPool) -> AppResult<Self> {
        let settings_service = Arc::new(SettingsService::new(db_pool.clone())?);
        let generator: Arc<dyn TextGenerator> =
            Arc::new(SettingsTextGenerator::new(Arc::clone(&settings_service)));
        Ok(Self::build(
            db_pool,
            settings_service,
            Arc::new(SystemClock),
            generator,
        ))
    }

    /// Wiring with an explicit clock and text generator.
    pub fn with_collaborators(
        db_pool: DbPool,
        clock: Arc<dyn Clock>,
        generator: Arc<dyn TextGenerator>,
    ) -> AppResult<Self> {
        let settings_service = Arc::new(SettingsService::new(db_pool.clone())?);
        Ok(Self::build(db_pool, settings_service, clock, generator))
    }

    fn build(
        db_pool: DbPool,
        settings_service: Arc<SettingsService>,
        clock: Arc<dyn Clock>,
        generator: Arc<dyn TextGenerator>,
    ) -> Self {
        let catalog_service = Arc::new(TaskCatalogService::new(db_pool.clone()));
        let completion_service = Arc::new(CompletionService::new(
            db_pool.clone(),
            Arc::clone(&clock),
            Arc::clone(&settings_service),
            Arc::clone(&catalog_service),
        ));
        let aggregator = Arc::new(WeeklyAggregator::new(
            db_pool.clone(),
            Arc::clone(&settings_service),
        ));
        let goal_calculator = Arc::new(GoalCalculator::new(
            db_pool.clone(),
            Arc::clone(&settings_service),
        ));
        let progress_service = Arc::new(ProgressService::new(
            db_pool.clone(),
            Arc::clone(&clock),
            Arc::clone(&settings_service),
        ));
        let achievement_service = Arc::new(AchievementService::new(
            db_pool.clone(),
            Arc::clone(&progress_service),
            generator,
            clock,
        ));

        Self {
            db_pool,
            settings_service,
            catalog_service,
            completion_service,
            aggregator,
            goal_calculator,
            progress_service,
            achievement_service,
        }
    }

    pub fn db(&self) -> DbPool {
        self.db_pool.clone()
    }

    pub fn settings(&self) -> Arc<SettingsService> {
        Arc::clone(&self.settings_service)
    }

    pub fn catalog(&self) -> Arc<TaskCatalogService> {
        Arc::clone(&self.catalog_service)
    }

    pub fn completions(&self) -> Arc<CompletionService> {
        Arc::clone(&self.completion_service)
    }

    pub fn aggregator(&self) -> Arc<WeeklyAggregator> {
        Arc::clone(&self.aggregator)
    }

    pub fn goals(&self) -> Arc<GoalCalculator> {
        Arc::clone(&self.goal_calculator)
    }

    pub fn progress(&self) -> Arc<ProgressService> {
        Arc::clone(&self.progress_service)
    }

    pub fn achievements(&self) -> Arc<AchievementService> {
        Arc::clone(&self.achievement_service)
    }
}

/// Serializable error shape handed to the surrounding request layer.
#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<JsonValue>,
}

impl ErrorPayload {
    pub fn new(
        code: impl Into<String>,
        message: impl Into<String>,
        details: Option<JsonValue>,
    ) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details,
        }
    }
}

impl From<AppError> for ErrorPayload {
    fn from(error: AppError) -> Self {
        match error {
            AppError::Validation { message, details } => {
                ErrorPayload::new("VALIDATION_ERROR", message, details)
            }
            AppError::NotFound => ErrorPayload::new("NOT_FOUND", "resource not found", None),
            AppError::Conflict { message } => ErrorPayload::new("CONFLICT", message, None),
            AppError::Consistency { message } => ErrorPayload::new("CONSISTENCY", message, None),
            AppError::TextGeneration {
                code,
                message,
                correlation_id,
            } => ErrorPayload::new(
                code.as_str(),
                message,
                correlation_id.map(|id| json!({ "correlationId": id })),
            ),
            AppError::Database { message } => {
                error!(target: "app::state", %message, "database error surfaced");
                ErrorPayload::new("UNKNOWN", "database error", None)
            }
            AppError::Serialization(err) => {
                error!(target: "app::state", error = %err, "serialization error surfaced");
                ErrorPayload::new("UNKNOWN", "serialization failed", None)
            }
            AppError::Io(err) => {
                error!(target: "app::state", error = %err, "io error surfaced");
                ErrorPayload::new("UNKNOWN", "file system error", None)
            }
            AppError::Other(message) => {
                error!(target: "app::state", %message, "unexpected error surfaced");
                ErrorPayload::new("UNKNOWN", message, None)
            }
        }
    }
}
