use std::fmt;

use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{error, warn};

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextGenErrorCode {
    MissingApiKey,
    Forbidden,
    HttpTimeout,
    RateLimited,
    InvalidResponse,
    InvalidRequest,
    ProviderUnavailable,
    Unknown,
}

impl TextGenErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            TextGenErrorCode::MissingApiKey => "MISSING_API_KEY",
            TextGenErrorCode::Forbidden => "FORBIDDEN",
            TextGenErrorCode::HttpTimeout => "HTTP_TIMEOUT",
            TextGenErrorCode::RateLimited => "RATE_LIMITED",
            TextGenErrorCode::InvalidResponse => "INVALID_RESPONSE",
            TextGenErrorCode::InvalidRequest => "INVALID_REQUEST",
            TextGenErrorCode::ProviderUnavailable => "PROVIDER_UNAVAILABLE",
            TextGenErrorCode::Unknown => "UNKNOWN_TEXTGEN_ERROR",
        }
    }
}

impl fmt::Display for TextGenErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("database error: {message}")]
    Database { message: String },

    #[error("record not found")]
    NotFound,

    #[error("record conflict: {message}")]
    Conflict { message: String },

    #[error("validation failed: {message}")]
    Validation {
        message: String,
        details: Option<JsonValue>,
    },

    /// Per-task weekly stats disagree with the persisted completion rows.
    #[error("consistency check failed: {message}")]
    Consistency { message: String },

    #[error("{message}")]
    TextGeneration {
        code: TextGenErrorCode,
        message: String,
        correlation_id: Option<String>,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        let message = message.into();
        warn!(target: "app::validation", %message, "validation error");
        AppError::Validation {
            message,
            details: None,
        }
    }

    pub fn validation_with_details(message: impl Into<String>, details: JsonValue) -> Self {
        let message = message.into();
        warn!(target: "app::validation", %message, details = %details, "validation error with details");
        AppError::Validation {
            message,
            details: Some(details),
        }
    }

    pub fn consistency(message: impl Into<String>) -> Self {
        let message = message.into();
        warn!(target: "app::aggregator", %message, "stat consistency violation");
        AppError::Consistency { message }
    }

    pub fn text_generation(code: TextGenErrorCode, message: impl Into<String>) -> Self {
        Self::text_generation_with_correlation(code, message, None)
    }

    pub fn text_generation_with_correlation(
        code: TextGenErrorCode,
        message: impl Into<String>,
        correlation_id: Option<&str>,
    ) -> Self {
        let message = message.into();
        let correlation = correlation_id.map(|value| value.to_string());
        match &correlation {
            Some(id) => {
                warn!(target: "app::textgen::error", code = %code, correlation_id = %id, %message);
            }
            None => {
                warn!(target: "app::textgen::error", code = %code, %message);
            }
        }

        AppError::TextGeneration {
            code,
            message,
            correlation_id: correlation,
        }
    }

    pub fn text_generation_code(&self) -> Option<TextGenErrorCode> {
        match self {
            AppError::TextGeneration { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn correlation_id(&self) -> Option<&str> {
        match self {
            AppError::TextGeneration { correlation_id, .. } => correlation_id.as_deref(),
            _ => None,
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        let message = message.into();
        warn!(target: "app::conflict", %message, "conflict error");
        AppError::Conflict { message }
    }

    pub fn not_found() -> Self {
        warn!(target: "app::database", "resource not found");
        AppError::NotFound
    }

    pub fn database(message: impl Into<String>) -> Self {
        let message = message.into();
        error!(target: "app::database", %message, "database error");
        AppError::Database { message }
    }

    pub fn other(message: impl Into<String>) -> Self {
        let message = message.into();
        error!(target: "app::other", %message, "other error");
        AppError::Other(message)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::NotFound)
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(error: rusqlite::Error) -> Self {
        use rusqlite::Error::{QueryReturnedNoRows, SqliteFailure};
        use rusqlite::ErrorCode;

        match &error {
            QueryReturnedNoRows => AppError::not_found(),
            SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation => {
                AppError::conflict("unique or check constraint violated")
            }
            _ => {
                error!(target: "app::database", error = ?error, "sqlite error");
                AppError::database(error.to_string())
            }
        }
    }
}
