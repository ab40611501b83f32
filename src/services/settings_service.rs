use std::sync::RwLock;
use std::time::Duration as StdDuration;

use chrono::Utc;
use tracing::{info, warn};

use crate::db::repositories::settings_repository::{
    SettingChange, SettingKey, SettingsRepository, StoredSettings,
};
use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::settings::AppSettings;
use crate::services::goal_calculator::{GoalPolicy, GOAL_FLOOR};

const ENV_TEXTGEN_API: &str = "JOBQUEST_TEXTGEN_API_KEY";
const ENV_TEXTGEN_BASE_URL: &str = "JOBQUEST_TEXTGEN_BASE_URL";
const ENV_TEXTGEN_MODEL: &str = "JOBQUEST_TEXTGEN_MODEL";

const DEFAULT_TEXTGEN_BASE_URL: &str = "https://api.deepseek.com";
const DEFAULT_TEXTGEN_MODEL: &str = "deepseek-chat";
const DEFAULT_GOAL_CAP: i64 = 500;
const DEFAULT_GOAL_GROWTH_PERCENT: i64 = 10;
const MAX_GOAL_CAP: i64 = 10_000;
const MAX_GOAL_GROWTH_PERCENT: i64 = 50;
const TEXTGEN_TIMEOUT_SECS: u64 = 30;

/// Partial update. `Some(None)` on the api key clears it.
#[derive(Debug, Default, Clone)]
pub struct SettingsUpdateInput {
    pub text_generation_api_key: Option<Option<String>>,
    pub text_generation_base_url: Option<String>,
    pub text_generation_model: Option<String>,
    pub goal_cap: Option<i64>,
    pub goal_growth_percent: Option<i64>,
}

/// Resolved connection details for the text generation provider.
#[derive(Debug, Clone, PartialEq)]
pub struct TextGenerationConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub timeout: StdDuration,
}

pub struct SettingsService {
    db: DbPool,
    cache: RwLock<Option<AppSettings>>,
}

impl SettingsService {
    pub fn new(db: DbPool) -> AppResult<Self> {
        Ok(Self {
            db,
            cache: RwLock::new(None),
        })
    }

    pub fn get(&self) -> AppResult<AppSettings> {
        if let Ok(guard) = self.cache.read() {
            if let Some(settings) = guard.as_ref() {
                return Ok(settings.clone());
            }
        }

        let settings = self.load_settings_from_db()?;
        if let Ok(mut guard) = self.cache.write() {
            *guard = Some(settings.clone());
        }
        Ok(settings)
    }

    pub fn update(&self, input: SettingsUpdateInput) -> AppResult<AppSettings> {
        let base_url = input
            .text_generation_base_url
            .as_deref()
            .map(normalize_base_url)
            .transpose()?;
        let model = input
            .text_generation_model
            .as_deref()
            .map(normalize_model)
            .transpose()?;
        let api_key = match &input.text_generation_api_key {
            None => None,
            Some(None) => Some(None),
            Some(Some(value)) => {
                let trimmed = value.trim();
                if trimmed.is_empty() {
                    return Err(AppError::validation("text generation api key cannot be empty"));
                }
                Some(Some(trimmed.to_string()))
            }
        };
        if let Some(cap) = input.goal_cap {
            ensure_goal_cap(cap)?;
        }
        if let Some(growth) = input.goal_growth_percent {
            ensure_goal_growth(growth)?;
        }

        let mut changes = Vec::new();
        match api_key {
            Some(Some(value)) => {
                changes.push(SettingChange::Set(SettingKey::TextGenerationApiKey, value))
            }
            Some(None) => changes.push(SettingChange::Clear(SettingKey::TextGenerationApiKey)),
            None => {}
        }
        if let Some(value) = base_url {
            changes.push(SettingChange::Set(SettingKey::TextGenerationBaseUrl, value));
        }
        if let Some(value) = model {
            changes.push(SettingChange::Set(SettingKey::TextGenerationModel, value));
        }
        if let Some(value) = input.goal_cap {
            changes.push(SettingChange::Set(SettingKey::GoalCap, value.to_string()));
        }
        if let Some(value) = input.goal_growth_percent {
            changes.push(SettingChange::Set(SettingKey::GoalGrowthPercent, value.to_string()));
        }

        self.db
            .with_transaction(|tx| SettingsRepository::apply(tx, &changes))?;

        let mut current = self.load_settings_from_db()?;
        current.updated_at = Utc::now().to_rfc3339();
        if let Ok(mut guard) = self.cache.write() {
            *guard = Some(current.clone());
        }

        info!(target: "app::settings", "settings updated");
        Ok(current)
    }

    pub fn goal_policy(&self) -> AppResult<GoalPolicy> {
        let settings = self.get()?;
        Ok(GoalPolicy::new(
            settings.goal_cap,
            settings.goal_growth_percent as f64 / 100.0,
        ))
    }

    /// Environment variables win over stored values.
    pub fn text_generation_config(&self) -> AppResult<TextGenerationConfig> {
        let stored = self.db.with_connection(SettingsRepository::load)?;
        let stored_value = |key| stored.get(key).map(str::to_string);

        let api_key = env_value(ENV_TEXTGEN_API)
            .or_else(|| stored_value(SettingKey::TextGenerationApiKey))
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        let base_url = env_value(ENV_TEXTGEN_BASE_URL)
            .or_else(|| stored_value(SettingKey::TextGenerationBaseUrl))
            .unwrap_or_else(|| DEFAULT_TEXTGEN_BASE_URL.to_string());
        let model = env_value(ENV_TEXTGEN_MODEL)
            .or_else(|| stored_value(SettingKey::TextGenerationModel))
            .unwrap_or_else(|| DEFAULT_TEXTGEN_MODEL.to_string());

        Ok(TextGenerationConfig {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            timeout: StdDuration::from_secs(TEXTGEN_TIMEOUT_SECS),
        })
    }

    fn load_settings_from_db(&self) -> AppResult<AppSettings> {
        let stored = self.db.with_connection(SettingsRepository::load)?;

        let goal_cap = stored_or_default(&stored, SettingKey::GoalCap, DEFAULT_GOAL_CAP, |value| {
            ensure_goal_cap(value).is_ok()
        });
        let goal_growth_percent = stored_or_default(
            &stored,
            SettingKey::GoalGrowthPercent,
            DEFAULT_GOAL_GROWTH_PERCENT,
            |value| ensure_goal_growth(value).is_ok(),
        );

        Ok(AppSettings {
            text_generation_base_url: stored
                .get(SettingKey::TextGenerationBaseUrl)
                .unwrap_or(DEFAULT_TEXTGEN_BASE_URL)
                .to_string(),
            text_generation_model: stored
                .get(SettingKey::TextGenerationModel)
                .unwrap_or(DEFAULT_TEXTGEN_MODEL)
                .to_string(),
            text_generation_api_key: stored
                .get(SettingKey::TextGenerationApiKey)
                .map(mask_api_key),
            goal_cap,
            goal_growth_percent,
            updated_at: stored
                .updated_at
                .clone()
                .unwrap_or_else(|| Utc::now().to_rfc3339()),
        })
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn stored_or_default(
    stored: &StoredSettings,
    key: SettingKey,
    default: i64,
    accept: impl Fn(i64) -> bool,
) -> i64 {
    let Some(raw) = stored.get(key) else {
        return default;
    };
    match raw.trim().parse::<i64>() {
        Ok(value) if accept(value) => value,
        _ => {
            warn!(
                target: "app::settings",
                key = key.as_str(),
                value = %raw,
                "stored setting invalid, falling back to default"
            );
            default
        }
    }
}

fn normalize_base_url(value: &str) -> AppResult<String> {
    let trimmed = value.trim().trim_end_matches('/');
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(AppError::validation(
            "text generation base url must start with http:// or https://",
        ));
    }
    Ok(trimmed.to_string())
}

fn normalize_model(value: &str) -> AppResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::validation("text generation model cannot be empty"));
    }
    Ok(trimmed.to_string())
}

fn ensure_goal_cap(value: i64) -> AppResult<()> {
    if !(GOAL_FLOOR..=MAX_GOAL_CAP).contains(&value) {
        return Err(AppError::validation(format!(
            "goal cap must be between {GOAL_FLOOR} and {MAX_GOAL_CAP}"
        )));
    }
    Ok(())
}

fn ensure_goal_growth(value: i64) -> AppResult<()> {
    if !(0..=MAX_GOAL_GROWTH_PERCENT).contains(&value) {
        return Err(AppError::validation(format!(
            "goal growth must be between 0 and {MAX_GOAL_GROWTH_PERCENT} percent"
        )));
    }
    Ok(())
}

fn mask_api_key(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let visible: String = chars[chars.len() - 4..].iter().collect();
    let masked_prefix = "*".repeat(chars.len() - 4);
    format!("{}{}", masked_prefix, visible)
}
