use std::collections::HashMap;

use rusqlite::{named_params, Connection};
use tracing::debug;

use crate::error::AppResult;

/// Keys of the `app_settings` table this crate understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingKey {
    TextGenerationApiKey,
    TextGenerationBaseUrl,
    TextGenerationModel,
    GoalCap,
    GoalGrowthPercent,
}

impl SettingKey {
    pub const ALL: [SettingKey; 5] = [
        SettingKey::TextGenerationApiKey,
        SettingKey::TextGenerationBaseUrl,
        SettingKey::TextGenerationModel,
        SettingKey::GoalCap,
        SettingKey::GoalGrowthPercent,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SettingKey::TextGenerationApiKey => "text_generation_api_key",
            SettingKey::TextGenerationBaseUrl => "text_generation_base_url",
            SettingKey::TextGenerationModel => "text_generation_model",
            SettingKey::GoalCap => "goal_cap",
            SettingKey::GoalGrowthPercent => "goal_growth_percent",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|key| key.as_str() == value)
    }
}

/// One pending write against `app_settings`.
#[derive(Debug, Clone, PartialEq)]
pub enum SettingChange {
    Set(SettingKey, String),
    Clear(SettingKey),
}

/// Snapshot of every known stored setting.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoredSettings {
    values: HashMap<SettingKey, String>,
    pub updated_at: Option<String>,
}

impl StoredSettings {
    pub fn get(&self, key: SettingKey) -> Option<&str> {
        self.values.get(&key).map(String::as_str)
    }
}

pub struct SettingsRepository;

impl SettingsRepository {
    /// Reads the whole table. Rows with keys this crate does not know are
    /// skipped.
    pub fn load(conn: &Connection) -> AppResult<StoredSettings> {
        let mut stmt = conn.prepare("SELECT key, value, updated_at FROM app_settings")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>("key")?,
                    row.get::<_, String>("value")?,
                    row.get::<_, String>("updated_at")?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stored = StoredSettings::default();
        for (key, value, updated_at) in rows {
            let Some(parsed) = SettingKey::parse(&key) else {
                debug!(target: "app::settings", key = %key, "ignoring unknown setting");
                continue;
            };
            stored.values.insert(parsed, value);
            if stored.updated_at.as_deref() < Some(updated_at.as_str()) {
                stored.updated_at = Some(updated_at);
            }
        }

        Ok(stored)
    }

    /// Applies `changes` in order and returns the number of rows touched.
    pub fn apply(conn: &Connection, changes: &[SettingChange]) -> AppResult<usize> {
        let mut touched = 0;
        for change in changes {
            touched += match change {
                SettingChange::Set(key, value) => conn.execute(
                    r#"
                        INSERT INTO app_settings (key, value)
                        VALUES (:key, :value)
                        ON CONFLICT(key) DO UPDATE SET
                            value = excluded.value,
                            updated_at = CURRENT_TIMESTAMP
                    "#,
                    named_params! {":key": key.as_str(), ":value": value},
                )?,
                SettingChange::Clear(key) => conn.execute(
                    "DELETE FROM app_settings WHERE key = :key",
                    named_params! {":key": key.as_str()},
                )?,
            };
        }
        Ok(touched)
    }
}
