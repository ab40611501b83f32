use serde::Serialize;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppSettings {
    pub text_generation_base_url: String,
    pub text_generation_model: String,
    /// Masked on read; the raw key never leaves the settings service.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_generation_api_key: Option<String>,
    pub goal_cap: i64,
    pub goal_growth_percent: i64,
    pub updated_at: String,
}
