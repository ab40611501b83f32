use std::sync::{Arc, RwLock};
use std::time::{Duration as StdDuration, Instant};

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{json, Value as JsonValue};
use tokio::time::sleep;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult, TextGenErrorCode};
use crate::services::prompt_templates::TextPrompt;
use crate::services::settings_service::{SettingsService, TextGenerationConfig};

/// Produces narrative text for a structured prompt. Callers own the fallback
/// when generation fails.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate_text(&self, prompt: &TextPrompt) -> AppResult<String>;
}

const DEFAULT_BACKOFF_SECS: [u64; 4] = [0, 1, 2, 4];

/// Client for an OpenAI-compatible `/v1/chat/completions` endpoint.
pub struct ChatCompletionGenerator {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    model: String,
    backoff: Vec<StdDuration>,
}

impl ChatCompletionGenerator {
    pub fn try_new(config: &TextGenerationConfig) -> AppResult<Self> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            AppError::text_generation(
                TextGenErrorCode::MissingApiKey,
                "text generation api key is not configured",
            )
        })?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .pool_max_idle_per_host(2)
            .pool_idle_timeout(Some(StdDuration::from_secs(90)))
            .build()
            .map_err(|err| AppError::other(format!("failed to build http client: {err}")))?;

        let base_url = config.base_url.trim_end_matches('/');

        Ok(Self {
            client,
            api_key,
            endpoint: format!("{base_url}/v1/chat/completions"),
            model: config.model.clone(),
            backoff: DEFAULT_BACKOFF_SECS
                .iter()
                .map(|secs| StdDuration::from_secs(*secs))
                .collect(),
        })
    }

    /// Replaces the retry delays. The first entry is the delay before the
    /// first attempt.
    pub fn with_backoff(mut self, backoff: Vec<StdDuration>) -> Self {
        if !backoff.is_empty() {
            self.backoff = backoff;
        }
        self
    }

    fn build_request_body(&self, prompt: &TextPrompt) -> JsonValue {
        let user_content =
            serde_json::to_string(&prompt.payload).unwrap_or_else(|_| "{}".to_string());
        json!({
            "model": self.model,
            "temperature": prompt.temperature,
            "max_tokens": prompt.max_tokens,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": prompt.system_prompt },
                { "role": "user", "content": user_content }
            ]
        })
    }

    fn map_http_error(status: StatusCode, correlation_id: &str) -> (AppError, bool) {
        let (code, message, retryable) = match status {
            StatusCode::UNAUTHORIZED => (
                TextGenErrorCode::MissingApiKey,
                "text generation api key is invalid or unauthorized".to_string(),
                false,
            ),
            StatusCode::FORBIDDEN => (
                TextGenErrorCode::Forbidden,
                "text generation api access is forbidden".to_string(),
                false,
            ),
            StatusCode::TOO_MANY_REQUESTS => (
                TextGenErrorCode::RateLimited,
                "text generation provider is rate limiting requests".to_string(),
                true,
            ),
            status if status.is_server_error() => (
                TextGenErrorCode::ProviderUnavailable,
                format!(
                    "text generation provider unavailable (status {})",
                    status.as_u16()
                ),
                true,
            ),
            StatusCode::BAD_REQUEST => (
                TextGenErrorCode::InvalidRequest,
                "text generation request was rejected as malformed".to_string(),
                false,
            ),
            StatusCode::NOT_FOUND => (
                TextGenErrorCode::InvalidRequest,
                "text generation endpoint not found".to_string(),
                false,
            ),
            status => (
                TextGenErrorCode::Unknown,
                format!(
                    "text generation provider returned status {}",
                    status.as_u16()
                ),
                false,
            ),
        };

        (
            AppError::text_generation_with_correlation(code, message, Some(correlation_id)),
            retryable,
        )
    }

    fn error_from_reqwest(err: reqwest::Error, correlation_id: &str) -> (AppError, bool) {
        if err.is_timeout() {
            (
                AppError::text_generation_with_correlation(
                    TextGenErrorCode::HttpTimeout,
                    "text generation request timed out",
                    Some(correlation_id),
                ),
                true,
            )
        } else if err.is_connect() {
            (
                AppError::text_generation_with_correlation(
                    TextGenErrorCode::ProviderUnavailable,
                    "could not connect to text generation provider",
                    Some(correlation_id),
                ),
                true,
            )
        } else if let Some(status) = err.status() {
            Self::map_http_error(status, correlation_id)
        } else {
            (
                AppError::text_generation_with_correlation(
                    TextGenErrorCode::Unknown,
                    format!("text generation request failed: {err}"),
                    Some(correlation_id),
                ),
                false,
            )
        }
    }

    async fn read_content(resp: reqwest::Response, correlation_id: &str) -> AppResult<String> {
        let body: JsonValue = resp.json().await.map_err(|err| {
            AppError::text_generation_with_correlation(
                TextGenErrorCode::InvalidResponse,
                format!("failed to decode text generation response: {err}"),
                Some(correlation_id),
            )
        })?;

        let content = body
            .pointer("/choices/0/message/content")
            .and_then(|value| value.as_str())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| {
                AppError::text_generation_with_correlation(
                    TextGenErrorCode::InvalidResponse,
                    "text generation response is missing message content",
                    Some(correlation_id),
                )
            })?;

        Ok(content.to_string())
    }
}

#[async_trait]
impl TextGenerator for ChatCompletionGenerator {
    async fn generate_text(&self, prompt: &TextPrompt) -> AppResult<String> {
        let correlation_id = Uuid::new_v4().to_string();
        let request_body = self.build_request_body(prompt);
        let mut last_error: Option<AppError> = None;

        for (attempt, delay) in self.backoff.iter().enumerate() {
            if !delay.is_zero() {
                sleep(*delay).await;
            }

            debug!(
                target: "app::textgen",
                operation = prompt.operation,
                attempt = attempt + 1,
                correlation_id = %correlation_id,
                "requesting text generation"
            );

            let start = Instant::now();
            let response = self
                .client
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .json(&request_body)
                .send()
                .await;

            let (error, retryable) = match response {
                Ok(resp) if resp.status().is_success() => {
                    let content = Self::read_content(resp, &correlation_id).await?;
                    debug!(
                        target: "app::textgen",
                        operation = prompt.operation,
                        correlation_id = %correlation_id,
                        latency_ms = start.elapsed().as_millis() as u64,
                        response_len = content.len(),
                        "text generation completed"
                    );
                    return Ok(content);
                }
                Ok(resp) => {
                    let status = resp.status();
                    warn!(
                        target: "app::textgen",
                        correlation_id = %correlation_id,
                        status = status.as_u16(),
                        "text generation returned non-success status"
                    );
                    Self::map_http_error(status, &correlation_id)
                }
                Err(err) => {
                    warn!(
                        target: "app::textgen",
                        correlation_id = %correlation_id,
                        "text generation request failed"
                    );
                    Self::error_from_reqwest(err, &correlation_id)
                }
            };

            if !retryable || attempt + 1 == self.backoff.len() {
                return Err(error);
            }
            last_error = Some(error);
        }

        Err(last_error.unwrap_or_else(|| {
            AppError::text_generation_with_correlation(
                TextGenErrorCode::ProviderUnavailable,
                "text generation request failed",
                Some(correlation_id.as_str()),
            )
        }))
    }
}

/// Generator that follows the stored settings, rebuilding its client only
/// when the effective configuration changes.
pub struct SettingsTextGenerator {
    settings: Arc<SettingsService>,
    current: RwLock<Option<(TextGenerationConfig, Arc<ChatCompletionGenerator>)>>,
}

impl SettingsTextGenerator {
    pub fn new(settings: Arc<SettingsService>) -> Self {
        Self {
            settings,
            current: RwLock::new(None),
        }
    }

    fn current_generator(&self) -> AppResult<Arc<ChatCompletionGenerator>> {
        let config = self.settings.text_generation_config()?;

        if let Ok(guard) = self.current.read() {
            if let Some((cached, generator)) = guard.as_ref() {
                if *cached == config {
                    return Ok(generator.clone());
                }
            }
        }

        let generator = Arc::new(ChatCompletionGenerator::try_new(&config)?);
        if let Ok(mut guard) = self.current.write() {
            *guard = Some((config, generator.clone()));
        }
        debug!(target: "app::textgen", "text generation client rebuilt");
        Ok(generator)
    }
}

#[async_trait]
impl TextGenerator for SettingsTextGenerator {
    async fn generate_text(&self, prompt: &TextPrompt) -> AppResult<String> {
        let generator = self.current_generator()?;
        generator.generate_text(prompt).await
    }
}

/// Strips an optional markdown code fence and parses the remaining JSON.
pub fn parse_json_content(content: &str) -> AppResult<JsonValue> {
    let trimmed = content.trim();
    let cleaned = if trimmed.starts_with("```") {
        trimmed
            .trim_start_matches("```json")
            .trim_start_matches("```JSON")
            .trim_start_matches("```")
            .trim_end_matches("```")
            .trim()
    } else {
        trimmed
    };

    serde_json::from_str(cleaned).map_err(|err| {
        AppError::text_generation(
            TextGenErrorCode::InvalidResponse,
            format!("generated content is not JSON: {err}"),
        )
    })
}

pub mod testing {
    use super::*;

    /// Error mapping with a fixed correlation id.
    pub fn map_http_error(status: StatusCode) -> (AppError, bool) {
        ChatCompletionGenerator::map_http_error(status, "test-correlation-id")
    }

    /// A generator against `base_url` that retries without sleeping.
    pub fn generator_for(base_url: &str, attempts: usize) -> AppResult<ChatCompletionGenerator> {
        let config = TextGenerationConfig {
            api_key: Some("test-key".to_string()),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: "test-model".to_string(),
            timeout: StdDuration::from_secs(2),
        };
        Ok(ChatCompletionGenerator::try_new(&config)?
            .with_backoff(vec![StdDuration::ZERO; attempts.max(1)]))
    }
}
