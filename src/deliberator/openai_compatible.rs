use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, header};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{
    deliberator::{
        backend::{ReasoningBackend, ReasoningQuery, Resolution},
        error::{
            BackendError, BackendErrorKind, internal_error, protocol_violation, timeout,
            unavailable,
        },
    },
    types::Confidence,
};

const BACKEND_NAME: &str = "openai_compatible";

fn default_labels() -> Vec<String> {
    ["urgent", "billing", "spam", "other"]
        .into_iter()
        .map(str::to_string)
        .collect()
}

fn default_label_confidence() -> Confidence {
    Confidence::constant(0.90)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiCompatibleConfig {
    pub endpoint: String,
    pub model: String,
    /// Name of the environment variable holding the bearer token.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_labels")]
    pub labels: Vec<String>,
    /// Chat completions carry no score, so every accepted label gets this confidence.
    #[serde(default = "default_label_confidence")]
    pub label_confidence: Confidence,
}

pub struct OpenAiCompatibleBackend {
    client: Client,
    config: OpenAiCompatibleConfig,
}

impl OpenAiCompatibleBackend {
    pub fn new(config: OpenAiCompatibleConfig) -> Result<Self, BackendError> {
        if config.endpoint.trim().is_empty() {
            return Err(
                BackendError::new(BackendErrorKind::InvalidRequest, "endpoint cannot be empty")
                    .with_backend(BACKEND_NAME),
            );
        }
        if config.labels.is_empty() {
            return Err(
                BackendError::new(BackendErrorKind::InvalidRequest, "labels cannot be empty")
                    .with_backend(BACKEND_NAME),
            );
        }

        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| internal_error(format!("failed to build http client: {err}")))?;
        Ok(Self { client, config })
    }

    fn prompt(&self, query: &ReasoningQuery) -> String {
        let mut prompt = format!(
            "Classify this message into one category ({}). Respond with just the category name.",
            self.config.labels.join(", ")
        );
        if !query.context.is_empty() {
            prompt.push_str("\n\nContext:");
            for (key, value) in &query.context {
                prompt.push_str(&format!("\n{key}: {value}"));
            }
        }
        prompt.push_str(&format!("\n\nMessage: {}", query.content));
        prompt
    }

    fn parse_label(&self, body: &Value) -> Result<String, BackendError> {
        let text = body
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                protocol_violation("response is missing choices[0].message.content")
                    .with_backend(BACKEND_NAME)
            })?;

        let answered = text
            .trim()
            .trim_matches(|c: char| !c.is_alphanumeric())
            .to_lowercase();
        // The configured spelling is what gets cached and learned.
        self.config
            .labels
            .iter()
            .find(|known| known.to_lowercase() == answered)
            .cloned()
            .ok_or_else(|| {
                protocol_violation(format!("backend answered with unknown label '{answered}'"))
                    .with_backend(BACKEND_NAME)
            })
    }
}

#[async_trait]
impl ReasoningBackend for OpenAiCompatibleBackend {
    fn name(&self) -> &str {
        BACKEND_NAME
    }

    async fn resolve(&self, query: ReasoningQuery) -> Result<Resolution, BackendError> {
        let url = format!(
            "{}/chat/completions",
            self.config.endpoint.trim_end_matches('/')
        );
        let body = json!({
            "model": self.config.model,
            "temperature": 0,
            "messages": [{"role": "user", "content": self.prompt(&query)}],
        });

        let mut request = self
            .client
            .post(url)
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-request-id", query.request_id.as_str())
            .json(&body);
        if let Some(env_name) = &self.config.api_key_env {
            let token = std::env::var(env_name).map_err(|_| {
                BackendError::new(
                    BackendErrorKind::Authentication,
                    format!("api key environment variable '{env_name}' is not set"),
                )
                .with_retryable(false)
                .with_backend(BACKEND_NAME)
            })?;
            request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }

        let response = request.send().await.map_err(|err| {
            let mapped = if err.is_timeout() {
                timeout(format!("openai-compatible request timed out: {err}"))
            } else {
                unavailable(format!("openai-compatible request failed: {err}"))
            };
            mapped.with_backend(BACKEND_NAME)
        })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(map_http_error(status, &text));
        }

        let payload: Value = response.json().await.map_err(|err| {
            protocol_violation(format!("failed to decode openai-compatible response: {err}"))
                .with_backend(BACKEND_NAME)
        })?;
        let category = self.parse_label(&payload)?;

        Ok(Resolution {
            category,
            confidence: self.config.label_confidence.value(),
            rationale: None,
            model: Some(self.config.model.clone()),
        })
    }
}

pub fn map_http_error(status: u16, body: &str) -> BackendError {
    let excerpt = body.chars().take(240).collect::<String>();

    let mut err = match status {
        401 => BackendError::new(BackendErrorKind::Authentication, "authentication failed")
            .with_retryable(false),
        403 => BackendError::new(BackendErrorKind::Authorization, "authorization failed")
            .with_retryable(false),
        408 | 429 => BackendError::new(
            BackendErrorKind::RateLimited,
            format!("backend returned status {status}"),
        )
        .with_retryable(true),
        400..=499 => BackendError::new(
            BackendErrorKind::InvalidRequest,
            format!("backend returned status {status}"),
        )
        .with_retryable(false),
        _ => unavailable(format!("backend returned status {status}")).with_retryable(true),
    };

    err = err.with_backend(BACKEND_NAME).with_http_status(status);
    if !excerpt.is_empty() {
        err.message = format!("{}: {}", err.message, excerpt);
    }
    err
}
