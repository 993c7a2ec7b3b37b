//! HTTP Backend Adapter
//!
//! A generic adapter for OpenAI-compatible chat completion APIs. Covers any
//! provider exposing a `/chat/completions` endpoint with bearer auth.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use super::{Backend, QueryOptions};
use crate::error::BackendError;

/// Backend adapter for OpenAI-compatible chat completion endpoints
pub struct HttpBackend {
    /// Provider name as referenced in configuration
    name: String,

    /// Base URL, e.g. "https://api.openai.com/v1"
    base_url: String,

    /// Bearer token, usually sourced from an env var
    api_key: Option<String>,

    /// Served models; empty means accept any model identifier
    models: Vec<String>,

    /// Extra headers sent with every request
    headers: HashMap<String, String>,

    client: Client,
}

impl HttpBackend {
    /// Create an adapter with an explicit API key
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(10)
            .build()
            .unwrap_or_default();

        Self {
            name: name.into(),
            base_url: base_url.into(),
            api_key,
            models: Vec::new(),
            headers: HashMap::new(),
            client,
        }
    }

    /// Create an adapter reading the API key from an environment variable
    pub fn from_env(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key_env: &str,
    ) -> Self {
        let api_key = std::env::var(api_key_env).ok();
        Self::new(name, base_url, api_key)
    }

    /// Restrict the adapter to a fixed model list
    pub fn with_models(mut self, models: Vec<String>) -> Self {
        self.models = models;
        self
    }

    /// Add an extra header sent with every request
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn build_headers(&self) -> Result<HeaderMap, BackendError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(key) = &self.api_key {
            let value = HeaderValue::from_str(&format!("Bearer {}", key))
                .map_err(|e| BackendError::Api(format!("Invalid API key format: {}", e)))?;
            headers.insert(AUTHORIZATION, value);
        }

        for (key, value) in &self.headers {
            if let (Ok(name), Ok(val)) = (
                HeaderName::try_from(key.as_str()),
                HeaderValue::from_str(value),
            ) {
                headers.insert(name, val);
            }
        }

        Ok(headers)
    }

    fn build_body(&self, model: &str, prompt: &str, opts: &QueryOptions) -> ChatRequest {
        let mut messages = Vec::new();
        if let Some(system) = &opts.system {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: system.clone(),
            });
        }
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: prompt.to_string(),
        });

        ChatRequest {
            model: model.to_string(),
            messages,
            temperature: opts.temperature,
            max_tokens: opts.max_tokens,
            extra: opts.extra.clone(),
        }
    }
}

#[async_trait]
impl Backend for HttpBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_available(&self) -> bool {
        !self.base_url.is_empty() && self.api_key.is_some()
    }

    fn validate_model(&self, model: &str) -> bool {
        self.models.is_empty() || self.models.iter().any(|m| m == model)
    }

    async fn query_model(
        &self,
        model: &str,
        prompt: &str,
        opts: &QueryOptions,
    ) -> std::result::Result<String, BackendError> {
        let headers = self.build_headers()?;
        let body = self.build_body(model, prompt, opts);

        debug!(backend = %self.name, %model, "sending chat completion request");

        let response = self
            .client
            .post(self.completions_url())
            .headers(headers)
            .json(&body)
            .send()
            .await
            .map_err(|e| BackendError::Api(format!("Request failed: {}", e)))?;

        let status = response.status();
        let retry_after = parse_retry_after(response.headers());
        let response_body = response
            .text()
            .await
            .map_err(|e| BackendError::Api(format!("Failed to read response body: {}", e)))?;

        if is_rate_limit_response(status.as_u16(), &response_body) {
            return Err(BackendError::RateLimited { retry_after });
        }

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(BackendError::Api(format!(
                "Authentication failed: {}",
                response_body
            )));
        }

        if !status.is_success() {
            return Err(BackendError::Api(format!(
                "Request failed with status {}: {}",
                status, response_body
            )));
        }

        let parsed: ChatResponse = serde_json::from_str(&response_body).map_err(|e| {
            BackendError::Api(format!(
                "Failed to parse response: {}. Body: {}",
                e,
                &response_body[..response_body.len().min(500)]
            ))
        })?;

        Ok(parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }
}

/// Detect a rate-limit rejection. Some providers return 400/403 with a
/// rate-limit message instead of a clean 429.
fn is_rate_limit_response(status: u16, body: &str) -> bool {
    if status == 429 {
        return true;
    }

    let lower_body = body.to_lowercase();
    lower_body.contains("rate limit")
        || lower_body.contains("rate_limit")
        || lower_body.contains("too many requests")
        || lower_body.contains("quota exceeded")
}

/// Parse a `retry-after` header given in whole seconds
fn parse_retry_after(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,

    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,

    #[serde(flatten)]
    extra: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}
