//! OpenAI-compatible chat completions client (OpenRouter by default).

use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::Deserialize;
use tracing::debug;

use prodscout_shared::{AppConfig, OpenRouterConfig, ProdScoutError, Result, resolve_api_key};

use crate::ContentModel;

/// Sampling temperature for extraction; low so repeated runs agree.
const TEMPERATURE: f64 = 0.1;

/// Chat completions client speaking the OpenAI wire format.
#[derive(Debug, Clone)]
pub struct OpenRouterClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
}

impl OpenRouterClient {
    /// Build a client for `config` authenticating with `api_key`.
    pub fn new(config: &OpenRouterConfig, api_key: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let bearer = HeaderValue::from_str(&format!("Bearer {api_key}"))
            .map_err(|e| ProdScoutError::config(format!("invalid API key: {e}")))?;
        headers.insert(AUTHORIZATION, bearer);

        let http = reqwest::Client::builder()
            .user_agent(prodscout_shared::USER_AGENT)
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| ProdScoutError::Service(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.default_model.clone(),
        })
    }

    /// Build a client from application config, reading the key from the
    /// configured environment variable.
    pub fn from_app_config(config: &AppConfig) -> Result<Self> {
        let key = resolve_api_key(config)?;
        Self::new(&config.openrouter, &key)
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ContentModel for OpenRouterClient {
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "temperature": TEMPERATURE,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user }
            ]
        });

        let response = self
            .http
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProdScoutError::Service(format!("chat completion request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ProdScoutError::Service(format!(
                "chat completion returned HTTP {status}: {}",
                detail.chars().take(200).collect::<String>()
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProdScoutError::Service(format!("malformed chat completion: {e}")))?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ProdScoutError::Service("chat completion had no content".into()))?;

        debug!(model = %self.model, chars = text.len(), "chat completion received");
        Ok(text)
    }
}
