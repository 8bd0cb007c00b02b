//! Provider-neutral LLM invocation.
//!
//! Every node call goes through [`LlmClient::complete`] with a system prompt,
//! a user turn, a model id, a token ceiling, and a JSON-mode flag. The two
//! backends translate that into their own wire shapes; adding a backend means
//! implementing the trait and registering it on [`LlmRouter`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use revvy_core::config::LlmConfig;
use revvy_core::domain::Provider;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const GEMINI_TEMPERATURE: f64 = 0.3;

#[derive(Clone, Debug, PartialEq)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub model: String,
    pub max_tokens: u32,
    pub json_mode: bool,
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("llm request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("llm provider returned status {status}: {detail}")]
    Api { status: u16, detail: String },
    #[error("llm provider returned an empty response")]
    EmptyResponse,
    #[error("no api key configured for provider `{0}`")]
    ProviderNotConfigured(Provider),
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError>;
}

/// Anthropic Messages API client.
pub struct AnthropicClient {
    client: reqwest::Client,
    base_url: String,
    api_key: SecretString,
}

impl AnthropicClient {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, api_key: SecretString) -> Self {
        Self { client, base_url: base_url.into(), api_key }
    }
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContentBlock>,
}

#[derive(Debug, Deserialize)]
struct AnthropicContentBlock {
    #[serde(default)]
    text: Option<String>,
}

#[async_trait]
impl LlmClient for AnthropicClient {
    // `json_mode` has no wire-level equivalent here; callers that need JSON
    // ask for it in the prompt.
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError> {
        let url = format!("{}/v1/messages", self.base_url.trim_end_matches('/'));
        let body = json!({
            "model": request.model,
            "max_tokens": request.max_tokens,
            "system": request.system,
            "messages": [{ "role": "user", "content": request.user }],
        });

        let response = self
            .client
            .post(&url)
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(LlmError::Api { status: status.as_u16(), detail });
        }

        let payload: AnthropicResponse = response.json().await?;
        payload
            .content
            .into_iter()
            .find_map(|block| block.text.filter(|text| !text.is_empty()))
            .ok_or(LlmError::EmptyResponse)
    }
}

/// Google Gemini `generateContent` client.
pub struct GeminiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: SecretString,
}

impl GeminiClient {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, api_key: SecretString) -> Self {
        Self { client, base_url: base_url.into(), api_key }
    }
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: Option<String>,
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            request.model
        );

        let mut generation_config = json!({
            "maxOutputTokens": request.max_tokens,
            "temperature": GEMINI_TEMPERATURE,
        });
        if request.json_mode {
            generation_config["responseMimeType"] = json!("application/json");
        }
        let body = json!({
            "system_instruction": { "parts": [{ "text": request.system }] },
            "contents": [{ "role": "user", "parts": [{ "text": request.user }] }],
            "generationConfig": generation_config,
        });

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(LlmError::Api { status: status.as_u16(), detail });
        }

        let payload: GeminiResponse = response.json().await?;
        let text: String = payload
            .candidates
            .into_iter()
            .filter_map(|candidate| candidate.content)
            .flat_map(|content| content.parts)
            .filter_map(|part| part.text)
            .collect();
        if text.is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        Ok(text)
    }
}

/// Holds one client per configured provider and hands out the right one for a
/// request. A provider without credentials is absent, so a request pinned to
/// it fails before any node runs.
#[derive(Clone)]
pub struct LlmRouter {
    anthropic: Option<Arc<dyn LlmClient>>,
    gemini: Option<Arc<dyn LlmClient>>,
}

impl LlmRouter {
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let anthropic = config.anthropic_api_key.clone().map(|key| {
            Arc::new(AnthropicClient::new(http.clone(), config.anthropic_base_url.clone(), key))
                as Arc<dyn LlmClient>
        });
        let gemini = config.gemini_api_key.clone().map(|key| {
            Arc::new(GeminiClient::new(http.clone(), config.gemini_base_url.clone(), key))
                as Arc<dyn LlmClient>
        });

        Ok(Self { anthropic, gemini })
    }

    /// Router wired to explicit clients. Tests use this to script responses.
    pub fn with_clients(
        anthropic: Option<Arc<dyn LlmClient>>,
        gemini: Option<Arc<dyn LlmClient>>,
    ) -> Self {
        Self { anthropic, gemini }
    }

    pub fn client_for(&self, provider: Provider) -> Result<Arc<dyn LlmClient>, LlmError> {
        let client = match provider {
            Provider::Anthropic => self.anthropic.as_ref(),
            Provider::Gemini => self.gemini.as_ref(),
        };
        client.cloned().ok_or(LlmError::ProviderNotConfigured(provider))
    }

    pub fn ensure_configured(&self, provider: Provider) -> Result<(), LlmError> {
        self.client_for(provider).map(|_| ())
    }
}
