//! OpenAI-compatible HTTP transport

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::env;
use std::time::Duration;

use super::{
    ChatRequest, ChatResponse, ChatTransport, CompletionBatch, CompletionResponse,
    CompletionTransport, TokenUsage,
};
use crate::config::LlmSettings;
use crate::error::{LlmError, LlmResult};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// HTTP transport for the `/completions` and `/chat/completions` endpoints
#[derive(Clone)]
pub struct OpenAiTransport {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenAiTransport {
    /// Create a transport from settings, reading the API key from the environment
    pub fn new(settings: &LlmSettings) -> LlmResult<Self> {
        let env_var = settings.api_key_env.as_deref().unwrap_or("OPENAI_API_KEY");
        let api_key = env::var(env_var).map_err(|_| {
            LlmError::Authentication(format!("Environment variable {} not set", env_var))
        })?;

        let base_url = settings
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        Self::with_api_key(base_url, api_key, Duration::from_secs(settings.timeout_seconds))
    }

    /// Create a transport with an explicit key and endpoint
    pub fn with_api_key(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> LlmResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post<T: serde::Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> LlmResult<reqwest::Response> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let error_text = response.text().await.unwrap_or_default();
        Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => LlmError::Authentication(error_text),
            StatusCode::TOO_MANY_REQUESTS => LlmError::RateLimited(error_text),
            _ => LlmError::Api {
                status: status.as_u16(),
                message: error_text,
            },
        })
    }
}

#[async_trait]
impl CompletionTransport for OpenAiTransport {
    async fn send(&self, batch: CompletionBatch) -> LlmResult<CompletionResponse> {
        tracing::debug!(
            model = %batch.model,
            prompts = batch.prompts.len(),
            n = batch.n,
            "Sending completion batch"
        );

        let response = self.post("/completions", &batch).await?;
        response
            .json::<CompletionResponse>()
            .await
            .map_err(|e| LlmError::Parse(format!("Failed to parse response: {}", e)))
    }
}

#[async_trait]
impl ChatTransport for OpenAiTransport {
    async fn chat(&self, request: ChatRequest) -> LlmResult<ChatResponse> {
        let response = self.post("/chat/completions", &request).await?;
        let parsed: OpenAiChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Parse(format!("Failed to parse response: {}", e)))?;

        Ok(ChatResponse {
            contents: parsed
                .choices
                .into_iter()
                .map(|c| c.message.content.unwrap_or_default())
                .collect(),
            usage: parsed.usage.unwrap_or_default(),
        })
    }
}

// Chat API response types

#[derive(Debug, Deserialize)]
struct OpenAiChatResponse {
    choices: Vec<OpenAiChatChoice>,
    usage: Option<TokenUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChatChoice {
    message: OpenAiMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiMessage {
    content: Option<String>,
}
