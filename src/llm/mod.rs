//! Transport seam to token-based generation services
//!
//! The batching client and the retry helper only ever see the two traits in
//! this module. `OpenAiTransport` is the HTTP implementation; tests plug in
//! in-process fakes.

mod openai;

pub use openai::OpenAiTransport;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::LlmResult;

/// A transport that can complete one batch of prompts in a single request
#[async_trait]
pub trait CompletionTransport: Send + Sync {
    /// Send one batch and return the raw service response
    async fn send(&self, batch: CompletionBatch) -> LlmResult<CompletionResponse>;
}

/// A transport for chat-style completions
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Complete one chat request
    async fn chat(&self, request: ChatRequest) -> LlmResult<ChatResponse>;
}

/// One batched completion request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionBatch {
    pub model: String,
    #[serde(rename = "prompt")]
    pub prompts: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    pub max_tokens: u32,
    /// Candidates per prompt
    pub n: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

/// Response to a batched completion request
///
/// `choices` is flat: ordered by prompt index within the batch, then by
/// candidate index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub choices: Vec<CompletionChoice>,
    #[serde(default)]
    pub usage: TokenUsage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// One generated candidate as reported by the service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionChoice {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logprobs: Option<Value>,
}

/// Token usage information; every field may be missing from a response
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u64>,
}

impl TokenUsage {
    /// Usage with all three fields present
    pub fn new(prompt_tokens: u64, completion_tokens: u64, total_tokens: u64) -> Self {
        Self {
            prompt_tokens: Some(prompt_tokens),
            completion_tokens: Some(completion_tokens),
            total_tokens: Some(total_tokens),
        }
    }

    /// Add the fields present in `other` into `self`.
    ///
    /// A field missing from `other` contributes nothing; a field missing from
    /// `self` starts at the value found in `other`.
    pub fn accumulate(&mut self, other: &TokenUsage) {
        fn add(total: &mut Option<u64>, value: Option<u64>) {
            if let Some(value) = value {
                *total = Some(total.unwrap_or(0) + value);
            }
        }

        add(&mut self.prompt_tokens, other.prompt_tokens);
        add(&mut self.completion_tokens, other.completion_tokens);
        add(&mut self.total_tokens, other.total_tokens);
    }

    pub fn is_empty(&self) -> bool {
        self.prompt_tokens.is_none() && self.completion_tokens.is_none() && self.total_tokens.is_none()
    }
}

/// Chat message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A message in a chat request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }
}

/// Chat completion request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// Chat completion response
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatResponse {
    /// Content of each returned choice, in order
    pub contents: Vec<String>,
    pub usage: TokenUsage,
}

impl ChatResponse {
    /// Content of the first choice
    pub fn content(&self) -> Option<&str> {
        self.contents.first().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_accumulate_skips_missing_fields() {
        let mut total = TokenUsage::default();
        total.accumulate(&TokenUsage::new(3, 4, 7));
        total.accumulate(&TokenUsage {
            prompt_tokens: Some(2),
            completion_tokens: None,
            total_tokens: Some(2),
        });

        assert_eq!(total.prompt_tokens, Some(5));
        assert_eq!(total.completion_tokens, Some(4));
        assert_eq!(total.total_tokens, Some(9));
    }

    #[test]
    fn test_accumulate_never_seen_field_stays_missing() {
        let mut total = TokenUsage::default();
        total.accumulate(&TokenUsage {
            prompt_tokens: None,
            completion_tokens: None,
            total_tokens: Some(10),
        });

        assert_eq!(total.prompt_tokens, None);
        assert_eq!(total.completion_tokens, None);
        assert_eq!(total.total_tokens, Some(10));
        assert!(!total.is_empty());
    }

    #[test]
    fn test_batch_serializes_prompts_as_prompt() {
        let batch = CompletionBatch {
            model: "davinci".to_string(),
            prompts: vec!["a".to_string(), "b".to_string()],
            stop: None,
            max_tokens: 16,
            n: 2,
            temperature: None,
        };

        let value = serde_json::to_value(&batch).unwrap();
        assert_eq!(value["prompt"], json!(["a", "b"]));
        assert_eq!(value["n"], 2);
        assert!(value.get("stop").is_none());
        assert!(value.get("temperature").is_none());
    }

    #[test]
    fn test_response_tolerates_missing_usage() {
        let response: CompletionResponse = serde_json::from_value(json!({
            "choices": [{ "text": "hi", "finish_reason": "stop" }]
        }))
        .unwrap();

        assert_eq!(response.choices.len(), 1);
        assert!(response.usage.is_empty());
        assert_eq!(response.choices[0].finish_reason.as_deref(), Some("stop"));
    }
}
