//! Retry-and-extract helper for chat completions
//!
//! Asks a chat model for code, retries transient failures with a per-attempt
//! timeout and pulls the fenced code block out of the answer.

mod extract;

pub use extract::{extract_code_block, extract_or_verbatim, find_code_start};

use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoffBuilder;

use crate::config::PrompterSettings;
use crate::error::{LlmError, LlmResult};
use crate::llm::{ChatMessage, ChatRequest, ChatTransport};

/// What a [`fetch_with_retry`] call produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The answer contained a fenced code block
    Extracted(String),
    /// The answer had no recognizable block; full text
    Verbatim(String),
    /// Every attempt failed
    Failed { attempts: u32, last_error: String },
}

impl FetchOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, FetchOutcome::Failed { .. })
    }

    /// Collapse to a plain string, empty on failure
    pub fn into_text(self) -> String {
        match self {
            FetchOutcome::Extracted(text) | FetchOutcome::Verbatim(text) => text,
            FetchOutcome::Failed { .. } => String::new(),
        }
    }

    /// The answer text, or [`LlmError::Exhausted`] when every attempt failed
    pub fn into_result(self) -> LlmResult<String> {
        match self {
            FetchOutcome::Extracted(text) | FetchOutcome::Verbatim(text) => Ok(text),
            FetchOutcome::Failed { attempts, last_error } => {
                Err(LlmError::Exhausted { attempts, last_error })
            }
        }
    }
}

/// Retry limits for [`fetch_with_retry`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_trials: u32,
    pub attempt_timeout: Duration,
    /// First delay between attempts; grows exponentially
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_trials: 3,
            attempt_timeout: Duration::from_secs(30),
            initial_backoff: Duration::from_millis(500),
        }
    }
}

impl From<&PrompterSettings> for RetryPolicy {
    fn from(settings: &PrompterSettings) -> Self {
        Self {
            max_trials: settings.max_trials,
            attempt_timeout: Duration::from_secs(settings.attempt_timeout_seconds),
            initial_backoff: Duration::from_millis(settings.initial_backoff_ms),
        }
    }
}

/// Ask `model` for code and extract the fenced block from its answer.
///
/// Stops at the first successful attempt. Authentication and protocol errors
/// abort immediately and are returned as `Err`; any other failure, timeouts
/// included, moves on to the next attempt.
pub async fn fetch_with_retry<C: ChatTransport + ?Sized>(
    transport: &C,
    system_prompt: &str,
    user_prompt: &str,
    model: &str,
    policy: &RetryPolicy,
) -> LlmResult<FetchOutcome> {
    let request = ChatRequest {
        model: model.to_string(),
        messages: vec![ChatMessage::system(system_prompt), ChatMessage::user(user_prompt)],
        max_tokens: None,
    };

    let mut delays = ExponentialBackoffBuilder::new()
        .with_initial_interval(policy.initial_backoff)
        .with_max_elapsed_time(None)
        .build();
    let mut last_error = String::from("no attempts made");

    for attempt in 1..=policy.max_trials {
        let result = tokio::time::timeout(policy.attempt_timeout, transport.chat(request.clone()))
            .await
            .unwrap_or(Err(LlmError::Timeout));

        match result {
            Ok(response) => {
                let content = response.content().unwrap_or_default();
                return Ok(match extract_code_block(content) {
                    Some(code) => {
                        tracing::info!(attempt, "Extracted code block");
                        tracing::debug!(code = %code, "Extracted code");
                        FetchOutcome::Extracted(code.to_string())
                    }
                    None => {
                        tracing::info!(attempt, "No code block in response, returning full text");
                        FetchOutcome::Verbatim(content.to_string())
                    }
                });
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                tracing::warn!(attempt, max_trials = policy.max_trials, "Chat attempt failed: {}", e);
                last_error = e.to_string();
            }
        }

        if attempt < policy.max_trials {
            if let Some(delay) = delays.next_backoff() {
                tokio::time::sleep(delay).await;
            }
        }
    }

    Ok(FetchOutcome::Failed {
        attempts: policy.max_trials,
        last_error,
    })
}
