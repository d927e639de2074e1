//! Batched generation client
//!
//! [`BatchedClient`] wraps a [`CompletionTransport`], splits prompts into
//! fixed-size batches, sends them one after another and stitches the
//! candidates back together in prompt order. Every completed batch is
//! reported to the client's [`CallbackManager`] so attached meters can price
//! it.

mod params;

pub use params::MaxTokens;

use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::LlmSettings;
use crate::error::{LlmError, LlmResult};
use crate::llm::{CompletionBatch, CompletionChoice, CompletionTransport, TokenUsage};
use crate::token::{self, TokenCounter};
use crate::usage::{CallbackManager, CompletionEvent};

/// One candidate completion for a prompt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Generation {
    pub text: String,
    #[serde(default)]
    pub info: GenerationInfo,
}

/// Extra details the service reported for a candidate
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logprobs: Option<Value>,
}

impl From<CompletionChoice> for Generation {
    fn from(choice: CompletionChoice) -> Self {
        Self {
            text: choice.text,
            info: GenerationInfo {
                finish_reason: choice.finish_reason,
                logprobs: choice.logprobs,
            },
        }
    }
}

/// Output of one `generate` call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    /// Candidates per prompt, in prompt order
    pub generations: Vec<Vec<Generation>>,
    /// Usage summed over every batch of the call
    pub usage: TokenUsage,
    pub model_name: String,
}

/// Split `items` into consecutive batches of at most `batch_size`
pub fn split_batches<T>(items: &[T], batch_size: usize) -> std::slice::Chunks<'_, T> {
    items.chunks(batch_size.max(1))
}

/// Generation client that batches prompts over a transport
pub struct BatchedClient<T> {
    transport: T,
    callbacks: Arc<CallbackManager>,
    counter: OnceLock<TokenCounter>,
    model: String,
    batch_size: usize,
    n: u32,
    stop: Option<Vec<String>>,
    max_tokens: MaxTokens,
    temperature: Option<f32>,
}

impl<T: CompletionTransport> BatchedClient<T> {
    /// Create a client from LLM settings
    pub fn new(transport: T, settings: &LlmSettings, callbacks: Arc<CallbackManager>) -> Self {
        Self {
            transport,
            callbacks,
            counter: OnceLock::new(),
            model: settings.model.clone(),
            batch_size: settings.batch_size.max(1),
            n: settings.n.max(1),
            stop: settings.stop.clone().filter(|s| !s.is_empty()),
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
        }
    }

    /// Use a specific token counter for `MaxTokens::Auto`
    pub fn with_token_counter(self, counter: TokenCounter) -> Self {
        let cell = OnceLock::new();
        let _ = cell.set(counter);
        Self { counter: cell, ..self }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn callbacks(&self) -> &Arc<CallbackManager> {
        &self.callbacks
    }

    /// Generate `n` candidates for every prompt.
    ///
    /// `stop` may only be given when no default stop sequence is configured.
    /// `max_tokens` falls back to the configured default when `None`.
    pub async fn generate<S: AsRef<str>>(
        &self,
        prompts: &[S],
        stop: Option<Vec<String>>,
        max_tokens: Option<MaxTokens>,
    ) -> LlmResult<GenerationResult> {
        let stop = self.resolve_stop(stop)?;
        let max_tokens = self.resolve_max_tokens(prompts, max_tokens.unwrap_or(self.max_tokens))?;

        let mut result = GenerationResult {
            generations: Vec::with_capacity(prompts.len()),
            usage: TokenUsage::default(),
            model_name: self.model.clone(),
        };

        for (index, batch) in split_batches(prompts, self.batch_size).enumerate() {
            let request = CompletionBatch {
                model: self.model.clone(),
                prompts: batch.iter().map(|p| p.as_ref().to_string()).collect(),
                stop: stop.clone(),
                max_tokens,
                n: self.n,
                temperature: self.temperature,
            };

            tracing::debug!(batch = index, prompts = batch.len(), max_tokens, "Issuing batch");
            let response = self.transport.send(request).await?;

            // The service billed the batch even if its choices are unusable
            result.usage.accumulate(&response.usage);
            self.callbacks.dispatch(&CompletionEvent {
                model_id: self.model.clone(),
                usage: response.usage,
            });

            let expected = batch.len() * self.n as usize;
            if response.choices.len() != expected {
                return Err(LlmError::Parse(format!(
                    "batch {} returned {} choices, expected {} ({} prompts x n={})",
                    index,
                    response.choices.len(),
                    expected,
                    batch.len(),
                    self.n
                )));
            }

            let mut choices = response.choices.into_iter();
            for _ in 0..batch.len() {
                result.generations.push(
                    choices
                        .by_ref()
                        .take(self.n as usize)
                        .map(Generation::from)
                        .collect(),
                );
            }
        }

        Ok(result)
    }

    fn resolve_stop(&self, stop: Option<Vec<String>>) -> LlmResult<Option<Vec<String>>> {
        match (stop, &self.stop) {
            (Some(_), Some(_)) => Err(LlmError::ConfigConflict(
                "`stop` found in both the input and default params".to_string(),
            )),
            (Some(stop), None) => Ok(Some(stop)),
            (None, default) => Ok(default.clone()),
        }
    }

    fn resolve_max_tokens<S: AsRef<str>>(&self, prompts: &[S], max_tokens: MaxTokens) -> LlmResult<u32> {
        match max_tokens {
            MaxTokens::Fixed(n) => Ok(n),
            MaxTokens::Auto => match prompts {
                [prompt] => {
                    let counter = self.counter.get_or_init(|| TokenCounter::for_model(&self.model));
                    token::max_tokens_for_prompt(counter, &self.model, prompt.as_ref())
                }
                _ => Err(LlmError::UnsupportedBatchMode {
                    prompts: prompts.len(),
                }),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use rust_decimal_macros::dec;
    use std::collections::VecDeque;

    use crate::llm::CompletionResponse;
    use crate::usage::PriceTable;

    /// Echoes each prompt back `n` times and records every batch it sees
    #[derive(Default)]
    struct EchoTransport {
        sent: Mutex<Vec<CompletionBatch>>,
        usages: Mutex<VecDeque<TokenUsage>>,
        fail_on_call: Option<usize>,
    }

    impl EchoTransport {
        fn with_usages(usages: Vec<TokenUsage>) -> Self {
            Self {
                usages: Mutex::new(usages.into()),
                ..Default::default()
            }
        }

        fn sent(&self) -> Vec<CompletionBatch> {
            self.sent.lock().clone()
        }
    }

    #[async_trait]
    impl CompletionTransport for EchoTransport {
        async fn send(&self, batch: CompletionBatch) -> LlmResult<CompletionResponse> {
            let call = {
                let mut sent = self.sent.lock();
                sent.push(batch.clone());
                sent.len()
            };
            if self.fail_on_call == Some(call) {
                return Err(LlmError::Timeout);
            }

            let choices = batch
                .prompts
                .iter()
                .flat_map(|p| {
                    (0..batch.n).map(move |i| CompletionChoice {
                        text: format!("{}#{}", p, i),
                        finish_reason: Some("stop".to_string()),
                        logprobs: None,
                    })
                })
                .collect();

            Ok(CompletionResponse {
                choices,
                usage: self.usages.lock().pop_front().unwrap_or_default(),
                model: Some(batch.model),
            })
        }
    }


    fn settings(batch_size: usize, n: u32) -> LlmSettings {
        LlmSettings {
            model: "davinci".to_string(),
            batch_size,
            n,
            stop: None,
            max_tokens: MaxTokens::Fixed(16),
            ..LlmSettings::default()
        }
    }

    fn callbacks() -> Arc<CallbackManager> {
        Arc::new(CallbackManager::new(PriceTable::new([(
            "davinci".to_string(),
            dec!(0.02),
        )])))
    }

    #[test]
    fn test_split_batches_reconstructs_input() {
        for len in 0..12usize {
            let items: Vec<usize> = (0..len).collect();
            for batch_size in 1..6usize {
                let batches: Vec<&[usize]> = split_batches(&items, batch_size).collect();
                assert_eq!(batches.len(), len.div_ceil(batch_size));
                assert!(batches.iter().all(|b| !b.is_empty() && b.len() <= batch_size));
                assert_eq!(batches.concat(), items);
            }
        }
    }

    #[test]
    fn test_split_batches_example() {
        let prompts = ["a", "b", "c"];
        let batches: Vec<_> = split_batches(&prompts, 2).collect();
        assert_eq!(batches, vec![&["a", "b"][..], &["c"][..]]);
    }

    #[tokio::test]
    async fn test_generate_batches_in_order_and_sums_usage() {
        let transport = EchoTransport::with_usages(vec![
            TokenUsage::new(4, 6, 10),
            TokenUsage {
                prompt_tokens: Some(2),
                completion_tokens: None,
                total_tokens: Some(5),
            },
        ]);
        let callbacks = callbacks();
        let client = BatchedClient::new(transport, &settings(2, 1), callbacks.clone());
        let guard = callbacks.attach();

        let result = client.generate(&["a", "b", "c"], None, None).await.unwrap();

        let sent = client.transport().sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].prompts, vec!["a", "b"]);
        assert_eq!(sent[1].prompts, vec!["c"]);

        let texts: Vec<&str> = result.generations.iter().map(|g| g[0].text.as_str()).collect();
        assert_eq!(texts, vec!["a#0", "b#0", "c#0"]);
        assert_eq!(result.model_name, "davinci");
        assert_eq!(result.usage.prompt_tokens, Some(6));
        assert_eq!(result.usage.completion_tokens, Some(6));
        assert_eq!(result.usage.total_tokens, Some(15));

        // one event per batch
        assert_eq!(guard.successful_requests(), 2);
        assert_eq!(guard.total_tokens(), 15);
        assert_eq!(guard.total_cost(), dec!(0.3));
    }

    #[tokio::test]
    async fn test_generate_slices_candidates_by_n() {
        let client = BatchedClient::new(EchoTransport::default(), &settings(2, 3), callbacks());

        let result = client.generate(&["x", "y", "z"], None, None).await.unwrap();

        assert_eq!(result.generations.len(), 3);
        for (prompt, group) in ["x", "y", "z"].iter().zip(&result.generations) {
            let texts: Vec<String> = group.iter().map(|g| g.text.clone()).collect();
            assert_eq!(texts, (0..3).map(|i| format!("{}#{}", prompt, i)).collect::<Vec<_>>());
            assert_eq!(group[0].info.finish_reason.as_deref(), Some("stop"));
        }
        assert!(client.transport().sent().iter().all(|b| b.n == 3));
    }

    #[tokio::test]
    async fn test_generate_empty_prompts() {
        let client = BatchedClient::new(EchoTransport::default(), &settings(2, 1), callbacks());
        let prompts: [&str; 0] = [];

        let result = client.generate(&prompts, None, None).await.unwrap();

        assert!(result.generations.is_empty());
        assert!(result.usage.is_empty());
        assert!(client.transport().sent().is_empty());
    }

    #[tokio::test]
    async fn test_stop_conflicts_with_default() {
        let mut config = settings(2, 1);
        config.stop = Some(vec!["\n".to_string()]);
        let client = BatchedClient::new(EchoTransport::default(), &config, callbacks());

        let err = client
            .generate(&["a"], Some(vec!["END".to_string()]), None)
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::ConfigConflict(_)));
        assert!(client.transport().sent().is_empty());

        client.generate(&["a"], None, None).await.unwrap();
        assert_eq!(client.transport().sent()[0].stop, Some(vec!["\n".to_string()]));
    }

    #[tokio::test]
    async fn test_caller_stop_is_forwarded() {
        let client = BatchedClient::new(EchoTransport::default(), &settings(2, 1), callbacks());

        client
            .generate(&["a", "b", "c"], Some(vec!["END".to_string()]), None)
            .await
            .unwrap();

        assert!(client
            .transport()
            .sent()
            .iter()
            .all(|b| b.stop == Some(vec!["END".to_string()])));
    }

    #[tokio::test]
    async fn test_auto_max_tokens_requires_single_prompt() {
        let client = BatchedClient::new(EchoTransport::default(), &settings(2, 1), callbacks())
            .with_token_counter(TokenCounter::with_ratio(4.0));

        let err = client
            .generate(&["a", "b"], None, Some(MaxTokens::Auto))
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::UnsupportedBatchMode { prompts: 2 }));

        client
            .generate(&["tell me a joke"], None, Some(MaxTokens::Auto))
            .await
            .unwrap();
        let max_tokens = client.transport().sent()[0].max_tokens;
        assert!(max_tokens > 0);
        assert_eq!(max_tokens, token::context_window("davinci") - 4);
    }

    #[tokio::test]
    async fn test_transport_failure_propagates() {
        let transport = EchoTransport {
            fail_on_call: Some(2),
            ..Default::default()
        };
        let callbacks = callbacks();
        let client = BatchedClient::new(transport, &settings(1, 1), callbacks.clone());
        let guard = callbacks.attach();

        let err = client.generate(&["a", "b", "c"], None, None).await.unwrap_err();

        assert!(matches!(err, LlmError::Timeout));
        // no retry, and the failed batch fires no event
        assert_eq!(client.transport().sent().len(), 2);
        assert_eq!(guard.successful_requests(), 1);
    }

    #[tokio::test]
    async fn test_short_response_is_rejected() {
        struct ShortTransport;

        #[async_trait]
        impl CompletionTransport for ShortTransport {
            async fn send(&self, _batch: CompletionBatch) -> LlmResult<CompletionResponse> {
                Ok(CompletionResponse {
                    choices: vec![CompletionChoice::default()],
                    ..Default::default()
                })
            }
        }

        let client = BatchedClient::new(ShortTransport, &settings(2, 1), callbacks());
        let err = client.generate(&["a", "b"], None, None).await.unwrap_err();
        assert!(matches!(err, LlmError::Parse(_)));
    }

    #[tokio::test]
    async fn test_short_response_is_still_metered() {
        struct ShortBilledTransport;

        #[async_trait]
        impl CompletionTransport for ShortBilledTransport {
            async fn send(&self, _batch: CompletionBatch) -> LlmResult<CompletionResponse> {
                Ok(CompletionResponse {
                    choices: vec![CompletionChoice::default()],
                    usage: TokenUsage::new(60, 40, 100),
                    model: None,
                })
            }
        }

        let callbacks = callbacks();
        let client = BatchedClient::new(ShortBilledTransport, &settings(2, 1), callbacks.clone());
        let guard = callbacks.attach();

        let err = client.generate(&["a", "b"], None, None).await.unwrap_err();

        assert!(matches!(err, LlmError::Parse(_)));
        assert_eq!(guard.total_tokens(), 100);
        assert_eq!(guard.successful_requests(), 1);
        assert_eq!(guard.total_cost(), dec!(2.00));
    }
}
