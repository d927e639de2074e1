//! # Genie - metered, batched LLM generation
//!
//! Genie wraps a token-based generation API with request batching and
//! per-model cost accounting.
//!
//! ## Features
//!
//! - **Batched generation**: prompts are split into fixed-size batches, one
//!   request per batch, results reassembled in prompt order
//! - **Usage metering**: scoped meters price every completed batch from a
//!   per-model price table and keep running totals
//! - **Retry-and-extract**: bounded retries around a chat completion with
//!   fenced code block extraction
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use genie::config::Settings;
//! use genie::generation::BatchedClient;
//! use genie::llm::OpenAiTransport;
//! use genie::usage::CallbackManager;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::new()?;
//!     let callbacks = Arc::new(CallbackManager::new(settings.price_table()));
//!     let client = BatchedClient::new(
//!         OpenAiTransport::new(&settings.llm)?,
//!         &settings.llm,
//!         callbacks.clone(),
//!     );
//!
//!     let meter = callbacks.attach();
//!     client.generate(&["Tell me a joke."], None, None).await?;
//!     println!("{}", meter.detach().snapshot());
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - `llm/` - Transport traits and the OpenAI-compatible HTTP transport
//! - `generation/` - Batching client
//! - `usage/` - Price table, meters and the callback manager
//! - `prompter/` - Retry-and-extract helper
//! - `token/` - Token counting and context windows
//! - `config/` - Settings loading and validation

pub mod cli;
pub mod config;
pub mod error;
pub mod generation;
pub mod llm;
pub mod prompter;
pub mod token;
pub mod usage;

pub use error::{LlmError, LlmResult};
