use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::generation::MaxTokens;

/// Genie - metered, batched LLM generation
#[derive(Parser, Debug, Clone)]
#[command(name = "genie", version, about, long_about = None)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, env = "GENIE_CONFIG", default_value = "genie.toml")]
    pub config: PathBuf,

    /// Completion model
    #[arg(long, env = "GENIE_MODEL")]
    pub model: Option<String>,

    /// Base URL of the OpenAI-compatible API
    #[arg(long, env = "GENIE_BASE_URL")]
    pub base_url: Option<String>,

    /// Prompts sent per request
    #[arg(long, env = "GENIE_BATCH_SIZE")]
    pub batch_size: Option<usize>,

    /// Candidates generated per prompt
    #[arg(long)]
    pub n: Option<u32>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Generate completions for one or more prompts and report usage
    Generate {
        /// Prompts, one request slot each
        #[arg(required = true)]
        prompts: Vec<String>,

        /// Stop sequence (repeatable)
        #[arg(long)]
        stop: Vec<String>,

        /// Token limit per candidate, or "auto" for a single prompt
        #[arg(long)]
        max_tokens: Option<MaxTokens>,
    },

    /// Ask a chat model for code and print the extracted block
    FetchCode {
        /// System prompt
        #[arg(long)]
        system: String,

        /// User prompt
        #[arg(long)]
        user: String,

        /// Chat model (defaults to prompter.model)
        #[arg(long)]
        chat_model: Option<String>,

        /// Attempts before giving up (defaults to prompter.max_trials)
        #[arg(long)]
        max_trials: Option<u32>,
    },
}
