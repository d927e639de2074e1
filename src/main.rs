use clap::Parser;
use genie::cli::{Cli, Command};
use genie::config::Settings;
use genie::error::LlmError;
use genie::generation::BatchedClient;
use genie::llm::OpenAiTransport;
use genie::prompter::{self, RetryPolicy};
use genie::usage::CallbackManager;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let settings = Settings::new_with_cli(&cli)?;

    let result = match cli.command {
        Command::Generate { prompts, stop, max_tokens } => {
            let stop = (!stop.is_empty()).then_some(stop);
            generate(&settings, &prompts, stop, max_tokens).await
        }
        Command::FetchCode { system, user, chat_model, max_trials } => {
            fetch_code(&settings, &system, &user, chat_model, max_trials).await
        }
    };

    match result {
        Err(e) if e.is_fatal() => {
            error!("{}", e);
            println!();
            println!("You need an OpenAI key to use genie. You can get a key here: https://openai.com/api/");
            println!("Set the environment variable OPENAI_API_KEY (or the variable named by llm.api_key_env).");
            std::process::exit(1);
        }
        other => Ok(other?),
    }
}

async fn generate(
    settings: &Settings,
    prompts: &[String],
    stop: Option<Vec<String>>,
    max_tokens: Option<genie::generation::MaxTokens>,
) -> Result<(), LlmError> {
    let transport = OpenAiTransport::new(&settings.llm)?;
    let callbacks = Arc::new(CallbackManager::new(settings.price_table()));
    let client = BatchedClient::new(transport, &settings.llm, callbacks.clone());

    info!(
        "Generating {} prompt(s) with {} in batches of {}",
        prompts.len(),
        client.model(),
        client.batch_size()
    );

    let meter = {
        let guard = callbacks.attach();
        let result = client.generate(prompts, stop, max_tokens).await?;

        for (prompt, candidates) in prompts.iter().zip(&result.generations) {
            println!("=== {}", prompt);
            for candidate in candidates {
                println!("{}", candidate.text.trim());
            }
        }

        guard.detach()
    };

    println!();
    println!("{}", meter.snapshot());
    Ok(())
}

async fn fetch_code(
    settings: &Settings,
    system: &str,
    user: &str,
    chat_model: Option<String>,
    max_trials: Option<u32>,
) -> Result<(), LlmError> {
    let transport = OpenAiTransport::new(&settings.llm)?;
    let model = chat_model.unwrap_or_else(|| settings.prompter.model.clone());
    let mut policy = RetryPolicy::from(&settings.prompter);
    if let Some(max_trials) = max_trials {
        policy.max_trials = max_trials.max(1);
    }

    let code = prompter::fetch_with_retry(&transport, system, user, &model, &policy)
        .await?
        .into_result()?;
    println!("{}", code);

    Ok(())
}
