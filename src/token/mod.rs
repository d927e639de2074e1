//! Token counting and per-model context limits

mod counter;

pub use counter::TokenCounter;

use crate::error::{LlmError, LlmResult};

/// Context window size for a model, prompt and completion together
pub fn context_window(model: &str) -> u32 {
    match model {
        m if m.contains("gpt-4-32k") => 32768,
        m if m.contains("gpt-4") => 8192,
        m if m.contains("gpt-3.5-turbo-16k") => 16384,
        m if m.contains("gpt-3.5-turbo") => 4096,
        m if m.contains("code-davinci-002") => 8001,
        m if m.contains("code-cushman-001") => 2048,
        m if m.starts_with("text-davinci") => 4097,
        m if m.contains("curie") || m.contains("babbage") || m.contains("ada") => 2049,
        "davinci" => 2049,
        _ => 4097,
    }
}

/// Largest `max_tokens` the model accepts for this prompt
pub fn max_tokens_for_prompt(counter: &TokenCounter, model: &str, prompt: &str) -> LlmResult<u32> {
    let window = context_window(model);
    let used = counter.count(prompt);

    match window.checked_sub(used) {
        Some(remaining) if remaining > 0 => Ok(remaining),
        _ => Err(LlmError::InvalidRequest(format!(
            "prompt uses {} tokens, leaving no room in the {} token context of {}",
            used, window, model
        ))),
    }
}
