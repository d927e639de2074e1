use config::{Config, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub mod validator;

use crate::cli::Cli;
use crate::generation::MaxTokens;
use crate::usage::{ModelPrice, PriceTable};

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub llm: LlmSettings,
    #[serde(default)]
    pub prompter: PrompterSettings,
    #[serde(default)]
    pub pricing: PricingSettings,
}

/// Batched completion client configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LlmSettings {
    /// Model name/identifier
    pub model: String,
    /// Custom base URL (for self-hosted or proxied endpoints)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Environment variable containing the API key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    /// Prompts sent per request
    pub batch_size: usize,
    /// Candidates generated per prompt
    pub n: u32,
    /// Integer, "auto" or -1
    pub max_tokens: MaxTokens,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Default stop sequences; callers cannot pass their own when set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    /// HTTP request timeout in seconds
    pub timeout_seconds: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            model: "text-davinci-003".to_string(),
            base_url: None,
            api_key_env: None,
            batch_size: 20,
            n: 1,
            max_tokens: MaxTokens::default(),
            temperature: Some(0.7),
            stop: None,
            timeout_seconds: 60,
        }
    }
}

/// Retry-and-extract helper configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PrompterSettings {
    /// Chat model asked for code
    pub model: String,
    pub max_trials: u32,
    pub attempt_timeout_seconds: u64,
    /// First delay between attempts in milliseconds
    pub initial_backoff_ms: u64,
}

impl Default for PrompterSettings {
    fn default() -> Self {
        Self {
            model: "gpt-3.5-turbo".to_string(),
            max_trials: 3,
            attempt_timeout_seconds: 30,
            initial_backoff_ms: 500,
        }
    }
}

/// Price table configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PricingSettings {
    /// Start from the built-in prices before applying `models`
    pub include_defaults: bool,
    /// Per-model prices; entries override built-in prices for the same model
    pub models: Vec<ModelPrice>,
}

impl Default for PricingSettings {
    fn default() -> Self {
        Self {
            include_defaults: true,
            models: Vec::new(),
        }
    }
}

impl PricingSettings {
    /// Effective price list, configured entries overriding built-in ones
    pub fn effective_prices(&self) -> Vec<ModelPrice> {
        let mut prices = if self.include_defaults {
            PriceTable::default_prices()
        } else {
            Vec::new()
        };
        merge_vec_by_key(&mut prices, self.models.clone(), |p| p.model.clone());
        prices
    }

    pub fn price_table(&self) -> PriceTable {
        PriceTable::from(self.effective_prices().as_slice())
    }
}

impl Settings {
    pub fn new() -> Result<Self, anyhow::Error> {
        Self::from_root(".")
    }

    /// Create settings from CLI arguments (config file plus CLI overrides)
    pub fn new_with_cli(cli: &Cli) -> Result<Self, anyhow::Error> {
        let mut settings = Self::load(File::from(cli.config.clone()).required(false))?;

        // CLI > env vars > config file
        settings.apply_cli_overrides(cli);

        settings.validate()?;
        Ok(settings)
    }

    /// Load `<root>/genie.{toml,yaml,json}` if present
    pub fn from_root(root: &str) -> Result<Self, anyhow::Error> {
        let config_path = Path::new(root).join("genie");
        let settings = Self::load(File::from(config_path).required(false))?;
        settings.validate()?;
        Ok(settings)
    }

    fn load<T>(source: T) -> Result<Self, anyhow::Error>
    where
        T: config::Source + Send + Sync + 'static,
    {
        let s = Config::builder()
            .add_source(source)
            .set_default("llm.model", LlmSettings::default().model)?
            .set_default("prompter.model", PrompterSettings::default().model)?
            .build()?;

        Ok(s.try_deserialize()?)
    }

    fn validate(&self) -> Result<(), anyhow::Error> {
        validator::ConfigValidator::validate(self).map_err(|errors| {
            let error_messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            anyhow::anyhow!(
                "Configuration validation failed:\n{}",
                error_messages.join("\n")
            )
        })
    }

    /// Apply CLI argument overrides to settings
    fn apply_cli_overrides(&mut self, cli: &Cli) {
        if let Some(model) = &cli.model {
            self.llm.model = model.clone();
        }
        if let Some(base_url) = &cli.base_url {
            self.llm.base_url = Some(base_url.clone());
        }
        if let Some(batch_size) = cli.batch_size {
            self.llm.batch_size = batch_size;
        }
        if let Some(n) = cli.n {
            self.llm.n = n;
        }
    }

    pub fn price_table(&self) -> PriceTable {
        self.pricing.price_table()
    }
}

/// Merge two vectors by a key function.
/// Items from `other` override items in `base` with the same key.
/// Items from `other` not in `base` are added.
fn merge_vec_by_key<T, K, F>(base: &mut Vec<T>, other: Vec<T>, key_fn: F)
where
    K: Eq + std::hash::Hash,
    F: Fn(&T) -> K,
{
    use std::collections::HashMap;

    let mut key_to_index: HashMap<K, usize> = HashMap::new();
    for (i, item) in base.iter().enumerate() {
        key_to_index.insert(key_fn(item), i);
    }

    for item in other {
        let key = key_fn(&item);
        if let Some(&idx) = key_to_index.get(&key) {
            base[idx] = item;
        } else {
            key_to_index.insert(key, base.len());
            base.push(item);
        }
    }
}
