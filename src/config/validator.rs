use std::collections::HashSet;
use thiserror::Error;

use rust_decimal::Decimal;

use crate::config::{LlmSettings, PricingSettings, PrompterSettings, Settings};
use crate::generation::MaxTokens;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Duplicate entry: {0}")]
    Duplicate(String),
}

pub struct ConfigValidator;

impl ConfigValidator {
    pub fn validate(settings: &Settings) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if let Err(e) = Self::validate_llm(&settings.llm) {
            errors.extend(e);
        }

        if let Err(e) = Self::validate_prompter(&settings.prompter) {
            errors.extend(e);
        }

        if let Err(e) = Self::validate_pricing(&settings.pricing) {
            errors.extend(e);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn validate_llm(llm: &LlmSettings) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if llm.model.trim().is_empty() {
            errors.push(ValidationError::MissingField("llm.model".to_string()));
        }

        if llm.batch_size == 0 {
            errors.push(ValidationError::InvalidValue {
                field: "llm.batch_size".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        if llm.n == 0 {
            errors.push(ValidationError::InvalidValue {
                field: "llm.n".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        if llm.max_tokens == MaxTokens::Fixed(0) {
            errors.push(ValidationError::InvalidValue {
                field: "llm.max_tokens".to_string(),
                reason: "must be positive or \"auto\"".to_string(),
            });
        }

        if let Some(temperature) = llm.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                errors.push(ValidationError::InvalidValue {
                    field: "llm.temperature".to_string(),
                    reason: format!("{} is outside 0.0..=2.0", temperature),
                });
            }
        }

        if let Some(stop) = &llm.stop {
            if stop.iter().any(|s| s.is_empty()) {
                errors.push(ValidationError::InvalidValue {
                    field: "llm.stop".to_string(),
                    reason: "stop sequences cannot be empty strings".to_string(),
                });
            }
        }

        if llm.timeout_seconds == 0 {
            errors.push(ValidationError::InvalidValue {
                field: "llm.timeout_seconds".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn validate_prompter(prompter: &PrompterSettings) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if prompter.model.trim().is_empty() {
            errors.push(ValidationError::MissingField("prompter.model".to_string()));
        }

        if prompter.max_trials == 0 {
            errors.push(ValidationError::InvalidValue {
                field: "prompter.max_trials".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        if prompter.attempt_timeout_seconds == 0 {
            errors.push(ValidationError::InvalidValue {
                field: "prompter.attempt_timeout_seconds".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn validate_pricing(pricing: &PricingSettings) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();
        let mut seen = HashSet::new();

        for price in &pricing.models {
            if price.model.trim().is_empty() {
                errors.push(ValidationError::MissingField("pricing.models.model".to_string()));
                continue;
            }

            if !seen.insert(price.model.as_str()) {
                errors.push(ValidationError::Duplicate(format!("pricing for model '{}'", price.model)));
            }

            if price.price_per_token < Decimal::ZERO {
                errors.push(ValidationError::InvalidValue {
                    field: format!("pricing.models[{}].price_per_token", price.model),
                    reason: "cannot be negative".to_string(),
                });
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
