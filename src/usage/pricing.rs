//! Per-model price table

use std::collections::HashMap;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Price of one model, as it appears in configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ModelPrice {
    pub model: String,
    pub price_per_token: Decimal,
}

/// Immutable mapping of model identifier to price per token.
///
/// Unknown models price at zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceTable {
    prices: HashMap<String, Decimal>,
}

impl PriceTable {
    pub fn new(prices: impl IntoIterator<Item = (String, Decimal)>) -> Self {
        Self {
            prices: prices.into_iter().collect(),
        }
    }

    /// Price per token, zero for models not in the table
    pub fn price(&self, model: &str) -> Decimal {
        self.prices.get(model).copied().unwrap_or(Decimal::ZERO)
    }

    /// Cost of `tokens` tokens on `model`
    pub fn cost(&self, model: &str, tokens: u64) -> Decimal {
        self.price(model) * Decimal::from(tokens)
    }

    pub fn contains(&self, model: &str) -> bool {
        self.prices.contains_key(model)
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    /// Prices for the base completion models
    pub fn default_prices() -> Vec<ModelPrice> {
        [
            ("davinci", dec!(0.020)),
            ("curie", dec!(0.0020)),
            ("babbage", dec!(0.0005)),
            ("ada", dec!(0.0004)),
            ("text-davinci-003", dec!(0.020)),
            ("text-davinci-002", dec!(0.020)),
            ("text-curie-001", dec!(0.0020)),
            ("text-babbage-001", dec!(0.0005)),
            ("text-ada-001", dec!(0.0004)),
        ]
        .into_iter()
        .map(|(model, price_per_token)| ModelPrice {
            model: model.to_string(),
            price_per_token,
        })
        .collect()
    }
}

impl From<&[ModelPrice]> for PriceTable {
    fn from(prices: &[ModelPrice]) -> Self {
        Self::new(
            prices
                .iter()
                .map(|p| (p.model.clone(), p.price_per_token)),
        )
    }
}
