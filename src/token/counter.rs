//! Token counting utilities

use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use parking_lot::RwLock;
use tiktoken_rs::CoreBPE;

/// Token counter with caching
///
/// Uses the model's BPE vocabulary when tiktoken knows the model and falls
/// back to a characters-per-token approximation otherwise.
pub struct TokenCounter {
    /// Tokenizer for the model, if one is known
    bpe: Option<CoreBPE>,
    /// Cache of text hash -> token count
    cache: RwLock<HashMap<u64, u32>>,
    /// Approximate chars per token, used without a tokenizer
    chars_per_token: f32,
}

impl TokenCounter {
    /// Create a counter for a model
    pub fn for_model(model: &str) -> Self {
        let bpe = match tiktoken_rs::get_bpe_from_model(model) {
            Ok(bpe) => Some(bpe),
            Err(e) => {
                tracing::debug!(model, "No tokenizer for model, approximating: {}", e);
                None
            }
        };

        Self {
            bpe,
            cache: RwLock::new(HashMap::new()),
            chars_per_token: 4.0,
        }
    }

    /// Create an approximating counter with a specific chars-per-token ratio
    pub fn with_ratio(chars_per_token: f32) -> Self {
        Self {
            bpe: None,
            cache: RwLock::new(HashMap::new()),
            chars_per_token,
        }
    }

    /// Whether counts come from a real tokenizer
    pub fn is_exact(&self) -> bool {
        self.bpe.is_some()
    }

    /// Count tokens in text
    pub fn count(&self, text: &str) -> u32 {
        let hash = Self::hash_text(text);

        if let Some(&count) = self.cache.read().get(&hash) {
            return count;
        }

        let count = match &self.bpe {
            Some(bpe) => bpe.encode_with_special_tokens(text).len() as u32,
            None => (text.len() as f32 / self.chars_per_token).ceil() as u32,
        };

        self.cache.write().insert(hash, count);

        count
    }

    fn hash_text(text: &str) -> u64 {
        use std::collections::hash_map::DefaultHasher;

        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        hasher.finish()
    }

    /// Clear the cache
    pub fn clear_cache(&self) {
        self.cache.write().clear();
    }
}
