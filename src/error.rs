//! Error types for generation and transport operations

use thiserror::Error;

/// Errors that can occur while talking to a generation service
#[derive(Debug, Error)]
pub enum LlmError {
    /// Caller-supplied stop sequences conflict with the configured default
    #[error("Configuration conflict: {0}")]
    ConfigConflict(String),

    /// `max_tokens = auto` requested for more than one prompt
    #[error("Unsupported batch mode: max_tokens=auto requires exactly one prompt, got {prompts}")]
    UnsupportedBatchMode { prompts: usize },

    /// Authentication error
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Transport-level protocol error (malformed request, bad header, ...)
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Network error
    #[error("Network error: {0}")]
    Network(String),

    /// Timeout
    #[error("Request timed out")]
    Timeout,

    /// Rate limited
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// API error
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Invalid request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Every retry attempt failed
    #[error("No answer after {attempts} attempt(s): {last_error}")]
    Exhausted { attempts: u32, last_error: String },
}

impl LlmError {
    /// Whether this error cannot be fixed by trying again
    pub fn is_fatal(&self) -> bool {
        matches!(self, LlmError::Authentication(_) | LlmError::Protocol(_))
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else if err.is_connect() {
            LlmError::Network(format!("Connection error: {}", err))
        } else if err.is_builder() {
            LlmError::Protocol(err.to_string())
        } else if err.is_decode() {
            LlmError::Parse(err.to_string())
        } else {
            LlmError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for LlmError {
    fn from(err: serde_json::Error) -> Self {
        LlmError::Parse(err.to_string())
    }
}

/// Result type alias for LLM operations
pub type LlmResult<T> = Result<T, LlmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_errors() {
        assert!(LlmError::Authentication("bad key".to_string()).is_fatal());
        assert!(LlmError::Protocol("bad header".to_string()).is_fatal());
        assert!(!LlmError::Timeout.is_fatal());
        assert!(!LlmError::Api { status: 500, message: "boom".to_string() }.is_fatal());
        assert!(!LlmError::Exhausted { attempts: 3, last_error: "Request timed out".to_string() }.is_fatal());
    }

    #[test]
    fn test_error_messages() {
        let err = LlmError::UnsupportedBatchMode { prompts: 2 };
        assert!(err.to_string().contains("got 2"));

        let err = LlmError::Api { status: 502, message: "bad gateway".to_string() };
        assert_eq!(err.to_string(), "API error: 502 - bad gateway");
    }
}
