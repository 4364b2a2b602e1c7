//! Gemini error types.

use thiserror::Error;

use cloner_models::ModelError;

/// Result type for Gemini operations.
pub type GeminiResult<T> = Result<T, GeminiError>;

#[derive(Debug, Error)]
pub enum GeminiError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Gemini API returned {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Uploaded file {name} failed processing")]
    FileFailed { name: String },

    #[error("Uploaded file {name} still processing after {secs}s")]
    FileTimeout { name: String, secs: u64 },

    #[error("No content in Gemini response")]
    EmptyResponse,

    #[error("Failed to parse Gemini output: {0}")]
    Parse(String),

    #[error("Analysis rejected: {0}")]
    InvalidAnalysis(#[from] ModelError),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl GeminiError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
        }
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    /// Whether trying again (or with another model) can help.
    pub fn is_retryable(&self) -> bool {
        match self {
            GeminiError::Network(_) | GeminiError::EmptyResponse | GeminiError::Parse(_) => true,
            GeminiError::Http { status, .. } => *status == 429 || *status >= 500 || *status == 404,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(GeminiError::http(503, "overloaded").is_retryable());
        assert!(GeminiError::http(404, "model not found").is_retryable());
        assert!(!GeminiError::http(403, "bad key").is_retryable());
        assert!(GeminiError::parse("trailing text").is_retryable());
        assert!(!GeminiError::config("missing key").is_retryable());
    }
}
