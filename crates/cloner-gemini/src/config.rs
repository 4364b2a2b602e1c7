//! Gemini client configuration.

use std::time::Duration;

use crate::error::{GeminiError, GeminiResult};

const DEFAULT_API_URL: &str = "https://generativelanguage.googleapis.com";

/// Models tried in order until one answers.
pub const DEFAULT_MODELS: &[&str] = &["gemini-2.5-flash", "gemini-2.5-flash-lite", "gemini-2.5-pro"];

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    /// API root without version prefix
    pub api_url: String,
    /// Fallback order for content generation
    pub models: Vec<String>,
    /// Interval between file state checks
    pub file_poll_interval: Duration,
    /// Give up on an uploaded file that is still processing after this long
    pub file_processing_timeout: Duration,
    /// Per-request timeout
    pub request_timeout: Duration,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_url: DEFAULT_API_URL.to_string(),
            models: DEFAULT_MODELS.iter().map(|m| m.to_string()).collect(),
            file_poll_interval: Duration::from_secs(2),
            file_processing_timeout: Duration::from_secs(300),
            request_timeout: Duration::from_secs(300),
        }
    }

    /// Create config from environment variables.
    pub fn from_env() -> GeminiResult<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| GeminiError::config("GEMINI_API_KEY not set"))?;

        let mut config = Self::new(api_key.trim());
        if let Ok(url) = std::env::var("GEMINI_API_URL") {
            if !url.trim().is_empty() {
                config.api_url = url.trim().to_string();
            }
        }
        if let Ok(models) = std::env::var("GEMINI_MODELS") {
            let models: Vec<String> = models
                .split(',')
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(str::to_string)
                .collect();
            if !models.is_empty() {
                config.models = models;
            }
        }
        Ok(config)
    }

    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    pub fn with_models(mut self, models: &[&str]) -> Self {
        self.models = models.iter().map(|m| m.to_string()).collect();
        self
    }

    pub fn with_file_polling(mut self, interval: Duration, timeout: Duration) -> Self {
        self.file_poll_interval = interval;
        self.file_processing_timeout = timeout;
        self
    }
}
