//! Generation API seam.

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

use cloner_models::{
    AspectRatio, GenerationModel, JobId, JobKind, Resolution, StatusReport, VideoLength,
};

/// Result type for generation API calls.
pub type ApiResult<T> = Result<T, ApiError>;

/// Errors raised by a generation API client.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Insufficient credits: {0}")]
    InsufficientCredits(String),

    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ApiError {
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed(message.into())
    }

    /// Network failures, 429 and 5xx.
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Network(_) => true,
            ApiError::Http { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            ApiError::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Everything needed to submit one generation job.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub model: GenerationModel,
    pub prompt: String,
    /// Public URLs of input images
    pub reference_images: Vec<String>,
    /// Defaults to the model's own default when unset
    pub aspect_ratio: Option<AspectRatio>,
    pub resolution: Resolution,
    pub video_length: VideoLength,
    pub remove_watermark: bool,
}

impl GenerationRequest {
    pub fn new(model: GenerationModel, prompt: impl Into<String>) -> Self {
        Self {
            model,
            prompt: prompt.into(),
            reference_images: Vec::new(),
            aspect_ratio: None,
            resolution: Resolution::default(),
            video_length: VideoLength::default(),
            remove_watermark: true,
        }
    }

    pub fn with_reference(mut self, url: impl Into<String>) -> Self {
        self.reference_images.push(url.into());
        self
    }

    pub fn with_aspect_ratio(mut self, ratio: AspectRatio) -> Self {
        self.aspect_ratio = Some(ratio);
        self
    }

    pub fn with_resolution(mut self, resolution: Resolution) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn with_video_length(mut self, length: VideoLength) -> Self {
        self.video_length = length;
        self
    }

    pub fn with_remove_watermark(mut self, remove: bool) -> Self {
        self.remove_watermark = remove;
        self
    }

    pub fn kind(&self) -> JobKind {
        self.model.kind()
    }

    pub fn aspect_ratio(&self) -> AspectRatio {
        self.aspect_ratio
            .unwrap_or_else(|| self.model.default_aspect_ratio())
    }

    /// First input image, recorded on the job.
    pub fn input_reference(&self) -> Option<String> {
        self.reference_images.first().cloned()
    }

    /// Reject requests the vendor would refuse anyway.
    pub fn check(&self) -> Result<(), String> {
        if self.prompt.trim().is_empty() {
            return Err("prompt is empty".to_string());
        }
        if self.model.kind() == JobKind::Video && self.reference_images.is_empty() {
            return Err(format!("{} requires a reference image", self.model));
        }
        Ok(())
    }
}

/// Hosted generation service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GenerationApi: Send + Sync {
    /// Create a job and return the vendor's id for it.
    async fn submit(&self, request: &GenerationRequest) -> ApiResult<JobId>;

    /// Current state of a job.
    async fn get_status(&self, job_id: &JobId) -> ApiResult<StatusReport>;

    /// Upload a local file to the vendor's file host and return its public URL.
    async fn upload_reference(&self, path: &Path) -> ApiResult<String>;
}
