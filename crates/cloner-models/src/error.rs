//! Model validation errors.

use thiserror::Error;

use crate::job::JobStatus;

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors raised when a model value or transition is invalid.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("Scene numbers start at 1, got {0}")]
    InvalidSceneNumber(u32),

    #[error("Project name cannot be empty")]
    EmptyProjectName,

    #[error("Scene {scene} cannot have a video reference without an image reference")]
    VideoBeforeImage { scene: u32 },

    #[error("Job {job_id} is already {status}; refusing transition to {attempted}")]
    AlreadyTerminal {
        job_id: String,
        status: JobStatus,
        attempted: JobStatus,
    },

    #[error("Job {0} reported completed without a result reference")]
    MissingResult(String),

    #[error("Unknown model: {0}")]
    UnknownModel(String),

    #[error("Invalid {field}: {message}")]
    InvalidField { field: &'static str, message: String },
}

impl ModelError {
    pub fn invalid_field(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            message: message.into(),
        }
    }
}
