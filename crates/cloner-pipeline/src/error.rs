//! Pipeline error types.

use std::fmt;

use thiserror::Error;

use cloner_gemini::GeminiError;
use cloner_jobs::DispatchError;
use cloner_media::MediaError;
use cloner_models::{JobId, ModelError, SceneNumber};
use cloner_records::RecordError;

use crate::stage::Stage;

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Why one scene of a generation stage did not get its reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneFailure {
    pub scene: SceneNumber,
    /// Error kind, e.g. `timeout` or `vendor_failed`
    pub kind: &'static str,
    /// Vendor job, when one was accepted
    pub job_id: Option<JobId>,
    pub message: String,
}

impl fmt::Display for SceneFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scene {} [{}]", self.scene, self.kind)?;
        if let Some(job_id) = &self.job_id {
            write!(f, " job {}", job_id)?;
        }
        write!(f, ": {}", self.message)
    }
}

fn list_failures(failures: &[SceneFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing input: {0}")]
    MissingInput(String),

    #[error("Project incomplete: {0}")]
    Incomplete(String),

    #[error("{} of the {stage} scenes failed: {}", .failures.len(), list_failures(.failures))]
    SceneFailures {
        stage: Stage,
        failures: Vec<SceneFailure>,
    },

    #[error("Stage {stage} failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: Box<PipelineError>,
    },

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("Record store error: {0}")]
    Record(#[from] RecordError),

    #[error("Analysis service error: {0}")]
    Gemini(#[from] GeminiError),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("Invalid data: {0}")]
    Model(#[from] ModelError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn missing_input(msg: impl Into<String>) -> Self {
        Self::MissingInput(msg.into())
    }

    pub fn incomplete(msg: impl Into<String>) -> Self {
        Self::Incomplete(msg.into())
    }

    /// Attribute this error to `stage`, unless it already is.
    pub fn in_stage(self, stage: Stage) -> Self {
        match self {
            PipelineError::Stage { .. } => self,
            other => PipelineError::Stage {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// Stage the error was raised in, if known.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            PipelineError::Stage { stage, .. } | PipelineError::SceneFailures { stage, .. } => {
                Some(*stage)
            }
            _ => None,
        }
    }

    /// Stable name of the error kind, for user output.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Config(_) => "configuration",
            PipelineError::MissingInput(_) => "missing_input",
            PipelineError::Incomplete(_) => "incomplete",
            PipelineError::SceneFailures { .. } => "scene_failures",
            PipelineError::Stage { source, .. } => source.kind(),
            PipelineError::Dispatch(e) => e.kind(),
            PipelineError::Record(RecordError::Config(_)) => "configuration",
            PipelineError::Record(_) => "record_store",
            PipelineError::Gemini(GeminiError::Config(_)) => "configuration",
            PipelineError::Gemini(_) => "analysis_service",
            PipelineError::Media(MediaError::Cancelled) => "cancelled",
            PipelineError::Media(MediaError::Timeout(_)) => "timeout",
            PipelineError::Media(_) => "media",
            PipelineError::Model(_) => "invalid_data",
            PipelineError::Io(_) => "io",
            PipelineError::Json(_) => "invalid_data",
        }
    }

    /// Vendor jobs left behind by this error, for re-polling.
    pub fn job_ids(&self) -> Vec<JobId> {
        match self {
            PipelineError::Stage { source, .. } => source.job_ids(),
            PipelineError::Dispatch(e) => e.job_id().cloned().into_iter().collect(),
            PipelineError::SceneFailures { failures, .. } => {
                failures.iter().filter_map(|f| f.job_id.clone()).collect()
            }
            _ => Vec::new(),
        }
    }

    /// Whether the run stopped because the user interrupted it.
    pub fn is_cancelled(&self) -> bool {
        match self {
            PipelineError::Stage { source, .. } => source.is_cancelled(),
            PipelineError::SceneFailures { failures, .. } => {
                failures.iter().any(|f| f.kind == "cancelled")
            }
            other => other.kind() == "cancelled",
        }
    }
}

impl From<cloner_jobs::ApiError> for PipelineError {
    fn from(e: cloner_jobs::ApiError) -> Self {
        match e {
            cloner_jobs::ApiError::Config(msg) => PipelineError::Config(msg),
            other => PipelineError::Dispatch(DispatchError::Submission(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloner_models::{Job, JobKind};
    use std::time::Duration;

    fn failure(n: u32, kind: &'static str, job: Option<&str>) -> SceneFailure {
        SceneFailure {
            scene: SceneNumber::new(n).unwrap(),
            kind,
            job_id: job.map(JobId::from_string),
            message: "boom".to_string(),
        }
    }

    #[test]
    fn test_stage_wrapping_keeps_kind_and_job() {
        let job = Job::submitted(JobId::from_string("v-9"), JobKind::Video, "sora-2", None);
        let err = PipelineError::from(DispatchError::Timeout {
            job: Box::new(job),
            waited: Duration::from_secs(900),
        })
        .in_stage(Stage::Videos);

        assert_eq!(err.stage(), Some(Stage::Videos));
        assert_eq!(err.kind(), "timeout");
        assert_eq!(err.job_ids(), vec![JobId::from_string("v-9")]);
        assert!(err.to_string().contains("videos"));
        assert!(err.to_string().contains("v-9"));
    }

    #[test]
    fn test_in_stage_does_not_double_wrap() {
        let err = PipelineError::config("x")
            .in_stage(Stage::Images)
            .in_stage(Stage::Combine);
        assert_eq!(err.stage(), Some(Stage::Images));
    }

    #[test]
    fn test_scene_failures_message() {
        let err = PipelineError::SceneFailures {
            stage: Stage::Images,
            failures: vec![failure(2, "vendor_failed", Some("img-2")), failure(3, "quota", None)],
        };
        let msg = err.to_string();
        assert!(msg.starts_with("2 of the images scenes failed"));
        assert!(msg.contains("scene 2 [vendor_failed] job img-2: boom"));
        assert_eq!(err.job_ids().len(), 1);
        assert!(!err.is_cancelled());
    }

    #[test]
    fn test_cancelled_detection() {
        let err = PipelineError::SceneFailures {
            stage: Stage::Videos,
            failures: vec![failure(1, "cancelled", Some("v-1"))],
        }
        .in_stage(Stage::Videos);
        assert!(err.is_cancelled());
        assert!(PipelineError::Media(MediaError::Cancelled).is_cancelled());
    }
}
