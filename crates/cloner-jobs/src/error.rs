//! Dispatcher error taxonomy.

use std::time::Duration;

use thiserror::Error;

use cloner_models::{Cost, Job, JobId, ModelError};

/// Result type for dispatcher operations.
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Errors surfaced by [`crate::JobDispatcher`].
///
/// None of these are retried by the dispatcher itself; transient status
/// failures are absorbed before `TransientPoll` is raised.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Submission rejected: {0}")]
    Submission(String),

    #[error("Insufficient vendor credits: {0}")]
    Quota(String),

    #[error("Spend approval exhausted: requested {requested}, remaining {remaining}")]
    BudgetExceeded { requested: Cost, remaining: Cost },

    #[error("Status checks for job {job_id} kept failing after {attempts} attempts: {message}")]
    TransientPoll {
        job_id: JobId,
        attempts: u32,
        message: String,
    },

    #[error("Job {job_id} not found: {message}")]
    NotFound { job_id: JobId, message: String },

    #[error("Job {} still {} after {}s", .job.job_id, .job.status(), .waited.as_secs())]
    Timeout { job: Box<Job>, waited: Duration },

    #[error("Malformed response for job {job_id}: {message}")]
    MalformedResponse { job_id: JobId, message: String },

    #[error("Stopped waiting for job {} (last status {})", .job.job_id, .job.status())]
    Cancelled { job: Box<Job> },

    #[error("Cancelled before submission; nothing was charged")]
    CancelledBeforeSubmit,

    #[error("Invalid job transition: {0}")]
    InvalidTransition(#[from] ModelError),
}

impl DispatchError {
    /// Stable name of the error kind, for logs and user output.
    pub fn kind(&self) -> &'static str {
        match self {
            DispatchError::Config(_) => "configuration",
            DispatchError::Submission(_) => "submission",
            DispatchError::Quota(_) => "quota",
            DispatchError::BudgetExceeded { .. } => "budget",
            DispatchError::TransientPoll { .. } => "transient_poll",
            DispatchError::NotFound { .. } => "not_found",
            DispatchError::Timeout { .. } => "timeout",
            DispatchError::MalformedResponse { .. } => "malformed_response",
            DispatchError::Cancelled { .. } | DispatchError::CancelledBeforeSubmit => "cancelled",
            DispatchError::InvalidTransition(_) => "invalid_transition",
        }
    }

    /// Vendor job id, when the job was accepted before the error.
    pub fn job_id(&self) -> Option<&JobId> {
        match self {
            DispatchError::TransientPoll { job_id, .. }
            | DispatchError::NotFound { job_id, .. }
            | DispatchError::MalformedResponse { job_id, .. } => Some(job_id),
            DispatchError::Timeout { job, .. } | DispatchError::Cancelled { job } => {
                Some(&job.job_id)
            }
            _ => None,
        }
    }

    /// Last observed job for errors that leave it re-pollable.
    pub fn last_job(&self) -> Option<&Job> {
        match self {
            DispatchError::Timeout { job, .. } | DispatchError::Cancelled { job } => Some(job),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloner_models::JobKind;

    #[test]
    fn test_timeout_keeps_job() {
        let job = Job::submitted(JobId::from_string("t1"), JobKind::Video, "sora-2", None);
        let err = DispatchError::Timeout {
            job: Box::new(job),
            waited: Duration::from_secs(900),
        };
        assert_eq!(err.kind(), "timeout");
        assert_eq!(err.job_id().map(|j| j.as_str()), Some("t1"));
        assert!(err.to_string().contains("t1"));
        assert!(err.last_job().is_some());
    }
}
