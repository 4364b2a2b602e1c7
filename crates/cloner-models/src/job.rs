//! Generation job definitions.
//!
//! A [`Job`] lives for a single polling cycle: it is created by a
//! submission, mutated by status observations, and discarded once the
//! caller has copied its result into a scene record.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

/// Vendor-assigned identifier for a generation job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a job produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Image,
    Video,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Image => "image",
            JobKind::Video => "video",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "image" => Ok(JobKind::Image),
            "video" => Ok(JobKind::Video),
            other => Err(ModelError::invalid_field("job kind", other)),
        }
    }
}

/// Job processing status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Accepted by the vendor, not started
    #[default]
    Queued,
    /// Vendor is generating
    Processing,
    /// Finished with a result reference
    Completed,
    /// Finished with an error detail
    Failed,
}

impl JobStatus {
    /// Get string representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Check if this is a terminal state (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One vendor answer to a status query, already mapped to our vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub status: JobStatus,
    pub result_url: Option<String>,
    pub error_detail: Option<String>,
}

impl StatusReport {
    pub fn queued() -> Self {
        Self {
            status: JobStatus::Queued,
            result_url: None,
            error_detail: None,
        }
    }

    pub fn processing() -> Self {
        Self {
            status: JobStatus::Processing,
            result_url: None,
            error_detail: None,
        }
    }

    pub fn completed(url: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Completed,
            result_url: Some(url.into()),
            error_detail: None,
        }
    }

    pub fn failed(detail: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Failed,
            result_url: None,
            error_detail: Some(detail.into()),
        }
    }
}

/// A submitted generation job.
///
/// The status fields are private so that every change goes through
/// [`Job::observe`], which allows exactly one transition into a terminal
/// state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "JobFields")]
pub struct Job {
    pub job_id: JobId,
    pub kind: JobKind,
    /// Model identifier the job was submitted with
    pub model: String,
    pub submitted_at: DateTime<Utc>,
    /// Image or prompt reference the job was built from
    pub input_reference: Option<String>,
    status: JobStatus,
    result_reference: Option<String>,
    error_detail: Option<String>,
}

impl Job {
    /// Create a freshly submitted job in `Queued`.
    pub fn submitted(
        job_id: JobId,
        kind: JobKind,
        model: impl Into<String>,
        input_reference: Option<String>,
    ) -> Self {
        Self {
            job_id,
            kind,
            model: model.into(),
            submitted_at: Utc::now(),
            input_reference,
            status: JobStatus::Queued,
            result_reference: None,
            error_detail: None,
        }
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    /// Result URL, set only when completed.
    pub fn result_reference(&self) -> Option<&str> {
        self.result_reference.as_deref()
    }

    /// Vendor failure detail, set only when failed.
    pub fn error_detail(&self) -> Option<&str> {
        self.error_detail.as_deref()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Apply a status report.
    ///
    /// Returns `Ok(true)` when the status changed. A report that would move
    /// the job backwards (processing to queued) is ignored. Terminal jobs
    /// reject every report, and a completed report must carry a result URL.
    pub fn observe(&mut self, report: StatusReport) -> ModelResult<bool> {
        if self.status.is_terminal() {
            return Err(ModelError::AlreadyTerminal {
                job_id: self.job_id.to_string(),
                status: self.status,
                attempted: report.status,
            });
        }

        match report.status {
            JobStatus::Queued => Ok(false),
            JobStatus::Processing => {
                let changed = self.status != JobStatus::Processing;
                self.status = JobStatus::Processing;
                Ok(changed)
            }
            JobStatus::Completed => {
                let url = report
                    .result_url
                    .filter(|u| !u.trim().is_empty())
                    .ok_or_else(|| ModelError::MissingResult(self.job_id.to_string()))?;
                self.status = JobStatus::Completed;
                self.result_reference = Some(url);
                Ok(true)
            }
            JobStatus::Failed => {
                self.status = JobStatus::Failed;
                self.error_detail = Some(
                    report
                        .error_detail
                        .filter(|d| !d.trim().is_empty())
                        .unwrap_or_else(|| "vendor reported failure without detail".to_string()),
                );
                Ok(true)
            }
        }
    }
}

/// Unchecked wire form of [`Job`]; deserialization goes through
/// `TryFrom` so a stored job can never hold an impossible status.
#[derive(Deserialize)]
struct JobFields {
    job_id: JobId,
    kind: JobKind,
    model: String,
    submitted_at: DateTime<Utc>,
    #[serde(default)]
    input_reference: Option<String>,
    status: JobStatus,
    #[serde(default)]
    result_reference: Option<String>,
    #[serde(default)]
    error_detail: Option<String>,
}

impl TryFrom<JobFields> for Job {
    type Error = ModelError;

    fn try_from(f: JobFields) -> Result<Self, Self::Error> {
        let has_result = f.result_reference.as_deref().is_some_and(|u| !u.trim().is_empty());
        match f.status {
            JobStatus::Completed if !has_result => {
                return Err(ModelError::MissingResult(f.job_id.to_string()));
            }
            JobStatus::Completed => {}
            _ if f.result_reference.is_some() => {
                return Err(ModelError::invalid_field(
                    "job",
                    format!("{} is {} but carries a result reference", f.job_id, f.status),
                ));
            }
            JobStatus::Failed => {}
            _ if f.error_detail.is_some() => {
                return Err(ModelError::invalid_field(
                    "job",
                    format!("{} is {} but carries a failure detail", f.job_id, f.status),
                ));
            }
            _ => {}
        }

        Ok(Self {
            job_id: f.job_id,
            kind: f.kind,
            model: f.model,
            submitted_at: f.submitted_at,
            input_reference: f.input_reference,
            status: f.status,
            result_reference: f.result_reference,
            error_detail: f.error_detail,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> Job {
        Job::submitted(JobId::from_string("task-1"), JobKind::Image, "z-image", None)
    }

    #[test]
    fn test_new_job_is_queued() {
        let job = job();
        assert_eq!(job.status(), JobStatus::Queued);
        assert!(job.result_reference().is_none());
        assert!(job.error_detail().is_none());
    }

    #[test]
    fn test_queued_to_processing_to_completed() {
        let mut job = job();
        assert!(job.observe(StatusReport::processing()).unwrap());
        assert!(!job.observe(StatusReport::processing()).unwrap());
        assert!(job
            .observe(StatusReport::completed("https://cdn.example/a.png"))
            .unwrap());
        assert_eq!(job.status(), JobStatus::Completed);
        assert_eq!(job.result_reference(), Some("https://cdn.example/a.png"));
    }

    #[test]
    fn test_backwards_report_is_ignored() {
        let mut job = job();
        job.observe(StatusReport::processing()).unwrap();
        assert!(!job.observe(StatusReport::queued()).unwrap());
        assert_eq!(job.status(), JobStatus::Processing);
    }

    #[test]
    fn test_terminal_rejects_further_transitions() {
        let mut job = job();
        job.observe(StatusReport::failed("unsafe content")).unwrap();

        let err = job
            .observe(StatusReport::completed("https://cdn.example/a.png"))
            .unwrap_err();
        assert!(matches!(err, ModelError::AlreadyTerminal { .. }));
        assert_eq!(job.status(), JobStatus::Failed);
        assert_eq!(job.error_detail(), Some("unsafe content"));
        assert!(job.result_reference().is_none());
    }

    #[test]
    fn test_completed_without_url_is_rejected() {
        let mut job = job();
        let report = StatusReport {
            status: JobStatus::Completed,
            result_url: Some("  ".to_string()),
            error_detail: None,
        };
        assert!(matches!(
            job.observe(report),
            Err(ModelError::MissingResult(_))
        ));
        assert_eq!(job.status(), JobStatus::Queued);
    }

    #[test]
    fn test_failed_without_detail_gets_placeholder() {
        let mut job = job();
        let report = StatusReport {
            status: JobStatus::Failed,
            result_url: None,
            error_detail: None,
        };
        job.observe(report).unwrap();
        assert!(job.error_detail().is_some());
    }

    #[test]
    fn test_deserialize_round_trips_completed_job() {
        let mut job = job();
        job.observe(StatusReport::completed("https://cdn.example/a.png")).unwrap();
        let json = serde_json::to_string(&job).unwrap();
        let back: Job = serde_json::from_str(&json).unwrap();
        assert_eq!(back, job);
    }

    #[test]
    fn test_deserialize_rejects_completed_without_result() {
        let mut value = serde_json::to_value(job()).unwrap();
        value["status"] = serde_json::json!("completed");
        let err = serde_json::from_value::<Job>(value).unwrap_err();
        assert!(err.to_string().contains("without a result reference"), "{err}");
    }

    #[test]
    fn test_deserialize_rejects_result_on_running_job() {
        let mut value = serde_json::to_value(job()).unwrap();
        value["status"] = serde_json::json!("processing");
        value["result_reference"] = serde_json::json!("https://cdn.example/a.png");
        assert!(serde_json::from_value::<Job>(value).is_err());
    }

    #[test]
    fn test_job_kind_parse() {
        assert_eq!("Video".parse::<JobKind>().unwrap(), JobKind::Video);
        assert!("audio".parse::<JobKind>().is_err());
    }
}
