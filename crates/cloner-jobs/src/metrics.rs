//! Generation job metrics.

use metrics::{counter, histogram};

/// Metric name constants for consistency.
pub mod names {
    /// Jobs accepted by the vendor, by kind and model.
    pub const JOBS_SUBMITTED_TOTAL: &str = "generation_jobs_submitted_total";

    /// Status checks, by kind and outcome.
    pub const STATUS_CHECKS_TOTAL: &str = "generation_status_checks_total";

    /// Terminal outcomes and waiting errors, by kind and outcome.
    pub const JOB_OUTCOMES_TOTAL: &str = "generation_job_outcomes_total";

    /// Time spent waiting for a job, by kind.
    pub const WAIT_SECONDS: &str = "generation_wait_seconds";
}

pub fn record_submission(kind: &str, model: &str) {
    counter!(
        names::JOBS_SUBMITTED_TOTAL,
        "kind" => kind.to_string(),
        "model" => model.to_string()
    )
    .increment(1);
}

pub fn record_status_check(kind: &str, outcome: &'static str) {
    counter!(
        names::STATUS_CHECKS_TOTAL,
        "kind" => kind.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_outcome(kind: &str, outcome: &str, waited_secs: f64) {
    counter!(
        names::JOB_OUTCOMES_TOTAL,
        "kind" => kind.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);

    histogram!(names::WAIT_SECONDS, "kind" => kind.to_string()).record(waited_secs);
}
