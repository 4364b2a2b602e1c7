//! Job dispatcher and completion poller.
//!
//! `submit` charges the spend approval and creates a vendor job.
//! `await_completion` sleeps on the job kind's backoff schedule between
//! status checks until the job is completed or failed, the overall timeout
//! passes, or the caller cancels. Cancelling only stops local polling; the
//! vendor job keeps running and can be polled again by id.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};

use cloner_models::{Job, JobKind, JobStatus, ModelError, StatusReport};

use crate::api::{ApiError, GenerationApi, GenerationRequest};
use crate::approval::SpendApproval;
use crate::error::{DispatchError, DispatchResult};
use crate::metrics::{record_outcome, record_status_check, record_submission};
use crate::schedule::SchedulePolicy;

// =============================================================================
// Configuration
// =============================================================================

/// Bounded retry of a single status check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusRetry {
    /// Total attempts per check, including the first.
    pub attempts: u32,
    /// Delay after the first failure; doubles after each further failure.
    pub base_delay: Duration,
}

impl Default for StatusRetry {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl StatusRetry {
    fn delay_after(&self, failed_attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(failed_attempt.saturating_sub(1)))
    }
}

/// Dispatcher configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatcherConfig {
    pub schedules: SchedulePolicy,
    pub status_retry: StatusRetry,
}

// =============================================================================
// Dispatcher
// =============================================================================

/// Submits generation jobs and waits for them to finish.
#[derive(Clone)]
pub struct JobDispatcher {
    api: Arc<dyn GenerationApi>,
    config: DispatcherConfig,
    cancel: Option<watch::Receiver<bool>>,
}

impl JobDispatcher {
    pub fn new(api: Arc<dyn GenerationApi>, config: DispatcherConfig) -> Self {
        Self {
            api,
            config,
            cancel: None,
        }
    }

    /// Stop waiting as soon as the channel carries `true`.
    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Whether the cancel channel has fired. No new jobs are submitted after that.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|rx| *rx.borrow())
    }

    pub fn api(&self) -> &Arc<dyn GenerationApi> {
        &self.api
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Submit a paid generation job.
    ///
    /// The model's unit cost is reserved on `approval` first and released
    /// again if the vendor rejects the request.
    pub async fn submit(
        &self,
        kind: JobKind,
        request: &GenerationRequest,
        approval: &SpendApproval,
    ) -> DispatchResult<Job> {
        if request.kind() != kind {
            return Err(DispatchError::Submission(format!(
                "model {} does not produce {} jobs",
                request.model, kind
            )));
        }
        request.check().map_err(DispatchError::Submission)?;
        if self.is_cancelled() {
            return Err(DispatchError::CancelledBeforeSubmit);
        }

        let cost = request.model.unit_cost();
        approval.reserve(cost)?;

        let span = info_span!("generation_submit", kind = %kind, model = %request.model);
        let job_id = match self.api.submit(request).instrument(span).await {
            Ok(id) => id,
            Err(e) => {
                approval.release(cost);
                return Err(match e {
                    ApiError::InsufficientCredits(msg) => DispatchError::Quota(msg),
                    other => DispatchError::Submission(other.to_string()),
                });
            }
        };

        record_submission(kind.as_str(), request.model.cli_name());
        info!(
            job_id = %job_id,
            kind = %kind,
            model = %request.model,
            cost = %cost,
            "Generation job submitted"
        );

        Ok(Job::submitted(
            job_id,
            kind,
            request.model.vendor_id(),
            request.input_reference(),
        ))
    }

    /// Submit and wait in one call.
    pub async fn run(
        &self,
        kind: JobKind,
        request: &GenerationRequest,
        approval: &SpendApproval,
    ) -> DispatchResult<Job> {
        let job = self.submit(kind, request, approval).await?;
        self.await_completion(job).await
    }

    /// Wait until `job` is completed or failed.
    ///
    /// A vendor-side failure is returned as `Ok` with a failed job. The
    /// returned job is always terminal; non-terminal jobs only come back
    /// inside `Timeout` or `Cancelled`.
    pub async fn await_completion(&self, job: Job) -> DispatchResult<Job> {
        if job.is_terminal() {
            return Ok(job);
        }

        let span = info_span!("generation_poll", job_id = %job.job_id, kind = %job.kind);
        self.poll_until_terminal(job).instrument(span).await
    }

    async fn poll_until_terminal(&self, mut job: Job) -> DispatchResult<Job> {
        let schedule = self.config.schedules.for_kind(job.kind);
        let mut cancel = self.cancel.clone();
        let started = Instant::now();
        let mut checks = 0u32;

        loop {
            let elapsed = started.elapsed();
            let wait = schedule.interval_at(elapsed);
            if elapsed + wait > schedule.timeout() {
                warn!(
                    status = %job.status(),
                    checks,
                    waited_secs = elapsed.as_secs(),
                    "Gave up waiting for generation job"
                );
                record_outcome(job.kind.as_str(), "timeout", elapsed.as_secs_f64());
                return Err(DispatchError::Timeout {
                    job: Box::new(job),
                    waited: elapsed,
                });
            }

            if Self::pause(&mut cancel, wait).await {
                info!(status = %job.status(), "Stopped polling on cancellation");
                record_outcome(job.kind.as_str(), "cancelled", started.elapsed().as_secs_f64());
                return Err(DispatchError::Cancelled { job: Box::new(job) });
            }

            checks += 1;
            let report = self.check_status(&job).await?;
            let job_id = job.job_id.clone();
            match job.observe(report) {
                Ok(true) => debug!(status = %job.status(), checks, "Job status changed"),
                Ok(false) => debug!(status = %job.status(), checks, "Job still running"),
                Err(ModelError::MissingResult(_)) => {
                    record_outcome(job.kind.as_str(), "malformed", started.elapsed().as_secs_f64());
                    return Err(DispatchError::MalformedResponse {
                        job_id,
                        message: "completed without a result URL".to_string(),
                    });
                }
                Err(e) => return Err(DispatchError::InvalidTransition(e)),
            }

            if job.is_terminal() {
                let waited = started.elapsed();
                match job.status() {
                    JobStatus::Completed => info!(
                        checks,
                        waited_secs = waited.as_secs(),
                        "Generation job completed"
                    ),
                    _ => warn!(
                        checks,
                        error = job.error_detail().unwrap_or_default(),
                        "Generation job failed at vendor"
                    ),
                }
                record_outcome(job.kind.as_str(), job.status().as_str(), waited.as_secs_f64());
                return Ok(job);
            }
        }
    }

    /// One status check, retrying transient failures a bounded number of times.
    async fn check_status(&self, job: &Job) -> DispatchResult<StatusReport> {
        let retry = self.config.status_retry;
        let attempts = retry.attempts.max(1);
        let kind = job.kind.as_str();

        for attempt in 1..=attempts {
            match self.api.get_status(&job.job_id).await {
                Ok(report) => {
                    record_status_check(kind, "ok");
                    return Ok(report);
                }
                Err(e) if e.is_transient() => {
                    record_status_check(kind, "transient");
                    if attempt == attempts {
                        return Err(DispatchError::TransientPoll {
                            job_id: job.job_id.clone(),
                            attempts,
                            message: e.to_string(),
                        });
                    }
                    let delay = retry.delay_after(attempt);
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Status check failed, retrying: {}",
                        e
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(ApiError::Http { status, message }) if (400..500).contains(&status) => {
                    record_status_check(kind, "not_found");
                    if status == 401 || status == 403 {
                        return Err(DispatchError::Config(format!(
                            "status check unauthorized ({status}): {message}"
                        )));
                    }
                    return Err(DispatchError::NotFound {
                        job_id: job.job_id.clone(),
                        message,
                    });
                }
                Err(e) => {
                    record_status_check(kind, "malformed");
                    return Err(DispatchError::MalformedResponse {
                        job_id: job.job_id.clone(),
                        message: e.to_string(),
                    });
                }
            }
        }

        Err(DispatchError::TransientPoll {
            job_id: job.job_id.clone(),
            attempts,
            message: "no status check attempted".to_string(),
        })
    }

    /// Sleep for `wait`. Returns `true` if cancelled first.
    async fn pause(cancel: &mut Option<watch::Receiver<bool>>, wait: Duration) -> bool {
        let deadline = Instant::now() + wait;
        let Some(rx) = cancel.as_mut() else {
            tokio::time::sleep_until(deadline).await;
            return false;
        };

        loop {
            if *rx.borrow_and_update() {
                return true;
            }
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => return false,
                changed = rx.changed() => {
                    if changed.is_err() {
                        // Sender gone: nobody can cancel any more.
                        tokio::time::sleep_until(deadline).await;
                        return false;
                    }
                }
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use cloner_models::{Cost, GenerationModel, JobId};

    use crate::api::MockGenerationApi;
    use crate::schedule::BackoffSchedule;

    fn dispatcher(mock: MockGenerationApi) -> JobDispatcher {
        JobDispatcher::new(Arc::new(mock), DispatcherConfig::default())
    }

    fn image_job() -> Job {
        Job::submitted(JobId::from_string("img-1"), JobKind::Image, "z-image", None)
    }

    fn video_job() -> Job {
        Job::submitted(
            JobId::from_string("vid-1"),
            JobKind::Video,
            "sora-2-image-to-video",
            Some("https://cdn/i.png".to_string()),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_completes_on_third_check_with_spacing() {
        let calls: Arc<Mutex<Vec<Instant>>> = Arc::new(Mutex::new(Vec::new()));
        let seen = calls.clone();

        let mut mock = MockGenerationApi::new();
        mock.expect_get_status().times(3).returning(move |_| {
            let mut seen = seen.lock().unwrap();
            seen.push(Instant::now());
            Ok(match seen.len() {
                1 => StatusReport::queued(),
                2 => StatusReport::processing(),
                _ => StatusReport::completed("https://cdn/out.png"),
            })
        });

        let start = Instant::now();
        let job = dispatcher(mock).await_completion(image_job()).await.unwrap();

        assert_eq!(job.status(), JobStatus::Completed);
        assert_eq!(job.result_reference(), Some("https://cdn/out.png"));

        let min = BackoffSchedule::image_default().min_interval();
        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 3);
        assert!(calls[0] - start >= min);
        for pair in calls.windows(2) {
            assert!(pair[1] - pair[0] >= min);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_vendor_failure_is_returned_without_retry() {
        let mut mock = MockGenerationApi::new();
        mock.expect_get_status()
            .times(1)
            .returning(|_| Ok(StatusReport::failed("unsafe content")));

        let job = dispatcher(mock).await_completion(video_job()).await.unwrap();
        assert_eq!(job.status(), JobStatus::Failed);
        assert_eq!(job.error_detail(), Some("unsafe content"));
        assert!(job.result_reference().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_carries_last_observed_job() {
        let mut mock = MockGenerationApi::new();
        mock.expect_get_status()
            .times(2)
            .returning(|_| Ok(StatusReport::processing()));

        let schedule =
            BackoffSchedule::new(vec![], Duration::from_secs(5), Duration::from_secs(12)).unwrap();
        let config = DispatcherConfig {
            schedules: SchedulePolicy::uniform(schedule),
            ..Default::default()
        };
        let err = JobDispatcher::new(Arc::new(mock), config)
            .await_completion(image_job())
            .await
            .unwrap_err();

        match err {
            DispatchError::Timeout { job, waited } => {
                assert_eq!(job.job_id.as_str(), "img-1");
                assert_eq!(job.status(), JobStatus::Processing);
                assert!(waited <= Duration::from_secs(12));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_are_absorbed() {
        let attempts = Arc::new(Mutex::new(0u32));
        let counter = attempts.clone();

        let mut mock = MockGenerationApi::new();
        mock.expect_get_status().times(3).returning(move |_| {
            let mut n = counter.lock().unwrap();
            *n += 1;
            if *n < 3 {
                Err(ApiError::http(500, "upstream"))
            } else {
                Ok(StatusReport::completed("https://cdn/out.png"))
            }
        });

        let job = dispatcher(mock).await_completion(image_job()).await.unwrap();
        assert_eq!(job.status(), JobStatus::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_escalate_after_bound() {
        let mut mock = MockGenerationApi::new();
        mock.expect_get_status()
            .times(3)
            .returning(|_| Err(ApiError::http(503, "down")));

        let err = dispatcher(mock).await_completion(image_job()).await.unwrap_err();
        assert!(matches!(err, DispatchError::TransientPoll { attempts: 3, .. }));
        assert_eq!(err.job_id().map(|j| j.as_str()), Some("img-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_job_is_not_found() {
        let mut mock = MockGenerationApi::new();
        mock.expect_get_status()
            .times(1)
            .returning(|_| Err(ApiError::http(404, "no such task")));

        let err = dispatcher(mock).await_completion(image_job()).await.unwrap_err();
        assert!(matches!(err, DispatchError::NotFound { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_completed_without_url_is_malformed() {
        let mut mock = MockGenerationApi::new();
        mock.expect_get_status().times(1).returning(|_| {
            Ok(StatusReport {
                status: JobStatus::Completed,
                result_url: None,
                error_detail: None,
            })
        });

        let err = dispatcher(mock).await_completion(image_job()).await.unwrap_err();
        assert!(matches!(err, DispatchError::MalformedResponse { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stops_polling() {
        let mut mock = MockGenerationApi::new();
        mock.expect_get_status().times(0);

        let (tx, rx) = watch::channel(false);
        let dispatcher = dispatcher(mock).with_cancel(rx);
        tx.send(true).unwrap();

        let err = dispatcher.await_completion(video_job()).await.unwrap_err();
        match err {
            DispatchError::Cancelled { job } => {
                assert_eq!(job.job_id.as_str(), "vid-1");
                assert_eq!(job.status(), JobStatus::Queued);
            }
            other => panic!("expected cancellation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_submit_charges_approval() {
        let mut mock = MockGenerationApi::new();
        mock.expect_submit()
            .times(1)
            .returning(|_| Ok(JobId::from_string("task-9")));

        let approval = SpendApproval::new(Cost::from_micros(4_000));
        let request = GenerationRequest::new(GenerationModel::ZImage, "a red apple");
        let job = dispatcher(mock)
            .submit(JobKind::Image, &request, &approval)
            .await
            .unwrap();

        assert_eq!(job.job_id.as_str(), "task-9");
        assert_eq!(job.status(), JobStatus::Queued);
        assert_eq!(job.model, "z-image");
        assert_eq!(approval.remaining(), Cost::ZERO);
    }

    #[tokio::test]
    async fn test_submit_after_cancel_never_calls_vendor() {
        let mut mock = MockGenerationApi::new();
        mock.expect_submit().times(0);

        let (tx, rx) = watch::channel(false);
        let dispatcher = dispatcher(mock).with_cancel(rx);
        assert!(!dispatcher.is_cancelled());
        tx.send(true).unwrap();
        assert!(dispatcher.is_cancelled());

        let approval = SpendApproval::new(Cost::from_micros(4_000));
        let request = GenerationRequest::new(GenerationModel::ZImage, "a red apple");
        let err = dispatcher
            .run(JobKind::Image, &request, &approval)
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::CancelledBeforeSubmit));
        assert_eq!(err.kind(), "cancelled");
        assert!(err.job_id().is_none());
        assert_eq!(approval.spent(), Cost::ZERO);
    }

    #[tokio::test]
    async fn test_submit_without_budget_never_calls_vendor() {
        let mut mock = MockGenerationApi::new();
        mock.expect_submit().times(0);

        let approval = SpendApproval::new(Cost::ZERO);
        let request = GenerationRequest::new(GenerationModel::ZImage, "a red apple");
        let err = dispatcher(mock)
            .submit(JobKind::Image, &request, &approval)
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::BudgetExceeded { .. }));
    }

    #[tokio::test]
    async fn test_quota_error_releases_reservation() {
        let mut mock = MockGenerationApi::new();
        mock.expect_submit()
            .times(1)
            .returning(|_| Err(ApiError::InsufficientCredits("balance 0".to_string())));

        let approval = SpendApproval::new(Cost::from_micros(500_000));
        let request = GenerationRequest::new(GenerationModel::Sora2, "walk")
            .with_reference("https://cdn/i.png");
        let err = dispatcher(mock)
            .submit(JobKind::Video, &request, &approval)
            .await
            .unwrap_err();

        assert!(matches!(err, DispatchError::Quota(_)));
        assert_eq!(approval.spent(), Cost::ZERO);
    }

    #[tokio::test]
    async fn test_submit_rejection_is_submission_error() {
        let mut mock = MockGenerationApi::new();
        mock.expect_submit()
            .times(1)
            .returning(|_| Err(ApiError::Rejected("invalid aspect ratio".to_string())));

        let approval = SpendApproval::new(Cost::from_micros(4_000));
        let request = GenerationRequest::new(GenerationModel::ZImage, "a red apple");
        let err = dispatcher(mock)
            .submit(JobKind::Image, &request, &approval)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "submission");
    }

    #[tokio::test]
    async fn test_kind_mismatch_is_rejected_locally() {
        let mut mock = MockGenerationApi::new();
        mock.expect_submit().times(0);

        let approval = SpendApproval::new(Cost::from_micros(1_000_000));
        let request = GenerationRequest::new(GenerationModel::ZImage, "a red apple");
        let err = dispatcher(mock)
            .submit(JobKind::Video, &request, &approval)
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Submission(_)));
        assert_eq!(approval.spent(), Cost::ZERO);
    }

    #[test]
    fn test_status_retry_delays_double() {
        let retry = StatusRetry {
            attempts: 3,
            base_delay: Duration::from_millis(100),
        };
        assert_eq!(retry.delay_after(1), Duration::from_millis(100));
        assert_eq!(retry.delay_after(2), Duration::from_millis(200));
    }
}
