//! Re-polling a job left behind by an earlier run.

use cloner_jobs::JobDispatcher;
use cloner_models::{Job, JobId, JobKind};

use crate::error::PipelineResult;

/// Wait for a previously submitted job using the kind's normal schedule.
///
/// Nothing is submitted and nothing is charged.
pub async fn poll_job(dispatcher: &JobDispatcher, kind: JobKind, job_id: &str) -> PipelineResult<Job> {
    let job = Job::submitted(JobId::from_string(job_id), kind, "unknown", None);
    Ok(dispatcher.await_completion(job).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use cloner_jobs::{
        ApiResult, BackoffSchedule, DispatcherConfig, GenerationApi, GenerationRequest,
        SchedulePolicy,
    };
    use cloner_models::{JobStatus, StatusReport};

    struct FinishedApi {
        checks: AtomicU32,
    }

    #[async_trait]
    impl GenerationApi for FinishedApi {
        async fn submit(&self, _request: &GenerationRequest) -> ApiResult<JobId> {
            panic!("re-polling must not submit");
        }

        async fn get_status(&self, job_id: &JobId) -> ApiResult<StatusReport> {
            self.checks.fetch_add(1, Ordering::SeqCst);
            assert_eq!(job_id.as_str(), "old-42");
            Ok(StatusReport::completed("https://cdn/old-42.mp4"))
        }

        async fn upload_reference(&self, _path: &Path) -> ApiResult<String> {
            unreachable!()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_existing_job() {
        let api = Arc::new(FinishedApi {
            checks: AtomicU32::new(0),
        });
        let schedule =
            BackoffSchedule::new(vec![], Duration::from_secs(1), Duration::from_secs(30)).unwrap();
        let dispatcher = JobDispatcher::new(
            api.clone(),
            DispatcherConfig {
                schedules: SchedulePolicy::uniform(schedule),
                ..DispatcherConfig::default()
            },
        );

        let job = poll_job(&dispatcher, JobKind::Video, "old-42").await.unwrap();
        assert_eq!(job.status(), JobStatus::Completed);
        assert_eq!(job.result_reference(), Some("https://cdn/old-42.mp4"));
        assert_eq!(api.checks.load(Ordering::SeqCst), 1);
    }
}
