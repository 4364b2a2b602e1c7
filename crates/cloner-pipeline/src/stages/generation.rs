//! Bounded concurrent generation shared by the images and videos stages.

use std::future::Future;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{info, info_span, warn, Instrument};

use cloner_jobs::{GenerationRequest, JobDispatcher, SpendApproval};
use cloner_models::{JobKind, JobStatus, SceneRecord};

use crate::error::{PipelineError, PipelineResult, SceneFailure};
use crate::stage::Stage;

/// One scene and the job that should produce its asset.
#[derive(Debug, Clone)]
pub struct SceneJob {
    pub record: SceneRecord,
    pub request: GenerationRequest,
}

/// Per-scene results of a generation stage.
#[derive(Debug, Default)]
pub struct GenerationReport {
    /// Records with their new reference persisted
    pub succeeded: Vec<SceneRecord>,
    pub failures: Vec<SceneFailure>,
}

impl GenerationReport {
    /// Fail the stage if any scene failed. Successful scenes stay persisted.
    pub fn into_result(self, stage: Stage) -> PipelineResult<Vec<SceneRecord>> {
        if self.failures.is_empty() {
            Ok(self.succeeded)
        } else {
            Err(PipelineError::SceneFailures {
                stage,
                failures: self.failures,
            })
        }
    }
}

/// Generate every scene's asset with at most `max_concurrent` jobs in flight.
///
/// A scene that fails never stops its siblings. `persist` stores the result
/// URL of each completed job and returns the updated record.
pub async fn generate_scenes<P, Fut>(
    kind: JobKind,
    jobs: Vec<SceneJob>,
    dispatcher: &JobDispatcher,
    approval: &SpendApproval,
    max_concurrent: usize,
    persist: P,
) -> GenerationReport
where
    P: Fn(SceneRecord, String) -> Fut,
    Fut: Future<Output = PipelineResult<SceneRecord>>,
{
    let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));
    let persist = &persist;

    let futures: Vec<_> = jobs
        .into_iter()
        .map(|SceneJob { record, request }| {
            let semaphore = semaphore.clone();
            let scene = record.scene_number;
            let span = info_span!("scene_generation", scene = %scene, kind = %kind);

            async move {
                let result = match semaphore.acquire().await {
                    Ok(_permit) => {
                        // Scenes still queued for a slot must not be submitted after Ctrl-C.
                        if dispatcher.is_cancelled() {
                            return Err(SceneFailure {
                                scene,
                                kind: "cancelled",
                                job_id: None,
                                message: "cancelled before submission".to_string(),
                            });
                        }
                        dispatcher.run(kind, &request, approval).await
                    }
                    Err(_) => {
                        return Err(SceneFailure {
                            scene,
                            kind: "cancelled",
                            job_id: None,
                            message: "job slots closed".to_string(),
                        })
                    }
                };

                let job = match result {
                    Ok(job) => job,
                    Err(e) => {
                        warn!(error = %e, "Scene generation failed");
                        return Err(SceneFailure {
                            scene,
                            kind: e.kind(),
                            job_id: e.job_id().cloned(),
                            message: e.to_string(),
                        });
                    }
                };

                match (job.status(), job.result_reference()) {
                    (JobStatus::Completed, Some(url)) => {
                        let url = url.to_string();
                        match persist(record, url.clone()).await {
                            Ok(updated) => {
                                info!(job_id = %job.job_id, url = %url, "Scene asset stored");
                                Ok(updated)
                            }
                            Err(e) => {
                                warn!(job_id = %job.job_id, error = %e, "Could not store scene asset");
                                Err(SceneFailure {
                                    scene,
                                    kind: e.kind(),
                                    job_id: Some(job.job_id.clone()),
                                    message: e.to_string(),
                                })
                            }
                        }
                    }
                    (status, _) => {
                        let detail = job.error_detail().unwrap_or("no detail given").to_string();
                        warn!(job_id = %job.job_id, %status, detail = %detail, "Vendor did not produce the asset");
                        Err(SceneFailure {
                            scene,
                            kind: "vendor_failed",
                            job_id: Some(job.job_id.clone()),
                            message: detail,
                        })
                    }
                }
            }
            .instrument(span)
        })
        .collect();

    let mut report = GenerationReport::default();
    for result in join_all(futures).await {
        match result {
            Ok(record) => report.succeeded.push(record),
            Err(failure) => report.failures.push(failure),
        }
    }
    report.failures.sort_by_key(|f| f.scene);
    report
}
