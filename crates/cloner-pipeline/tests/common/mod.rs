//! Shared fakes for pipeline tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use cloner_jobs::{
    ApiResult, BackoffSchedule, DispatcherConfig, GenerationApi, GenerationRequest,
    JobDispatcher, SchedulePolicy, SpendApproval, StatusRetry,
};
use cloner_media::{CombineRequest, Combiner, Downloader, MediaResult};
use cloner_models::{
    CostEstimate, GenerationModel, JobId, NewSceneRecord, ProjectName, SceneNumber, SceneRecord,
    StatusReport,
};
use cloner_pipeline::{
    ApprovalGate, AutoApprove, PipelineConfig, PipelineResult, ProjectContext, Services, Stage,
};
use cloner_records::MemorySceneStore;

/// Completes every job on its first status check with a URL derived from
/// the prompt, so tests can tell which scene a result belongs to.
#[derive(Default)]
pub struct FakeApi {
    submitted: Mutex<Vec<GenerationRequest>>,
    next_id: AtomicUsize,
    jobs: Mutex<Vec<(String, String)>>,
}

impl FakeApi {
    pub fn submitted(&self) -> Vec<GenerationRequest> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn prompts(&self) -> Vec<String> {
        let mut prompts: Vec<String> = self.submitted().into_iter().map(|r| r.prompt).collect();
        prompts.sort();
        prompts
    }
}

fn slug(prompt: &str) -> String {
    prompt.replace(' ', "-")
}

#[async_trait]
impl GenerationApi for FakeApi {
    async fn submit(&self, request: &GenerationRequest) -> ApiResult<JobId> {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("job-{n}");
        let ext = if request.model == GenerationModel::Sora2 {
            "mp4"
        } else {
            "png"
        };
        self.jobs
            .lock()
            .unwrap()
            .push((id.clone(), format!("https://cdn.test/{}.{ext}", slug(&request.prompt))));
        self.submitted.lock().unwrap().push(request.clone());
        Ok(JobId::from_string(id))
    }

    async fn get_status(&self, job_id: &JobId) -> ApiResult<StatusReport> {
        let jobs = self.jobs.lock().unwrap();
        let (_, url) = jobs
            .iter()
            .find(|(id, _)| id == job_id.as_str())
            .expect("status for unknown job");
        Ok(StatusReport::completed(url.clone()))
    }

    async fn upload_reference(&self, _path: &Path) -> ApiResult<String> {
        Ok("https://cdn.test/reference.png".to_string())
    }
}

/// Writes a small placeholder file for every URL.
#[derive(Default)]
pub struct FakeDownloader {
    urls: Mutex<Vec<String>>,
}

impl FakeDownloader {
    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Downloader for FakeDownloader {
    async fn download(&self, url: &str, dest: &Path) -> MediaResult<u64> {
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(dest, url.as_bytes())?;
        self.urls.lock().unwrap().push(url.to_string());
        Ok(url.len() as u64)
    }
}

/// Records the clip order it was asked to combine and writes the output.
#[derive(Default)]
pub struct RecordingCombiner {
    requests: Mutex<Vec<CombineRequest>>,
}

impl RecordingCombiner {
    pub fn requests(&self) -> Vec<CombineRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Combiner for RecordingCombiner {
    async fn combine(&self, request: &CombineRequest) -> MediaResult<PathBuf> {
        if let Some(parent) = request.output.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&request.output, b"combined")?;
        self.requests.lock().unwrap().push(request.clone());
        Ok(request.output.clone())
    }
}

/// Declines every spend.
pub struct DeclineAll;

#[async_trait]
impl ApprovalGate for DeclineAll {
    async fn approve(
        &self,
        _stage: Stage,
        _estimate: &CostEstimate,
    ) -> PipelineResult<Option<SpendApproval>> {
        Ok(None)
    }
}

pub fn fast_dispatcher(api: Arc<FakeApi>) -> JobDispatcher {
    let schedule =
        BackoffSchedule::new(vec![], Duration::from_millis(100), Duration::from_secs(30)).unwrap();
    JobDispatcher::new(
        api,
        DispatcherConfig {
            schedules: SchedulePolicy::uniform(schedule),
            status_retry: StatusRetry::default(),
        },
    )
}

pub fn project() -> ProjectName {
    ProjectName::new("Resume Test").unwrap()
}

pub fn record(n: u32) -> SceneRecord {
    SceneRecord::created(
        format!("rec{n}"),
        NewSceneRecord {
            project_name: project(),
            scene_number: SceneNumber::new(n).unwrap(),
            scene_description: format!("scene {n} description"),
            image_prompt: format!("image prompt {n}"),
            video_prompt: format!("video prompt {n}"),
        },
    )
}

pub fn record_with_image(n: u32) -> SceneRecord {
    let mut r = record(n);
    r.attach_image(format!("https://cdn.test/existing-image-{n}.png"));
    r
}

pub fn record_with_video(n: u32) -> SceneRecord {
    let mut r = record_with_image(n);
    r.attach_video(format!("https://cdn.test/existing-video-{n}.mp4"))
        .unwrap();
    r
}

/// Everything a stage test needs, backed by fakes and a temp directory.
pub struct Harness {
    pub dir: TempDir,
    pub ctx: ProjectContext,
    pub store: Arc<MemorySceneStore>,
    pub api: Arc<FakeApi>,
    pub downloader: Arc<FakeDownloader>,
    pub combiner: Arc<RecordingCombiner>,
}

impl Harness {
    pub async fn with_records(records: Vec<SceneRecord>) -> Self {
        let dir = TempDir::new().unwrap();
        let config = PipelineConfig {
            work_dir: dir.path().join("outputs"),
            inputs_dir: dir.path().join("inputs"),
            ..PipelineConfig::default()
        };
        let ctx = ProjectContext::new(project(), &config);

        let store = Arc::new(MemorySceneStore::new());
        for r in records {
            store.insert(r).await;
        }

        Self {
            dir,
            ctx,
            store,
            api: Arc::new(FakeApi::default()),
            downloader: Arc::new(FakeDownloader::default()),
            combiner: Arc::new(RecordingCombiner::default()),
        }
    }

    pub fn services(&self) -> Services {
        self.services_with(Arc::new(AutoApprove))
    }

    pub fn services_with(&self, approval: Arc<dyn ApprovalGate>) -> Services {
        Services::new(approval)
            .with_store(self.store.clone())
            .with_dispatcher(fast_dispatcher(self.api.clone()))
            .with_downloader(self.downloader.clone())
            .with_combiner(self.combiner.clone())
    }

    pub fn dry_run(mut self) -> Self {
        self.ctx = self.ctx.clone().with_dry_run(true);
        self
    }
}
