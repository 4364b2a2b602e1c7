//! External services used by the stages.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

use cloner_gemini::{
    AnalysisService, GeminiClient, GeminiConfig, PromptService, PromptSynthesizer, VideoAnalyzer,
};
use cloner_jobs::{JobDispatcher, KieClient, KieConfig};
use cloner_media::{Combiner, Downloader, FfmpegCombiner, HttpDownloader};
use cloner_records::{AirtableClient, SceneRepository, SceneStore};

use crate::approval::ApprovalGate;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::stage::Stage;

/// Kie.ai-backed dispatcher configured from the environment.
pub fn dispatcher_from_env(
    config: &PipelineConfig,
    cancel: watch::Receiver<bool>,
) -> PipelineResult<JobDispatcher> {
    let kie = KieClient::new(KieConfig::from_env()?)?;
    Ok(JobDispatcher::new(Arc::new(kie), config.dispatcher_config()?).with_cancel(cancel))
}

/// The services a run needs. Missing ones fail only when a stage asks for them.
#[derive(Clone)]
pub struct Services {
    store: Option<Arc<dyn SceneStore>>,
    analyzer: Option<Arc<dyn AnalysisService>>,
    prompter: Option<Arc<dyn PromptService>>,
    dispatcher: Option<JobDispatcher>,
    downloader: Option<Arc<dyn Downloader>>,
    combiner: Option<Arc<dyn Combiner>>,
    approval: Arc<dyn ApprovalGate>,
    max_image_jobs: usize,
    max_video_jobs: usize,
}

impl Services {
    pub fn new(approval: Arc<dyn ApprovalGate>) -> Self {
        let defaults = PipelineConfig::default();
        Self {
            store: None,
            analyzer: None,
            prompter: None,
            dispatcher: None,
            downloader: None,
            combiner: None,
            approval,
            max_image_jobs: defaults.max_image_jobs,
            max_video_jobs: defaults.max_video_jobs,
        }
    }

    /// Build the clients `stages` need from the environment.
    ///
    /// Dry runs skip clients that can only be used for paid or writing calls.
    pub fn from_env(
        config: &PipelineConfig,
        stages: &[Stage],
        dry_run: bool,
        approval: Arc<dyn ApprovalGate>,
        cancel: watch::Receiver<bool>,
    ) -> PipelineResult<Self> {
        let needs = |s: Stage| stages.contains(&s);
        let mut services = Self::new(approval).with_concurrency(config.max_image_jobs, config.max_video_jobs);

        if needs(Stage::Log) || needs(Stage::Images) || needs(Stage::Videos) || needs(Stage::Combine) {
            let client = AirtableClient::from_env()?;
            let repository = SceneRepository::new(client)
                .with_extended_fields(config.airtable_extended_fields);
            services = services.with_store(Arc::new(repository));
        }

        if !dry_run && (needs(Stage::Analyze) || needs(Stage::Prompts)) {
            let gemini_config = GeminiConfig::from_env()?;
            if needs(Stage::Analyze) {
                let client = GeminiClient::new(gemini_config.clone())?;
                services = services.with_analyzer(Arc::new(VideoAnalyzer::new(client)));
            }
            if needs(Stage::Prompts) {
                let client = GeminiClient::new(gemini_config)?;
                services = services.with_prompter(Arc::new(PromptSynthesizer::new(client)));
            }
        }

        if !dry_run && stages.iter().any(Stage::is_paid) {
            services = services.with_dispatcher(dispatcher_from_env(config, cancel.clone())?);
        }

        if !dry_run && (needs(Stage::Videos) || needs(Stage::Combine)) {
            let downloader = HttpDownloader::new(config.download_timeout)?;
            services = services.with_downloader(Arc::new(downloader));
        }

        if !dry_run && needs(Stage::Combine) {
            let combiner = FfmpegCombiner::new(config.combine_timeout).with_cancel(cancel);
            services = services.with_combiner(Arc::new(combiner));
        }

        debug!(?stages, dry_run, "Services configured");
        Ok(services)
    }

    pub fn with_store(mut self, store: Arc<dyn SceneStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_analyzer(mut self, analyzer: Arc<dyn AnalysisService>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    pub fn with_prompter(mut self, prompter: Arc<dyn PromptService>) -> Self {
        self.prompter = Some(prompter);
        self
    }

    pub fn with_dispatcher(mut self, dispatcher: JobDispatcher) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn with_downloader(mut self, downloader: Arc<dyn Downloader>) -> Self {
        self.downloader = Some(downloader);
        self
    }

    pub fn with_combiner(mut self, combiner: Arc<dyn Combiner>) -> Self {
        self.combiner = Some(combiner);
        self
    }

    /// Concurrent generation jobs per stage, each at least 1.
    pub fn with_concurrency(mut self, image_jobs: usize, video_jobs: usize) -> Self {
        self.max_image_jobs = image_jobs.max(1);
        self.max_video_jobs = video_jobs.max(1);
        self
    }

    pub fn store(&self) -> PipelineResult<&Arc<dyn SceneStore>> {
        self.store.as_ref().ok_or_else(|| missing("record store"))
    }

    pub fn analyzer(&self) -> PipelineResult<&Arc<dyn AnalysisService>> {
        self.analyzer.as_ref().ok_or_else(|| missing("analysis service"))
    }

    pub fn prompter(&self) -> PipelineResult<&Arc<dyn PromptService>> {
        self.prompter.as_ref().ok_or_else(|| missing("prompt service"))
    }

    pub fn dispatcher(&self) -> PipelineResult<&JobDispatcher> {
        self.dispatcher.as_ref().ok_or_else(|| missing("generation API"))
    }

    pub fn downloader(&self) -> PipelineResult<&Arc<dyn Downloader>> {
        self.downloader.as_ref().ok_or_else(|| missing("downloader"))
    }

    pub fn combiner(&self) -> PipelineResult<&Arc<dyn Combiner>> {
        self.combiner.as_ref().ok_or_else(|| missing("media combiner"))
    }

    pub fn approval(&self) -> &Arc<dyn ApprovalGate> {
        &self.approval
    }

    pub fn max_image_jobs(&self) -> usize {
        self.max_image_jobs
    }

    pub fn max_video_jobs(&self) -> usize {
        self.max_video_jobs
    }
}

fn missing(what: &str) -> PipelineError {
    PipelineError::config(format!("no {what} configured for this run"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::AutoApprove;
    use cloner_records::MemorySceneStore;

    #[test]
    fn test_missing_service_is_config_error() {
        let services = Services::new(Arc::new(AutoApprove));
        let err = services.dispatcher().err().unwrap();
        assert_eq!(err.kind(), "configuration");
        assert!(services.store().is_err());
    }

    #[test]
    fn test_builder_and_concurrency_floor() {
        let services = Services::new(Arc::new(AutoApprove))
            .with_store(Arc::new(MemorySceneStore::new()))
            .with_concurrency(0, 3);
        assert!(services.store().is_ok());
        assert_eq!(services.max_image_jobs(), 1);
        assert_eq!(services.max_video_jobs(), 3);
    }
}
