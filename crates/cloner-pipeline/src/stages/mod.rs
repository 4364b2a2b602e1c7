//! Stage implementations.
//!
//! Every stage reads its inputs from local artifacts or the record store,
//! so any of them can be re-run on its own after a failure or restart.

pub mod analyze;
pub mod combine;
pub mod generation;
pub mod images;
pub mod log;
pub mod prompts;
pub mod videos;

use std::path::PathBuf;

use cloner_models::{AspectRatio, GenerationModel, Resolution, VideoLength};

use crate::context::ProjectContext;
use crate::error::PipelineResult;
use crate::services::Services;
use crate::stage::{Stage, StageOutcome};

/// Options for the analyze stage.
#[derive(Debug, Clone, Default)]
pub struct AnalyzeOptions {
    /// Source video to clone
    pub video: Option<PathBuf>,
}

/// Options for the prompts stage.
#[derive(Debug, Clone, Default)]
pub struct PromptOptions {
    /// Product or character image; auto-detected from the inputs directory when unset
    pub reference_image: Option<PathBuf>,
}

/// Options for the log stage.
#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    /// Delete the project's records and log them again
    pub clear: bool,
}

/// Options for the images stage.
#[derive(Debug, Clone)]
pub struct ImageOptions {
    pub model: GenerationModel,
    pub reference_image: Option<PathBuf>,
    pub aspect_ratio: Option<AspectRatio>,
    pub resolution: Resolution,
}

impl Default for ImageOptions {
    fn default() -> Self {
        Self {
            model: GenerationModel::ZImage,
            reference_image: None,
            aspect_ratio: None,
            resolution: Resolution::default(),
        }
    }
}

/// Options for the videos stage.
#[derive(Debug, Clone)]
pub struct VideoOptions {
    pub model: GenerationModel,
    pub aspect_ratio: Option<AspectRatio>,
    pub length: VideoLength,
    pub remove_watermark: bool,
    /// Only persist the reference, do not fetch the file
    pub skip_download: bool,
}

impl Default for VideoOptions {
    fn default() -> Self {
        Self {
            model: GenerationModel::Sora2,
            aspect_ratio: None,
            length: VideoLength::default(),
            remove_watermark: true,
            skip_download: false,
        }
    }
}

/// Options for the combine stage.
#[derive(Debug, Clone)]
pub struct CombineOptions {
    /// Defaults to `final_video.mp4` in the project directory
    pub output: Option<PathBuf>,
    pub music: Option<PathBuf>,
    pub fade_duration: f64,
    pub re_encode: bool,
}

impl Default for CombineOptions {
    fn default() -> Self {
        Self {
            output: None,
            music: None,
            fade_duration: 2.0,
            re_encode: false,
        }
    }
}

impl CombineOptions {
    pub fn output_path(&self, ctx: &ProjectContext) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| ctx.default_output_path())
    }
}

/// Options for every stage of a run.
#[derive(Debug, Clone, Default)]
pub struct StageOptions {
    pub analyze: AnalyzeOptions,
    pub prompts: PromptOptions,
    pub log: LogOptions,
    pub images: ImageOptions,
    pub videos: VideoOptions,
    pub combine: CombineOptions,
}

/// Run one stage unconditionally.
pub async fn run_stage(
    stage: Stage,
    ctx: &ProjectContext,
    services: &Services,
    options: &StageOptions,
) -> PipelineResult<StageOutcome> {
    match stage {
        Stage::Analyze => analyze::run(ctx, services, &options.analyze).await,
        Stage::Prompts => prompts::run(ctx, services, &options.prompts).await,
        Stage::Log => log::run(ctx, services, &options.log).await,
        Stage::Images => images::run(ctx, services, &options.images).await,
        Stage::Videos => videos::run(ctx, services, &options.videos).await,
        Stage::Combine => combine::run(ctx, services, &options.combine).await,
    }
}
