//! Pipeline configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use cloner_jobs::{BackoffSchedule, DispatcherConfig, SchedulePolicy};

use crate::error::PipelineResult;

/// Pipeline configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Root for per-project artifacts (analysis, prompts, clips, final video)
    pub work_dir: PathBuf,
    /// Where reference images are auto-detected from
    pub inputs_dir: PathBuf,
    /// Concurrent image jobs per stage
    pub max_image_jobs: usize,
    /// Concurrent video jobs per stage
    pub max_video_jobs: usize,
    /// Overall wait for one image job
    pub image_timeout: Duration,
    /// Overall wait for one video job
    pub video_timeout: Duration,
    /// FFmpeg combination timeout
    pub combine_timeout: Duration,
    /// Per-file download timeout
    pub download_timeout: Duration,
    /// Write `Scene Number` / `Scene Description` columns to the record store
    pub airtable_extended_fields: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("outputs"),
            inputs_dir: PathBuf::from("inputs"),
            max_image_jobs: 4,
            max_video_jobs: 2,
            image_timeout: Duration::from_secs(600),
            video_timeout: Duration::from_secs(900),
            combine_timeout: Duration::from_secs(300),
            download_timeout: Duration::from_secs(300),
            airtable_extended_fields: false,
        }
    }
}

impl PipelineConfig {
    /// Create config from environment variables.
    ///
    /// Unset or unparsable values fall back to the defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            work_dir: std::env::var("CLONER_WORK_DIR")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            inputs_dir: std::env::var("CLONER_INPUTS_DIR")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.inputs_dir),
            max_image_jobs: env_parse("CLONER_MAX_IMAGE_JOBS", defaults.max_image_jobs).max(1),
            max_video_jobs: env_parse("CLONER_MAX_VIDEO_JOBS", defaults.max_video_jobs).max(1),
            image_timeout: Duration::from_secs(env_parse(
                "CLONER_IMAGE_TIMEOUT_SECS",
                defaults.image_timeout.as_secs(),
            )),
            video_timeout: Duration::from_secs(env_parse(
                "CLONER_VIDEO_TIMEOUT_SECS",
                defaults.video_timeout.as_secs(),
            )),
            combine_timeout: Duration::from_secs(env_parse(
                "CLONER_COMBINE_TIMEOUT_SECS",
                defaults.combine_timeout.as_secs(),
            )),
            download_timeout: Duration::from_secs(env_parse(
                "CLONER_DOWNLOAD_TIMEOUT_SECS",
                defaults.download_timeout.as_secs(),
            )),
            airtable_extended_fields: env_parse(
                "AIRTABLE_EXTENDED_FIELDS",
                defaults.airtable_extended_fields,
            ),
        }
    }

    /// Dispatcher settings with the configured per-kind timeouts.
    pub fn dispatcher_config(&self) -> PipelineResult<DispatcherConfig> {
        Ok(DispatcherConfig {
            schedules: SchedulePolicy {
                image: BackoffSchedule::image_default().with_timeout(self.image_timeout)?,
                video: BackoffSchedule::video_default().with_timeout(self.video_timeout)?,
            },
            ..DispatcherConfig::default()
        })
    }
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}
