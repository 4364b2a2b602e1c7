//! Creative cloner pipeline.
//!
//! This crate provides:
//! - Stage implementations (analyze, prompts, log, images, videos, combine)
//! - Resumable sequencing with completion detection
//! - Spend approval and bounded generation concurrency
//! - Setup verification
//! - The `cloner` CLI

pub mod approval;
pub mod config;
pub mod context;
pub mod error;
pub mod logging;
pub mod poll;
pub mod sequencer;
pub mod services;
pub mod stage;
pub mod stages;
pub mod verify;

pub use approval::{ApprovalGate, AutoApprove, ConsoleApproval};
pub use config::PipelineConfig;
pub use context::ProjectContext;
pub use error::{PipelineError, PipelineResult, SceneFailure};
pub use logging::{init_tracing, StageLogger};
pub use poll::poll_job;
pub use sequencer::{RunReport, Sequencer};
pub use services::{dispatcher_from_env, Services};
pub use stage::{Stage, StageOutcome};
pub use stages::{
    AnalyzeOptions, CombineOptions, ImageOptions, LogOptions, PromptOptions, StageOptions,
    VideoOptions,
};
pub use verify::{verify, CheckResult};
