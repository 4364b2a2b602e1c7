//! Shared data models for the creative cloner pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Generation jobs and their lifecycle
//! - Scene records persisted in the record store
//! - Video analysis and prompt sheets exchanged between stages
//! - The generation model catalog and spend accounting

pub mod analysis;
pub mod catalog;
pub mod error;
pub mod job;
pub mod prompts;
pub mod scene;
pub mod utils;

// Re-export common types
pub use analysis::{SceneAnalysis, VideoAnalysis};
pub use catalog::{AspectRatio, Cost, CostEstimate, GenerationModel, Resolution, VideoLength};
pub use error::{ModelError, ModelResult};
pub use job::{Job, JobId, JobKind, JobStatus, StatusReport};
pub use prompts::{PromptSheet, PromptSheetMetadata, ScenePrompts};
pub use scene::{
    parse_scene_number, scene_title, NewSceneRecord, ProjectName, SceneNumber, SceneRecord,
    DEFAULT_PROJECT_NAME,
};
pub use utils::truncate_prompt;
