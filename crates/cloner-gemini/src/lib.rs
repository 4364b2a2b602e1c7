//! Gemini integration for the creative cloner pipeline.
//!
//! - `GeminiClient`: Files API uploads and JSON/text generation with model fallback
//! - `VideoAnalyzer`: source video to scene breakdown
//! - `PromptSynthesizer`: scene breakdown (plus optional reference image) to prompts

pub mod client;
pub mod config;
pub mod error;
pub mod service;
pub mod templates;

pub use client::{FileState, GeminiClient, GeminiFile};
pub use config::GeminiConfig;
pub use error::{GeminiError, GeminiResult};
pub use service::{AnalysisService, PromptService, PromptSynthesizer, VideoAnalyzer};
pub use templates::build_scene_prompts;
