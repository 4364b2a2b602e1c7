//! Analysis and prompt services.

use std::path::Path;

use async_trait::async_trait;
use tracing::info;

use cloner_models::{PromptSheet, VideoAnalysis};

use crate::client::GeminiClient;
use crate::error::{GeminiError, GeminiResult};
use crate::templates::{build_scene_prompts, ANALYSIS_PROMPT, REFERENCE_PROMPT};

/// Turns a source video into a scene breakdown.
#[async_trait]
pub trait AnalysisService: Send + Sync {
    async fn analyze(&self, video: &Path) -> GeminiResult<VideoAnalysis>;
}

/// Turns a scene breakdown into per-scene image and video prompts.
#[async_trait]
pub trait PromptService: Send + Sync {
    async fn synthesize(
        &self,
        analysis: &VideoAnalysis,
        reference_image: Option<&Path>,
    ) -> GeminiResult<PromptSheet>;
}

/// Gemini-backed [`AnalysisService`].
pub struct VideoAnalyzer {
    client: GeminiClient,
}

impl VideoAnalyzer {
    pub fn new(client: GeminiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AnalysisService for VideoAnalyzer {
    async fn analyze(&self, video: &Path) -> GeminiResult<VideoAnalysis> {
        let uploaded = self.client.upload_file(video).await?;
        let name = uploaded.name.clone();

        let result = async {
            let file = self.client.wait_until_active(uploaded).await?;
            let mut analysis: VideoAnalysis =
                self.client.generate_json(Some(&file), ANALYSIS_PROMPT).await?;
            analysis.validate()?;
            analysis.sort_scenes();
            Ok::<_, GeminiError>(analysis)
        }
        .await;

        // Uploaded media is removed whether or not the analysis succeeded.
        self.client.delete_file(&name).await;

        if let Ok(a) = &result {
            info!(scenes = a.total_scenes(), "Video analysis complete");
        }
        result
    }
}

/// Gemini-backed [`PromptService`].
pub struct PromptSynthesizer {
    client: GeminiClient,
}

impl PromptSynthesizer {
    pub fn new(client: GeminiClient) -> Self {
        Self { client }
    }

    /// Describe the reference product or character in a few sentences.
    pub async fn describe_reference(&self, image: &Path) -> GeminiResult<String> {
        let uploaded = self.client.upload_file(image).await?;
        let name = uploaded.name.clone();

        let result = async {
            let file = self.client.wait_until_active(uploaded).await?;
            self.client.generate_text(Some(&file), REFERENCE_PROMPT).await
        }
        .await;

        self.client.delete_file(&name).await;
        result
    }
}

#[async_trait]
impl PromptService for PromptSynthesizer {
    async fn synthesize(
        &self,
        analysis: &VideoAnalysis,
        reference_image: Option<&Path>,
    ) -> GeminiResult<PromptSheet> {
        let subject = match reference_image {
            Some(path) => {
                let described = self.describe_reference(path).await?;
                info!(description = %described, "Reference subject described");
                Some(described)
            }
            None => None,
        };

        let prompts = build_scene_prompts(analysis, subject.as_deref());
        let sheet = PromptSheet::new(
            reference_image.map(|p| p.display().to_string()),
            subject.unwrap_or_default(),
            prompts,
        );
        sheet.validate()?;
        Ok(sheet)
    }
}
