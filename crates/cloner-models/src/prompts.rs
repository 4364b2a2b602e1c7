//! Prompt sheet produced by the prompt stage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

/// Image and video prompts for one scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenePrompts {
    pub scene_number: u32,
    pub scene_description: String,
    #[serde(default)]
    pub duration: Option<f64>,
    pub image_prompt: String,
    pub video_prompt: String,
}

/// Where a prompt sheet came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptSheetMetadata {
    pub generated_at: DateTime<Utc>,
    /// Reference image used to describe the subject, if any
    pub reference_image: Option<String>,
    /// Subject description substituted into every prompt
    pub subject_description: String,
    pub total_scenes: usize,
}

/// All prompts for a project, ordered by scene number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptSheet {
    pub metadata: PromptSheetMetadata,
    pub prompts: Vec<ScenePrompts>,
}

impl PromptSheet {
    pub fn new(
        reference_image: Option<String>,
        subject_description: String,
        mut prompts: Vec<ScenePrompts>,
    ) -> Self {
        prompts.sort_by_key(|p| p.scene_number);
        Self {
            metadata: PromptSheetMetadata {
                generated_at: Utc::now(),
                reference_image,
                subject_description,
                total_scenes: prompts.len(),
            },
            prompts,
        }
    }

    pub fn validate(&self) -> ModelResult<()> {
        if self.prompts.is_empty() {
            return Err(ModelError::invalid_field("prompt sheet", "no prompts"));
        }
        for p in &self.prompts {
            if p.image_prompt.trim().is_empty() || p.video_prompt.trim().is_empty() {
                return Err(ModelError::invalid_field(
                    "prompt sheet",
                    format!("scene {} has an empty prompt", p.scene_number),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prompt(n: u32) -> ScenePrompts {
        ScenePrompts {
            scene_number: n,
            scene_description: format!("scene {n}"),
            duration: Some(5.0),
            image_prompt: "image".to_string(),
            video_prompt: "video".to_string(),
        }
    }

    #[test]
    fn test_sheet_sorts_prompts() {
        let sheet = PromptSheet::new(None, "a cat".to_string(), vec![prompt(2), prompt(1)]);
        assert_eq!(sheet.prompts[0].scene_number, 1);
        assert_eq!(sheet.metadata.total_scenes, 2);
        assert!(sheet.validate().is_ok());
    }

    #[test]
    fn test_sheet_rejects_empty_prompt() {
        let mut p = prompt(1);
        p.video_prompt = " ".to_string();
        let sheet = PromptSheet::new(None, "a cat".to_string(), vec![p]);
        assert!(sheet.validate().is_err());
    }
}
