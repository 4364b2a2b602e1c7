//! Structured video analysis returned by the analysis stage.
//!
//! Scenes are described along six axes: subject, environment, action,
//! lighting, camera and (for the whole video) music.

use std::collections::HashSet;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{ModelError, ModelResult};

/// Scene breakdown of a source video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoAnalysis {
    /// Total duration in seconds, when the service reports it
    #[serde(default, deserialize_with = "de_opt_seconds")]
    pub overall_duration: Option<f64>,
    /// Background music or sound description
    #[serde(default)]
    pub music_sound: Option<String>,
    pub scenes: Vec<SceneAnalysis>,
}

/// One scene of the analysed video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneAnalysis {
    pub scene_number: u32,
    pub description: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub environment: String,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub lighting: String,
    #[serde(default)]
    pub camera: String,
    /// Approximate duration in seconds
    #[serde(default, deserialize_with = "de_opt_seconds")]
    pub duration: Option<f64>,
}

impl VideoAnalysis {
    /// Check the breakdown is usable: at least one scene, numbers start at 1
    /// and are unique.
    pub fn validate(&self) -> ModelResult<()> {
        if self.scenes.is_empty() {
            return Err(ModelError::invalid_field("analysis", "no scenes returned"));
        }

        let mut seen = HashSet::new();
        for scene in &self.scenes {
            if scene.scene_number == 0 {
                return Err(ModelError::InvalidSceneNumber(0));
            }
            if !seen.insert(scene.scene_number) {
                return Err(ModelError::invalid_field(
                    "analysis",
                    format!("duplicate scene number {}", scene.scene_number),
                ));
            }
            if scene.description.trim().is_empty() {
                return Err(ModelError::invalid_field(
                    "analysis",
                    format!("scene {} has no description", scene.scene_number),
                ));
            }
        }
        Ok(())
    }

    /// Order scenes by ascending scene number.
    pub fn sort_scenes(&mut self) {
        self.scenes.sort_by_key(|s| s.scene_number);
    }

    pub fn total_scenes(&self) -> usize {
        self.scenes.len()
    }
}

/// Accepts `5`, `5.5`, `"5"` or `"5 seconds"`.
fn de_opt_seconds<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    let raw = Option::<Raw>::deserialize(deserializer)?;
    Ok(match raw {
        None => None,
        Some(Raw::Number(n)) => Some(n),
        Some(Raw::Text(s)) => s
            .split_whitespace()
            .next()
            .and_then(|t| t.trim_end_matches('s').parse::<f64>().ok()),
    })
}
