//! Scene records persisted in the record store.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::{ModelError, ModelResult};
use crate::prompts::ScenePrompts;

/// Project used when the caller does not name one.
pub const DEFAULT_PROJECT_NAME: &str = "Creative Cloner Project";

const MAX_TITLE_DESCRIPTION_CHARS: usize = 50;

static SCENE_TITLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*scene\s+(\d+)\b").expect("scene title pattern"));

// =============================================================================
// Identifiers
// =============================================================================

/// 1-based scene position inside a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct SceneNumber(u32);

impl SceneNumber {
    pub fn new(n: u32) -> ModelResult<Self> {
        if n == 0 {
            return Err(ModelError::InvalidSceneNumber(n));
        }
        Ok(Self(n))
    }

    pub fn get(&self) -> u32 {
        self.0
    }
}

impl TryFrom<u32> for SceneNumber {
    type Error = ModelError;

    fn try_from(n: u32) -> Result<Self, Self::Error> {
        Self::new(n)
    }
}

impl From<SceneNumber> for u32 {
    fn from(n: SceneNumber) -> Self {
        n.0
    }
}

impl fmt::Display for SceneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Name grouping the scene records of one run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProjectName(String);

impl ProjectName {
    pub fn new(name: impl Into<String>) -> ModelResult<Self> {
        let name = name.into().trim().to_string();
        if name.is_empty() {
            return Err(ModelError::EmptyProjectName);
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Filesystem-safe form used for the project's work directory.
    pub fn slug(&self) -> String {
        let mut slug = String::with_capacity(self.0.len());
        for c in self.0.chars() {
            if c.is_ascii_alphanumeric() {
                slug.push(c.to_ascii_lowercase());
            } else if !slug.ends_with('-') {
                slug.push('-');
            }
        }
        let slug = slug.trim_matches('-');
        if slug.is_empty() {
            "project".to_string()
        } else {
            slug.to_string()
        }
    }
}

impl Default for ProjectName {
    fn default() -> Self {
        Self(DEFAULT_PROJECT_NAME.to_string())
    }
}

impl TryFrom<String> for ProjectName {
    type Error = ModelError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<ProjectName> for String {
    fn from(p: ProjectName) -> Self {
        p.0
    }
}

impl std::str::FromStr for ProjectName {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Display for ProjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Titles
// =============================================================================

/// Display title stored in the record store's primary field.
///
/// Long descriptions are cut to 47 characters followed by `...`.
pub fn scene_title(number: SceneNumber, description: &str) -> String {
    let description = description.trim();
    let short = if description.chars().count() > MAX_TITLE_DESCRIPTION_CHARS {
        let cut: String = description
            .chars()
            .take(MAX_TITLE_DESCRIPTION_CHARS - 3)
            .collect();
        format!("{cut}...")
    } else {
        description.to_string()
    };
    format!("Scene {number} - {short}")
}

/// Recover the scene number from a title like `Scene 3 - ...`.
pub fn parse_scene_number(title: &str) -> Option<SceneNumber> {
    SCENE_TITLE
        .captures(title)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<u32>().ok())
        .and_then(|n| SceneNumber::new(n).ok())
}

// =============================================================================
// Records
// =============================================================================

/// A scene record about to be created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct NewSceneRecord {
    pub project_name: ProjectName,
    pub scene_number: SceneNumber,
    #[validate(length(min = 1, message = "scene description is required"))]
    pub scene_description: String,
    #[validate(length(min = 1, message = "image prompt is required"))]
    pub image_prompt: String,
    #[validate(length(min = 1, message = "video prompt is required"))]
    pub video_prompt: String,
}

impl NewSceneRecord {
    pub fn from_prompts(project_name: &ProjectName, prompts: &ScenePrompts) -> ModelResult<Self> {
        Ok(Self {
            project_name: project_name.clone(),
            scene_number: SceneNumber::new(prompts.scene_number)?,
            scene_description: prompts.scene_description.clone(),
            image_prompt: prompts.image_prompt.clone(),
            video_prompt: prompts.video_prompt.clone(),
        })
    }

    pub fn title(&self) -> String {
        scene_title(self.scene_number, &self.scene_description)
    }

    /// Run field validation, mapping the first failure to a model error.
    pub fn check(&self) -> ModelResult<()> {
        self.validate()
            .map_err(|e| ModelError::invalid_field("scene record", e.to_string()))
    }
}

/// A persisted scene record.
///
/// References are private: a video reference can only be attached once an
/// image reference exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneRecord {
    /// Store-assigned identifier
    pub record_id: String,
    pub project_name: ProjectName,
    pub scene_number: SceneNumber,
    pub title: String,
    pub scene_description: String,
    pub image_prompt: String,
    pub video_prompt: String,
    image_reference: Option<String>,
    video_reference: Option<String>,
}

impl SceneRecord {
    /// Record as created from `new`, with no references yet.
    pub fn created(record_id: impl Into<String>, new: NewSceneRecord) -> Self {
        let title = new.title();
        Self {
            record_id: record_id.into(),
            project_name: new.project_name,
            scene_number: new.scene_number,
            title,
            scene_description: new.scene_description,
            image_prompt: new.image_prompt,
            video_prompt: new.video_prompt,
            image_reference: None,
            video_reference: None,
        }
    }

    /// Attach references loaded from the store.
    pub fn with_references(
        mut self,
        image_reference: Option<String>,
        video_reference: Option<String>,
    ) -> ModelResult<Self> {
        self.image_reference = image_reference.filter(|s| !s.is_empty());
        self.video_reference = video_reference.filter(|s| !s.is_empty());
        self.check_causality()?;
        Ok(self)
    }

    pub fn image_reference(&self) -> Option<&str> {
        self.image_reference.as_deref()
    }

    pub fn video_reference(&self) -> Option<&str> {
        self.video_reference.as_deref()
    }

    /// No image generated yet.
    pub fn needs_image(&self) -> bool {
        self.image_reference.is_none()
    }

    /// Image exists but no video yet.
    pub fn needs_video(&self) -> bool {
        self.image_reference.is_some() && self.video_reference.is_none()
    }

    pub fn attach_image(&mut self, url: impl Into<String>) {
        self.image_reference = Some(url.into());
    }

    pub fn attach_video(&mut self, url: impl Into<String>) -> ModelResult<()> {
        if self.image_reference.is_none() {
            return Err(ModelError::VideoBeforeImage {
                scene: self.scene_number.get(),
            });
        }
        self.video_reference = Some(url.into());
        Ok(())
    }

    pub fn check_causality(&self) -> ModelResult<()> {
        if self.video_reference.is_some() && self.image_reference.is_none() {
            return Err(ModelError::VideoBeforeImage {
                scene: self.scene_number.get(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_record(n: u32) -> NewSceneRecord {
        NewSceneRecord {
            project_name: ProjectName::new("Demo").unwrap(),
            scene_number: SceneNumber::new(n).unwrap(),
            scene_description: "A runner at dawn".to_string(),
            image_prompt: "runner".to_string(),
            video_prompt: "runner runs".to_string(),
        }
    }

    #[test]
    fn test_scene_number_rejects_zero() {
        assert!(SceneNumber::new(0).is_err());
        assert!(serde_json::from_str::<SceneNumber>("0").is_err());
        assert_eq!(serde_json::from_str::<SceneNumber>("4").unwrap().get(), 4);
    }

    #[test]
    fn test_project_name_trims_and_rejects_empty() {
        assert_eq!(ProjectName::new("  Spot ").unwrap().as_str(), "Spot");
        assert_eq!(ProjectName::new("   "), Err(ModelError::EmptyProjectName));
    }

    #[test]
    fn test_project_slug() {
        let name = ProjectName::new("Creative Cloner Project!").unwrap();
        assert_eq!(name.slug(), "creative-cloner-project");
        assert_eq!(ProjectName::new("***").unwrap().slug(), "project");
    }

    #[test]
    fn test_scene_title_truncates_long_descriptions() {
        let n = SceneNumber::new(2).unwrap();
        assert_eq!(scene_title(n, "Short"), "Scene 2 - Short");

        let long = "x".repeat(60);
        let title = scene_title(n, &long);
        assert!(title.ends_with("..."));
        assert_eq!(title.len(), "Scene 2 - ".len() + 47 + 3);
    }

    #[test]
    fn test_parse_scene_number() {
        assert_eq!(parse_scene_number("Scene 12 - Beach").map(|n| n.get()), Some(12));
        assert_eq!(parse_scene_number("scene 3").map(|n| n.get()), Some(3));
        assert!(parse_scene_number("Intro").is_none());
        assert!(parse_scene_number("Scene 0 - nope").is_none());
    }

    #[test]
    fn test_new_record_validation() {
        let mut record = new_record(1);
        assert!(record.check().is_ok());
        record.image_prompt.clear();
        assert!(record.check().is_err());
    }

    #[test]
    fn test_video_requires_image() {
        let mut record = SceneRecord::created("rec1", new_record(1));
        assert!(record.needs_image());
        assert!(!record.needs_video());

        assert!(record.attach_video("https://cdn/v.mp4").is_err());
        assert!(record.video_reference().is_none());

        record.attach_image("https://cdn/i.png");
        assert!(record.needs_video());
        record.attach_video("https://cdn/v.mp4").unwrap();
        assert!(!record.needs_video());
        assert!(record.check_causality().is_ok());
    }

    #[test]
    fn test_with_references_rejects_video_only() {
        let record = SceneRecord::created("rec1", new_record(1));
        let err = record
            .with_references(None, Some("https://cdn/v.mp4".to_string()))
            .unwrap_err();
        assert_eq!(err, ModelError::VideoBeforeImage { scene: 1 });
    }
}
