//! Per-run project context.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use cloner_models::{ProjectName, PromptSheet, SceneNumber, SceneRecord};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};

const REFERENCE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];

/// Everything a stage needs to know about the run it belongs to.
///
/// Passed explicitly to every stage; nothing is read from globals.
#[derive(Debug, Clone)]
pub struct ProjectContext {
    project: ProjectName,
    dry_run: bool,
    test_mode: bool,
    project_dir: PathBuf,
    inputs_dir: PathBuf,
}

impl ProjectContext {
    pub fn new(project: ProjectName, config: &PipelineConfig) -> Self {
        let project_dir = config.work_dir.join(project.slug());
        Self {
            project,
            dry_run: false,
            test_mode: false,
            project_dir,
            inputs_dir: config.inputs_dir.clone(),
        }
    }

    /// No paid calls and no writes.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Cheapest model, first pending scene only.
    pub fn with_test_mode(mut self, test_mode: bool) -> Self {
        self.test_mode = test_mode;
        self
    }

    pub fn project(&self) -> &ProjectName {
        &self.project
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn test_mode(&self) -> bool {
        self.test_mode
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    pub fn inputs_dir(&self) -> &Path {
        &self.inputs_dir
    }

    pub fn analysis_path(&self) -> PathBuf {
        self.project_dir.join("analysis.json")
    }

    pub fn prompts_path(&self) -> PathBuf {
        self.project_dir.join("prompts.json")
    }

    pub fn videos_dir(&self) -> PathBuf {
        self.project_dir.join("videos")
    }

    /// Local copy of a scene's generated video.
    pub fn clip_path(&self, scene: SceneNumber) -> PathBuf {
        self.videos_dir().join(format!("scene_{:03}.mp4", scene.get()))
    }

    pub fn default_output_path(&self) -> PathBuf {
        self.project_dir.join("final_video.mp4")
    }

    /// Print one line of a dry-run plan.
    pub fn plan(&self, line: impl AsRef<str>) {
        println!("  [dry-run] {}", line.as_ref());
    }

    /// Read a JSON artifact written by an earlier stage.
    pub async fn read_artifact<T: DeserializeOwned>(&self, path: &Path) -> PipelineResult<T> {
        let bytes = match tokio::fs::read(path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(PipelineError::missing_input(format!(
                    "{} not found",
                    path.display()
                )));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Write a JSON artifact, replacing any previous version atomically.
    pub async fn write_artifact<T: Serialize>(&self, path: &Path, value: &T) -> PipelineResult<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_vec_pretty(value)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &json).await?;
        tokio::fs::rename(&tmp, path).await?;
        debug!(path = %path.display(), bytes = json.len(), "Wrote artifact");
        Ok(())
    }

    /// Scenes listed in `prompts.json` that have no record in `records`.
    ///
    /// Empty when the prompts stage has not written a sheet yet.
    pub async fn unlogged_scenes(&self, records: &[SceneRecord]) -> PipelineResult<Vec<u32>> {
        let path = self.prompts_path();
        if !tokio::fs::try_exists(&path).await? {
            return Ok(Vec::new());
        }
        let sheet: PromptSheet = self.read_artifact(&path).await?;
        let mut missing: Vec<u32> = sheet
            .prompts
            .iter()
            .map(|p| p.scene_number)
            .filter(|n| !records.iter().any(|r| r.scene_number.get() == *n))
            .collect();
        missing.sort_unstable();
        missing.dedup();
        Ok(missing)
    }

    /// First image in the inputs directory, by file name.
    pub async fn find_reference_image(&self) -> PipelineResult<Option<PathBuf>> {
        let mut entries = match tokio::fs::read_dir(&self.inputs_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut images = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_image = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| REFERENCE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()));
            if is_image && entry.file_type().await?.is_file() {
                images.push(path);
            }
        }
        images.sort();
        Ok(images.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    fn context(dir: &Path) -> ProjectContext {
        let config = PipelineConfig {
            work_dir: dir.join("outputs"),
            inputs_dir: dir.join("inputs"),
            ..PipelineConfig::default()
        };
        ProjectContext::new(ProjectName::new("Summer Promo").unwrap(), &config)
    }

    #[test]
    fn test_paths_live_under_project_slug() {
        let ctx = context(Path::new("/w"));
        assert_eq!(ctx.project_dir(), Path::new("/w/outputs/summer-promo"));
        assert_eq!(
            ctx.clip_path(SceneNumber::new(7).unwrap()),
            PathBuf::from("/w/outputs/summer-promo/videos/scene_007.mp4")
        );
        assert!(ctx.default_output_path().ends_with("final_video.mp4"));
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Note {
        text: String,
    }

    #[tokio::test]
    async fn test_artifact_roundtrip_and_missing() {
        let dir = tempfile::TempDir::new().unwrap();
        let ctx = context(dir.path());

        let err = ctx
            .read_artifact::<Note>(&ctx.analysis_path())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::MissingInput(_)));

        let note = Note {
            text: "hi".to_string(),
        };
        ctx.write_artifact(&ctx.analysis_path(), &note).await.unwrap();
        let back: Note = ctx.read_artifact(&ctx.analysis_path()).await.unwrap();
        assert_eq!(back, note);
    }

    #[tokio::test]
    async fn test_reference_image_detection() {
        let dir = tempfile::TempDir::new().unwrap();
        let ctx = context(dir.path());
        assert_eq!(ctx.find_reference_image().await.unwrap(), None);

        let inputs = dir.path().join("inputs");
        tokio::fs::create_dir_all(&inputs).await.unwrap();
        tokio::fs::write(inputs.join("source.mp4"), b"v").await.unwrap();
        tokio::fs::write(inputs.join("b_product.PNG"), b"i").await.unwrap();
        tokio::fs::write(inputs.join("a_product.jpg"), b"i").await.unwrap();

        assert_eq!(
            ctx.find_reference_image().await.unwrap(),
            Some(inputs.join("a_product.jpg"))
        );
    }
}
