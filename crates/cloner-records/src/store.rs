//! Scene store abstraction shared by every pipeline stage.

use async_trait::async_trait;

use cloner_models::{NewSceneRecord, ProjectName, SceneRecord};

use crate::error::RecordResult;

/// Persistent home of scene records, keyed by `(project, scene number)`.
#[async_trait]
pub trait SceneStore: Send + Sync {
    /// All records of `project`, ordered by ascending scene number.
    async fn list_project(&self, project: &ProjectName) -> RecordResult<Vec<SceneRecord>>;

    /// Create records, returning them in input order.
    async fn create_many(&self, records: Vec<NewSceneRecord>) -> RecordResult<Vec<SceneRecord>>;

    /// Persist the generated image for a scene.
    async fn set_image_reference(&self, record: &SceneRecord, url: &str)
        -> RecordResult<SceneRecord>;

    /// Persist the generated video for a scene.
    ///
    /// Fails when the stored record has no image reference.
    async fn set_video_reference(&self, record: &SceneRecord, url: &str)
        -> RecordResult<SceneRecord>;

    /// Delete every record of `project`. Returns how many were removed.
    async fn clear_project(&self, project: &ProjectName) -> RecordResult<usize>;

    async fn create(&self, record: NewSceneRecord) -> RecordResult<SceneRecord> {
        let mut created = self.create_many(vec![record]).await?;
        created
            .pop()
            .ok_or_else(|| crate::error::RecordError::invalid_response("no record created"))
    }
}
