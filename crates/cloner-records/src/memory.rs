//! In-memory scene store for offline runs and tests.

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use cloner_models::{NewSceneRecord, ProjectName, SceneRecord};

use crate::error::{RecordError, RecordResult};
use crate::store::SceneStore;

/// Scene store backed by a `Vec` behind a lock.
#[derive(Debug, Default)]
pub struct MemorySceneStore {
    records: RwLock<Vec<SceneRecord>>,
}

impl MemorySceneStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-existing records as-is.
    pub async fn insert(&self, record: SceneRecord) {
        self.records.write().await.push(record);
    }

    /// Copy of every stored record, in insertion order.
    pub async fn snapshot(&self) -> Vec<SceneRecord> {
        self.records.read().await.clone()
    }

    fn find_mut<'a>(
        records: &'a mut [SceneRecord],
        record_id: &str,
    ) -> RecordResult<&'a mut SceneRecord> {
        records
            .iter_mut()
            .find(|r| r.record_id == record_id)
            .ok_or_else(|| RecordError::not_found(record_id))
    }
}

#[async_trait]
impl SceneStore for MemorySceneStore {
    async fn list_project(&self, project: &ProjectName) -> RecordResult<Vec<SceneRecord>> {
        let mut scenes: Vec<SceneRecord> = self
            .records
            .read()
            .await
            .iter()
            .filter(|r| &r.project_name == project)
            .cloned()
            .collect();
        scenes.sort_by_key(|r| r.scene_number);
        Ok(scenes)
    }

    async fn create_many(&self, records: Vec<NewSceneRecord>) -> RecordResult<Vec<SceneRecord>> {
        let mut stored = self.records.write().await;
        let mut created = Vec::with_capacity(records.len());

        for new in records {
            new.check()?;
            let taken = stored
                .iter()
                .chain(created.iter())
                .any(|r: &SceneRecord| {
                    r.project_name == new.project_name && r.scene_number == new.scene_number
                });
            if taken {
                return Err(RecordError::InvalidRequest(format!(
                    "scene {} already exists in project {}",
                    new.scene_number, new.project_name
                )));
            }
            created.push(SceneRecord::created(format!("rec{}", Uuid::new_v4().simple()), new));
        }

        stored.extend(created.iter().cloned());
        Ok(created)
    }

    async fn set_image_reference(
        &self,
        record: &SceneRecord,
        url: &str,
    ) -> RecordResult<SceneRecord> {
        let mut stored = self.records.write().await;
        let target = Self::find_mut(&mut stored, &record.record_id)?;
        target.attach_image(url);
        Ok(target.clone())
    }

    async fn set_video_reference(
        &self,
        record: &SceneRecord,
        url: &str,
    ) -> RecordResult<SceneRecord> {
        let mut stored = self.records.write().await;
        let target = Self::find_mut(&mut stored, &record.record_id)?;
        target.attach_video(url).map_err(RecordError::from)?;
        Ok(target.clone())
    }

    async fn clear_project(&self, project: &ProjectName) -> RecordResult<usize> {
        let mut stored = self.records.write().await;
        let before = stored.len();
        stored.retain(|r| &r.project_name != project);
        Ok(before - stored.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloner_models::{ModelError, SceneNumber};

    fn new_record(project: &str, n: u32) -> NewSceneRecord {
        NewSceneRecord {
            project_name: ProjectName::new(project).unwrap(),
            scene_number: SceneNumber::new(n).unwrap(),
            scene_description: format!("scene {n}"),
            image_prompt: "image".to_string(),
            video_prompt: "video".to_string(),
        }
    }

    #[tokio::test]
    async fn test_list_is_sorted_and_scoped() {
        let store = MemorySceneStore::new();
        store
            .create_many(vec![new_record("A", 3), new_record("A", 1), new_record("B", 2)])
            .await
            .unwrap();

        let project = ProjectName::new("A").unwrap();
        let numbers: Vec<u32> = store
            .list_project(&project)
            .await
            .unwrap()
            .iter()
            .map(|r| r.scene_number.get())
            .collect();
        assert_eq!(numbers, vec![1, 3]);
    }

    #[tokio::test]
    async fn test_duplicate_scene_number_rejected() {
        let store = MemorySceneStore::new();
        store.create(new_record("A", 1)).await.unwrap();
        let err = store.create(new_record("A", 1)).await.unwrap_err();
        assert!(matches!(err, RecordError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_video_requires_stored_image() {
        let store = MemorySceneStore::new();
        let record = store.create(new_record("A", 1)).await.unwrap();

        let err = store
            .set_video_reference(&record, "https://cdn/v.mp4")
            .await
            .unwrap_err();
        assert!(matches!(err, RecordError::Model(ModelError::VideoBeforeImage { .. })));

        let record = store
            .set_image_reference(&record, "https://cdn/i.png")
            .await
            .unwrap();
        let record = store
            .set_video_reference(&record, "https://cdn/v.mp4")
            .await
            .unwrap();
        assert_eq!(record.video_reference(), Some("https://cdn/v.mp4"));
    }

    #[tokio::test]
    async fn test_clear_project() {
        let store = MemorySceneStore::new();
        store
            .create_many(vec![new_record("A", 1), new_record("A", 2), new_record("B", 1)])
            .await
            .unwrap();
        let removed = store
            .clear_project(&ProjectName::new("A").unwrap())
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.snapshot().await.len(), 1);
    }
}
