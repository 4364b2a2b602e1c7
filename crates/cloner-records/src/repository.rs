//! Airtable-backed scene repository.

use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, warn};

use cloner_models::{
    parse_scene_number, ModelError, NewSceneRecord, ProjectName, SceneNumber, SceneRecord,
};

use crate::client::{formula_string, AirtableClient};
use crate::error::{RecordError, RecordResult};
use crate::store::SceneStore;
use crate::types::{Attachment, Fields, Record};

/// Column names in the scenes table.
pub mod fields {
    pub const PROJECT_NAME: &str = "Project Name";
    pub const TITLE: &str = "scene";
    pub const IMAGE_PROMPT: &str = "start_image_prompt";
    pub const VIDEO_PROMPT: &str = "video_prompt";
    pub const IMAGE: &str = "start_image";
    pub const VIDEO: &str = "scene_video";
    /// Optional columns, written only when extended fields are enabled
    pub const SCENE_NUMBER: &str = "Scene Number";
    pub const DESCRIPTION: &str = "Scene Description";
}

/// Scene records stored in an Airtable table.
#[derive(Clone)]
pub struct SceneRepository {
    client: AirtableClient,
    extended_fields: bool,
}

impl SceneRepository {
    pub fn new(client: AirtableClient) -> Self {
        Self {
            client,
            extended_fields: false,
        }
    }

    /// Also write the `Scene Number` and `Scene Description` columns.
    ///
    /// Tables without those columns reject unknown fields, so this is off
    /// by default and the number is recovered from the title instead.
    pub fn with_extended_fields(mut self, enabled: bool) -> Self {
        self.extended_fields = enabled;
        self
    }

    fn project_formula(project: &ProjectName) -> String {
        format!(
            "{{{}}}={}",
            fields::PROJECT_NAME,
            formula_string(project.as_str())
        )
    }

    fn to_fields(&self, new: &NewSceneRecord) -> Fields {
        let mut f = Fields::new();
        f.insert(
            fields::PROJECT_NAME.to_string(),
            Value::from(new.project_name.as_str()),
        );
        f.insert(fields::TITLE.to_string(), Value::from(new.title()));
        f.insert(
            fields::IMAGE_PROMPT.to_string(),
            Value::from(new.image_prompt.as_str()),
        );
        f.insert(
            fields::VIDEO_PROMPT.to_string(),
            Value::from(new.video_prompt.as_str()),
        );
        if self.extended_fields {
            f.insert(
                fields::SCENE_NUMBER.to_string(),
                Value::from(new.scene_number.get()),
            );
            f.insert(
                fields::DESCRIPTION.to_string(),
                Value::from(new.scene_description.as_str()),
            );
        }
        f
    }
}

/// Map a stored row to a scene record.
pub fn record_to_scene(record: &Record) -> RecordResult<SceneRecord> {
    let title = record.text(fields::TITLE).unwrap_or_default().to_string();

    let project_name = ProjectName::new(record.text(fields::PROJECT_NAME).unwrap_or_default())?;

    let scene_number = match record.number(fields::SCENE_NUMBER) {
        Some(n) => SceneNumber::new(u32::try_from(n).map_err(|_| {
            RecordError::invalid_response(format!("record {} has scene number {}", record.id, n))
        })?)?,
        None => parse_scene_number(&title).ok_or_else(|| {
            RecordError::invalid_response(format!(
                "record {} has no scene number and an unparseable title {:?}",
                record.id, title
            ))
        })?,
    };

    let scene_description = record
        .text(fields::DESCRIPTION)
        .map(str::to_string)
        .unwrap_or_else(|| {
            title
                .split_once(" - ")
                .map(|(_, d)| d.to_string())
                .unwrap_or_default()
        });

    let new = NewSceneRecord {
        project_name,
        scene_number,
        scene_description,
        image_prompt: record.text(fields::IMAGE_PROMPT).unwrap_or_default().to_string(),
        video_prompt: record.text(fields::VIDEO_PROMPT).unwrap_or_default().to_string(),
    };

    let mut scene = SceneRecord::created(record.id.clone(), new).with_references(
        record.first_attachment_url(fields::IMAGE),
        record.first_attachment_url(fields::VIDEO),
    )?;
    if !title.is_empty() {
        scene.title = title;
    }
    Ok(scene)
}

#[async_trait]
impl SceneStore for SceneRepository {
    async fn list_project(&self, project: &ProjectName) -> RecordResult<Vec<SceneRecord>> {
        let formula = Self::project_formula(project);
        let records = self.client.list_records(Some(&formula)).await?;

        let mut scenes = Vec::with_capacity(records.len());
        for record in &records {
            match record_to_scene(record) {
                Ok(scene) => scenes.push(scene),
                Err(RecordError::Model(e @ ModelError::VideoBeforeImage { .. })) => {
                    return Err(RecordError::Model(e));
                }
                Err(e) => {
                    warn!(record_id = %record.id, "Skipping unreadable scene record: {}", e);
                }
            }
        }
        scenes.sort_by_key(|s| s.scene_number);
        Ok(scenes)
    }

    async fn create_many(&self, records: Vec<NewSceneRecord>) -> RecordResult<Vec<SceneRecord>> {
        for new in &records {
            new.check()?;
        }

        let rows = records.iter().map(|r| self.to_fields(r)).collect();
        let created = self.client.create_records(rows).await?;

        let scenes: Vec<SceneRecord> = created
            .into_iter()
            .zip(records)
            .map(|(row, new)| SceneRecord::created(row.id, new))
            .collect();

        info!(
            table = %self.client.table(),
            count = scenes.len(),
            "Created scene records"
        );
        Ok(scenes)
    }

    async fn set_image_reference(
        &self,
        record: &SceneRecord,
        url: &str,
    ) -> RecordResult<SceneRecord> {
        let mut f = Fields::new();
        f.insert(fields::IMAGE.to_string(), Attachment::cell(url));
        self.client.update_record(&record.record_id, &f).await?;

        let mut updated = record.clone();
        updated.attach_image(url);
        info!(record_id = %record.record_id, scene = %record.scene_number, "Stored image reference");
        Ok(updated)
    }

    async fn set_video_reference(
        &self,
        record: &SceneRecord,
        url: &str,
    ) -> RecordResult<SceneRecord> {
        let stored = record_to_scene(&self.client.get_record(&record.record_id).await?)?;
        if stored.needs_image() {
            return Err(ModelError::VideoBeforeImage {
                scene: stored.scene_number.get(),
            }
            .into());
        }

        let mut f = Fields::new();
        f.insert(fields::VIDEO.to_string(), Attachment::cell(url));
        self.client.update_record(&record.record_id, &f).await?;

        let mut updated = stored;
        updated.attach_video(url)?;
        info!(record_id = %record.record_id, scene = %record.scene_number, "Stored video reference");
        Ok(updated)
    }

    async fn clear_project(&self, project: &ProjectName) -> RecordResult<usize> {
        let formula = Self::project_formula(project);
        let ids: Vec<String> = self
            .client
            .list_records(Some(&formula))
            .await?
            .into_iter()
            .map(|r| r.id)
            .collect();

        if ids.is_empty() {
            return Ok(0);
        }

        let deleted = self.client.delete_records(&ids).await?;
        info!(project = %project, deleted, "Cleared project records");
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(fields: Value) -> Record {
        serde_json::from_value(json!({ "id": "recA", "fields": fields })).unwrap()
    }

    #[test]
    fn test_record_to_scene_from_title() {
        let scene = record_to_scene(&row(json!({
            "Project Name": "Demo",
            "scene": "Scene 4 - Sunset walk",
            "start_image_prompt": "img",
            "video_prompt": "vid",
            "start_image": [{ "url": "https://dl/a.png" }]
        })))
        .unwrap();

        assert_eq!(scene.scene_number.get(), 4);
        assert_eq!(scene.scene_description, "Sunset walk");
        assert_eq!(scene.title, "Scene 4 - Sunset walk");
        assert_eq!(scene.image_reference(), Some("https://dl/a.png"));
        assert!(scene.needs_video());
    }

    #[test]
    fn test_record_to_scene_prefers_number_column() {
        let scene = record_to_scene(&row(json!({
            "Project Name": "Demo",
            "Scene Number": 7,
            "Scene Description": "Long description",
            "scene": "Scene 1 - stale title"
        })))
        .unwrap();
        assert_eq!(scene.scene_number.get(), 7);
        assert_eq!(scene.scene_description, "Long description");
    }

    #[test]
    fn test_record_to_scene_rejects_video_without_image() {
        let err = record_to_scene(&row(json!({
            "Project Name": "Demo",
            "scene": "Scene 1 - x",
            "scene_video": [{ "url": "https://dl/v.mp4" }]
        })))
        .unwrap_err();
        assert!(matches!(err, RecordError::Model(ModelError::VideoBeforeImage { .. })));
    }

    #[test]
    fn test_project_formula_escapes_quotes() {
        let project = ProjectName::new("Bob's Ad").unwrap();
        assert_eq!(
            SceneRepository::project_formula(&project),
            r"{Project Name}='Bob\'s Ad'"
        );
    }
}
