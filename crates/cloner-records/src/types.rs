//! Airtable REST wire types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field map of a record.
pub type Fields = Map<String, Value>;

/// A stored record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    #[serde(default)]
    pub fields: Fields,
    #[serde(rename = "createdTime", default, skip_serializing_if = "Option::is_none")]
    pub created_time: Option<String>,
}

impl Record {
    /// Text value of a field.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    /// Numeric value of a field, accepting numbers stored as text.
    pub fn number(&self, name: &str) -> Option<u64> {
        match self.fields.get(name)? {
            Value::Number(n) => n.as_u64().or_else(|| n.as_f64().map(|f| f as u64)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// URL of the first attachment in a field.
    pub fn first_attachment_url(&self, name: &str) -> Option<String> {
        let value = self.fields.get(name)?;
        let attachments: Vec<Attachment> = serde_json::from_value(value.clone()).ok()?;
        attachments
            .into_iter()
            .map(|a| a.url)
            .find(|u| !u.is_empty())
    }
}

/// Attachment cell entry. Only `url` is needed when writing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

impl Attachment {
    /// Attachment cell value pointing at `url`.
    pub fn cell(url: &str) -> Value {
        serde_json::json!([{ "url": url }])
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListRecordsResponse {
    #[serde(default)]
    pub records: Vec<Record>,
    #[serde(default)]
    pub offset: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct NewRecord {
    pub fields: Fields,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateRecordsRequest {
    pub records: Vec<NewRecord>,
    pub typecast: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RecordsResponse {
    #[serde(default)]
    pub records: Vec<Record>,
}

#[derive(Debug, Serialize)]
pub(crate) struct UpdateRecordRequest<'a> {
    pub fields: &'a Fields,
    pub typecast: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DeletedRecord {
    #[allow(dead_code)]
    pub id: String,
    #[serde(default)]
    pub deleted: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DeleteRecordsResponse {
    #[serde(default)]
    pub records: Vec<DeletedRecord>,
}
