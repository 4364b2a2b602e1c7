//! Gemini REST client.
//!
//! Media goes through the Files API: a resumable upload returns a file in
//! `PROCESSING` state, which must reach `ACTIVE` before a model can read it.
//! Content generation tries each configured model in turn.

use std::path::Path;
use std::time::Instant;

use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::config::GeminiConfig;
use crate::error::{GeminiError, GeminiResult};

// =============================================================================
// Wire types
// =============================================================================

/// A file held by the Files API.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiFile {
    /// Resource name, `files/<id>`
    pub name: String,
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub state: FileState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileState {
    #[default]
    StateUnspecified,
    Processing,
    Active,
    Failed,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    file: GeminiFile,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part<'a> {
    File {
        #[serde(rename = "fileData")]
        file_data: FileData<'a>,
    },
    Text {
        text: &'a str,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FileData<'a> {
    file_uri: &'a str,
    mime_type: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

// =============================================================================
// Helpers
// =============================================================================

/// Guess a MIME type from the file extension.
pub fn mime_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("mp4") | Some("m4v") => "video/mp4",
        Some("mov") => "video/quicktime",
        Some("webm") => "video/webm",
        Some("avi") => "video/x-msvideo",
        Some("mkv") => "video/x-matroska",
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        _ => "application/octet-stream",
    }
}

/// Strip a Markdown code fence around a model's JSON answer.
pub fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    let text = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```JSON"))
        .or_else(|| text.strip_prefix("```"))
        .unwrap_or(text);
    let text = text.strip_suffix("```").unwrap_or(text);
    text.trim()
}

// =============================================================================
// Client
// =============================================================================

#[derive(Clone)]
pub struct GeminiClient {
    http: Client,
    config: GeminiConfig,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> GeminiResult<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("cloner-gemini/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http, config })
    }

    pub fn from_env() -> GeminiResult<Self> {
        Self::new(GeminiConfig::from_env()?)
    }

    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.api_url.trim_end_matches('/'), path)
    }

    async fn check(response: Response) -> GeminiResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(GeminiError::http(status.as_u16(), body))
    }

    async fn parse<T: DeserializeOwned>(response: Response) -> GeminiResult<T> {
        let body = Self::check(response).await?.text().await?;
        serde_json::from_str(&body).map_err(|e| GeminiError::parse(format!("{e}: {body}")))
    }

    /// Upload a local file with the resumable protocol.
    pub async fn upload_file(&self, path: &Path) -> GeminiResult<GeminiFile> {
        let bytes = tokio::fs::read(path).await?;
        let mime = mime_type_for(path);
        let display_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload");

        let span = info_span!("gemini_upload", file = display_name, bytes = bytes.len());
        async {
            let start = self
                .http
                .post(self.url("upload/v1beta/files"))
                .query(&[("key", self.config.api_key.as_str())])
                .header("X-Goog-Upload-Protocol", "resumable")
                .header("X-Goog-Upload-Command", "start")
                .header("X-Goog-Upload-Header-Content-Length", bytes.len().to_string())
                .header("X-Goog-Upload-Header-Content-Type", mime)
                .json(&json!({ "file": { "display_name": display_name } }))
                .send()
                .await?;
            let start = Self::check(start).await?;

            let upload_url = start
                .headers()
                .get("x-goog-upload-url")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
                .ok_or_else(|| GeminiError::parse("upload start response has no upload URL"))?;

            let response = self
                .http
                .post(&upload_url)
                .header("X-Goog-Upload-Offset", "0")
                .header("X-Goog-Upload-Command", "upload, finalize")
                .body(bytes)
                .send()
                .await?;
            let uploaded: UploadResponse = Self::parse(response).await?;

            info!(name = %uploaded.file.name, mime, "Uploaded file to Gemini");
            Ok::<_, GeminiError>(uploaded.file)
        }
        .instrument(span)
        .await
    }

    pub async fn get_file(&self, name: &str) -> GeminiResult<GeminiFile> {
        let response = self
            .http
            .get(self.url(&format!("v1beta/{name}")))
            .query(&[("key", self.config.api_key.as_str())])
            .send()
            .await?;
        Self::parse(response).await
    }

    /// Poll an uploaded file until it is `ACTIVE`.
    pub async fn wait_until_active(&self, file: GeminiFile) -> GeminiResult<GeminiFile> {
        let started = Instant::now();
        let mut file = file;

        loop {
            match file.state {
                FileState::Active => return Ok(file),
                FileState::Failed => return Err(GeminiError::FileFailed { name: file.name }),
                _ => {}
            }
            if started.elapsed() >= self.config.file_processing_timeout {
                return Err(GeminiError::FileTimeout {
                    name: file.name,
                    secs: self.config.file_processing_timeout.as_secs(),
                });
            }
            debug!(name = %file.name, state = ?file.state, "Waiting for file processing");
            tokio::time::sleep(self.config.file_poll_interval).await;
            file = self.get_file(&file.name).await?;
        }
    }

    /// Delete an uploaded file. Failures are logged, not returned.
    pub async fn delete_file(&self, name: &str) {
        let result = self
            .http
            .delete(self.url(&format!("v1beta/{name}")))
            .query(&[("key", self.config.api_key.as_str())])
            .send()
            .await;
        match result {
            Ok(r) if r.status().is_success() => debug!(name, "Deleted Gemini file"),
            Ok(r) => warn!(name, status = r.status().as_u16(), "Failed to delete Gemini file"),
            Err(e) => warn!(name, "Failed to delete Gemini file: {}", e),
        }
    }

    /// Ask for a JSON answer about an optional file and parse it.
    pub async fn generate_json<T: DeserializeOwned>(
        &self,
        file: Option<&GeminiFile>,
        prompt: &str,
    ) -> GeminiResult<T> {
        self.with_model_fallback(|model| async move {
            let text = self.call_model(&model, file, prompt, true).await?;
            serde_json::from_str(strip_json_fences(&text))
                .map_err(|e| GeminiError::parse(format!("{model}: {e}")))
        })
        .await
    }

    /// Ask for a plain-text answer.
    pub async fn generate_text(&self, file: Option<&GeminiFile>, prompt: &str) -> GeminiResult<String> {
        self.with_model_fallback(|model| async move {
            let text = self.call_model(&model, file, prompt, false).await?;
            Ok(text.trim().to_string())
        })
        .await
    }

    async fn with_model_fallback<T, F, Fut>(&self, attempt: F) -> GeminiResult<T>
    where
        F: Fn(String) -> Fut,
        Fut: std::future::Future<Output = GeminiResult<T>>,
    {
        let mut last_error = None;

        for model in &self.config.models {
            info!("Attempting Gemini API with model: {}", model);
            match attempt(model.clone()).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() => {
                    warn!("Failed with model {}: {}", model, e);
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| GeminiError::config("no Gemini models configured")))
    }

    async fn call_model(
        &self,
        model: &str,
        file: Option<&GeminiFile>,
        prompt: &str,
        json_output: bool,
    ) -> GeminiResult<String> {
        let mut parts = Vec::with_capacity(2);
        if let Some(f) = file {
            parts.push(Part::File {
                file_data: FileData {
                    file_uri: &f.uri,
                    mime_type: &f.mime_type,
                },
            });
        }
        parts.push(Part::Text { text: prompt });

        let request = GenerateRequest {
            contents: vec![Content { parts }],
            generation_config: json_output.then(|| GenerationConfig {
                response_mime_type: "application/json".to_string(),
            }),
        };

        let span = info_span!("gemini_request", model);
        async {
            let started = Instant::now();
            let response = self
                .http
                .post(self.url(&format!("v1beta/models/{model}:generateContent")))
                .query(&[("key", self.config.api_key.as_str())])
                .json(&request)
                .send()
                .await?;
            let response: GenerateResponse = Self::parse(response).await?;

            let text: String = response
                .candidates
                .into_iter()
                .next()
                .and_then(|c| c.content)
                .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
                .unwrap_or_default();
            if text.trim().is_empty() {
                return Err(GeminiError::EmptyResponse);
            }

            debug!(
                duration_ms = started.elapsed().as_millis() as u64,
                chars = text.len(),
                "Gemini answered"
            );
            Ok(text)
        }
        .instrument(span)
        .await
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;

    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer, models: &[&str]) -> GeminiClient {
        GeminiClient::new(
            GeminiConfig::new("gem-key")
                .with_api_url(server.uri())
                .with_models(models)
                .with_file_polling(Duration::from_millis(10), Duration::from_secs(2)),
        )
        .unwrap()
    }

    fn answer(text: &str) -> serde_json::Value {
        json!({"candidates": [{"content": {"parts": [{"text": text}]}}]})
    }

    #[test]
    fn test_strip_json_fences() {
        assert_eq!(strip_json_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_json_fences("```\n[1]\n```"), "[1]");
        assert_eq!(strip_json_fences("  {\"a\":1} "), "{\"a\":1}");
    }

    #[test]
    fn test_mime_type_for() {
        assert_eq!(mime_type_for(Path::new("clip.MP4")), "video/mp4");
        assert_eq!(mime_type_for(Path::new("ref.jpeg")), "image/jpeg");
        assert_eq!(mime_type_for(Path::new("noext")), "application/octet-stream");
    }

    #[tokio::test]
    async fn test_generate_json_falls_back_to_next_model() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/model-a:generateContent"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/model-b:generateContent"))
            .and(query_param("key", "gem-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(answer("```json\n{\"n\": 3}\n```")))
            .expect(1)
            .mount(&server)
            .await;

        #[derive(Deserialize)]
        struct Answer {
            n: u32,
        }

        let parsed: Answer = client(&server, &["model-a", "model-b"])
            .generate_json(None, "count")
            .await
            .unwrap();
        assert_eq!(parsed.n, 3);
    }

    #[tokio::test]
    async fn test_auth_error_stops_fallback() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("API key invalid"))
            .expect(1)
            .mount(&server)
            .await;

        let err = client(&server, &["model-a", "model-b"])
            .generate_text(None, "hello")
            .await
            .unwrap_err();
        assert!(matches!(err, GeminiError::Http { status: 403, .. }));
    }

    #[tokio::test]
    async fn test_upload_and_wait_until_active() {
        let server = MockServer::start().await;
        let upload_url = format!("{}/upload-session/abc", server.uri());

        Mock::given(method("POST"))
            .and(path("/upload/v1beta/files"))
            .and(header("X-Goog-Upload-Command", "start"))
            .respond_with(ResponseTemplate::new(200).insert_header("x-goog-upload-url", upload_url.as_str()))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/upload-session/abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "file": {
                    "name": "files/abc",
                    "uri": "https://gemini/files/abc",
                    "mimeType": "video/mp4",
                    "state": "PROCESSING"
                }
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1beta/files/abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "files/abc",
                "uri": "https://gemini/files/abc",
                "mimeType": "video/mp4",
                "state": "ACTIVE"
            })))
            .mount(&server)
            .await;

        let mut video = tempfile::Builder::new().suffix(".mp4").tempfile().unwrap();
        video.write_all(b"not really a video").unwrap();

        let gemini = client(&server, &["model-a"]);
        let file = gemini.upload_file(video.path()).await.unwrap();
        assert_eq!(file.state, FileState::Processing);

        let file = gemini.wait_until_active(file).await.unwrap();
        assert_eq!(file.state, FileState::Active);
        assert_eq!(file.mime_type, "video/mp4");
    }

    #[tokio::test]
    async fn test_failed_file_processing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1beta/files/bad"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "files/bad",
                "state": "FAILED"
            })))
            .mount(&server)
            .await;

        let pending = GeminiFile {
            name: "files/bad".into(),
            uri: String::new(),
            mime_type: String::new(),
            state: FileState::Processing,
        };
        let err = client(&server, &["m"]).wait_until_active(pending).await.unwrap_err();
        assert!(matches!(err, GeminiError::FileFailed { .. }));
    }
}
