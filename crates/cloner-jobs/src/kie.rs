//! Kie.ai generation client.
//!
//! Every model goes through the same two endpoints: `jobs/createTask` takes
//! `{model, input}` and returns a task id, `jobs/recordInfo` reports the task
//! state. Reference images are uploaded to Kie's file host first so the
//! vendor can fetch them by URL.

use std::path::Path;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use cloner_models::{truncate_prompt, GenerationModel, JobId, JobStatus, StatusReport};

use crate::api::{ApiError, ApiResult, GenerationApi, GenerationRequest};

const DEFAULT_API_URL: &str = "https://api.kie.ai/api/v1";
const DEFAULT_UPLOAD_URL: &str = "https://kieai.redpandaai.co/api/file-stream-upload";
const DEFAULT_UPLOAD_PATH: &str = "creative-cloner";

// =============================================================================
// Configuration
// =============================================================================

/// Kie.ai client configuration.
#[derive(Debug, Clone)]
pub struct KieConfig {
    pub api_key: String,
    /// API root, e.g. `https://api.kie.ai/api/v1`
    pub api_url: String,
    /// File stream upload endpoint
    pub upload_url: String,
    /// Folder uploads are stored under
    pub upload_path: String,
    /// Per-request timeout
    pub timeout: Duration,
    /// Timeout for reference uploads
    pub upload_timeout: Duration,
}

impl KieConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_url: DEFAULT_API_URL.to_string(),
            upload_url: DEFAULT_UPLOAD_URL.to_string(),
            upload_path: DEFAULT_UPLOAD_PATH.to_string(),
            timeout: Duration::from_secs(30),
            upload_timeout: Duration::from_secs(60),
        }
    }

    /// Create config from environment variables.
    pub fn from_env() -> ApiResult<Self> {
        let api_key = std::env::var("KIE_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ApiError::Config("KIE_API_KEY must be set".to_string()))?;

        let mut config = Self::new(api_key.trim());
        if let Ok(url) = std::env::var("KIE_API_URL") {
            config.api_url = url;
        }
        if let Ok(url) = std::env::var("KIE_UPLOAD_URL") {
            config.upload_url = url;
        }
        Ok(config)
    }

    /// Point both endpoints at one base URL (used by tests).
    pub fn with_base_url(mut self, base: &str) -> Self {
        let base = base.trim_end_matches('/');
        self.api_url = format!("{base}/api/v1");
        self.upload_url = format!("{base}/api/file-stream-upload");
        self
    }
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    msg: Option<String>,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedTask {
    task_id: Option<String>,
}

/// Task state as returned by `jobs/recordInfo`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordInfo {
    #[serde(default)]
    pub state: Option<String>,
    /// JSON-encoded string (sometimes an object) holding `resultUrls`
    #[serde(default)]
    pub result_json: Option<Value>,
    #[serde(default)]
    pub fail_code: Option<Value>,
    #[serde(default)]
    pub fail_msg: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadedFile {
    download_url: Option<String>,
    file_url: Option<String>,
}

// =============================================================================
// Pure mapping
// =============================================================================

/// Build the model-specific `input` object for a request.
///
/// Prompts longer than the model accepts are cut at a sentence boundary.
pub fn build_payload(request: &GenerationRequest) -> Value {
    let max = request.model.max_prompt_chars();
    let prompt = if request.prompt.chars().count() > max {
        warn!(
            model = %request.model,
            length = request.prompt.chars().count(),
            max,
            "Prompt too long, truncating"
        );
        truncate_prompt(&request.prompt, max)
    } else {
        request.prompt.clone()
    };
    let ratio = request.aspect_ratio();

    match request.model {
        GenerationModel::ZImage => json!({
            "prompt": prompt,
            "aspect_ratio": ratio.image_param(),
        }),
        GenerationModel::NanoBananaPro => {
            let mut input = json!({
                "prompt": prompt,
                "aspect_ratio": ratio.image_param(),
                "resolution": request.resolution.as_str(),
                "output_format": "png",
            });
            if !request.reference_images.is_empty() {
                input["image_input"] = json!(request.reference_images);
            }
            input
        }
        GenerationModel::Sora2 => json!({
            "prompt": prompt,
            "image_urls": request.reference_images,
            "aspect_ratio": ratio.video_param(),
            "n_frames": request.video_length.n_frames(),
            "remove_watermark": request.remove_watermark,
            "upload_method": "s3",
        }),
    }
}

/// Map a `recordInfo` payload to a status report.
///
/// A `success` state without any result URL is reported as completed with
/// no URL, which the dispatcher treats as a malformed response.
pub fn map_record_info(info: &RecordInfo) -> ApiResult<StatusReport> {
    let state = info
        .state
        .as_deref()
        .ok_or_else(|| ApiError::malformed("task record has no state"))?;

    let report = match state {
        "waiting" | "queuing" => StatusReport::queued(),
        "generating" => StatusReport::processing(),
        "success" => match first_result_url(info.result_json.as_ref())? {
            Some(url) => StatusReport::completed(url),
            None => StatusReport {
                status: JobStatus::Completed,
                result_url: None,
                error_detail: None,
            },
        },
        "fail" => {
            let code = match &info.fail_code {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Null) | None => "N/A".to_string(),
                Some(other) => other.to_string(),
            };
            let msg = info.fail_msg.as_deref().unwrap_or("Unknown error");
            StatusReport::failed(format!("[{code}] {msg}"))
        }
        other => {
            warn!(state = other, "Unknown task state, treating as processing");
            StatusReport::processing()
        }
    };
    Ok(report)
}

fn first_result_url(result_json: Option<&Value>) -> ApiResult<Option<String>> {
    let parsed = match result_json {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => return Ok(None),
        Some(Value::String(s)) => serde_json::from_str::<Value>(s)
            .map_err(|e| ApiError::malformed(format!("resultJson is not JSON: {e}")))?,
        Some(v) => v.clone(),
    };

    Ok(parsed
        .get("resultUrls")
        .and_then(Value::as_array)
        .and_then(|urls| urls.iter().find_map(Value::as_str))
        .map(str::to_string))
}

fn mime_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        Some("mp4") => "video/mp4",
        _ => "image/jpeg",
    }
}

// =============================================================================
// Client
// =============================================================================

/// Kie.ai HTTP client.
#[derive(Clone)]
pub struct KieClient {
    http: Client,
    config: KieConfig,
}

impl KieClient {
    pub fn new(config: KieConfig) -> ApiResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .user_agent(concat!("cloner-jobs/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> ApiResult<Self> {
        Self::new(KieConfig::from_env()?)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.api_url.trim_end_matches('/'), path)
    }

    /// Decode the `{code, msg, data}` envelope, mapping HTTP and envelope
    /// failures to [`ApiError`].
    async fn parse_envelope<T: DeserializeOwned>(response: Response) -> ApiResult<Option<T>> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::error_for(status.as_u16(), body));
        }

        let body = response.text().await?;
        let envelope: Envelope<T> = serde_json::from_str(&body)
            .map_err(|e| ApiError::malformed(format!("{e}: {body}")))?;

        match envelope.code {
            Some(code) if code != 200 => {
                let status = u16::try_from(code).unwrap_or(500);
                Err(Self::error_for(status, envelope.msg.unwrap_or_default()))
            }
            _ => Ok(envelope.data),
        }
    }

    fn error_for(status: u16, message: String) -> ApiError {
        match StatusCode::from_u16(status) {
            Ok(StatusCode::PAYMENT_REQUIRED) => ApiError::InsufficientCredits(message),
            Ok(StatusCode::BAD_REQUEST) | Ok(StatusCode::UNPROCESSABLE_ENTITY) => {
                ApiError::Rejected(format!("invalid parameters: {message}"))
            }
            _ => ApiError::http(status, message),
        }
    }
}

#[async_trait]
impl GenerationApi for KieClient {
    async fn submit(&self, request: &GenerationRequest) -> ApiResult<JobId> {
        let body = json!({
            "model": request.model.vendor_id(),
            "input": build_payload(request),
        });
        debug!(model = request.model.vendor_id(), "Creating generation task");

        let start = Instant::now();
        let response = self
            .http
            .post(self.endpoint("jobs/createTask"))
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;

        // Submissions are paid and never retried; 429 surfaces as a rejection.
        let created: Option<CreatedTask> = match Self::parse_envelope(response).await {
            Err(ApiError::Http { status: 429, message }) => {
                return Err(ApiError::Rejected(format!("rate limited: {message}")))
            }
            other => other?,
        };

        let task_id = created
            .and_then(|c| c.task_id)
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| ApiError::malformed("createTask response has no taskId"))?;

        debug!(
            task_id = %task_id,
            duration_ms = start.elapsed().as_millis() as u64,
            "Generation task created"
        );
        Ok(JobId::from_string(task_id))
    }

    async fn get_status(&self, job_id: &JobId) -> ApiResult<StatusReport> {
        let response = self
            .http
            .get(self.endpoint("jobs/recordInfo"))
            .bearer_auth(&self.config.api_key)
            .query(&[("taskId", job_id.as_str())])
            .send()
            .await?;

        let info: RecordInfo = Self::parse_envelope(response)
            .await?
            .ok_or_else(|| ApiError::malformed("recordInfo response has no data"))?;
        map_record_info(&info)
    }

    async fn upload_reference(&self, path: &Path) -> ApiResult<String> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("reference.jpg")
            .to_string();

        let part = Part::bytes(bytes)
            .file_name(file_name.clone())
            .mime_str(mime_for(path))?;
        let form = Form::new()
            .part("file", part)
            .text("uploadPath", self.config.upload_path.clone())
            .text("fileName", file_name.clone());

        let response = self
            .http
            .post(&self.config.upload_url)
            .bearer_auth(&self.config.api_key)
            .timeout(self.config.upload_timeout)
            .multipart(form)
            .send()
            .await?;

        let uploaded: UploadedFile = Self::parse_envelope(response)
            .await?
            .ok_or_else(|| ApiError::malformed("upload response has no data"))?;
        let url = uploaded
            .download_url
            .or(uploaded.file_url)
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| ApiError::malformed("upload response has no downloadUrl or fileUrl"))?;

        info!(file = %file_name, url = %url, "Uploaded reference image");
        Ok(url)
    }
}

// =============================================================================
// Tests
// =============================================================================
