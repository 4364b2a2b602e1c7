//! Airtable REST API client.
//!
//! Production-grade client with:
//! - HTTP client tuning (pooling, timeouts)
//! - Exponential backoff with jitter
//! - Observability (tracing spans, metrics)

use std::time::{Duration, Instant};

use reqwest::{Client, Response, StatusCode};
use tracing::{debug, info_span, Instrument};

use crate::error::{RecordError, RecordResult};
use crate::metrics::record_request;
use crate::retry::{with_retry, RetryConfig};
use crate::types::{
    CreateRecordsRequest, DeleteRecordsResponse, Fields, ListRecordsResponse, NewRecord, Record,
    RecordsResponse, UpdateRecordRequest,
};

/// Airtable accepts at most this many records per write or delete call.
pub const BATCH_SIZE: usize = 10;

const DEFAULT_API_URL: &str = "https://api.airtable.com/v0";
const DEFAULT_TABLE: &str = "Scenes";

// =============================================================================
// Configuration
// =============================================================================

/// Airtable client configuration.
#[derive(Debug, Clone)]
pub struct AirtableConfig {
    /// Personal access token
    pub api_token: String,
    /// Base identifier (`app...`)
    pub base_id: String,
    /// Table holding scene records
    pub table: String,
    /// API root, overridable for tests
    pub api_url: String,
    /// Request timeout
    pub timeout: Duration,
    /// Connect timeout
    pub connect_timeout: Duration,
    /// Retry configuration
    pub retry: RetryConfig,
}

impl AirtableConfig {
    /// Config with default table, endpoint and timeouts.
    pub fn new(api_token: impl Into<String>, base_id: impl Into<String>) -> Self {
        Self {
            api_token: api_token.into(),
            base_id: base_id.into(),
            table: DEFAULT_TABLE.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
            retry: RetryConfig::default(),
        }
    }

    /// Create config from environment variables.
    pub fn from_env() -> RecordResult<Self> {
        let api_token = std::env::var("AIRTABLE_API_TOKEN")
            .or_else(|_| std::env::var("AIRTABLE_API_KEY"))
            .map_err(|_| {
                RecordError::config("AIRTABLE_API_TOKEN or AIRTABLE_API_KEY must be set")
            })?;
        if api_token.trim().is_empty() {
            return Err(RecordError::config("AIRTABLE_API_TOKEN cannot be empty"));
        }

        let base_id = std::env::var("AIRTABLE_BASE_ID")
            .map_err(|_| RecordError::config("AIRTABLE_BASE_ID must be set"))?;
        if base_id.trim().is_empty() {
            return Err(RecordError::config("AIRTABLE_BASE_ID cannot be empty"));
        }

        let connect_timeout_secs: u64 = std::env::var("AIRTABLE_CONNECT_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(5);

        Ok(Self {
            table: std::env::var("AIRTABLE_TABLE")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_TABLE.to_string()),
            api_url: std::env::var("AIRTABLE_API_URL")
                .unwrap_or_else(|_| DEFAULT_API_URL.to_string()),
            connect_timeout: Duration::from_secs(connect_timeout_secs),
            retry: RetryConfig::from_env(),
            ..Self::new(api_token.trim(), base_id.trim())
        })
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }
}

// =============================================================================
// Client
// =============================================================================

/// Airtable REST API client bound to one table.
#[derive(Clone)]
pub struct AirtableClient {
    http: Client,
    config: AirtableConfig,
    table_url: String,
}

impl AirtableClient {
    /// Create a new Airtable client.
    pub fn new(config: AirtableConfig) -> RecordResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .user_agent(concat!("cloner-records/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(RecordError::Network)?;

        let table_url = format!(
            "{}/{}/{}",
            config.api_url.trim_end_matches('/'),
            config.base_id,
            urlencoding::encode(&config.table)
        );

        Ok(Self {
            http,
            config,
            table_url,
        })
    }

    /// Create from environment variables.
    pub fn from_env() -> RecordResult<Self> {
        Self::new(AirtableConfig::from_env()?)
    }

    pub fn table(&self) -> &str {
        &self.config.table
    }

    fn record_url(&self, record_id: &str) -> String {
        format!("{}/{}", self.table_url, urlencoding::encode(record_id))
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// List every record matching `formula`, following pagination.
    pub async fn list_records(&self, formula: Option<&str>) -> RecordResult<Vec<Record>> {
        let mut records = Vec::new();
        let mut offset: Option<String> = None;

        loop {
            let mut query: Vec<(&str, String)> = vec![("pageSize", "100".to_string())];
            if let Some(f) = formula {
                query.push(("filterByFormula", f.to_string()));
            }
            if let Some(o) = &offset {
                query.push(("offset", o.clone()));
            }

            let query = &query;
            let page: ListRecordsResponse = self
                .execute_request("list_records", None, async {
                    with_retry(&self.config.retry, "list_records", move || async move {
                        let response = self
                            .http
                            .get(&self.table_url)
                            .bearer_auth(&self.config.api_token)
                            .query(query)
                            .send()
                            .await?;
                        Self::parse_response(response, "list_records").await
                    })
                    .await
                })
                .await?;

            debug!(count = page.records.len(), "Fetched record page");
            records.extend(page.records);

            match page.offset {
                Some(next) if !next.is_empty() => offset = Some(next),
                _ => break,
            }
        }

        Ok(records)
    }

    /// Create records in batches of [`BATCH_SIZE`], preserving input order.
    pub async fn create_records(&self, fields: Vec<Fields>) -> RecordResult<Vec<Record>> {
        let mut created = Vec::with_capacity(fields.len());

        for chunk in fields.chunks(BATCH_SIZE) {
            let body = CreateRecordsRequest {
                records: chunk
                    .iter()
                    .map(|f| NewRecord { fields: f.clone() })
                    .collect(),
                typecast: true,
            };
            let body = &body;

            let response: RecordsResponse = self
                .execute_request("create_records", None, async {
                    with_retry(&self.config.retry, "create_records", move || async move {
                        let response = self
                            .http
                            .post(&self.table_url)
                            .bearer_auth(&self.config.api_token)
                            .json(body)
                            .send()
                            .await?;
                        Self::parse_response(response, "create_records").await
                    })
                    .await
                })
                .await?;

            if response.records.len() != chunk.len() {
                return Err(RecordError::invalid_response(format!(
                    "created {} records, expected {}",
                    response.records.len(),
                    chunk.len()
                )));
            }
            created.extend(response.records);
        }

        Ok(created)
    }

    /// Merge `fields` into an existing record.
    pub async fn update_record(&self, record_id: &str, fields: &Fields) -> RecordResult<Record> {
        let url = self.record_url(record_id);
        let body = UpdateRecordRequest {
            fields,
            typecast: true,
        };
        let (url, body) = (&url, &body);

        self.execute_request("update_record", Some(record_id), async {
            with_retry(&self.config.retry, "update_record", move || async move {
                let response = self
                    .http
                    .patch(url)
                    .bearer_auth(&self.config.api_token)
                    .json(body)
                    .send()
                    .await?;
                Self::parse_response(response, "update_record").await
            })
            .await
        })
        .await
    }

    /// Fetch one record.
    pub async fn get_record(&self, record_id: &str) -> RecordResult<Record> {
        let url = self.record_url(record_id);
        let url = &url;

        self.execute_request("get_record", Some(record_id), async {
            with_retry(&self.config.retry, "get_record", move || async move {
                let response = self
                    .http
                    .get(url)
                    .bearer_auth(&self.config.api_token)
                    .send()
                    .await?;
                Self::parse_response(response, "get_record").await
            })
            .await
        })
        .await
    }

    /// Delete records in batches of [`BATCH_SIZE`]. Returns how many were deleted.
    pub async fn delete_records(&self, record_ids: &[String]) -> RecordResult<usize> {
        let mut deleted = 0;

        for chunk in record_ids.chunks(BATCH_SIZE) {
            let query: Vec<(&str, &str)> =
                chunk.iter().map(|id| ("records[]", id.as_str())).collect();
            let query = &query;

            let response: DeleteRecordsResponse = self
                .execute_request("delete_records", None, async {
                    with_retry(&self.config.retry, "delete_records", move || async move {
                        let response = self
                            .http
                            .delete(&self.table_url)
                            .bearer_auth(&self.config.api_token)
                            .query(query)
                            .send()
                            .await?;
                        Self::parse_response(response, "delete_records").await
                    })
                    .await
                })
                .await?;

            deleted += response.records.iter().filter(|r| r.deleted).count();
        }

        Ok(deleted)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    async fn execute_request<T, F>(
        &self,
        operation: &str,
        record_id: Option<&str>,
        fut: F,
    ) -> RecordResult<T>
    where
        F: std::future::Future<Output = RecordResult<T>>,
    {
        let span = if let Some(id) = record_id {
            info_span!("airtable_request", operation = %operation, table = %self.config.table, record_id = %id)
        } else {
            info_span!("airtable_request", operation = %operation, table = %self.config.table)
        };

        let start = Instant::now();
        let result = fut.instrument(span).await;
        let latency_ms = start.elapsed().as_millis() as f64;

        let status = match &result {
            Ok(_) => 200,
            Err(e) => e.http_status().unwrap_or(500),
        };
        record_request(operation, status, latency_ms);

        result
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: Response,
        operation: &str,
    ) -> RecordResult<T> {
        let status = response.status();
        if status.is_success() {
            let body = response.text().await?;
            return serde_json::from_str(&body).map_err(|e| {
                RecordError::invalid_response(format!("{operation}: {e}"))
            });
        }
        Err(Self::handle_error_response(status, operation, response).await)
    }

    async fn handle_error_response(
        status: StatusCode,
        operation: &str,
        response: Response,
    ) -> RecordError {
        let body = response.text().await.unwrap_or_default();
        RecordError::from_http_status(status.as_u16(), format!("{operation} failed: {body}"))
    }
}

/// Quote a value for use inside an Airtable formula string literal.
pub fn formula_string(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}
