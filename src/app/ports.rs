use crate::error::Result;
use crate::types::Document;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-request knobs a stage may pass to a fetcher.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    pub headers: HashMap<String, String>,
    /// Overrides the fetcher's configured timeout.
    pub timeout_ms: Option<u64>,
    /// Browser fetchers only: CSS selector that must appear before the page is read.
    pub wait_for_selector: Option<String>,
    /// Browser fetchers only: pause for the configured settle delay after load.
    pub settle_after_load: bool,
    pub headless: Option<bool>,
}

impl FetchOptions {
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }
}

/// Content acquisition strategy returning the raw body text.
#[async_trait]
pub trait Fetcher: Send + Sync {
    fn name(&self) -> &'static str;
    async fn fetch(&self, url: &str, options: &FetchOptions) -> Result<String>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    #[serde(alias = "running")]
    #[default]
    Running,
    #[serde(alias = "completed")]
    Completed,
    #[serde(alias = "failed")]
    Failed,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartJob {
    pub job_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Response of `start-scan`; the backend names the new run `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStarted {
    #[serde(rename = "id", alias = "runId")]
    pub run_id: i64,
    #[serde(default)]
    pub status: JobStatus,
}

/// One tracked scan run as stored by the job-tracking backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRun {
    pub id: i64,
    #[serde(alias = "job_id")]
    pub job_id: String,
    #[serde(default, alias = "job_name")]
    pub job_name: Option<String>,
    #[serde(default, alias = "correlation_id")]
    pub correlation_id: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    pub status: JobStatus,
    #[serde(default, alias = "start_time")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, alias = "end_time")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default, alias = "result_data")]
    pub result_data: Option<Vec<Document>>,
    #[serde(default, alias = "error_message")]
    pub error_message: Option<String>,
}

/// Sink for scan-run lifecycle transitions. Complete and fail only affect RUNNING runs.
#[async_trait]
pub trait JobTracker: Send + Sync {
    async fn start(&self, request: StartJob) -> Result<JobStarted>;
    async fn complete(&self, run_id: i64, documents: &[Document]) -> Result<u64>;
    async fn fail(&self, run_id: i64, error_message: Option<&str>) -> Result<u64>;
    async fn job(&self, run_id: i64) -> Result<Option<JobRun>>;
}
