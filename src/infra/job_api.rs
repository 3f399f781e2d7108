use crate::app::ports::{JobRun, JobStarted, JobTracker, StartJob};
use crate::error::{Result, ScraperError};
use crate::types::Document;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CompleteScan<'a> {
    id: i64,
    result_data: &'a [Document],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ScanFailed<'a> {
    id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_message: Option<&'a str>,
}

/// Update acknowledgement. The backend answers 404 when nothing changed, so a 200 without
/// an explicit count means the one run was updated.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Affected {
    #[serde(default = "one_row")]
    affected_rows: u64,
}

fn one_row() -> u64 {
    1
}

/// Client for the external job-tracking REST API.
pub struct HttpJobTracker {
    client: reqwest::Client,
    base_url: String,
}

impl HttpJobTracker {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn check(response: reqwest::Response, action: &str) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ScraperError::Api {
            message: format!("{} returned {}: {}", action, status, body),
        })
    }

    async fn affected(response: reqwest::Response, action: &str) -> Result<u64> {
        if response.status() == StatusCode::NOT_FOUND {
            debug!("{}: run not found or not RUNNING", action);
            return Ok(0);
        }
        let response = Self::check(response, action).await?;
        let body = response.text().await?;
        if body.trim().is_empty() {
            return Ok(1);
        }
        Ok(serde_json::from_str::<Affected>(&body)?.affected_rows)
    }
}

#[async_trait]
impl JobTracker for HttpJobTracker {
    #[instrument(skip(self, request), fields(job_id = %request.job_id))]
    async fn start(&self, request: StartJob) -> Result<JobStarted> {
        let response = self
            .client
            .post(self.endpoint("start-scan"))
            .json(&request)
            .send()
            .await?;
        let response = Self::check(response, "start-scan").await?;
        Ok(response.json().await?)
    }

    #[instrument(skip(self, documents), fields(documents = documents.len()))]
    async fn complete(&self, run_id: i64, documents: &[Document]) -> Result<u64> {
        let response = self
            .client
            .put(self.endpoint("complete-scan"))
            .json(&CompleteScan {
                id: run_id,
                result_data: documents,
            })
            .send()
            .await?;
        Self::affected(response, "complete-scan").await
    }

    #[instrument(skip(self))]
    async fn fail(&self, run_id: i64, error_message: Option<&str>) -> Result<u64> {
        let response = self
            .client
            .put(self.endpoint("scan-failed"))
            .json(&ScanFailed {
                id: run_id,
                error_message,
            })
            .send()
            .await?;
        Self::affected(response, "scan-failed").await
    }

    #[instrument(skip(self))]
    async fn job(&self, run_id: i64) -> Result<Option<JobRun>> {
        let response = self
            .client
            .get(self.endpoint(&run_id.to_string()))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = Self::check(response, "job").await?;
        Ok(response.json().await?)
    }
}
