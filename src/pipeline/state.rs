use crate::error::{Result, ScraperError};
use crate::types::Document;
use serde::Serialize;
use uuid::Uuid;

/// Accumulator threaded through the stages of one scan run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineState {
    pub scan_id: Uuid,
    pub run_id: Option<i64>,
    pub correlation_id: Option<String>,
    /// URL the raw data was fetched from; relative links are resolved against it.
    pub base_url: Option<String>,
    pub raw_data: Option<String>,
    pub documents: Vec<Document>,
}

impl Default for PipelineState {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineState {
    pub fn new() -> Self {
        Self {
            scan_id: Uuid::new_v4(),
            run_id: None,
            correlation_id: None,
            base_url: None,
            raw_data: None,
            documents: Vec::new(),
        }
    }

    pub fn for_run(run_id: Option<i64>, correlation_id: Option<String>) -> Self {
        Self {
            run_id,
            correlation_id,
            ..Self::new()
        }
    }

    pub fn with_raw_data(mut self, raw: impl Into<String>, base_url: Option<String>) -> Self {
        self.raw_data = Some(raw.into());
        self.base_url = base_url;
        self
    }

    /// Raw content set by an earlier download stage.
    pub fn require_raw_data(&self) -> Result<&str> {
        self.raw_data
            .as_deref()
            .ok_or_else(|| ScraperError::Parse("no raw data available; a download stage must run first".to_string()))
    }
}
