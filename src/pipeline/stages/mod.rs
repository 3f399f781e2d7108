//! Built-in pipeline stages.

pub mod download;
pub mod enrich;
pub mod parse;
pub mod summary;

pub use download::DownloadStage;
pub use enrich::{ExpressionEnricher, TextCleanupEnricher};
pub use parse::{HtmlTableParserStage, JsonParserStage, RssParserStage};
pub use summary::{SummaryFromLinkStage, SummaryHtmlToTextStage};

use crate::error::{Result, ScraperError};
use crate::types::StageSpec;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// Deserializes a stage's settings from its `params` overlaid with its `config`.
pub(crate) fn stage_config<T: DeserializeOwned + Default>(spec: &StageSpec) -> Result<T> {
    let mut merged = Map::new();
    for source in [&spec.params, &spec.config].into_iter().flatten() {
        if let Value::Object(obj) = source {
            merged.extend(obj.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
    }
    if merged.is_empty() {
        return Ok(T::default());
    }
    serde_json::from_value(Value::Object(merged))
        .map_err(|e| ScraperError::Config(format!("invalid settings for stage {}: {}", spec.stage, e)))
}
