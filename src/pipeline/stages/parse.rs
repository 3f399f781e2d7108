use crate::app::ports::{FetchOptions, Fetcher};
use crate::constants::{DEFAULT_API_MAPPINGS, DEFAULT_RSS_MAPPINGS, DEFAULT_TABLE_MAPPINGS, JSON_ACCEPT, JSON_ITEM_KEYS};
use crate::error::{Result, ScraperError};
use crate::parser::{parse_feed, parse_table, TableParseConfig};
use crate::pipeline::engine::{Stage, StageContext};
use crate::pipeline::processing::document::{build_document, resolve_rules};
use crate::pipeline::processing::mapper::{get_path, FieldMappings};
use crate::pipeline::processing::text::{clean_html, looks_like_html, TextFormat};
use crate::pipeline::stages::stage_config;
use crate::pipeline::state::PipelineState;
use crate::types::{Document, Row, SourceConfig};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

const TABLE_KEYS: &[&str] = &["tableSelector", "rowSelector", "headerRowIndex", "columns", "isDivTable"];

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RssParserConfig {
    #[serde(default)]
    field_mappings: Option<FieldMappings>,
    #[serde(default = "default_true")]
    convert_html_to_markdown: bool,
}

impl Default for RssParserConfig {
    fn default() -> Self {
        Self {
            field_mappings: None,
            convert_html_to_markdown: true,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableStageConfig {
    #[serde(default)]
    field_mappings: Option<FieldMappings>,
}

/// Maps rows to documents; a row that cannot be materialised is logged and skipped.
fn rows_to_documents(rows: Vec<Row>, rules: &[String], source: &SourceConfig) -> Vec<Document> {
    values_to_documents(rows.into_iter().map(Value::Object).collect(), rules, source)
}

fn values_to_documents(values: Vec<Value>, rules: &[String], source: &SourceConfig) -> Vec<Document> {
    let total = values.len();
    let documents: Vec<Document> = values
        .into_iter()
        .enumerate()
        .filter_map(|(i, value)| {
            if !value.is_object() {
                warn!("Skipping row {} of {}: not an object", i + 1, total);
                return None;
            }
            match build_document(&value, rules, source) {
                Ok(doc) => Some(doc),
                Err(e) => {
                    warn!("Skipping row {} of {}: {}", i + 1, total, e);
                    None
                }
            }
        })
        .collect();
    info!("🧾 Mapped {}/{} rows to documents", documents.len(), total);
    documents
}

/// RSS-PARSER: feed items to documents, fetching the source itself when no download ran.
pub struct RssParserStage {
    fetcher: Arc<dyn Fetcher>,
}

impl RssParserStage {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl Stage for RssParserStage {
    async fn process(&self, mut state: PipelineState, ctx: &StageContext<'_>) -> Result<PipelineState> {
        let config: RssParserConfig = stage_config(ctx.spec)?;

        if state.raw_data.is_none() {
            info!("No raw data yet, fetching feed {}", ctx.source.url);
            let body = self.fetcher.fetch(&ctx.source.url, &FetchOptions::default()).await?;
            state.raw_data = Some(body);
            state.base_url = Some(ctx.source.url.clone());
        }

        let mut rows = parse_feed(state.require_raw_data()?)?;
        info!("📰 Parsed {} feed item(s)", rows.len());

        if config.convert_html_to_markdown {
            for row in rows.iter_mut() {
                if let Some(Value::String(desc)) = row.get_mut("description") {
                    if looks_like_html(desc) {
                        *desc = clean_html(desc, TextFormat::Markdown);
                    }
                }
            }
        }

        let rules = resolve_rules(config.field_mappings.as_ref(), ctx.source, DEFAULT_RSS_MAPPINGS);
        state.documents = rows_to_documents(rows, &rules, ctx.source);
        Ok(state)
    }
}

/// HTML-TABLE-PARSER: rows of the downloaded page to documents.
pub struct HtmlTableParserStage;

impl HtmlTableParserStage {
    fn table_config(ctx: &StageContext<'_>) -> Result<TableParseConfig> {
        let stage_table = ctx
            .spec
            .config
            .as_ref()
            .filter(|c| TABLE_KEYS.iter().any(|k| c.get(k).is_some()));
        match stage_table {
            Some(config) => serde_json::from_value(config.clone()).map_err(|e| {
                ScraperError::Config(format!("invalid table config for {}: {}", ctx.spec.stage, e))
            }),
            None => Ok(ctx.source.selector.clone().unwrap_or_default()),
        }
    }
}

fn apply_row_fallbacks(row: &mut Row) {
    if !row.contains_key("publishedOn") {
        if let Some(date) = row.get("publishDate").cloned() {
            row.insert("publishedOn".to_string(), date);
        }
    }
    if !row.contains_key("summary") {
        let summary = match row.get("content") {
            Some(Value::String(content)) => Some(clean_html(content, TextFormat::Markdown)),
            _ => None,
        };
        if let Some(summary) = summary {
            row.insert("summary".to_string(), Value::String(summary));
        }
    }
}

#[async_trait]
impl Stage for HtmlTableParserStage {
    async fn process(&self, mut state: PipelineState, ctx: &StageContext<'_>) -> Result<PipelineState> {
        let table = Self::table_config(ctx)?;
        let stage: TableStageConfig = stage_config(ctx.spec)?;
        let base_url = state.base_url.clone().unwrap_or_else(|| ctx.source.url.clone());

        let mut rows = parse_table(state.require_raw_data()?, &table, Some(&base_url))?;
        info!("📊 Extracted {} table row(s) with '{}'", rows.len(), table.table_selector);
        rows.iter_mut().for_each(apply_row_fallbacks);

        let rules = resolve_rules(stage.field_mappings.as_ref(), ctx.source, DEFAULT_TABLE_MAPPINGS);
        state.documents = rows_to_documents(rows, &rules, ctx.source);
        Ok(state)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsonParserConfig {
    #[serde(default)]
    field_mappings: Option<FieldMappings>,
    /// Dot path to the item array, e.g. `response.docs`.
    #[serde(default)]
    items_path: Option<String>,
}

/// Finds the item array: the body itself, `items_path`, or the first of `items`/`results`/`data`.
fn json_items(body: Value, items_path: Option<&str>) -> Vec<Value> {
    if let Some(path) = items_path {
        let segments: Vec<&str> = path.split('.').filter(|s| !s.is_empty()).collect();
        return match get_path(&body, &segments) {
            Some(Value::Array(items)) => items.clone(),
            _ => {
                warn!("No item array at '{}'", path);
                Vec::new()
            }
        };
    }
    match body {
        Value::Array(items) => items,
        Value::Object(mut obj) => {
            for key in JSON_ITEM_KEYS {
                if let Some(Value::Array(items)) = obj.remove(*key) {
                    return items;
                }
            }
            warn!("JSON object has none of {:?}", JSON_ITEM_KEYS);
            Vec::new()
        }
        _ => {
            warn!("JSON body is neither an array nor an object");
            Vec::new()
        }
    }
}

/// JSON-PARSER: items of a JSON API response to documents, fetching the source when no
/// download ran. Null items and items that do not fit the document shape are skipped.
pub struct JsonParserStage {
    fetcher: Arc<dyn Fetcher>,
}

impl JsonParserStage {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl Stage for JsonParserStage {
    async fn process(&self, mut state: PipelineState, ctx: &StageContext<'_>) -> Result<PipelineState> {
        let config: JsonParserConfig = stage_config(ctx.spec)?;

        if state.raw_data.is_none() {
            info!("No raw data yet, fetching API {}", ctx.source.url);
            let options = FetchOptions::default().with_header("Accept", JSON_ACCEPT);
            let body = self.fetcher.fetch(&ctx.source.url, &options).await?;
            state.raw_data = Some(body);
            state.base_url = Some(ctx.source.url.clone());
        }

        let body: Value = serde_json::from_str(state.require_raw_data()?)
            .map_err(|e| ScraperError::Parse(format!("response is not JSON: {}", e)))?;
        let items: Vec<Value> = json_items(body, config.items_path.as_deref())
            .into_iter()
            .filter(|item| !item.is_null())
            .collect();
        info!("🔌 Parsed {} API item(s)", items.len());

        let rules = resolve_rules(config.field_mappings.as_ref(), ctx.source, DEFAULT_API_MAPPINGS);
        state.documents = values_to_documents(items, &rules, ctx.source);
        Ok(state)
    }
}
