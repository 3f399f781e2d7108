use crate::error::{Result, ScraperError};
use crate::pipeline::processing::mapper::{map_fields, FieldMappings};
use crate::types::{Document, SourceConfig};
use serde_json::{Map, Value};

/// Picks the mapping rules for a parser stage: the stage's own, then the source's, then `fallback`.
pub fn resolve_rules(stage: Option<&FieldMappings>, source: &SourceConfig, fallback: &[&str]) -> Vec<String> {
    if let Some(rules) = stage.map(FieldMappings::to_rules).filter(|r| !r.is_empty()) {
        return rules;
    }
    match &source.mapper {
        Some(rules) if !rules.is_empty() => rules.clone(),
        _ => fallback.iter().map(|s| s.to_string()).collect(),
    }
}

/// Builds a document from one parsed row: source defaults, overlaid by mapped values.
///
/// `source` falls back to the source configuration's name when neither side sets it.
pub fn build_document(row: &Value, rules: &[String], source: &SourceConfig) -> Result<Document> {
    let mut fields: Map<String, Value> = source.defaults.clone();
    map_fields(row, &mut fields, rules);

    for value in fields.values_mut() {
        match value {
            Value::Number(n) => *value = Value::String(n.to_string()),
            Value::Bool(b) => *value = Value::String(b.to_string()),
            _ => {}
        }
    }

    let has_source = fields
        .get("source")
        .and_then(Value::as_str)
        .is_some_and(|s| !s.trim().is_empty());
    if !has_source {
        fields.insert("source".to_string(), Value::String(source.name.clone()));
    }

    serde_json::from_value(Value::Object(fields))
        .map_err(|e| ScraperError::Mapping(format!("row does not fit the document shape: {}", e)))
}
