//! Declarative `"src.path->dst.path"` field copying between JSON objects.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::warn;

/// One parsed `"src->dst"` rule with dot-separated paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingRule {
    pub source: Vec<String>,
    pub dest: Vec<String>,
}

impl MappingRule {
    pub fn parse(rule: &str) -> Option<Self> {
        let (src, dst) = rule.split_once("->")?;
        let split = |p: &str| -> Option<Vec<String>> {
            let parts: Vec<String> = p.trim().split('.').map(|s| s.trim().to_string()).collect();
            if parts.iter().any(String::is_empty) {
                None
            } else {
                Some(parts)
            }
        };
        Some(Self {
            source: split(src)?,
            dest: split(dst)?,
        })
    }
}

/// Field mappings as written in stage configuration: a rule list or a `{dest: src}` object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldMappings {
    Rules(Vec<String>),
    Object(BTreeMap<String, String>),
}

impl FieldMappings {
    pub fn to_rules(&self) -> Vec<String> {
        match self {
            FieldMappings::Rules(rules) => rules.clone(),
            FieldMappings::Object(map) => map.iter().map(|(dest, src)| format!("{}->{}", src, dest)).collect(),
        }
    }
}

/// Resolves a dotted path; any non-object intermediate yields `None`. JSON null counts as absent.
pub fn get_path<'a, S: AsRef<str>>(value: &'a Value, path: &[S]) -> Option<&'a Value> {
    let mut current = value;
    for key in path {
        current = current.as_object()?.get(key.as_ref())?;
    }
    if current.is_null() {
        None
    } else {
        Some(current)
    }
}

/// Writes `value` at a dotted path, creating (or replacing non-object) intermediates.
pub fn set_path<S: AsRef<str>>(dest: &mut Map<String, Value>, path: &[S], value: Value) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };
    let mut current = dest;
    for key in parents {
        let entry = current
            .entry(key.as_ref().to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        current = match entry {
            Value::Object(map) => map,
            _ => return,
        };
    }
    current.insert(last.as_ref().to_string(), value);
}

/// Applies every rule in order; rules whose source is absent leave `dest` untouched.
pub fn map_fields<R: AsRef<str>>(source: &Value, dest: &mut Map<String, Value>, rules: &[R]) {
    for raw in rules {
        let Some(rule) = MappingRule::parse(raw.as_ref()) else {
            warn!("Skipping malformed mapping rule '{}'", raw.as_ref());
            continue;
        };
        if let Some(value) = get_path(source, &rule.source) {
            set_path(dest, &rule.dest, value.clone());
        }
    }
}
