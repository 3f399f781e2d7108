use crate::constants::{
    BROWSER_DOWNLOADER, HTML_TABLE_PARSER, JSON_PARSER, RSS_DOWNLOADER, RSS_PARSER, TEXT_CLEANUP_ENRICHER,
    WEB_PAGE_DOWNLOADER,
};
use crate::parser::table::TableParseConfig;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// One parsed row or feed item before it is mapped into a [`Document`].
pub type Row = Map<String, Value>;

macro_rules! document_fields {
    ($($field:ident => $key:literal),* $(,)?) => {
        /// Canonical normalized regulatory-change record.
        ///
        /// Known fields are typed; anything else a mapping writes lands in `extra`.
        #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
        #[serde(rename_all = "camelCase")]
        pub struct Document {
            $(
                #[serde(default, skip_serializing_if = "Option::is_none")]
                pub $field: Option<String>,
            )*
            #[serde(flatten)]
            pub extra: BTreeMap<String, Value>,
        }

        impl Document {
            /// Camel-case names of the typed string fields, in declaration order.
            pub const STRING_FIELDS: &'static [&'static str] = &[$($key),*];

            pub fn field(&self, name: &str) -> Option<&str> {
                match name {
                    $($key => self.$field.as_deref(),)*
                    _ => self.extra.get(name).and_then(Value::as_str),
                }
            }

            fn typed_field_mut(&mut self, name: &str) -> Option<&mut Option<String>> {
                match name {
                    $($key => Some(&mut self.$field),)*
                    _ => None,
                }
            }
        }
    };
}

document_fields! {
    source => "source",
    type_of_change => "typeOfChange",
    event_type => "eventType",
    issuing_authority => "issuingAuthority",
    identifier => "identifier",
    title => "title",
    summary => "summary",
    link_to_reg_change_text => "linkToRegChangeText",
    published_on => "publishedOn",
    html_content => "htmlContent",
    pdf_content => "pdfContent",
    introduced_on => "introducedOn",
    citation_id => "citationId",
    bill_type => "billType",
    reg_type => "regType",
    year => "year",
    regulation_status => "regulationStatus",
    bill_status => "billStatus",
    first_effective_date => "firstEffectiveDate",
    comments => "comments",
    enacted_date => "enactedDate",
    topic => "topic",
}

impl Document {
    /// Writes a string value to a typed field or, for unknown names, into `extra`.
    pub fn set_field(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.typed_field_mut(name) {
            Some(slot) => *slot = Some(value),
            None => {
                self.extra.insert(name.to_string(), Value::String(value));
            }
        }
    }

    /// Every populated string-valued field, typed fields first, then string entries of `extra`.
    pub fn string_fields(&self) -> Vec<(String, String)> {
        let mut out: Vec<(String, String)> = Self::STRING_FIELDS
            .iter()
            .filter_map(|name| self.field(name).map(|v| (name.to_string(), v.to_string())))
            .collect();
        out.extend(
            self.extra
                .iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string()))),
        );
        out
    }

    /// Rewrites every string-valued field in place with `f`.
    pub fn map_strings(&mut self, mut f: impl FnMut(&str, &str) -> String) {
        for name in Self::STRING_FIELDS {
            if let Some(slot) = self.typed_field_mut(name) {
                if let Some(current) = slot.as_deref() {
                    let next = f(name, current);
                    *slot = Some(next);
                }
            }
        }
        for (key, value) in self.extra.iter_mut() {
            if let Value::String(s) = value {
                *s = f(key, s);
            }
        }
    }
}

/// Declared scanner strategy of a source; expands to a default pipeline when none is given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScannerType {
    Rss,
    HtmlTable,
    Playwright,
    Api,
    Pipeline,
}

/// One step of a source pipeline: the stage key plus free-form params and parser config.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageSpec {
    pub stage: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Value>,
}

impl StageSpec {
    pub fn new(stage: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            params: None,
            config: None,
        }
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = Some(params);
        self
    }

    pub fn with_config(mut self, config: Value) -> Self {
        self.config = Some(config);
        self
    }

    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.as_ref().and_then(|p| p.get(key))
    }

    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.param(key).and_then(Value::as_str)
    }

    pub fn param_u64(&self, key: &str) -> Option<u64> {
        self.param(key).and_then(Value::as_u64)
    }

    pub fn param_bool(&self, key: &str) -> Option<bool> {
        self.param(key).and_then(Value::as_bool)
    }

    /// Looks a key up in `config`, falling back to `params`.
    pub fn setting(&self, key: &str) -> Option<&Value> {
        self.config
            .as_ref()
            .and_then(|c| c.get(key))
            .or_else(|| self.param(key))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceConfig {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scanner_type: Option<ScannerType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<TableParseConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapper: Option<Vec<String>>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
    #[serde(default)]
    pub pipeline: Vec<StageSpec>,
    #[serde(default)]
    pub defaults: Map<String, Value>,
}

fn default_enabled() -> bool {
    true
}

impl SourceConfig {
    pub fn new(id: impl Into<String>, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            url: url.into(),
            scanner_type: None,
            selector: None,
            mapper: None,
            enabled: true,
            schedule: None,
            pipeline: Vec::new(),
            defaults: Map::new(),
        }
    }

    /// Source label reported to the job tracker: `defaults.source`, else the source name.
    pub fn reporting_source(&self) -> String {
        self.defaults
            .get("source")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(&self.name)
            .to_string()
    }

    /// The stage list to execute: the declared pipeline, or the scanner type's standard one.
    pub fn effective_pipeline(&self) -> Vec<StageSpec> {
        if !self.pipeline.is_empty() {
            return self.pipeline.clone();
        }
        match self.scanner_type {
            Some(ScannerType::Rss) => vec![
                StageSpec::new(RSS_DOWNLOADER),
                StageSpec::new(RSS_PARSER),
                StageSpec::new(TEXT_CLEANUP_ENRICHER),
            ],
            Some(ScannerType::HtmlTable) => vec![
                StageSpec::new(WEB_PAGE_DOWNLOADER),
                StageSpec::new(HTML_TABLE_PARSER),
                StageSpec::new(TEXT_CLEANUP_ENRICHER),
            ],
            Some(ScannerType::Playwright) => {
                let mut download = StageSpec::new(BROWSER_DOWNLOADER);
                if let Some(sel) = &self.selector {
                    download = download
                        .with_params(serde_json::json!({ "waitForSelector": sel.table_selector }));
                }
                vec![
                    download,
                    StageSpec::new(HTML_TABLE_PARSER),
                    StageSpec::new(TEXT_CLEANUP_ENRICHER),
                ]
            }
            Some(ScannerType::Api) => vec![StageSpec::new(JSON_PARSER), StageSpec::new(TEXT_CLEANUP_ENRICHER)],
            Some(ScannerType::Pipeline) | None => Vec::new(),
        }
    }
}
