//! Configurable extraction of rows from `<table>` or div-based tabular markup.

use crate::error::{Result, ScraperError};
use crate::parser::dates::normalize_date;
use crate::types::Row;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractMode {
    Text,
    Html,
    Href,
    Attribute,
}

/// How one column of a row is located and read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "ColumnSpec")]
pub struct ColumnConfig {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extract: Option<ExtractMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transform: Option<String>,
    #[serde(default)]
    pub is_link: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_attribute: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ColumnSpec {
    Name(String),
    Detailed(DetailedColumn),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DetailedColumn {
    name: String,
    #[serde(default)]
    selector: Option<String>,
    #[serde(default)]
    attribute: Option<String>,
    #[serde(default)]
    extract: Option<ExtractMode>,
    #[serde(default)]
    transform: Option<String>,
    #[serde(default)]
    is_link: bool,
    #[serde(default)]
    link_attribute: Option<String>,
}

impl From<ColumnSpec> for ColumnConfig {
    fn from(spec: ColumnSpec) -> Self {
        match spec {
            ColumnSpec::Name(name) => ColumnConfig::named(name),
            ColumnSpec::Detailed(d) => ColumnConfig {
                name: d.name,
                selector: d.selector,
                attribute: d.attribute,
                extract: d.extract,
                transform: d.transform,
                is_link: d.is_link,
                link_attribute: d.link_attribute,
            },
        }
    }
}

impl ColumnConfig {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    fn is_url(&self) -> bool {
        let lower = self.name.to_lowercase();
        lower.contains("url")
            || lower.contains("link")
            || self.is_link
            || self.extract == Some(ExtractMode::Href)
            || self.transform.as_deref() == Some("resolveUrl")
    }

    fn mode(&self) -> ExtractMode {
        match self.extract {
            Some(mode) => mode,
            None if self.attribute.is_some() => ExtractMode::Attribute,
            None if self.is_url() => ExtractMode::Href,
            None => ExtractMode::Text,
        }
    }
}

fn default_table_selector() -> String {
    "table".to_string()
}

fn default_header_row_index() -> i64 {
    0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableParseConfig {
    #[serde(default = "default_table_selector")]
    pub table_selector: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_selector: Option<String>,
    /// Index of the header row among the selected rows; negative means no header row.
    #[serde(default = "default_header_row_index")]
    pub header_row_index: i64,
    #[serde(default)]
    pub columns: Vec<ColumnConfig>,
    #[serde(default)]
    pub is_div_table: bool,
}

impl Default for TableParseConfig {
    fn default() -> Self {
        Self {
            table_selector: default_table_selector(),
            row_selector: None,
            header_row_index: default_header_row_index(),
            columns: Vec::new(),
            is_div_table: false,
        }
    }
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| ScraperError::Parse(format!("invalid CSS selector '{}': {:?}", css, e)))
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn element_text(el: &ElementRef<'_>) -> String {
    collapse_whitespace(&el.text().collect::<Vec<_>>().join(" "))
}

fn child_elements<'a>(el: &ElementRef<'a>) -> Vec<ElementRef<'a>> {
    el.children().filter_map(ElementRef::wrap).collect()
}

fn row_cells<'a>(row: &ElementRef<'a>, div_table: bool) -> Vec<ElementRef<'a>> {
    child_elements(row)
        .into_iter()
        .filter(|c| div_table || matches!(c.value().name(), "td" | "th"))
        .collect()
}

fn resolve_url(href: &str, base: Option<&Url>) -> String {
    match base.and_then(|b| b.join(href).ok()) {
        Some(url) => url.to_string(),
        None => href.to_string(),
    }
}

fn find_href(cell: &ElementRef<'_>, attr: &str) -> Option<String> {
    if let Some(v) = cell.value().attr(attr).map(str::trim).filter(|v| !v.is_empty()) {
        return Some(v.to_string());
    }
    cell.descendants()
        .filter_map(ElementRef::wrap)
        .find_map(|el| el.value().attr(attr).map(|v| v.trim().to_string()))
        .filter(|v| !v.is_empty())
}

fn extract_cell(cell: &ElementRef<'_>, column: &ColumnConfig, base: Option<&Url>) -> String {
    match column.mode() {
        ExtractMode::Html => cell.inner_html().trim().to_string(),
        ExtractMode::Attribute => {
            let attr = column.attribute.as_deref().unwrap_or("href");
            let value = cell.value().attr(attr).map(str::trim).unwrap_or_default();
            if column.transform.as_deref() == Some("resolveUrl") && !value.is_empty() {
                resolve_url(value, base)
            } else {
                value.to_string()
            }
        }
        ExtractMode::Href => {
            let attr = column.link_attribute.as_deref().unwrap_or("href");
            match find_href(cell, attr) {
                Some(href) => resolve_url(&href, base),
                None => element_text(cell),
            }
        }
        ExtractMode::Text => element_text(cell),
    }
}

fn infer_headers<'a>(
    header: Option<&ElementRef<'a>>,
    first_row: Option<&ElementRef<'a>>,
    div_table: bool,
) -> Vec<ColumnConfig> {
    let from_text = header.is_some();
    let Some(row) = header.or(first_row) else {
        return Vec::new();
    };
    row_cells(row, div_table)
        .iter()
        .enumerate()
        .map(|(i, cell)| {
            let text = if from_text {
                element_text(cell).to_lowercase().replace(' ', "_")
            } else {
                String::new()
            };
            let name = if !text.is_empty() {
                text
            } else if let Some(class) = cell.value().classes().next() {
                class.to_string()
            } else {
                format!("column_{}", i)
            };
            ColumnConfig::named(name)
        })
        .collect()
}

fn insert_value(row: &mut Row, name: &str, value: String) {
    if value.is_empty() {
        return;
    }
    let value = if matches!(name, "publishedOn" | "publishDate") {
        normalize_date(&value)
    } else {
        value
    };
    row.insert(name.to_string(), Value::String(value));
}

/// Extracts data rows from the first element matching `tableSelector`.
///
/// Fails with `Parse` when a selector is invalid or the table is missing; rows that yield no
/// values and the header row are omitted.
pub fn parse_table(html: &str, config: &TableParseConfig, base_url: Option<&str>) -> Result<Vec<Row>> {
    let document = Html::parse_document(html);
    let table_sel = selector(&config.table_selector)?;
    let table = document.select(&table_sel).next().ok_or_else(|| {
        ScraperError::Parse(format!("no element matches table selector '{}'", config.table_selector))
    })?;

    let rows: Vec<ElementRef<'_>> = match (&config.row_selector, config.is_div_table) {
        (Some(css), _) => table.select(&selector(css)?).collect(),
        (None, true) => child_elements(&table),
        (None, false) => table.select(&selector("tr")?).collect(),
    };

    let header_index = usize::try_from(config.header_row_index)
        .ok()
        .filter(|i| *i < rows.len());

    let column_selectors: Vec<Option<Selector>> = config
        .columns
        .iter()
        .map(|c| c.selector.as_deref().map(selector).transpose())
        .collect::<Result<_>>()?;
    let by_selector = column_selectors.iter().any(Option::is_some);

    let columns = if config.columns.is_empty() {
        let first_data = rows.iter().enumerate().find(|(i, _)| Some(*i) != header_index).map(|(_, r)| r);
        infer_headers(header_index.map(|i| &rows[i]), first_data, config.is_div_table)
    } else {
        config.columns.clone()
    };

    let base = base_url.and_then(|b| Url::parse(b).ok());
    let mut out = Vec::new();

    for (index, row_el) in rows.iter().enumerate() {
        if Some(index) == header_index {
            continue;
        }
        let cells = row_cells(row_el, config.is_div_table);
        let mut row = Row::new();

        if by_selector {
            for (col_idx, column) in columns.iter().enumerate() {
                let cell = match column_selectors.get(col_idx).and_then(Option::as_ref) {
                    Some(sel) => row_el.select(sel).next(),
                    None => cells.get(col_idx).copied(),
                };
                if let Some(cell) = cell {
                    insert_value(&mut row, &column.name, extract_cell(&cell, column, base.as_ref()));
                }
            }
        } else {
            for (col_idx, cell) in cells.iter().enumerate() {
                let column = match columns.get(col_idx) {
                    Some(c) => c.clone(),
                    None if config.columns.is_empty() => ColumnConfig::named(format!("column_{}", col_idx)),
                    None => continue,
                };
                insert_value(&mut row, &column.name, extract_cell(cell, &column, base.as_ref()));
            }
        }

        if row.is_empty() {
            debug!("Skipping empty row {}", index);
            continue;
        }
        out.push(row);
    }

    if out.is_empty() && !rows.is_empty() {
        warn!("Table '{}' had {} row(s) but none produced values", config.table_selector, rows.len());
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn header_row_skipped_and_relative_href_resolved() {
        let html = r#"<table>
            <tr><th>Date</th><th>Title</th></tr>
            <tr><td>2024-01-01</td><td><a href="/doc/1">Doc 1</a></td></tr>
        </table>"#;
        let config: TableParseConfig = serde_json::from_value(json!({
            "headerRowIndex": 0,
            "columns": ["date", {"name": "url", "extract": "href", "transform": "resolveUrl"}]
        }))
        .unwrap();
        let rows = parse_table(html, &config, Some("https://gov.example")).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(
            Value::Object(rows[0].clone()),
            json!({"date": "2024-01-01", "url": "https://gov.example/doc/1"})
        );
    }

    #[test]
    fn header_row_after_a_caption_row_is_not_emitted() {
        let html = r#"<table>
            <tr><td>Bills introduced this session</td></tr>
            <tr><th>Bill</th><th>Status</th></tr>
            <tr><td>HB 10</td><td>Passed</td></tr>
            <tr><td>SB 4</td><td>In committee</td></tr>
        </table>"#;
        let config: TableParseConfig = serde_json::from_value(json!({
            "headerRowIndex": 1,
            "columns": ["identifier", "status"]
        }))
        .unwrap();
        let rows = parse_table(html, &config, None).unwrap();
        let ids: Vec<&Value> = rows.iter().filter_map(|r| r.get("identifier")).collect();
        assert_eq!(ids, vec![&json!("Bills introduced this session"), &json!("HB 10"), &json!("SB 4")]);
        assert!(rows.iter().all(|r| r.get("identifier") != Some(&json!("Bill"))));
    }

    #[test]
    fn headers_inferred_from_header_row_text() {
        let html = r#"<table>
            <tr><th>Release Date</th><th></th><th class="notice">x</th></tr>
            <tr><td>  Jan   5 </td><td>middle</td><td>third</td><td>extra</td></tr>
            <tr><td></td><td> </td></tr>
        </table>"#;
        let rows = parse_table(html, &TableParseConfig::default(), None).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["release_date"], json!("Jan 5"));
        assert_eq!(rows[0]["column_1"], json!("middle"));
        assert_eq!(rows[0]["x"], json!("third"));
        assert_eq!(rows[0]["column_3"], json!("extra"));
    }

    #[test]
    fn no_header_row_uses_classes() {
        let html = r#"<table>
            <tr><td class="title">A</td><td>B</td></tr>
            <tr><td class="title">C</td><td>D</td></tr>
        </table>"#;
        let config = TableParseConfig {
            header_row_index: -1,
            ..Default::default()
        };
        let rows = parse_table(html, &config, None).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1]["title"], json!("C"));
        assert_eq!(rows[1]["column_1"], json!("D"));
    }

    #[test]
    fn div_table_with_column_selectors() {
        let html = r#"<div class="results">
            <div class="item"><span class="t">First</span><a class="l" href="a.html">go</a></div>
            <div class="item"><span class="t">Second</span></div>
            <div class="item"></div>
        </div>"#;
        let config: TableParseConfig = serde_json::from_value(json!({
            "tableSelector": "div.results",
            "isDivTable": true,
            "headerRowIndex": -1,
            "columns": [
                {"name": "title", "selector": "span.t"},
                {"name": "link", "selector": "a.l"}
            ]
        }))
        .unwrap();
        let rows = parse_table(html, &config, Some("https://gov.example/list/")).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["link"], json!("https://gov.example/list/a.html"));
        assert_eq!(rows[1]["title"], json!("Second"));
        assert!(rows[1].get("link").is_none());
    }

    #[test]
    fn html_and_attribute_modes() {
        let html = r#"<table>
            <tr><td data-id="R-7"><b>Bold</b> text</td></tr>
        </table>"#;
        let config: TableParseConfig = serde_json::from_value(json!({
            "headerRowIndex": -1,
            "columns": [
                {"name": "identifier", "selector": "td", "attribute": "data-id"},
                {"name": "summary", "selector": "td", "extract": "html"}
            ]
        }))
        .unwrap();
        let rows = parse_table(html, &config, None).unwrap();
        assert_eq!(rows[0]["identifier"], json!("R-7"));
        assert_eq!(rows[0]["summary"], json!("<b>Bold</b> text"));
    }

    #[test]
    fn missing_table_and_bad_selector_are_parse_errors() {
        let config = TableParseConfig {
            table_selector: "table.nope".into(),
            ..Default::default()
        };
        assert!(matches!(parse_table("<p>x</p>", &config, None), Err(ScraperError::Parse(_))));
        let config = TableParseConfig {
            table_selector: "[[".into(),
            ..Default::default()
        };
        assert!(matches!(parse_table("<table></table>", &config, None), Err(ScraperError::Parse(_))));
    }
}
