//! RSS 2.0 / RDF / Atom item extraction.
//!
//! The XML is first read into a small element tree so that repeated and single items are
//! handled the same way, then each item is flattened into a [`Row`] keyed by local element
//! names (namespace prefixes dropped).

use crate::error::{Result, ScraperError};
use crate::parser::dates::normalize_date;
use crate::types::Row;
use quick_xml::events::Event;
use quick_xml::Reader;
use serde_json::{Map, Value};
use tracing::{debug, warn};

#[derive(Debug, Default, Clone)]
struct XmlNode {
    name: String,
    attrs: Vec<(String, String)>,
    text: String,
    children: Vec<XmlNode>,
}

impl XmlNode {
    fn child(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.name == name)
    }

    fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlNode> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    fn text(&self) -> &str {
        self.text.trim()
    }

    /// Leaf elements become strings; elements with children become nested objects.
    fn to_value(&self) -> Value {
        if self.children.is_empty() {
            if self.text().is_empty() && !self.attrs.is_empty() {
                let obj: Map<String, Value> = self
                    .attrs
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect();
                return Value::Object(obj);
            }
            return Value::String(self.text().to_string());
        }
        let mut obj = Map::new();
        for child in &self.children {
            insert_first(&mut obj, &child.name, child.to_value());
        }
        Value::Object(obj)
    }
}

fn local_name(raw: &[u8]) -> String {
    let name = String::from_utf8_lossy(raw);
    match name.rsplit_once(':') {
        Some((_, local)) => local.to_string(),
        None => name.into_owned(),
    }
}

fn insert_first(obj: &mut Map<String, Value>, key: &str, value: Value) {
    let is_empty = |v: &Value| matches!(v, Value::String(s) if s.is_empty());
    match obj.get(key) {
        Some(existing) if !is_empty(existing) => {}
        _ => {
            obj.insert(key.to_string(), value);
        }
    }
}

fn open_node(e: &quick_xml::events::BytesStart<'_>) -> XmlNode {
    let attrs = e
        .attributes()
        .flatten()
        .map(|a| {
            let value = a
                .unescape_value()
                .map(|v| v.into_owned())
                .unwrap_or_else(|_| String::from_utf8_lossy(&a.value).into_owned());
            (local_name(a.key.as_ref()), value)
        })
        .collect();
    XmlNode {
        name: local_name(e.name().as_ref()),
        attrs,
        ..Default::default()
    }
}

/// Elements that stand for one feed entry; a half-read one is dropped when the XML breaks.
const ENTRY_TAGS: &[&str] = &["item", "entry"];

/// Tree read from the feed, plus the reader error that cut it short, if any.
struct ReadTree {
    root: XmlNode,
    error: Option<String>,
}

fn read_tree(xml: &str) -> Result<ReadTree> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<XmlNode> = Vec::new();
    let mut root: Option<XmlNode> = None;
    let mut error: Option<String> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => stack.push(open_node(&e)),
            Ok(Event::Empty(e)) => {
                let node = open_node(&e);
                match stack.last_mut() {
                    Some(parent) => parent.children.push(node),
                    None => root = root.or(Some(node)),
                }
            }
            Ok(Event::End(_)) => {
                if let Some(node) = stack.pop() {
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(node),
                        None => root = root.or(Some(node)),
                    }
                }
            }
            Ok(Event::Text(t)) => {
                if let Some(current) = stack.last_mut() {
                    let text = t
                        .unescape()
                        .map(|s| s.into_owned())
                        .unwrap_or_else(|_| String::from_utf8_lossy(&t).into_owned());
                    current.text.push_str(&text);
                }
            }
            Ok(Event::CData(c)) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&String::from_utf8_lossy(&c));
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                let message = format!("invalid XML at position {}: {}", reader.buffer_position(), e);
                if stack.is_empty() && root.is_none() {
                    return Err(ScraperError::Parse(message));
                }
                error = Some(message);
                break;
            }
        }
    }

    // Unclosed elements are salvaged rather than rejected. After a reader error the entry
    // being read is incomplete, so it is dropped; at plain EOF it is kept.
    if !stack.is_empty() {
        warn!("Feed ended with {} unclosed element(s)", stack.len());
        while let Some(node) = stack.pop() {
            if error.is_some() && ENTRY_TAGS.contains(&node.name.as_str()) {
                warn!("Dropping incomplete <{}> cut off by malformed XML", node.name);
                continue;
            }
            match stack.last_mut() {
                Some(parent) => parent.children.push(node),
                None => root = root.or(Some(node)),
            }
        }
    }
    if let Some(message) = &error {
        warn!("Feed salvaged after XML error: {}", message);
    }

    let root = root.ok_or_else(|| ScraperError::Parse("content has no XML root element".to_string()))?;
    Ok(ReadTree { root, error })
}

fn item_nodes(root: &XmlNode) -> Result<Vec<&XmlNode>> {
    let rss: Vec<&XmlNode> = if root.name == "rss" {
        root.children_named("channel")
            .flat_map(|c| c.children_named("item"))
            .collect()
    } else {
        Vec::new()
    };
    if !rss.is_empty() {
        return Ok(rss);
    }

    let rdf: Vec<&XmlNode> = if root.name == "RDF" {
        let mut items: Vec<&XmlNode> = root.children_named("item").collect();
        if items.is_empty() {
            items = root
                .children_named("channel")
                .flat_map(|c| c.children_named("item"))
                .collect();
        }
        items
    } else {
        Vec::new()
    };
    if !rdf.is_empty() {
        return Ok(rdf);
    }

    let atom: Vec<&XmlNode> = if root.name == "feed" {
        root.children_named("entry").collect()
    } else {
        Vec::new()
    };
    if !atom.is_empty() {
        return Ok(atom);
    }

    match root.name.as_str() {
        "rss" | "RDF" | "feed" => Ok(Vec::new()),
        other => Err(ScraperError::Parse(format!(
            "root element <{}> is not an RSS, RDF or Atom feed",
            other
        ))),
    }
}

fn item_link(item: &XmlNode) -> Option<String> {
    let links: Vec<&XmlNode> = item.children_named("link").collect();
    if let Some(text) = links.iter().map(|l| l.text()).find(|t| !t.is_empty()) {
        return Some(text.to_string());
    }
    links
        .iter()
        .find(|l| matches!(l.attr("rel"), None | Some("alternate")) && l.attr("href").is_some())
        .or_else(|| links.iter().find(|l| l.attr("href").is_some()))
        .and_then(|l| l.attr("href"))
        .map(str::to_string)
}

fn first_text(item: &XmlNode, names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|n| item.child(n))
        .map(|n| n.text())
        .find(|t| !t.is_empty())
        .map(str::to_string)
}

fn nested_str<'a>(row: &'a Row, path: &[&str]) -> Option<&'a str> {
    let (first, rest) = path.split_first()?;
    let mut current = row.get(*first)?;
    for key in rest {
        current = current.as_object()?.get(*key)?;
    }
    current.as_str().filter(|s| !s.trim().is_empty())
}

fn flatten_item(item: &XmlNode) -> Row {
    let mut row = Row::new();
    for child in &item.children {
        if child.name == "link" {
            continue;
        }
        insert_first(&mut row, &child.name, child.to_value());
    }

    if let Some(title) = first_text(item, &["title"]) {
        row.insert("title".into(), Value::String(title));
    }
    let link = item_link(item)
        .or_else(|| nested_str(&row, &["paper", "resource", "link"]).map(str::to_string));
    if let Some(link) = link {
        row.insert("link".into(), Value::String(link));
    }
    if let Some(desc) = first_text(item, &["description", "summary", "content", "encoded"]) {
        row.insert("description".into(), Value::String(desc));
    }
    if let Some(guid) = first_text(item, &["guid", "id"]) {
        row.insert("guid".into(), Value::String(guid));
    }

    let published = first_text(item, &["pubDate", "published", "updated", "date", "issued"])
        .or_else(|| nested_str(&row, &["paper", "publicationDate"]).map(str::to_string));
    if let Some(raw) = published {
        row.insert("publishedOn".into(), Value::String(normalize_date(&raw)));
    }
    row
}

/// Parses feed XML into one flat row per item.
///
/// Returns an empty list for a recognized feed without items and a `Parse` error for content
/// that is not XML or not a feed. Malformed XML keeps every item read before the break; it is
/// only an error when nothing could be salvaged.
pub fn parse_feed(xml: &str) -> Result<Vec<Row>> {
    let ReadTree { root, error } = read_tree(xml.trim_start_matches('\u{feff}'))?;
    let items = item_nodes(&root)?;
    if let (Some(message), true) = (error, items.is_empty()) {
        return Err(ScraperError::Parse(message));
    }
    debug!("Feed <{}> has {} item(s)", root.name, items.len());
    Ok(items.into_iter().map(flatten_item).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rss_item_is_flattened_with_normalized_date() {
        let xml = r#"<rss><channel><item><title>Title A</title><pubDate>Mon, 01 Jan 2024 10:00:00 -0500</pubDate><link>http://x/a</link></item></channel></rss>"#;
        let rows = parse_feed(xml).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["title"], json!("Title A"));
        assert_eq!(rows[0]["link"], json!("http://x/a"));
        assert_eq!(rows[0]["publishedOn"], json!("2024-01-01T15:00:00.000Z"));
    }

    #[test]
    fn single_and_multiple_items_have_same_shape() {
        let one = r#"<rss><channel><item><title>A</title></item></channel></rss>"#;
        let two = r#"<rss><channel><item><title>A</title></item><item><title>B</title></item></channel></rss>"#;
        let one = parse_feed(one).unwrap();
        let two = parse_feed(two).unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(two.len(), 2);
        assert_eq!(one[0], two[0]);
    }

    #[test]
    fn cdata_description_and_namespaced_fields() {
        let xml = r#"<?xml version="1.0"?>
<rss xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:cb="http://www.cbwiki.net/wiki/index.php/Specification_1.1">
  <channel>
    <item>
      <title>Rule</title>
      <description><![CDATA[<p>Some <b>html</b></p>]]></description>
      <dc:creator>Agency</dc:creator>
      <cb:paper>
        <cb:publicationDate>2024-02-03</cb:publicationDate>
        <cb:resource><cb:link>https://x.test/paper.pdf</cb:link></cb:resource>
      </cb:paper>
    </item>
  </channel>
</rss>"#;
        let rows = parse_feed(xml).unwrap();
        let row = &rows[0];
        assert_eq!(row["description"], json!("<p>Some <b>html</b></p>"));
        assert_eq!(row["creator"], json!("Agency"));
        assert_eq!(row["paper"]["resource"]["link"], json!("https://x.test/paper.pdf"));
        assert_eq!(row["link"], json!("https://x.test/paper.pdf"));
        assert_eq!(row["publishedOn"], json!("2024-02-03T00:00:00.000Z"));
    }

    #[test]
    fn rdf_items_outside_channel() {
        let xml = r#"<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#" xmlns="http://purl.org/rss/1.0/">
  <channel><title>c</title></channel>
  <item><title>R1</title><link>http://x/r1</link></item>
  <item><title>R2</title><link>http://x/r2</link></item>
</rdf:RDF>"#;
        let rows = parse_feed(xml).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1]["link"], json!("http://x/r2"));
    }

    #[test]
    fn atom_entries_use_alternate_href() {
        let xml = r#"<feed xmlns="http://www.w3.org/2005/Atom">
  <entry>
    <title>E</title>
    <link rel="self" href="http://x/self"/>
    <link rel="alternate" href="http://x/e"/>
    <id>urn:1</id>
    <summary>S</summary>
    <updated>2024-01-02T00:00:00Z</updated>
  </entry>
</feed>"#;
        let rows = parse_feed(xml).unwrap();
        assert_eq!(rows[0]["link"], json!("http://x/e"));
        assert_eq!(rows[0]["guid"], json!("urn:1"));
        assert_eq!(rows[0]["description"], json!("S"));
        assert_eq!(rows[0]["publishedOn"], json!("2024-01-02T00:00:00.000Z"));
    }

    #[test]
    fn non_feed_content_is_a_parse_error() {
        assert!(matches!(parse_feed("just text"), Err(ScraperError::Parse(_))));
        assert!(matches!(parse_feed("<html><body/></html>"), Err(ScraperError::Parse(_))));
        assert!(matches!(parse_feed("<rss><channel></item></rss>"), Err(ScraperError::Parse(_))));
    }

    #[test]
    fn items_before_malformed_markup_are_kept() {
        let xml = "<rss><channel><item><title>Good A</title></item><item><title>Good B</title></item>\
                   <item><title>Broken</b></title></item></channel></rss>";
        let rows = parse_feed(xml).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["title"], json!("Good A"));
        assert_eq!(rows[1]["title"], json!("Good B"));
    }

    #[test]
    fn truncated_feed_keeps_partial_last_item() {
        let xml = "<rss><channel><item><title>A</title></item><item><title>B</title>";
        let rows = parse_feed(xml).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1]["title"], json!("B"));
    }

    #[test]
    fn rdf_single_and_multiple_items_have_same_shape() {
        let wrap = |items: &str| {
            format!(
                r#"<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#" xmlns="http://purl.org/rss/1.0/">{}</rdf:RDF>"#,
                items
            )
        };
        let item_a = "<item><title>A</title><link>http://x/a</link><dc:date>2024-03-01</dc:date></item>";
        let item_b = "<item><title>B</title><link>http://x/b</link></item>";
        let one = parse_feed(&wrap(item_a)).unwrap();
        let two = parse_feed(&wrap(&format!("{}{}", item_a, item_b))).unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(two.len(), 2);
        assert_eq!(one[0], two[0]);
        assert_eq!(one[0]["publishedOn"], json!("2024-03-01T00:00:00.000Z"));
    }

    #[test]
    fn atom_single_and_multiple_entries_have_same_shape() {
        let wrap = |entries: &str| format!(r#"<feed xmlns="http://www.w3.org/2005/Atom">{}</feed>"#, entries);
        let entry_a = r#"<entry><title>A</title><link href="http://x/a"/><id>urn:a</id></entry>"#;
        let entry_b = r#"<entry><title>B</title><link href="http://x/b"/><id>urn:b</id></entry>"#;
        let one = parse_feed(&wrap(entry_a)).unwrap();
        let two = parse_feed(&wrap(&format!("{}{}", entry_a, entry_b))).unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(two.len(), 2);
        assert_eq!(one[0], two[0]);
        assert_eq!(two[1]["link"], json!("http://x/b"));
    }

    #[test]
    fn empty_feed_yields_no_rows() {
        assert!(parse_feed("<rss><channel><title>x</title></channel></rss>").unwrap().is_empty());
    }
}
