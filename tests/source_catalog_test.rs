use regchange_scraper::error::ScraperError;
use regchange_scraper::registry::SourceCatalog;
use regchange_scraper::types::ScannerType;
use std::fs;
use tempfile::tempdir;

const FEED_SOURCES: &str = r#"[
  {
    "id": "fed-reg",
    "name": "Federal Register",
    "url": "https://example.test/rss",
    "scannerType": "RSS",
    "defaults": {"issuingAuthority": "Federal Reserve"}
  },
  {
    "id": "retired",
    "name": "Retired feed",
    "url": "https://example.test/old",
    "scannerType": "RSS",
    "enabled": false
  }
]"#;

const TABLE_SOURCE: &str = r#"{
  "id": "state-bills",
  "name": "State Bills",
  "url": "https://example.test/bills",
  "scannerType": "HTML_TABLE",
  "selector": {
    "tableSelector": "table.bills",
    "columns": ["identifier", {"name": "title", "isLink": true}]
  },
  "pipeline": [
    {"stage": "WEB-PAGE-DOWNLOADER"},
    {"stage": "HTML-TABLE-PARSER", "config": {"fieldMappings": ["identifier->identifier"]}}
  ]
}"#;

#[test]
fn loads_sources_from_a_single_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("sources.json");
    fs::write(&path, FEED_SOURCES).unwrap();

    let catalog = SourceCatalog::load(&path).unwrap();

    assert_eq!(catalog.ids(), vec!["fed-reg", "retired"]);
    assert_eq!(catalog.enabled().len(), 1);
    let fed = catalog.get("fed-reg").unwrap();
    assert_eq!(fed.scanner_type, Some(ScannerType::Rss));
    assert_eq!(fed.defaults["issuingAuthority"], "Federal Reserve");
    assert_eq!(fed.effective_pipeline().len(), 3);
}

#[test]
fn merges_every_json_file_in_a_directory() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a_feeds.json"), FEED_SOURCES).unwrap();
    fs::write(dir.path().join("b_table.json"), TABLE_SOURCE).unwrap();
    fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

    let catalog = SourceCatalog::load(dir.path()).unwrap();

    assert_eq!(catalog.len(), 3);
    let bills = catalog.get("state-bills").unwrap();
    assert_eq!(bills.pipeline.len(), 2);
    let selector = bills.selector.as_ref().unwrap();
    assert_eq!(selector.table_selector, "table.bills");
    assert_eq!(selector.columns.len(), 2);
}

#[test]
fn duplicate_ids_are_rejected() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("one.json"), FEED_SOURCES).unwrap();
    fs::write(dir.path().join("two.json"), FEED_SOURCES).unwrap();

    let err = SourceCatalog::load_from_directory(dir.path()).unwrap_err();
    assert!(matches!(err, ScraperError::Config(ref m) if m.contains("fed-reg")));
}

#[test]
fn unreadable_or_invalid_files_are_config_errors() {
    let dir = tempdir().unwrap();
    assert!(matches!(
        SourceCatalog::load_from_file(dir.path().join("missing.json")),
        Err(ScraperError::Config(_))
    ));

    let bad = dir.path().join("bad.json");
    fs::write(&bad, "{ not json").unwrap();
    assert!(matches!(SourceCatalog::load(&bad), Err(ScraperError::Config(_))));
}
