/// Stage keys as they appear in source configuration files.
pub const WEB_PAGE_DOWNLOADER: &str = "WEB-PAGE-DOWNLOADER";
pub const RSS_DOWNLOADER: &str = "RSS-DOWNLOADER";
pub const BROWSER_DOWNLOADER: &str = "BROWSER-DOWNLOADER";
pub const PLAYWRIGHT_DOWNLOADER: &str = "PLAYWRIGHT-DOWNLOADER";
pub const RSS_PARSER: &str = "RSS-PARSER";
pub const HTML_TABLE_PARSER: &str = "HTML-TABLE-PARSER";
pub const JSON_PARSER: &str = "JSON-PARSER";
pub const EXPRESSION_EVAL_ENRICHER: &str = "EXPRESSION-EVAL-ENRICHER";
pub const TEXT_CLEANUP_ENRICHER: &str = "TEXT-CLEANUP-ENRICHER";
pub const SUMMARY_FROM_SITE_LINK_EXTRACTOR: &str = "SUMMARY-FROM-SITE-LINK-EXTRACTOR";
pub const SUMMARY_HTML_TO_TEXT_EXTRACTOR: &str = "SUMMARY-HTML-TO-TEXT-EXTRACTOR";

// Environment variables
pub const API_URL_ENV: &str = "API_URL";
pub const SOURCES_PATH_ENV: &str = "REGSCAN_SOURCES";
pub const FETCH_TIMEOUT_ENV: &str = "REGSCAN_FETCH_TIMEOUT_SECS";
pub const FETCH_RETRIES_ENV: &str = "REGSCAN_FETCH_RETRIES";
pub const MAX_CONCURRENT_SOURCES_ENV: &str = "REGSCAN_MAX_CONCURRENT_SOURCES";

pub const DEFAULT_API_URL: &str = "http://localhost:3000/api";
pub const DEFAULT_SOURCES_PATH: &str = "config/sources.json";
pub const DEFAULT_SETTINGS_PATH: &str = "config/scanner.toml";

/// Field mappings applied to feed items when neither the stage nor the source configures any.
pub const DEFAULT_RSS_MAPPINGS: &[&str] = &[
    "title->title",
    "description->summary",
    "publishedOn->publishedOn",
    "link->linkToRegChangeText",
    "guid->identifier",
];

/// Field mappings applied to table rows when neither the stage nor the source configures any.
pub const DEFAULT_TABLE_MAPPINGS: &[&str] = &[
    "identifier->identifier",
    "title->title",
    "summary->summary",
    "publishedOn->publishedOn",
    "url->linkToRegChangeText",
    "category->category",
    "status->regulationStatus",
    "source->source",
];

/// Field mappings applied to JSON API items when neither the stage nor the source configures any.
pub const DEFAULT_API_MAPPINGS: &[&str] = &[
    "identifier->identifier",
    "title->title",
    "summary->summary",
    "publishedOn->publishedOn",
    "url->linkToRegChangeText",
    "linkToRegChangeText->linkToRegChangeText",
    "source->source",
];

/// Wrapper keys searched, in order, when a JSON API answers with an object instead of an array.
pub const JSON_ITEM_KEYS: &[&str] = &["items", "results", "data"];

pub const JSON_ACCEPT: &str = "application/json, text/json;q=0.9, */*;q=0.5";
pub const FEED_ACCEPT: &str =
    "application/rss+xml, application/rdf+xml, application/atom+xml, application/xml;q=0.9, text/xml;q=0.8, */*;q=0.5";
pub const HTML_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
