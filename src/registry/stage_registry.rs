use crate::app::ports::Fetcher;
use crate::config::Settings;
use crate::constants::*;
use crate::error::{Result, ScraperError};
use crate::infra::http_client::{FeedFetcher, HttpFetcher};
use crate::pipeline::engine::Stage;
use crate::pipeline::stages::{
    DownloadStage, ExpressionEnricher, HtmlTableParserStage, JsonParserStage, RssParserStage,
    SummaryFromLinkStage, SummaryHtmlToTextStage, TextCleanupEnricher,
};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

/// The built-in stage types. Out-of-tree stages register under their own keys instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    WebPageDownloader,
    RssDownloader,
    BrowserDownloader,
    RssParser,
    HtmlTableParser,
    JsonParser,
    ExpressionEvalEnricher,
    TextCleanupEnricher,
    SummaryFromSiteLinkExtractor,
    SummaryHtmlToTextExtractor,
}

impl StageKind {
    pub const ALL: [StageKind; 10] = [
        StageKind::WebPageDownloader,
        StageKind::RssDownloader,
        StageKind::BrowserDownloader,
        StageKind::RssParser,
        StageKind::HtmlTableParser,
        StageKind::JsonParser,
        StageKind::ExpressionEvalEnricher,
        StageKind::TextCleanupEnricher,
        StageKind::SummaryFromSiteLinkExtractor,
        StageKind::SummaryHtmlToTextExtractor,
    ];

    pub fn key(self) -> &'static str {
        match self {
            StageKind::WebPageDownloader => WEB_PAGE_DOWNLOADER,
            StageKind::RssDownloader => RSS_DOWNLOADER,
            StageKind::BrowserDownloader => BROWSER_DOWNLOADER,
            StageKind::RssParser => RSS_PARSER,
            StageKind::HtmlTableParser => HTML_TABLE_PARSER,
            StageKind::JsonParser => JSON_PARSER,
            StageKind::ExpressionEvalEnricher => EXPRESSION_EVAL_ENRICHER,
            StageKind::TextCleanupEnricher => TEXT_CLEANUP_ENRICHER,
            StageKind::SummaryFromSiteLinkExtractor => SUMMARY_FROM_SITE_LINK_EXTRACTOR,
            StageKind::SummaryHtmlToTextExtractor => SUMMARY_HTML_TO_TEXT_EXTRACTOR,
        }
    }

    /// Additional keys accepted for the same stage.
    pub fn aliases(self) -> &'static [&'static str] {
        match self {
            StageKind::BrowserDownloader => &[PLAYWRIGHT_DOWNLOADER],
            _ => &[],
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for StageKind {
    type Err = ScraperError;

    fn from_str(s: &str) -> Result<Self> {
        StageKind::ALL
            .into_iter()
            .find(|k| k.key() == s || k.aliases().contains(&s))
            .ok_or_else(|| ScraperError::Registry(format!("'{}' is not a built-in stage", s)))
    }
}

/// Name to stage mapping consulted when a source's pipeline is resolved.
#[derive(Default)]
pub struct StageRegistry {
    stages: HashMap<String, Arc<dyn Stage>>,
}

impl StageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in stage wired to fetchers built from `settings`.
    pub fn with_builtin_stages(settings: &Settings) -> Result<Self> {
        let mut registry = Self::new();
        for kind in StageKind::ALL {
            let Some(stage) = builtin_stage(kind, settings)? else {
                debug!("Stage {} not available in this build", kind);
                continue;
            };
            registry.register(kind.key(), stage.clone())?;
            for alias in kind.aliases() {
                registry.register(*alias, stage.clone())?;
            }
        }
        Ok(registry)
    }

    /// Adds a stage under `key`; a key can only be registered once.
    pub fn register(&mut self, key: impl Into<String>, stage: Arc<dyn Stage>) -> Result<()> {
        let key = key.into();
        if self.stages.contains_key(&key) {
            return Err(ScraperError::Registry(format!("stage '{}' is already registered", key)));
        }
        debug!("Registered stage {}", key);
        self.stages.insert(key, stage);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Result<Arc<dyn Stage>> {
        self.stages
            .get(key)
            .cloned()
            .ok_or_else(|| ScraperError::Registry(format!("unknown stage '{}'", key)))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.stages.contains_key(key)
    }

    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.stages.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }
}

fn builtin_stage(kind: StageKind, settings: &Settings) -> Result<Option<Arc<dyn Stage>>> {
    let stage: Arc<dyn Stage> = match kind {
        StageKind::WebPageDownloader => {
            let fetcher: Arc<dyn Fetcher> = Arc::new(HttpFetcher::new(settings.fetch.clone())?);
            Arc::new(DownloadStage::new(fetcher))
        }
        StageKind::RssDownloader => {
            let fetcher: Arc<dyn Fetcher> = Arc::new(FeedFetcher::new(settings.fetch.clone())?);
            Arc::new(DownloadStage::new(fetcher))
        }
        StageKind::BrowserDownloader => match browser_fetcher(settings) {
            Some(fetcher) => Arc::new(DownloadStage::new(fetcher)),
            None => return Ok(None),
        },
        StageKind::RssParser => {
            let fetcher: Arc<dyn Fetcher> = Arc::new(FeedFetcher::new(settings.fetch.clone())?);
            Arc::new(RssParserStage::new(fetcher))
        }
        StageKind::HtmlTableParser => Arc::new(HtmlTableParserStage),
        StageKind::JsonParser => {
            let fetcher: Arc<dyn Fetcher> = Arc::new(HttpFetcher::new(settings.fetch.clone())?);
            Arc::new(JsonParserStage::new(fetcher))
        }
        StageKind::ExpressionEvalEnricher => Arc::new(ExpressionEnricher),
        StageKind::TextCleanupEnricher => Arc::new(TextCleanupEnricher),
        StageKind::SummaryFromSiteLinkExtractor => {
            Arc::new(SummaryFromLinkStage::new(summary_fetcher(settings)?, settings.summary.clone()))
        }
        StageKind::SummaryHtmlToTextExtractor => {
            Arc::new(SummaryHtmlToTextStage::new(summary_fetcher(settings)?, settings.summary.clone()))
        }
    };
    Ok(Some(stage))
}

fn summary_fetcher(settings: &Settings) -> Result<Arc<dyn Fetcher>> {
    let mut fetch = settings.fetch.clone();
    fetch.timeout_secs = settings.summary.timeout_secs;
    fetch.retries = 1;
    Ok(Arc::new(HttpFetcher::new(fetch)?))
}

#[cfg(feature = "browser")]
fn browser_fetcher(settings: &Settings) -> Option<Arc<dyn Fetcher>> {
    Some(Arc::new(crate::infra::browser::BrowserFetcher::new(settings.browser.clone())))
}

#[cfg(not(feature = "browser"))]
fn browser_fetcher(_settings: &Settings) -> Option<Arc<dyn Fetcher>> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::engine::StageContext;
    use crate::pipeline::state::PipelineState;
    use async_trait::async_trait;

    struct Noop;

    #[async_trait]
    impl Stage for Noop {
        async fn process(&self, state: PipelineState, _ctx: &StageContext<'_>) -> Result<PipelineState> {
            Ok(state)
        }
    }

    #[test]
    fn duplicate_registration_fails() {
        let mut registry = StageRegistry::new();
        registry.register("CUSTOM", Arc::new(Noop)).unwrap();
        let err = registry.register("CUSTOM", Arc::new(Noop)).unwrap_err();
        assert!(matches!(err, ScraperError::Registry(_)));
    }

    #[test]
    fn unknown_key_fails() {
        let registry = StageRegistry::new();
        assert!(matches!(registry.get("NOPE"), Err(ScraperError::Registry(_))));
    }

    #[test]
    fn builtins_are_registered_with_aliases() {
        let registry = StageRegistry::with_builtin_stages(&Settings::default()).unwrap();
        for key in [
            WEB_PAGE_DOWNLOADER,
            RSS_DOWNLOADER,
            RSS_PARSER,
            HTML_TABLE_PARSER,
            JSON_PARSER,
            EXPRESSION_EVAL_ENRICHER,
            TEXT_CLEANUP_ENRICHER,
            SUMMARY_FROM_SITE_LINK_EXTRACTOR,
            SUMMARY_HTML_TO_TEXT_EXTRACTOR,
        ] {
            assert!(registry.contains(key), "missing {key}");
        }
        #[cfg(feature = "browser")]
        {
            assert!(registry.contains(BROWSER_DOWNLOADER));
            assert!(registry.contains(PLAYWRIGHT_DOWNLOADER));
        }
    }

    #[test]
    fn stage_kind_parses_keys_and_aliases() {
        assert_eq!("RSS-PARSER".parse::<StageKind>().unwrap(), StageKind::RssParser);
        assert_eq!(
            "PLAYWRIGHT-DOWNLOADER".parse::<StageKind>().unwrap(),
            StageKind::BrowserDownloader
        );
        assert_eq!("JSON-PARSER".parse::<StageKind>().unwrap(), StageKind::JsonParser);
        assert!("rss-parser".parse::<StageKind>().is_err());
    }
}
