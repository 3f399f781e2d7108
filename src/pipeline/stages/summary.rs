use crate::app::ports::{FetchOptions, Fetcher};
use crate::config::SummarySettings;
use crate::error::Result;
use crate::pipeline::engine::{Stage, StageContext};
use crate::pipeline::processing::summary::{extract_summary, ExtractionMode, SummaryQuery};
use crate::pipeline::processing::text::{clean_html, TextFormat};
use crate::pipeline::stages::stage_config;
use crate::pipeline::state::PipelineState;
use async_trait::async_trait;
use futures::future::join_all;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummaryLinkConfig {
    #[serde(default)]
    selector: Option<String>,
    #[serde(default)]
    extraction_mode: ExtractionMode,
    #[serde(default)]
    end_selector: Option<String>,
    #[serde(default)]
    container_selector: Option<String>,
    #[serde(default)]
    sequential: bool,
    #[serde(default)]
    delay_ms: Option<u64>,
}

impl SummaryLinkConfig {
    /// `None` when there is nothing to look for.
    fn query(&self) -> Result<Option<SummaryQuery>> {
        let selector = match (&self.selector, self.extraction_mode) {
            (Some(s), _) => s.clone(),
            (None, ExtractionMode::WithinContainer) if self.container_selector.is_some() => String::new(),
            (None, _) => return Ok(None),
        };
        let query = SummaryQuery {
            selector,
            mode: self.extraction_mode,
            end_selector: self.end_selector.clone(),
            container_selector: self.container_selector.clone(),
        };
        query.validate()?;
        Ok(Some(query))
    }
}

fn page_options(settings: &SummarySettings) -> FetchOptions {
    FetchOptions {
        timeout_ms: Some(settings.timeout_secs * 1000),
        ..Default::default()
    }
}

/// SUMMARY-FROM-SITE-LINK-EXTRACTOR: replaces each document's summary with text taken from
/// its detail page. Failures leave the existing summary in place.
pub struct SummaryFromLinkStage {
    fetcher: Arc<dyn Fetcher>,
    settings: SummarySettings,
}

impl SummaryFromLinkStage {
    pub fn new(fetcher: Arc<dyn Fetcher>, settings: SummarySettings) -> Self {
        Self { fetcher, settings }
    }

    async fn summary_for(&self, link: &str, query: &SummaryQuery) -> Option<String> {
        let html = match self.fetcher.fetch(link, &page_options(&self.settings)).await {
            Ok(html) => html,
            Err(e) => {
                warn!("Summary fetch failed for {}: {}", link, e);
                return None;
            }
        };
        match extract_summary(&html, query) {
            Ok(Some(text)) => Some(text),
            Ok(None) => {
                debug!("No summary found on {}", link);
                None
            }
            Err(e) => {
                warn!("Summary extraction failed for {}: {}", link, e);
                None
            }
        }
    }
}

#[async_trait]
impl Stage for SummaryFromLinkStage {
    async fn process(&self, mut state: PipelineState, ctx: &StageContext<'_>) -> Result<PipelineState> {
        let config: SummaryLinkConfig = stage_config(ctx.spec)?;
        let Some(query) = config.query()? else {
            warn!("⚠️ {} has no 'selector', leaving summaries unchanged", ctx.spec.stage);
            return Ok(state);
        };
        let links: Vec<Option<String>> = state
            .documents
            .iter()
            .map(|d| d.link_to_reg_change_text.clone().filter(|l| !l.trim().is_empty()))
            .collect();

        let summaries: Vec<Option<String>> = if config.sequential {
            let delay = Duration::from_millis(config.delay_ms.unwrap_or(self.settings.request_delay_ms));
            let mut out = Vec::with_capacity(links.len());
            let mut first = true;
            for link in &links {
                let Some(link) = link else {
                    out.push(None);
                    continue;
                };
                if !first {
                    tokio::time::sleep(delay).await;
                }
                first = false;
                out.push(self.summary_for(link, &query).await);
            }
            out
        } else {
            join_all(links.iter().map(|link| {
                let query = &query;
                async move {
                    match link {
                        Some(link) => self.summary_for(link, query).await,
                        None => None,
                    }
                }
            }))
            .await
        };

        let mut updated = 0usize;
        for (doc, summary) in state.documents.iter_mut().zip(summaries) {
            if let Some(summary) = summary {
                doc.summary = Some(summary);
                updated += 1;
            }
        }
        info!("📝 Updated {}/{} summaries from detail pages", updated, state.documents.len());
        Ok(state)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
enum HtmlSource {
    #[default]
    #[serde(rename = "summary")]
    Summary,
    #[serde(rename = "linkToRegChangeText")]
    Link,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HtmlToTextConfig {
    #[serde(default)]
    source: HtmlSource,
    #[serde(default)]
    format: TextFormat,
    #[serde(default)]
    delay_ms: Option<u64>,
}

/// SUMMARY-HTML-TO-TEXT-EXTRACTOR: turns HTML summaries (or the linked detail page) into
/// plain text or markdown. Detail pages are fetched one at a time with a pause in between.
pub struct SummaryHtmlToTextStage {
    fetcher: Arc<dyn Fetcher>,
    settings: SummarySettings,
}

impl SummaryHtmlToTextStage {
    pub fn new(fetcher: Arc<dyn Fetcher>, settings: SummarySettings) -> Self {
        Self { fetcher, settings }
    }
}

#[async_trait]
impl Stage for SummaryHtmlToTextStage {
    async fn process(&self, mut state: PipelineState, ctx: &StageContext<'_>) -> Result<PipelineState> {
        let config: HtmlToTextConfig = stage_config(ctx.spec)?;

        match config.source {
            HtmlSource::Summary => {
                for doc in state.documents.iter_mut() {
                    if let Some(summary) = doc.summary.as_deref() {
                        doc.summary = Some(clean_html(summary, config.format));
                    }
                }
            }
            HtmlSource::Link => {
                let delay = Duration::from_millis(config.delay_ms.unwrap_or(self.settings.request_delay_ms));
                let options = page_options(&self.settings);
                let mut first = true;
                for doc in state.documents.iter_mut() {
                    let Some(link) = doc.link_to_reg_change_text.clone().filter(|l| !l.trim().is_empty()) else {
                        continue;
                    };
                    if !first {
                        tokio::time::sleep(delay).await;
                    }
                    first = false;
                    match self.fetcher.fetch(&link, &options).await {
                        Ok(html) => {
                            let text = clean_html(&html, config.format);
                            if !text.is_empty() {
                                doc.summary = Some(text);
                            }
                        }
                        Err(e) => warn!("Keeping summary for {}: {}", link, e),
                    }
                }
            }
        }
        Ok(state)
    }
}
