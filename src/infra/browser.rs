//! Headless-browser fetcher for pages whose content is rendered client-side.
//!
//! Every fetch launches its own browser process and tears it down before returning,
//! whichever way the fetch ends.

use crate::app::ports::{FetchOptions, Fetcher};
use crate::config::BrowserSettings;
use crate::error::{Result, ScraperError};
use crate::infra::http_client::validate_url;
use crate::metrics;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use futures::StreamExt;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// Owns a launched browser and its CDP handler task for the duration of one fetch.
struct BrowserSession {
    browser: Option<Browser>,
    handler: JoinHandle<()>,
}

impl BrowserSession {
    async fn launch(settings: &BrowserSettings, headless: bool) -> Result<Self> {
        let mut builder = BrowserConfig::builder()
            .request_timeout(Duration::from_secs(settings.navigation_timeout_secs));
        if !headless {
            builder = builder.with_head();
        }
        if let Some(path) = &settings.executable {
            builder = builder.chrome_executable(path);
        }
        let config = builder.build().map_err(ScraperError::Browser)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| ScraperError::Browser(format!("launch failed: {}", e)))?;
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });
        Ok(Self {
            browser: Some(browser),
            handler,
        })
    }

    fn browser(&self) -> Result<&Browser> {
        self.browser
            .as_ref()
            .ok_or_else(|| ScraperError::Browser("session already closed".to_string()))
    }

    async fn close(mut self) {
        if let Some(mut browser) = self.browser.take() {
            if let Err(e) = browser.close().await {
                warn!("Browser close failed: {}", e);
            }
            let _ = browser.wait().await;
        }
        self.handler.abort();
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        // Dropping the Browser kills the child process; the handler would otherwise spin.
        self.browser.take();
        self.handler.abort();
    }
}

pub struct BrowserFetcher {
    settings: BrowserSettings,
}

impl BrowserFetcher {
    pub fn new(settings: BrowserSettings) -> Self {
        Self { settings }
    }

    async fn render(&self, session: &BrowserSession, url: &str, options: &FetchOptions) -> Result<String> {
        let nav_timeout = options
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| Duration::from_secs(self.settings.navigation_timeout_secs));

        let page = tokio::time::timeout(nav_timeout, async {
            let page = session.browser()?.new_page(url).await.map_err(|e| {
                ScraperError::download(url, format!("navigation failed: {}", e))
            })?;
            page.wait_for_navigation()
                .await
                .map_err(|e| ScraperError::download(url, format!("navigation failed: {}", e)))?;
            Ok::<_, ScraperError>(page)
        })
        .await
        .map_err(|_| ScraperError::download(url, format!("navigation timed out after {:?}", nav_timeout)))??;

        if options.settle_after_load {
            debug!("Settling for {}ms after load", self.settings.settle_ms);
            tokio::time::sleep(Duration::from_millis(self.settings.settle_ms)).await;
        }

        if let Some(selector) = &options.wait_for_selector {
            let limit = Duration::from_secs(self.settings.selector_timeout_secs);
            let waited = tokio::time::timeout(limit, async {
                loop {
                    if page.find_element(selector.as_str()).await.is_ok() {
                        return;
                    }
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            })
            .await;
            if waited.is_err() {
                return Err(ScraperError::download(
                    url,
                    format!("selector '{}' did not appear within {:?}", selector, limit),
                ));
            }
            debug!("Selector '{}' present", selector);
        }

        let html = page
            .content()
            .await
            .map_err(|e| ScraperError::Browser(format!("reading page content failed: {}", e)))?;
        if let Err(e) = page.close().await {
            debug!("Page close failed: {}", e);
        }
        Ok(html)
    }
}

#[async_trait]
impl Fetcher for BrowserFetcher {
    fn name(&self) -> &'static str {
        "browser"
    }

    #[instrument(skip(self, options))]
    async fn fetch(&self, url: &str, options: &FetchOptions) -> Result<String> {
        validate_url(url)?;
        let headless = options.headless.unwrap_or(self.settings.headless);
        let session = BrowserSession::launch(&self.settings, headless).await?;
        info!("🌐 Rendering {} in headless browser", url);

        let result = self.render(&session, url, options).await;
        session.close().await;

        if let Ok(html) = &result {
            metrics::fetch::bytes("browser", html.len());
        }
        result
    }
}
