use crate::app::ports::{FetchOptions, Fetcher};
use crate::config::FetchSettings;
use crate::constants::{FEED_ACCEPT, HTML_ACCEPT};
use crate::error::{Result, ScraperError};
use crate::metrics;
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use url::Url;

/// Rejects anything that is not an absolute http(s) URL.
pub fn validate_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw).map_err(|e| ScraperError::download(raw, format!("invalid URL: {}", e)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ScraperError::download(
            raw,
            format!("unsupported URL scheme '{}'", other),
        )),
    }
}

/// Static GET fetcher with a bounded timeout and linear-backoff retries.
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    settings: FetchSettings,
    accept: &'static str,
    label: &'static str,
}

impl HttpFetcher {
    pub fn new(settings: FetchSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout())
            .user_agent(settings.user_agent.clone())
            .gzip(true)
            .deflate(true)
            .build()?;
        Ok(Self {
            client,
            settings,
            accept: HTML_ACCEPT,
            label: "http",
        })
    }

    pub fn settings(&self) -> &FetchSettings {
        &self.settings
    }

    async fn fetch_once(&self, url: &Url, options: &FetchOptions) -> Result<String> {
        let mut request = self.client.get(url.clone());
        if !options.headers.keys().any(|k| k.eq_ignore_ascii_case(ACCEPT.as_str())) {
            request = request.header(ACCEPT, self.accept);
        }
        for (key, value) in &options.headers {
            request = request.header(key.as_str(), value.as_str());
        }
        if let Some(ms) = options.timeout_ms {
            request = request.timeout(Duration::from_millis(ms));
        }

        let response = request
            .send()
            .await
            .map_err(|e| ScraperError::download(url.as_str(), e))?;
        let status = response.status();
        if !(status.is_success() || status.is_redirection()) {
            return Err(ScraperError::download(
                url.as_str(),
                format!("unexpected status {}", status),
            ));
        }
        response
            .text()
            .await
            .map_err(|e| ScraperError::download(url.as_str(), e))
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    fn name(&self) -> &'static str {
        self.label
    }

    #[instrument(skip(self, options))]
    async fn fetch(&self, url: &str, options: &FetchOptions) -> Result<String> {
        let parsed = validate_url(url)?;
        let attempts = self.settings.retries.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            match self.fetch_once(&parsed, options).await {
                Ok(body) => {
                    debug!("Fetched {} bytes on attempt {}", body.len(), attempt);
                    metrics::fetch::bytes(self.label, body.len());
                    return Ok(body);
                }
                Err(e) => {
                    warn!("Attempt {}/{} for {} failed: {}", attempt, attempts, url, e);
                    last_error = Some(e);
                    if attempt < attempts {
                        metrics::fetch::retried(self.label);
                        tokio::time::sleep(self.settings.backoff(attempt)).await;
                    }
                }
            }
        }

        let cause = last_error
            .map(|e| match e {
                ScraperError::Download { message, .. } => message,
                other => other.to_string(),
            })
            .unwrap_or_else(|| "no attempts made".to_string());
        Err(ScraperError::download(
            url,
            format!("giving up after {} attempt(s): {}", attempts, cause),
        ))
    }
}

/// Feed retrieval: same transport policy, feed-oriented Accept header. Parsing happens later.
#[derive(Clone)]
pub struct FeedFetcher {
    inner: HttpFetcher,
}

impl FeedFetcher {
    pub fn new(settings: FetchSettings) -> Result<Self> {
        let mut inner = HttpFetcher::new(settings)?;
        inner.accept = FEED_ACCEPT;
        inner.label = "feed";
        Ok(Self { inner })
    }
}

#[async_trait]
impl Fetcher for FeedFetcher {
    fn name(&self) -> &'static str {
        self.inner.label
    }

    async fn fetch(&self, url: &str, options: &FetchOptions) -> Result<String> {
        self.inner.fetch(url, options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_settings(retries: u32) -> FetchSettings {
        FetchSettings {
            timeout_secs: 5,
            retries,
            retry_delay_ms: 0,
            ..FetchSettings::default()
        }
    }

    #[test]
    fn rejects_non_http_schemes() {
        assert!(validate_url("ftp://x.test/file").is_err());
        assert!(validate_url("not a url").is_err());
        assert!(validate_url("https://x.test/a").is_ok());
    }

    #[tokio::test]
    async fn returns_body_on_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/page")
            .with_status(200)
            .with_body("<html>ok</html>")
            .create_async()
            .await;

        let fetcher = HttpFetcher::new(fast_settings(3)).unwrap();
        let body = fetcher
            .fetch(&format!("{}/page", server.url()), &FetchOptions::default())
            .await
            .unwrap();
        assert_eq!(body, "<html>ok</html>");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn retries_then_reports_download_error() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/down")
            .with_status(503)
            .expect(2)
            .create_async()
            .await;

        let fetcher = HttpFetcher::new(fast_settings(2)).unwrap();
        let url = format!("{}/down", server.url());
        let err = fetcher.fetch(&url, &FetchOptions::default()).await.unwrap_err();
        match err {
            ScraperError::Download { url: failed, message } => {
                assert_eq!(failed, url);
                assert!(message.contains("503"));
            }
            other => panic!("expected download error, got {other:?}"),
        }
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn feed_fetcher_sends_feed_accept_header() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/rss")
            .match_header("accept", FEED_ACCEPT)
            .with_status(200)
            .with_body("<rss/>")
            .create_async()
            .await;

        let fetcher = FeedFetcher::new(fast_settings(1)).unwrap();
        let body = fetcher
            .fetch(&format!("{}/rss", server.url()), &FetchOptions::default())
            .await
            .unwrap();
        assert_eq!(body, "<rss/>");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn accept_header_from_options_replaces_the_default() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api")
            .match_header("accept", "application/json")
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let fetcher = HttpFetcher::new(fast_settings(1)).unwrap();
        let options = FetchOptions::default().with_header("Accept", "application/json");
        let body = fetcher.fetch(&format!("{}/api", server.url()), &options).await.unwrap();
        assert_eq!(body, "[]");
        mock.assert_async().await;
    }
}
