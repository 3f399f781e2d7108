use crate::app::ports::{FetchOptions, Fetcher};
use crate::error::Result;
use crate::pipeline::engine::{Stage, StageContext};
use crate::pipeline::state::PipelineState;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

/// Fetches `params.url` (or the source url) into `rawData` using the wrapped fetcher.
///
/// Serves WEB-PAGE-DOWNLOADER, RSS-DOWNLOADER and BROWSER-DOWNLOADER; they differ only in the
/// fetcher they are built with.
pub struct DownloadStage {
    fetcher: Arc<dyn Fetcher>,
}

impl DownloadStage {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self { fetcher }
    }
}

/// Reads the optional fetch knobs a download stage accepts in its params.
pub(crate) fn fetch_options(ctx: &StageContext<'_>) -> FetchOptions {
    let spec = ctx.spec;
    let mut options = FetchOptions {
        timeout_ms: spec.param_u64("timeout"),
        wait_for_selector: spec.param_str("waitForSelector").map(str::to_string),
        settle_after_load: spec
            .param_str("waitUntil")
            .is_some_and(|w| w.eq_ignore_ascii_case("networkidle")),
        headless: spec.param_bool("headless"),
        ..Default::default()
    };
    if let Some(Value::Object(headers)) = spec.param("headers") {
        for (key, value) in headers {
            if let Some(v) = value.as_str() {
                options = options.with_header(key.clone(), v);
            }
        }
    }
    options
}

#[async_trait]
impl Stage for DownloadStage {
    async fn process(&self, mut state: PipelineState, ctx: &StageContext<'_>) -> Result<PipelineState> {
        let url = ctx.spec.param_str("url").unwrap_or(&ctx.source.url).to_string();
        let options = fetch_options(ctx);

        info!("⬇️ Downloading {} via {} fetcher", url, self.fetcher.name());
        let body = self.fetcher.fetch(&url, &options).await?;
        info!("📦 Downloaded {} bytes", body.len());

        state.raw_data = Some(body);
        state.base_url = Some(url);
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SourceConfig, StageSpec};
    use serde_json::json;

    fn options_for(params: serde_json::Value) -> FetchOptions {
        let source = SourceConfig::new("s", "S", "https://s.test/");
        let spec = StageSpec::new("BROWSER-DOWNLOADER").with_params(params);
        fetch_options(&StageContext {
            source: &source,
            spec: &spec,
            index: 0,
        })
    }

    #[test]
    fn networkidle_requests_the_settle_delay() {
        let options = options_for(json!({"waitUntil": "networkidle", "waitForSelector": "table", "timeout": 5000}));
        assert!(options.settle_after_load);
        assert_eq!(options.wait_for_selector.as_deref(), Some("table"));
        assert_eq!(options.timeout_ms, Some(5000));

        assert!(!options_for(json!({"waitUntil": "domcontentloaded"})).settle_after_load);
    }

    #[test]
    fn string_headers_are_forwarded() {
        let options = options_for(json!({"headers": {"Accept": "application/json", "X-Count": 3}}));
        assert_eq!(options.headers.get("Accept").map(String::as_str), Some("application/json"));
        assert!(!options.headers.contains_key("X-Count"));
    }
}
