use crate::constants::{
    API_URL_ENV, DEFAULT_API_URL, FETCH_RETRIES_ENV, FETCH_TIMEOUT_ENV, MAX_CONCURRENT_SOURCES_ENV,
};
use crate::error::{Result, ScraperError};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// Runtime policy for fetchers, enrichers, the job API client and the orchestrator.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub fetch: FetchSettings,
    pub browser: BrowserSettings,
    pub summary: SummarySettings,
    pub api: ApiSettings,
    pub orchestrator: OrchestratorSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchSettings {
    pub timeout_secs: u64,
    pub retries: u32,
    pub retry_delay_ms: u64,
    pub user_agent: String,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            retries: 3,
            retry_delay_ms: 1000,
            user_agent: concat!("regchange_scraper/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl FetchSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Delay before the retry that follows `attempt` (1-based); grows linearly.
    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.retry_delay_ms.saturating_mul(attempt as u64))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    pub headless: bool,
    pub navigation_timeout_secs: u64,
    pub selector_timeout_secs: u64,
    /// Pause after load when a stage asks for `waitUntil: networkidle`.
    pub settle_ms: u64,
    pub executable: Option<String>,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: true,
            navigation_timeout_secs: 30,
            selector_timeout_secs: 10,
            settle_ms: 500,
            executable: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SummarySettings {
    pub timeout_secs: u64,
    pub request_delay_ms: u64,
}

impl Default for SummarySettings {
    fn default() -> Self {
        Self {
            timeout_secs: 6,
            request_delay_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    pub base_url: String,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrchestratorSettings {
    pub max_concurrent_sources: usize,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            max_concurrent_sources: 1,
        }
    }
}

impl Settings {
    /// Loads settings from a TOML file (when given and present), then applies env overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = match path {
            Some(p) if p.exists() => Self::from_file(p)?,
            Some(p) => {
                warn!("Settings file {} not found, using defaults", p.display());
                Self::default()
            }
            None => Self::default(),
        };
        settings.apply_env();
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            ScraperError::Config(format!("Failed to read settings file '{}': {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(API_URL_ENV) {
            if !url.trim().is_empty() {
                self.api.base_url = url.trim().to_string();
            }
        }
        if let Some(v) = env_number(FETCH_TIMEOUT_ENV) {
            self.fetch.timeout_secs = v;
        }
        if let Some(v) = env_number(FETCH_RETRIES_ENV) {
            self.fetch.retries = v as u32;
        }
        if let Some(v) = env_number(MAX_CONCURRENT_SOURCES_ENV) {
            self.orchestrator.max_concurrent_sources = v as usize;
        }
    }
}

fn env_number(key: &str) -> Option<u64> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("Ignoring non-numeric value '{}' for {}", raw, key);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let s = Settings::from_toml("").unwrap();
        assert_eq!(s.fetch.retries, 3);
        assert_eq!(s.fetch.timeout_secs, 10);
        assert_eq!(s.summary.request_delay_ms, 1000);
        assert_eq!(s.orchestrator.max_concurrent_sources, 1);
        assert!(s.browser.headless);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let s = Settings::from_toml(
            r#"
            [fetch]
            retries = 2

            [api]
            base_url = "http://api.internal/api"
            "#,
        )
        .unwrap();
        assert_eq!(s.fetch.retries, 2);
        assert_eq!(s.fetch.retry_delay_ms, 1000);
        assert_eq!(s.api.base_url, "http://api.internal/api");
    }

    #[test]
    fn browser_settle_delay_is_configurable() {
        assert_eq!(Settings::default().browser.settle_ms, 500);
        let s = Settings::from_toml("[browser]\nsettle_ms = 1500\n").unwrap();
        assert_eq!(s.browser.settle_ms, 1500);
        assert!(s.browser.headless);
    }

    #[test]
    fn backoff_is_linear() {
        let f = FetchSettings {
            retry_delay_ms: 250,
            ..FetchSettings::default()
        };
        assert_eq!(f.backoff(1), Duration::from_millis(250));
        assert_eq!(f.backoff(3), Duration::from_millis(750));
    }
}
