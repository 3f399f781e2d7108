use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScraperError {
    #[error("Failed to download {url}: {message}")]
    Download { url: String, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Pipeline failed at stage {} ({stage_name}): {source}", .stage_index + 1)]
    Pipeline {
        stage_index: usize,
        stage_name: String,
        #[source]
        source: Box<ScraperError>,
    },

    #[error("Mapping error: {0}")]
    Mapping(String),

    #[error("Expression error: {0}")]
    Expression(String),

    #[error("Registry error: {0}")]
    Registry(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("API error: {message}")]
    Api { message: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ScraperError {
    pub fn download(url: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        ScraperError::Download {
            url: url.into(),
            message: cause.to_string(),
        }
    }

    /// Transport-level failures may succeed on a later attempt; everything else is deterministic.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ScraperError::Download { .. } | ScraperError::Http(_))
    }

    /// Short machine-friendly label used for metrics and job failure messages.
    pub fn kind(&self) -> &'static str {
        match self {
            ScraperError::Download { .. } => "download",
            ScraperError::Parse(_) => "parse",
            ScraperError::Pipeline { .. } => "pipeline",
            ScraperError::Mapping(_) => "mapping",
            ScraperError::Expression(_) => "expression",
            ScraperError::Registry(_) => "registry",
            ScraperError::Config(_) => "config",
            ScraperError::Browser(_) => "browser",
            ScraperError::Api { .. } => "api",
            ScraperError::Http(_) => "http",
            ScraperError::Json(_) => "json",
            ScraperError::Toml(_) => "toml",
            ScraperError::Io(_) => "io",
        }
    }
}

pub type Result<T> = std::result::Result<T, ScraperError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_error_reports_one_based_stage() {
        let err = ScraperError::Pipeline {
            stage_index: 0,
            stage_name: "WEB-PAGE-DOWNLOADER".to_string(),
            source: Box::new(ScraperError::download("https://x.test", "connection refused")),
        };
        let msg = err.to_string();
        assert!(msg.contains("stage 1"));
        assert!(msg.contains("WEB-PAGE-DOWNLOADER"));
        assert!(msg.contains("connection refused"));
    }

    #[test]
    fn only_transport_errors_are_retryable() {
        assert!(ScraperError::download("u", "x").is_retryable());
        assert!(!ScraperError::Parse("bad".into()).is_retryable());
        assert!(!ScraperError::Mapping("bad".into()).is_retryable());
    }
}
