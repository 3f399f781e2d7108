use crate::error::{Result, ScraperError};
use crate::types::SourceConfig;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::info;

#[derive(Deserialize)]
#[serde(untagged)]
enum SourceFile {
    Many(Vec<SourceConfig>),
    One(Box<SourceConfig>),
}

/// Ordered, id-unique collection of source configurations.
#[derive(Debug, Clone, Default)]
pub struct SourceCatalog {
    sources: Vec<SourceConfig>,
}

impl SourceCatalog {
    pub fn from_sources(sources: Vec<SourceConfig>) -> Result<Self> {
        let mut catalog = Self::default();
        for source in sources {
            catalog.insert(source)?;
        }
        Ok(catalog)
    }

    fn insert(&mut self, source: SourceConfig) -> Result<()> {
        if self.get(&source.id).is_some() {
            return Err(ScraperError::Config(format!("duplicate source id '{}'", source.id)));
        }
        self.sources.push(source);
        Ok(())
    }

    fn parse(content: &str, origin: &Path) -> Result<Vec<SourceConfig>> {
        let file: SourceFile = serde_json::from_str(content).map_err(|e| {
            ScraperError::Config(format!("Failed to parse source config {}: {}", origin.display(), e))
        })?;
        Ok(match file {
            SourceFile::Many(list) => list,
            SourceFile::One(one) => vec![*one],
        })
    }

    /// Loads a JSON array of sources (or a single source object) from one file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            ScraperError::Config(format!("Failed to read source file {}: {}", path.display(), e))
        })?;
        let catalog = Self::from_sources(Self::parse(&content, path)?)?;
        info!("📋 Loaded {} source(s) from {}", catalog.len(), path.display());
        Ok(catalog)
    }

    /// Loads and merges every `*.json` file in `dir`, in file-name order.
    pub fn load_from_directory<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(ScraperError::Config(format!(
                "Source directory does not exist: {}",
                dir.display()
            )));
        }

        let mut paths: Vec<_> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().and_then(|s| s.to_str()) == Some("json"))
            .collect();
        paths.sort();

        let mut catalog = Self::default();
        for path in paths {
            let content = fs::read_to_string(&path)?;
            for source in Self::parse(&content, &path)? {
                catalog.insert(source)?;
            }
        }
        info!("📋 Loaded {} source(s) from {}", catalog.len(), dir.display());
        Ok(catalog)
    }

    /// Dispatches on whether `path` is a directory or a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.is_dir() {
            Self::load_from_directory(path)
        } else {
            Self::load_from_file(path)
        }
    }

    pub fn get(&self, id: &str) -> Option<&SourceConfig> {
        self.sources.iter().find(|s| s.id == id)
    }

    pub fn all(&self) -> &[SourceConfig] {
        &self.sources
    }

    pub fn enabled(&self) -> Vec<&SourceConfig> {
        self.sources.iter().filter(|s| s.enabled).collect()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.id.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}
