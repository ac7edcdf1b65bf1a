use std::path::{Path, PathBuf};

use engram_core::{Result, VectorStoreError};
use serde::de::DeserializeOwned;

use crate::format::{parse_config, ConfigFormat};

/// Where configuration text comes from.
pub trait ConfigSource: Send + Sync {
    /// Return the raw content and the format to parse it with.
    fn fetch(&self) -> Result<(String, ConfigFormat)>;

    /// Human-readable origin, used in log lines.
    fn describe(&self) -> String;
}

/// A local file; the format follows the extension unless overridden.
pub struct FileConfigSource {
    path: PathBuf,
    format: Option<ConfigFormat>,
}

impl FileConfigSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            format: None,
        }
    }

    pub fn with_format(mut self, format: ConfigFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigSource for FileConfigSource {
    fn fetch(&self) -> Result<(String, ConfigFormat)> {
        let format = match self.format.or_else(|| ConfigFormat::from_path(&self.path)) {
            Some(format) => format,
            None => {
                return Err(VectorStoreError::Config(format!(
                    "unrecognised config extension: {} (expected one of {:?})",
                    self.path.display(),
                    ConfigFormat::EXTENSIONS
                )))
            }
        };
        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            VectorStoreError::Config(format!("cannot read {}: {e}", self.path.display()))
        })?;
        Ok((content, format))
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Configuration held in memory, e.g. embedded defaults or test fixtures.
pub struct StringConfigSource {
    content: String,
    format: ConfigFormat,
}

impl StringConfigSource {
    pub fn new(content: impl Into<String>, format: ConfigFormat) -> Self {
        Self {
            content: content.into(),
            format,
        }
    }
}

impl ConfigSource for StringConfigSource {
    fn fetch(&self) -> Result<(String, ConfigFormat)> {
        Ok((self.content.clone(), self.format))
    }

    fn describe(&self) -> String {
        format!("<inline {}>", self.format)
    }
}

pub fn load_from_source<T: DeserializeOwned>(source: &dyn ConfigSource) -> Result<T> {
    let (content, format) = source.fetch()?;
    tracing::debug!("loading {format} configuration from {}", source.describe());
    parse_config(&content, format)
}

pub fn load_from_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    load_from_source(&FileConfigSource::new(path))
}
