use std::fmt;
use std::path::Path;

use engram_core::{Result, VectorStoreError};
use serde::de::DeserializeOwned;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
    Yaml,
}

impl ConfigFormat {
    /// Every extension recognised, in discovery order.
    pub const EXTENSIONS: [&'static str; 4] = ["toml", "json", "yaml", "yml"];

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            "yaml" | "yml" => Some(Self::Yaml),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }
}

impl fmt::Display for ConfigFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Toml => "TOML",
            Self::Json => "JSON",
            Self::Yaml => "YAML",
        })
    }
}

/// Deserialize `content` written in `format`.
///
/// Every failure is reported as [`VectorStoreError::Config`].
pub fn parse_config<T: DeserializeOwned>(content: &str, format: ConfigFormat) -> Result<T> {
    let parsed = match format {
        ConfigFormat::Toml => toml::from_str(content).map_err(|e| e.to_string()),
        ConfigFormat::Json => serde_json::from_str(content).map_err(|e| e.to_string()),
        ConfigFormat::Yaml => serde_yml::from_str(content).map_err(|e| e.to_string()),
    };
    parsed.map_err(|e| VectorStoreError::Config(format!("{format} parse error: {e}")))
}
