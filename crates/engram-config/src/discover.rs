use std::path::{Path, PathBuf};

use engram_core::{Result, VectorStoreError};
use serde::de::DeserializeOwned;

use crate::format::ConfigFormat;
use crate::source::load_from_file;

/// Environment variable naming a config file, consulted when no explicit path is given.
pub const CONFIG_ENV_VAR: &str = "ENGRAM_CONFIG";

/// Locate the configuration file.
///
/// Search order:
/// 1. `explicit`, which must exist
/// 2. the file named by `$ENGRAM_CONFIG`, which must exist
/// 3. `./engram.{toml,json,yaml,yml}`
/// 4. `~/.engram/config.{toml,json,yaml,yml}`
///
/// Returns `Ok(None)` when steps 3 and 4 find nothing.
pub fn discover_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
    if let Some(path) = explicit {
        return require_existing(path.to_path_buf(), "config file");
    }
    if let Some(path) = std::env::var_os(CONFIG_ENV_VAR) {
        return require_existing(PathBuf::from(path), CONFIG_ENV_VAR);
    }

    let local = ConfigFormat::EXTENSIONS
        .iter()
        .map(|ext| PathBuf::from(format!("engram.{ext}")));
    let home = dirs::home_dir().into_iter().flat_map(|home| {
        ConfigFormat::EXTENSIONS
            .iter()
            .map(move |ext| home.join(".engram").join(format!("config.{ext}")))
    });
    Ok(local.chain(home).find(|candidate| candidate.is_file()))
}

fn require_existing(path: PathBuf, origin: &str) -> Result<Option<PathBuf>> {
    if path.is_file() {
        Ok(Some(path))
    } else {
        Err(VectorStoreError::Config(format!(
            "{origin} not found: {}",
            path.display()
        )))
    }
}

/// Discover the configuration file and deserialize it as `T`.
pub fn discover_and_load<T: DeserializeOwned>(explicit: Option<&Path>) -> Result<T> {
    match discover_config_path(explicit)? {
        Some(path) => load_from_file(&path),
        None => Err(VectorStoreError::Config(
            "no config file found: tried ./engram.{toml,json,yaml,yml} and ~/.engram/config.{toml,json,yaml,yml}"
                .to_string(),
        )),
    }
}
