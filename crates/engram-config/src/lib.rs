//! Configuration loading for Engram.
//!
//! Storage configuration can be written as TOML, JSON or YAML. This crate
//! only reads and deserializes it; the schema lives with the types being
//! configured (see `engram::StorageConfig`).

mod discover;
mod format;
mod source;

pub use discover::{discover_and_load, discover_config_path, CONFIG_ENV_VAR};
pub use format::{parse_config, ConfigFormat};
pub use source::{
    load_from_file, load_from_source, ConfigSource, FileConfigSource, StringConfigSource,
};
