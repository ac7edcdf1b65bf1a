use std::path::{Path, PathBuf};

use engram_config::{
    discover_and_load, discover_config_path, load_from_file, load_from_source, parse_config,
    ConfigFormat, FileConfigSource, StringConfigSource,
};
use engram_core::VectorStoreError;
use serde::Deserialize;

#[derive(Debug, Deserialize, PartialEq)]
struct Sample {
    collection_name: String,
    dimension: usize,
    #[serde(default)]
    tags: Vec<String>,
}

fn temp_file(content: &str, ext: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!(
        "engram_config_test_{}.{ext}",
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ));
    std::fs::write(&path, content).unwrap();
    path
}

const TOML: &str = r#"
collection_name = "knowledge"
dimension = 384
tags = ["a", "b"]
"#;

const JSON: &str = r#"{"collection_name": "knowledge", "dimension": 384, "tags": ["a", "b"]}"#;

const YAML: &str = r#"
collection_name: knowledge
dimension: 384
tags: [a, b]
"#;

fn expected() -> Sample {
    Sample {
        collection_name: "knowledge".into(),
        dimension: 384,
        tags: vec!["a".into(), "b".into()],
    }
}

#[test]
fn extension_detection() {
    assert_eq!(ConfigFormat::from_extension("TOML"), Some(ConfigFormat::Toml));
    assert_eq!(ConfigFormat::from_extension("yml"), Some(ConfigFormat::Yaml));
    assert_eq!(ConfigFormat::from_extension("ini"), None);
    assert_eq!(
        ConfigFormat::from_path(Path::new("/etc/engram.json")),
        Some(ConfigFormat::Json)
    );
    assert_eq!(ConfigFormat::from_path(Path::new("engram")), None);
}

#[test]
fn all_formats_parse_to_same_value() {
    let toml: Sample = parse_config(TOML, ConfigFormat::Toml).unwrap();
    let json: Sample = parse_config(JSON, ConfigFormat::Json).unwrap();
    let yaml: Sample = parse_config(YAML, ConfigFormat::Yaml).unwrap();
    assert_eq!(toml, expected());
    assert_eq!(json, expected());
    assert_eq!(yaml, expected());
}

#[test]
fn parse_errors_name_the_format() {
    let err = parse_config::<Sample>("dimension = ", ConfigFormat::Toml).unwrap_err();
    assert!(matches!(&err, VectorStoreError::Config(msg) if msg.starts_with("TOML parse error")));

    let err = parse_config::<Sample>("{}", ConfigFormat::Json).unwrap_err();
    assert!(err.to_string().contains("JSON parse error"));
}

#[test]
fn file_source_detects_format() {
    for (content, ext) in [(TOML, "toml"), (JSON, "json"), (YAML, "yaml")] {
        let path = temp_file(content, ext);
        let loaded: Sample = load_from_file(&path).unwrap();
        assert_eq!(loaded, expected());
        std::fs::remove_file(&path).ok();
    }
}

#[test]
fn file_source_format_override() {
    let path = temp_file(JSON, "conf");
    let source = FileConfigSource::new(&path).with_format(ConfigFormat::Json);
    let loaded: Sample = load_from_source(&source).unwrap();
    assert_eq!(loaded, expected());
    std::fs::remove_file(&path).ok();
}

#[test]
fn unknown_extension_is_config_error() {
    let path = temp_file(JSON, "conf");
    let err = load_from_file::<Sample>(&path).unwrap_err();
    assert!(matches!(err, VectorStoreError::Config(_)));
    std::fs::remove_file(&path).ok();
}

#[test]
fn string_source() {
    let source = StringConfigSource::new(YAML, ConfigFormat::Yaml);
    let loaded: Sample = load_from_source(&source).unwrap();
    assert_eq!(loaded, expected());
}

#[test]
fn explicit_path_wins_and_must_exist() {
    let path = temp_file(TOML, "toml");
    assert_eq!(discover_config_path(Some(&path)).unwrap(), Some(path.clone()));
    let loaded: Sample = discover_and_load(Some(&path)).unwrap();
    assert_eq!(loaded, expected());
    std::fs::remove_file(&path).ok();

    let err = discover_and_load::<Sample>(Some(Path::new("/nonexistent/engram.toml"))).unwrap_err();
    assert!(err.to_string().contains("not found"));
}
