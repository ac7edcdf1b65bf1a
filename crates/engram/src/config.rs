use std::path::Path;
use std::time::Duration;

use engram_config::{ConfigFormat, ConfigSource};
use engram_core::Result;
use engram_vectorstores::InMemoryConfig;
use serde::Deserialize;

use crate::MemoryType;

/// One backend plus the collection it targets, selected by the `type` tag.
///
/// ```toml
/// [knowledge]
/// type = "qdrant"
/// host = "localhost"
/// port = 6333
/// collection_name = "knowledge"
/// dimension = 768
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackendConfig {
    InMemory(InMemoryConfig),
    #[cfg(feature = "qdrant")]
    Qdrant(engram_qdrant::QdrantConfig),
    #[cfg(feature = "chroma")]
    Chroma(engram_chroma::ChromaConfig),
    #[cfg(feature = "pinecone")]
    Pinecone(engram_pinecone::PineconeConfig),
    #[cfg(feature = "milvus")]
    Milvus(engram_milvus::MilvusConfig),
}

impl BackendConfig {
    pub fn backend_name(&self) -> &'static str {
        match self {
            BackendConfig::InMemory(_) => "in_memory",
            #[cfg(feature = "qdrant")]
            BackendConfig::Qdrant(_) => "qdrant",
            #[cfg(feature = "chroma")]
            BackendConfig::Chroma(_) => "chroma",
            #[cfg(feature = "pinecone")]
            BackendConfig::Pinecone(_) => "pinecone",
            #[cfg(feature = "milvus")]
            BackendConfig::Milvus(_) => "milvus",
        }
    }

    pub fn collection_name(&self) -> &str {
        match self {
            BackendConfig::InMemory(c) => &c.collection_name,
            #[cfg(feature = "qdrant")]
            BackendConfig::Qdrant(c) => &c.collection_name,
            #[cfg(feature = "chroma")]
            BackendConfig::Chroma(c) => &c.collection_name,
            #[cfg(feature = "pinecone")]
            BackendConfig::Pinecone(c) => &c.collection_name,
            #[cfg(feature = "milvus")]
            BackendConfig::Milvus(c) => &c.collection_name,
        }
    }

    pub fn dimension(&self) -> usize {
        match self {
            BackendConfig::InMemory(c) => c.dimension,
            #[cfg(feature = "qdrant")]
            BackendConfig::Qdrant(c) => c.dimension,
            #[cfg(feature = "chroma")]
            BackendConfig::Chroma(c) => c.dimension,
            #[cfg(feature = "pinecone")]
            BackendConfig::Pinecone(c) => c.dimension,
            #[cfg(feature = "milvus")]
            BackendConfig::Milvus(c) => c.dimension,
        }
    }
}

impl From<InMemoryConfig> for BackendConfig {
    fn from(config: InMemoryConfig) -> Self {
        BackendConfig::InMemory(config)
    }
}

#[cfg(feature = "qdrant")]
impl From<engram_qdrant::QdrantConfig> for BackendConfig {
    fn from(config: engram_qdrant::QdrantConfig) -> Self {
        BackendConfig::Qdrant(config)
    }
}

#[cfg(feature = "chroma")]
impl From<engram_chroma::ChromaConfig> for BackendConfig {
    fn from(config: engram_chroma::ChromaConfig) -> Self {
        BackendConfig::Chroma(config)
    }
}

#[cfg(feature = "pinecone")]
impl From<engram_pinecone::PineconeConfig> for BackendConfig {
    fn from(config: engram_pinecone::PineconeConfig) -> Self {
        BackendConfig::Pinecone(config)
    }
}

#[cfg(feature = "milvus")]
impl From<engram_milvus::MilvusConfig> for BackendConfig {
    fn from(config: engram_milvus::MilvusConfig) -> Self {
        BackendConfig::Milvus(config)
    }
}

/// Connection pool maintenance settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PoolSettings {
    /// Released connections idle longer than this are dropped by
    /// [`StorageSystem::evict_idle`](crate::StorageSystem::evict_idle).
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

fn default_idle_timeout_secs() -> u64 {
    300
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout_secs(),
        }
    }
}

impl PoolSettings {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

/// Top-level storage configuration.
///
/// Only `knowledge` is required; `reflection` and `workspace` fall back to
/// the knowledge backend when omitted.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StorageConfig {
    pub knowledge: BackendConfig,
    #[serde(default)]
    pub reflection: Option<BackendConfig>,
    #[serde(default)]
    pub workspace: Option<BackendConfig>,
    /// Memory type served for unrecognised names. Unset means unknown names fail.
    #[serde(default)]
    pub fallback: Option<MemoryType>,
    #[serde(default)]
    pub pool: PoolSettings,
}

impl StorageConfig {
    pub fn new(knowledge: impl Into<BackendConfig>) -> Self {
        Self {
            knowledge: knowledge.into(),
            reflection: None,
            workspace: None,
            fallback: None,
            pool: PoolSettings::default(),
        }
    }

    pub fn with_reflection(mut self, config: impl Into<BackendConfig>) -> Self {
        self.reflection = Some(config.into());
        self
    }

    pub fn with_workspace(mut self, config: impl Into<BackendConfig>) -> Self {
        self.workspace = Some(config.into());
        self
    }

    pub fn with_fallback(mut self, memory_type: MemoryType) -> Self {
        self.fallback = Some(memory_type);
        self
    }

    pub fn with_pool(mut self, pool: PoolSettings) -> Self {
        self.pool = pool;
        self
    }

    /// The backend serving `memory_type`, after applying the knowledge default.
    pub fn backend_for(&self, memory_type: MemoryType) -> &BackendConfig {
        match memory_type {
            MemoryType::Knowledge => &self.knowledge,
            MemoryType::Reflection => self.reflection.as_ref().unwrap_or(&self.knowledge),
            MemoryType::Workspace => self.workspace.as_ref().unwrap_or(&self.knowledge),
        }
    }

    /// Discover and load a configuration file.
    ///
    /// Looks at `explicit`, then `$ENGRAM_CONFIG`, then `./engram.{toml,json,yaml,yml}`,
    /// then `~/.engram/config.{...}`.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        engram_config::discover_and_load(explicit)
    }

    pub fn load_from(source: &dyn ConfigSource) -> Result<Self> {
        engram_config::load_from_source(source)
    }

    pub fn parse(content: &str, format: ConfigFormat) -> Result<Self> {
        engram_config::parse_config(content, format)
    }
}
