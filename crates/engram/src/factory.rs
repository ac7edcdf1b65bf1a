use std::sync::Arc;

use engram_core::{validation::validate_collection_name, Result, VectorStore};
use engram_pool::{ConnectionPool, TransportFactory};
use engram_vectorstores::InMemoryVectorStore;

use crate::BackendConfig;

/// Builds adapters from [`BackendConfig`]s.
///
/// Networked adapters share connections through the attached pool (unless
/// their `use_pool` option is off). A transport factory can be injected to
/// run every adapter against a scripted transport.
#[derive(Clone, Default)]
pub struct VectorStoreFactory {
    pool: Option<Arc<ConnectionPool>>,
    transport: Option<Arc<dyn TransportFactory>>,
}

impl VectorStoreFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pool(mut self, pool: Arc<ConnectionPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn with_transport_factory(mut self, factory: Arc<dyn TransportFactory>) -> Self {
        self.transport = Some(factory);
        self
    }

    pub fn pool(&self) -> Option<&Arc<ConnectionPool>> {
        self.pool.as_ref()
    }

    /// Build a disconnected adapter for `config`.
    pub fn build(&self, config: &BackendConfig) -> Result<Arc<dyn VectorStore>> {
        validate_collection_name(config.collection_name())?;
        tracing::debug!(
            "building {} store for collection '{}' (dimension {})",
            config.backend_name(),
            config.collection_name(),
            config.dimension()
        );

        let store: Arc<dyn VectorStore> = match config {
            BackendConfig::InMemory(c) => Arc::new(InMemoryVectorStore::new(c.clone())),
            #[cfg(feature = "qdrant")]
            BackendConfig::Qdrant(c) => {
                let mut store = engram_qdrant::QdrantVectorStore::new(c.clone())?;
                if let Some(pool) = &self.pool {
                    store = store.with_pool(pool.clone());
                }
                if let Some(factory) = &self.transport {
                    store = store.with_transport_factory(factory.clone());
                }
                Arc::new(store)
            }
            #[cfg(feature = "chroma")]
            BackendConfig::Chroma(c) => {
                let mut store = engram_chroma::ChromaVectorStore::new(c.clone())?;
                if let Some(pool) = &self.pool {
                    store = store.with_pool(pool.clone());
                }
                if let Some(factory) = &self.transport {
                    store = store.with_transport_factory(factory.clone());
                }
                Arc::new(store)
            }
            #[cfg(feature = "pinecone")]
            BackendConfig::Pinecone(c) => {
                let mut store = engram_pinecone::PineconeVectorStore::new(c.clone())?;
                if let Some(pool) = &self.pool {
                    store = store.with_pool(pool.clone());
                }
                if let Some(factory) = &self.transport {
                    store = store.with_transport_factory(factory.clone());
                }
                Arc::new(store)
            }
            #[cfg(feature = "milvus")]
            BackendConfig::Milvus(c) => {
                let mut store = engram_milvus::MilvusVectorStore::new(c.clone())?;
                if let Some(pool) = &self.pool {
                    store = store.with_pool(pool.clone());
                }
                if let Some(factory) = &self.transport {
                    store = store.with_transport_factory(factory.clone());
                }
                Arc::new(store)
            }
        };
        Ok(store)
    }
}

/// Build a disconnected adapter for `config`, sharing connections through
/// `pool` when given.
pub fn create_vector_store(
    config: &BackendConfig,
    pool: Option<Arc<ConnectionPool>>,
) -> Result<Arc<dyn VectorStore>> {
    let mut factory = VectorStoreFactory::new();
    if let Some(pool) = pool {
        factory = factory.with_pool(pool);
    }
    factory.build(config)
}
