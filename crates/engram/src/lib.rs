//! Engram: the vector storage layer of an agent memory framework.
//!
//! One [`VectorStore`] contract covers an embedded in-memory engine and
//! several networked vector databases. This crate ties the pieces together:
//! a tagged [`BackendConfig`], a [`VectorStoreFactory`] that turns configs
//! into adapters, a [`CollectionManager`] routing each [`MemoryType`] to its
//! store, and [`StorageSystem`] owning the shared [`ConnectionPool`].
//!
//! # Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `default` | `full` |
//! | `qdrant` | Qdrant REST adapter |
//! | `chroma` | ChromaDB REST adapter |
//! | `pinecone` | Pinecone REST adapter |
//! | `milvus` | Milvus v2 REST adapter |
//! | `full` | All backends |
//!
//! The in-memory backend is always available.
//!
//! # Example
//!
//! ```rust,ignore
//! use engram::{MemoryType, StorageConfig, StorageSystem};
//! use engram::vectorstores::InMemoryConfig;
//!
//! let config = StorageConfig::new(InMemoryConfig::new("knowledge", 384));
//! let storage = StorageSystem::new(config)?;
//! storage.connect().await?;
//!
//! let store = storage.get_store(MemoryType::Knowledge)?;
//! let hits = store.search(&query, 5, None).await?;
//! storage.shutdown().await?;
//! ```

mod config;
mod factory;
mod manager;
mod system;

pub use config::{BackendConfig, PoolSettings, StorageConfig};
pub use factory::{create_vector_store, VectorStoreFactory};
pub use manager::{CollectionManager, MemoryType};
pub use system::StorageSystem;

pub use engram_core::{
    DistanceMetric, FieldFilter, Payload, Predicate, Result, SearchFilters, VectorId, VectorStore,
    VectorStoreError, VectorStoreResult,
};
pub use engram_pool::{ConnectionOptions, ConnectionParams, ConnectionPool, PoolStats};

/// Contract, shared types, payload codecs and filter translation.
pub use engram_core as core;

/// Connection parameters, transports and the connection pool.
pub use engram_pool as pool;

/// Configuration file loading.
pub use engram_config as config_loader;

/// Embedded in-memory backend.
pub use engram_vectorstores as vectorstores;

/// Qdrant adapter.
#[cfg(feature = "qdrant")]
pub use engram_qdrant as qdrant;

/// ChromaDB adapter.
#[cfg(feature = "chroma")]
pub use engram_chroma as chroma;

/// Pinecone adapter.
#[cfg(feature = "pinecone")]
pub use engram_pinecone as pinecone;

/// Milvus adapter.
#[cfg(feature = "milvus")]
pub use engram_milvus as milvus;
