//! Milvus vector store adapter for Engram.
//!
//! This crate provides [`MilvusVectorStore`], an implementation of the
//! [`VectorStore`](engram_core::VectorStore) trait backed by
//! [Milvus](https://milvus.io/) using its v2 REST API.
//!
//! Each collection has a `VarChar` primary key `id`, a `vector` field and a
//! JSON field `payload` holding the payload unchanged. Filters become Milvus
//! boolean expressions over that JSON field.
//!
//! # Example
//!
//! ```rust,no_run
//! use engram_milvus::{MilvusConfig, MilvusVectorStore};
//! use engram_core::VectorStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = MilvusConfig::new("workspace", 768);
//! let store = MilvusVectorStore::new(config)?;
//! store.connect().await?;
//! # Ok(())
//! # }
//! ```

mod filter;
mod vector_store;

pub use filter::MilvusFilterTranslator;
pub use vector_store::{MilvusConfig, MilvusVectorStore};

// Re-export core traits for convenience.
pub use engram_core::{FilterTranslator, PayloadCodec, VectorStore};
