//! Qdrant vector store adapter for Engram.
//!
//! This crate provides [`QdrantVectorStore`], an implementation of the
//! [`VectorStore`](engram_core::VectorStore) trait backed by
//! [Qdrant](https://qdrant.tech/) using its REST API.
//!
//! Payloads are stored unchanged. Integer ids map to Qdrant point ids
//! directly; text ids are mapped to a deterministic UUID and the original is
//! kept in the reserved payload key [`ORIGINAL_ID_KEY`].
//!
//! # Example
//!
//! ```rust,no_run
//! use engram_qdrant::{QdrantConfig, QdrantVectorStore};
//! use engram_core::VectorStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = QdrantConfig::new("knowledge", 1536);
//! let store = QdrantVectorStore::new(config)?;
//! store.connect().await?;
//! # Ok(())
//! # }
//! ```

mod filter;
mod vector_store;

pub use filter::QdrantFilterTranslator;
pub use vector_store::{QdrantConfig, QdrantVectorStore, ORIGINAL_ID_KEY};

// Re-export core traits for convenience.
pub use engram_core::{FilterTranslator, PayloadCodec, VectorStore};
