//! ChromaDB vector store adapter for Engram.
//!
//! This crate provides [`ChromaVectorStore`], an implementation of the
//! [`VectorStore`](engram_core::VectorStore) trait backed by
//! [ChromaDB](https://www.trychroma.com/) using its REST API.
//!
//! Chroma metadata only holds flat scalars, so payloads go through a
//! [`FlatPayloadCodec`](engram_core::FlatPayloadCodec) by default. Chroma has
//! no "contains all" operator: an `all` filter matches its first value only
//! and the translation is flagged as a fallback.
//!
//! # Example
//!
//! ```rust,no_run
//! use engram_chroma::{ChromaConfig, ChromaVectorStore};
//! use engram_core::VectorStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ChromaConfig::new("my_collection", 384);
//! let store = ChromaVectorStore::new(config)?;
//! store.connect().await?;
//! # Ok(())
//! # }
//! ```

mod filter;
mod vector_store;

pub use filter::ChromaFilterTranslator;
pub use vector_store::{ChromaConfig, ChromaVectorStore};

// Re-export core traits for convenience.
pub use engram_core::{FilterTranslator, PayloadCodec, VectorStore};
