//! Pinecone vector store adapter for Engram.
//!
//! This crate provides [`PineconeVectorStore`], an implementation of the
//! [`VectorStore`](engram_core::VectorStore) trait backed by
//! [Pinecone](https://www.pinecone.io/) using its data-plane REST API.
//!
//! A collection maps to a namespace of one index. Metadata is flattened with
//! [`FlatPayloadCodec`](engram_core::FlatPayloadCodec), keeping string lists
//! native since Pinecone filters can match inside them.
//!
//! # Example
//!
//! ```rust,no_run
//! use engram_pinecone::{PineconeConfig, PineconeVectorStore};
//! use engram_core::VectorStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PineconeConfig::new(
//!     "your-api-key",
//!     "https://my-index-abc123.svc.pinecone.io",
//!     "knowledge",
//!     1536,
//! );
//! let store = PineconeVectorStore::new(config)?;
//! store.connect().await?;
//! # Ok(())
//! # }
//! ```

mod filter;
mod vector_store;

pub use filter::PineconeFilterTranslator;
pub use vector_store::{PineconeConfig, PineconeVectorStore};

// Re-export core traits for convenience.
pub use engram_core::{FilterTranslator, PayloadCodec, VectorStore};
