mod in_memory;

pub use in_memory::{InMemoryConfig, InMemoryVectorStore};

// Re-export core traits for convenience.
pub use engram_core::{DistanceMetric, Payload, VectorId, VectorStore, VectorStoreResult};
