//! Core traits and types for Engram, the storage layer of an agent memory
//! framework.
//!
//! - [`VectorStore`]: the uniform contract every backend implements.
//! - [`PayloadCodec`]: encodes JSON payloads for a backend's metadata model.
//! - [`SearchFilters`] / [`FilterTranslator`]: the backend-independent filter DSL.
//! - [`VectorStoreError`]: the error taxonomy.

mod codec;
mod error;
pub mod filter;
mod retry;
mod store;
mod types;
pub mod validation;

pub use codec::{
    FlatPayloadCodec, IdentityCodec, PayloadCodec, JSON_TAG, LIST_TAG, MEMBER_TAG,
    NESTED_KEYS_FIELD,
};
pub use error::{BoxError, Result, VectorStoreError};
pub use filter::{
    FieldFilter, FilterTranslator, Predicate, RangeBounds, SearchFilters, TranslatedFilter,
};
pub use retry::RetryPolicy;
pub use store::VectorStore;
pub use types::{
    cosine_similarity, dot_product, euclidean_distance, similarity, DistanceMetric, Payload,
    VectorId, VectorStoreResult,
};
pub use validation::{validate_batch, validate_dimension};
