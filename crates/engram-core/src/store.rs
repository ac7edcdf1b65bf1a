use async_trait::async_trait;

use crate::{Payload, Result, SearchFilters, VectorId, VectorStoreResult};

/// Uniform contract implemented by every vector storage backend.
///
/// Every operation other than [`connect`](VectorStore::connect),
/// [`disconnect`](VectorStore::disconnect) and
/// [`is_connected`](VectorStore::is_connected) fails with
/// [`VectorStoreError::NotConnected`](crate::VectorStoreError::NotConnected)
/// when called before `connect()`.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Short backend identifier, e.g. `"qdrant"`.
    fn backend_name(&self) -> &'static str;

    fn collection_name(&self) -> &str;

    fn dimension(&self) -> usize;

    /// Acquire a connection and create or attach to the collection. Idempotent.
    async fn connect(&self) -> Result<()>;

    /// Release the connection. Idempotent.
    async fn disconnect(&self) -> Result<()>;

    async fn is_connected(&self) -> bool;

    /// Upsert a batch. All three slices must have equal length.
    async fn insert(
        &self,
        vectors: &[Vec<f32>],
        ids: &[VectorId],
        payloads: &[Payload],
    ) -> Result<()>;

    /// Return at most `limit` records, sorted by descending score.
    async fn search(
        &self,
        query: &[f32],
        limit: usize,
        filters: Option<&SearchFilters>,
    ) -> Result<Vec<VectorStoreResult>>;

    /// Fetch a record with its vector, or `None` when absent.
    async fn get(&self, id: &VectorId) -> Result<Option<VectorStoreResult>>;

    /// Replace both the vector and the payload of `id`.
    async fn update(&self, id: &VectorId, vector: &[f32], payload: &Payload) -> Result<()>;

    /// Remove one record. Deleting a missing id is not an error.
    async fn delete(&self, id: &VectorId) -> Result<()>;

    /// Drop the whole collection including its remote schema.
    async fn delete_collection(&self) -> Result<()>;

    /// List records and the total number matching `filters`, ignoring `limit`.
    async fn list(
        &self,
        filters: Option<&SearchFilters>,
        limit: Option<usize>,
    ) -> Result<(Vec<VectorStoreResult>, usize)>;
}
