use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use engram_core::{
    similarity, validate_batch, validate_dimension, DistanceMetric, Payload, Result,
    SearchFilters, VectorId, VectorStore, VectorStoreError, VectorStoreResult,
};
use serde::Deserialize;
use tokio::sync::RwLock;

/// Configuration for [`InMemoryVectorStore`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InMemoryConfig {
    pub collection_name: String,
    pub dimension: usize,
    /// Upper bound on stored records. Inserts beyond it fail.
    #[serde(default = "default_max_vectors")]
    pub max_vectors: usize,
    #[serde(default)]
    pub metric: DistanceMetric,
}

fn default_max_vectors() -> usize {
    100_000
}

impl InMemoryConfig {
    pub fn new(collection_name: impl Into<String>, dimension: usize) -> Self {
        Self {
            collection_name: collection_name.into(),
            dimension,
            max_vectors: default_max_vectors(),
            metric: DistanceMetric::default(),
        }
    }

    pub fn with_max_vectors(mut self, max_vectors: usize) -> Self {
        self.max_vectors = max_vectors;
        self
    }

    pub fn with_metric(mut self, metric: DistanceMetric) -> Self {
        self.metric = metric;
        self
    }
}

/// Stored vector with its payload.
struct StoredEntry {
    vector: Vec<f32>,
    payload: Payload,
}

/// In-memory vector store with brute-force nearest-neighbour search.
///
/// Inputs are copied on insert and results are cloned on read, so callers
/// never share memory with the stored records.
pub struct InMemoryVectorStore {
    config: InMemoryConfig,
    entries: RwLock<HashMap<VectorId, StoredEntry>>,
    connected: AtomicBool,
}

impl InMemoryVectorStore {
    pub fn new(config: InMemoryConfig) -> Self {
        Self {
            config,
            entries: RwLock::new(HashMap::new()),
            connected: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &InMemoryConfig {
        &self.config
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(VectorStoreError::NotConnected(
                "in_memory store is not connected; call connect() first".to_string(),
            ))
        }
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    fn backend_name(&self) -> &'static str {
        "in_memory"
    }

    fn collection_name(&self) -> &str {
        &self.config.collection_name
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    async fn connect(&self) -> Result<()> {
        if !self.connected.swap(true, Ordering::SeqCst) {
            tracing::debug!(
                "in_memory collection '{}' ready (dimension={}, metric={})",
                self.config.collection_name,
                self.config.dimension,
                self.config.metric
            );
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn insert(
        &self,
        vectors: &[Vec<f32>],
        ids: &[VectorId],
        payloads: &[Payload],
    ) -> Result<()> {
        self.ensure_connected()?;
        validate_batch(vectors, ids, payloads, self.config.dimension)?;

        let mut entries = self.entries.write().await;
        let new_ids = ids
            .iter()
            .filter(|id| !entries.contains_key(*id))
            .collect::<HashSet<_>>()
            .len();
        if entries.len() + new_ids > self.config.max_vectors {
            return Err(VectorStoreError::Store(format!(
                "collection '{}' is full: {} stored + {new_ids} new exceeds max_vectors={}",
                self.config.collection_name,
                entries.len(),
                self.config.max_vectors
            )));
        }

        for ((vector, id), payload) in vectors.iter().zip(ids).zip(payloads) {
            entries.insert(
                id.clone(),
                StoredEntry {
                    vector: vector.clone(),
                    payload: payload.clone(),
                },
            );
        }
        Ok(())
    }

    async fn search(
        &self,
        query: &[f32],
        limit: usize,
        filters: Option<&SearchFilters>,
    ) -> Result<Vec<VectorStoreResult>> {
        self.ensure_connected()?;
        validate_dimension(query, self.config.dimension)?;
        if let Some(filters) = filters {
            filters.validate()?;
        }

        let entries = self.entries.read().await;
        let mut scored: Vec<(&VectorId, &StoredEntry, f32)> = entries
            .iter()
            .filter(|(_, entry)| filters.map_or(true, |f| f.matches(&entry.payload)))
            .map(|(id, entry)| (id, entry, similarity(self.config.metric, query, &entry.vector)))
            .collect();

        // Sort by score descending, ties by id for a stable order
        scored.sort_by(|a, b| {
            b.2.partial_cmp(&a.2)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(b.0))
        });
        scored.truncate(limit);

        Ok(scored
            .into_iter()
            .map(|(id, entry, score)| {
                VectorStoreResult::new(id.clone(), score, entry.payload.clone())
            })
            .collect())
    }

    async fn get(&self, id: &VectorId) -> Result<Option<VectorStoreResult>> {
        self.ensure_connected()?;
        let entries = self.entries.read().await;
        Ok(entries.get(id).map(|entry| {
            VectorStoreResult::new(id.clone(), 1.0, entry.payload.clone())
                .with_vector(entry.vector.clone())
        }))
    }

    async fn update(&self, id: &VectorId, vector: &[f32], payload: &Payload) -> Result<()> {
        let vectors = [vector.to_vec()];
        self.insert(&vectors, std::slice::from_ref(id), std::slice::from_ref(payload))
            .await
    }

    async fn delete(&self, id: &VectorId) -> Result<()> {
        self.ensure_connected()?;
        self.entries.write().await.remove(id);
        Ok(())
    }

    async fn delete_collection(&self) -> Result<()> {
        self.ensure_connected()?;
        let mut entries = self.entries.write().await;
        tracing::debug!(
            "dropping in_memory collection '{}' ({} records)",
            self.config.collection_name,
            entries.len()
        );
        entries.clear();
        Ok(())
    }

    async fn list(
        &self,
        filters: Option<&SearchFilters>,
        limit: Option<usize>,
    ) -> Result<(Vec<VectorStoreResult>, usize)> {
        self.ensure_connected()?;
        if let Some(filters) = filters {
            filters.validate()?;
        }

        let entries = self.entries.read().await;
        let mut matching: Vec<(&VectorId, &StoredEntry)> = entries
            .iter()
            .filter(|(_, entry)| filters.map_or(true, |f| f.matches(&entry.payload)))
            .collect();
        matching.sort_by(|a, b| a.0.cmp(b.0));

        let total = matching.len();
        let results = matching
            .into_iter()
            .take(limit.unwrap_or(usize::MAX))
            .map(|(id, entry)| {
                VectorStoreResult::new(id.clone(), 1.0, entry.payload.clone())
                    .with_vector(entry.vector.clone())
            })
            .collect();
        Ok((results, total))
    }
}
