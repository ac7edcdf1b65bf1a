use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use engram_core::{Result, VectorStore, VectorStoreError};
use futures::future::join_all;
use serde::Deserialize;

use crate::{BackendConfig, StorageConfig, VectorStoreFactory};

/// The memory categories an agent stores vectors for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryType {
    /// Long-lived facts and documents.
    Knowledge,
    /// The agent's conclusions about its own past runs.
    Reflection,
    /// Scratch state for the task in progress.
    Workspace,
}

impl MemoryType {
    pub const ALL: [MemoryType; 3] = [
        MemoryType::Knowledge,
        MemoryType::Reflection,
        MemoryType::Workspace,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryType::Knowledge => "knowledge",
            MemoryType::Reflection => "reflection",
            MemoryType::Workspace => "workspace",
        }
    }
}

impl fmt::Display for MemoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemoryType {
    type Err = VectorStoreError;

    fn from_str(s: &str) -> Result<Self> {
        MemoryType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| VectorStoreError::UnknownMemoryType(s.to_string()))
    }
}

/// Routes each [`MemoryType`] to the store serving it.
///
/// Memory types configured with identical backend settings share one
/// adapter, so they also share its collection.
pub struct CollectionManager {
    routes: HashMap<MemoryType, Arc<dyn VectorStore>>,
    stores: Vec<Arc<dyn VectorStore>>,
    fallback: Option<MemoryType>,
}

impl CollectionManager {
    /// Build (but do not connect) the stores named by `config`.
    pub fn new(config: &StorageConfig, factory: &VectorStoreFactory) -> Result<Self> {
        let mut built: Vec<(&BackendConfig, Arc<dyn VectorStore>)> = Vec::new();
        let mut routes = HashMap::new();

        for memory_type in MemoryType::ALL {
            let backend = config.backend_for(memory_type);
            let store = match built.iter().find(|(c, _)| *c == backend) {
                Some((_, store)) => store.clone(),
                None => {
                    let store = factory.build(backend)?;
                    built.push((backend, store.clone()));
                    store
                }
            };
            tracing::debug!(
                "{memory_type} memory -> {} collection '{}'",
                store.backend_name(),
                store.collection_name()
            );
            routes.insert(memory_type, store);
        }

        Ok(Self {
            routes,
            stores: built.into_iter().map(|(_, store)| store).collect(),
            fallback: config.fallback,
        })
    }

    pub fn get_store(&self, memory_type: MemoryType) -> Result<Arc<dyn VectorStore>> {
        self.routes
            .get(&memory_type)
            .cloned()
            .ok_or_else(|| VectorStoreError::UnknownMemoryType(memory_type.to_string()))
    }

    /// Resolve a memory type by name (case-insensitive).
    ///
    /// Unknown names fail unless a fallback memory type is configured.
    pub fn get_store_by_name(&self, name: &str) -> Result<Arc<dyn VectorStore>> {
        match name.parse::<MemoryType>() {
            Ok(memory_type) => self.get_store(memory_type),
            Err(e) => match self.fallback {
                Some(fallback) => {
                    tracing::debug!("unknown memory type '{name}', using {fallback}");
                    self.get_store(fallback)
                }
                None => Err(e),
            },
        }
    }

    pub fn fallback(&self) -> Option<MemoryType> {
        self.fallback
    }

    /// Distinct stores, in the order they were first routed.
    pub fn stores(&self) -> &[Arc<dyn VectorStore>] {
        &self.stores
    }

    /// Connect every store. On failure the stores connected so far are
    /// disconnected again and the error is returned.
    pub async fn connect_all(&self) -> Result<()> {
        for (i, store) in self.stores.iter().enumerate() {
            if let Err(e) = store.connect().await {
                tracing::warn!(
                    "connecting {} collection '{}' failed: {e}",
                    store.backend_name(),
                    store.collection_name()
                );
                for connected in &self.stores[..i] {
                    if let Err(rollback) = connected.disconnect().await {
                        tracing::warn!(
                            "rolling back {} collection '{}' failed: {rollback}",
                            connected.backend_name(),
                            connected.collection_name()
                        );
                    }
                }
                return Err(e);
            }
        }
        tracing::info!("connected {} vector store(s)", self.stores.len());
        Ok(())
    }

    /// Disconnect every store concurrently, returning the first error.
    pub async fn disconnect_all(&self) -> Result<()> {
        let results = join_all(self.stores.iter().map(|store| store.disconnect())).await;
        let mut first_error = None;
        for (store, result) in self.stores.iter().zip(results) {
            if let Err(e) = result {
                tracing::warn!(
                    "disconnecting {} collection '{}' failed: {e}",
                    store.backend_name(),
                    store.collection_name()
                );
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
