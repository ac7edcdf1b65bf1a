use std::sync::Arc;

use engram_core::{Result, VectorStore};
use engram_pool::{ConnectionPool, PoolStats, TransportFactory};

use crate::{CollectionManager, MemoryType, PoolSettings, StorageConfig, VectorStoreFactory};

/// The assembled storage layer: one connection pool and the collection
/// manager whose stores draw from it.
pub struct StorageSystem {
    pool: Arc<ConnectionPool>,
    manager: CollectionManager,
    settings: PoolSettings,
}

impl StorageSystem {
    /// Build every configured store. Nothing is connected until
    /// [`connect`](Self::connect).
    pub fn new(config: StorageConfig) -> Result<Self> {
        Self::build(config, None)
    }

    /// Like [`new`](Self::new), but every networked adapter opens its
    /// connections through `transport`.
    pub fn with_transport(config: StorageConfig, transport: Arc<dyn TransportFactory>) -> Result<Self> {
        Self::build(config, Some(transport))
    }

    fn build(config: StorageConfig, transport: Option<Arc<dyn TransportFactory>>) -> Result<Self> {
        let pool = Arc::new(ConnectionPool::new());
        let mut factory = VectorStoreFactory::new().with_pool(pool.clone());
        if let Some(transport) = transport {
            factory = factory.with_transport_factory(transport);
        }
        let manager = CollectionManager::new(&config, &factory)?;
        Ok(Self {
            pool,
            manager,
            settings: config.pool,
        })
    }

    pub async fn connect(&self) -> Result<()> {
        self.manager.connect_all().await
    }

    pub fn get_store(&self, memory_type: MemoryType) -> Result<Arc<dyn VectorStore>> {
        self.manager.get_store(memory_type)
    }

    pub fn get_store_by_name(&self, name: &str) -> Result<Arc<dyn VectorStore>> {
        self.manager.get_store_by_name(name)
    }

    pub fn manager(&self) -> &CollectionManager {
        &self.manager
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    pub async fn pool_stats(&self) -> PoolStats {
        self.pool.stats().await
    }

    /// Drop released connections idle past the configured timeout.
    pub async fn evict_idle(&self) -> usize {
        self.pool.evict_idle(self.settings.idle_timeout()).await
    }

    /// Probe every pooled connection; returns how many are unhealthy.
    pub async fn health_check(&self) -> usize {
        self.pool.health_check_all().await
    }

    /// Disconnect every store, then tear down the pool.
    pub async fn shutdown(&self) -> Result<()> {
        let disconnected = self.manager.disconnect_all().await;
        self.pool.shutdown().await;
        disconnected
    }
}
