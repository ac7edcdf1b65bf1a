use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use engram_core::Result;
use tokio::sync::Mutex;

use crate::{ConnectionKey, Transport};

/// A shared, reference-counted client.
pub struct PooledConnection {
    pub key: ConnectionKey,
    pub client: Arc<dyn Transport>,
    pub ref_count: usize,
    pub last_health_check: Option<DateTime<Utc>>,
    pub healthy: bool,
    released_at: Option<Instant>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionStats {
    pub ref_count: usize,
    pub is_healthy: bool,
    pub last_health_check: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub total_connections: usize,
    pub per_connection: BTreeMap<ConnectionKey, ConnectionStats>,
}

/// Keyed cache of live backend clients shared across adapters.
///
/// Entries whose reference count drops to zero stay cached until
/// [`evict_idle`](ConnectionPool::evict_idle) or
/// [`shutdown`](ConnectionPool::shutdown) removes them, so quick
/// disconnect/connect cycles reuse the same client.
#[derive(Default)]
pub struct ConnectionPool {
    entries: Mutex<HashMap<ConnectionKey, PooledConnection>>,
}

impl ConnectionPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached client for `key`, or build one with `factory`.
    ///
    /// The pool lock is held while `factory` runs, so concurrent acquires of
    /// a new key build exactly one client.
    pub async fn acquire<F, Fut>(&self, key: &ConnectionKey, factory: F) -> Result<Arc<dyn Transport>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Arc<dyn Transport>>>,
    {
        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.get_mut(key) {
            entry.ref_count += 1;
            entry.released_at = None;
            tracing::debug!("reusing pooled connection {key} (refs={})", entry.ref_count);
            return Ok(entry.client.clone());
        }

        let client = factory().await?;
        entries.insert(
            key.clone(),
            PooledConnection {
                key: key.clone(),
                client: client.clone(),
                ref_count: 1,
                last_health_check: Some(Utc::now()),
                healthy: true,
                released_at: None,
            },
        );
        tracing::info!("opened pooled connection {key}");
        Ok(client)
    }

    /// Drop one reference to `key`, returning the remaining count.
    pub async fn release(&self, key: &ConnectionKey) -> usize {
        let mut entries = self.entries.lock().await;
        match entries.get_mut(key) {
            Some(entry) => {
                entry.ref_count = entry.ref_count.saturating_sub(1);
                if entry.ref_count == 0 {
                    entry.released_at = Some(Instant::now());
                    tracing::debug!("pooled connection {key} is now idle");
                }
                entry.ref_count
            }
            None => {
                tracing::warn!("release of unknown pooled connection {key}");
                0
            }
        }
    }

    pub async fn ref_count(&self, key: &ConnectionKey) -> Option<usize> {
        self.entries.lock().await.get(key).map(|e| e.ref_count)
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    pub async fn stats(&self) -> PoolStats {
        let entries = self.entries.lock().await;
        PoolStats {
            total_connections: entries.len(),
            per_connection: entries
                .values()
                .map(|e| {
                    (
                        e.key.clone(),
                        ConnectionStats {
                            ref_count: e.ref_count,
                            is_healthy: e.healthy,
                            last_health_check: e.last_health_check,
                        },
                    )
                })
                .collect(),
        }
    }

    /// Probe every cached client and record the outcome. Returns the number of unhealthy clients.
    pub async fn health_check_all(&self) -> usize {
        let clients: Vec<(ConnectionKey, Arc<dyn Transport>)> = {
            let entries = self.entries.lock().await;
            entries
                .iter()
                .map(|(k, e)| (k.clone(), e.client.clone()))
                .collect()
        };

        let mut results = Vec::with_capacity(clients.len());
        for (key, client) in clients {
            let healthy = match client.health_check().await {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!("pooled connection {key} failed health check: {e}");
                    false
                }
            };
            results.push((key, healthy));
        }

        let mut entries = self.entries.lock().await;
        let now = Utc::now();
        let mut unhealthy = 0;
        for (key, healthy) in results {
            if let Some(entry) = entries.get_mut(&key) {
                entry.healthy = healthy;
                entry.last_health_check = Some(now);
            }
            if !healthy {
                unhealthy += 1;
            }
        }
        unhealthy
    }

    /// Remove idle entries released more than `max_idle` ago. Returns how many were removed.
    pub async fn evict_idle(&self, max_idle: Duration) -> usize {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|key, entry| {
            let expired = entry.ref_count == 0
                && entry
                    .released_at
                    .is_some_and(|at| at.elapsed() >= max_idle);
            if expired {
                tracing::debug!("evicting idle pooled connection {key}");
            }
            !expired
        });
        before - entries.len()
    }

    /// Drop every cached client regardless of reference count.
    pub async fn shutdown(&self) -> usize {
        let mut entries = self.entries.lock().await;
        let closed = entries.len();
        entries.clear();
        tracing::info!("connection pool shut down ({closed} connection(s) closed)");
        closed
    }
}
