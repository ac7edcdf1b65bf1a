use std::sync::Arc;

use engram_core::{Result, RetryPolicy, VectorStoreError};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::{
    ConnectionKey, ConnectionPool, Endpoint, HttpTransportFactory, Transport, TransportFactory,
    TransportRequest, TransportResponse,
};

/// Owns one adapter's connection: pooled when a pool is attached, private otherwise.
pub struct Connector {
    backend: &'static str,
    endpoint: Endpoint,
    key: ConnectionKey,
    retry: RetryPolicy,
    pool: Option<Arc<ConnectionPool>>,
    factory: Arc<dyn TransportFactory>,
    client: RwLock<Option<Arc<dyn Transport>>>,
}

impl Connector {
    pub fn new(
        backend: &'static str,
        endpoint: Endpoint,
        key: ConnectionKey,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            backend,
            endpoint,
            key,
            retry,
            pool: None,
            factory: Arc::new(HttpTransportFactory),
            client: RwLock::new(None),
        }
    }

    pub fn with_pool(mut self, pool: Arc<ConnectionPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn with_factory(mut self, factory: Arc<dyn TransportFactory>) -> Self {
        self.factory = factory;
        self
    }

    pub fn backend(&self) -> &'static str {
        self.backend
    }

    pub fn key(&self) -> &ConnectionKey {
        &self.key
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn is_pooled(&self) -> bool {
        self.pool.is_some()
    }

    /// Acquire a client, retrying with backoff.
    ///
    /// Returns the client and whether this call established it (`false` when
    /// already connected).
    pub async fn connect(&self) -> Result<(Arc<dyn Transport>, bool)> {
        let mut slot = self.client.write().await;
        if let Some(client) = slot.as_ref() {
            return Ok((client.clone(), false));
        }

        let open = move || async move {
            let client = self.factory.build(&self.endpoint)?;
            client.health_check().await?;
            Ok::<_, VectorStoreError>(client)
        };

        let client = match &self.pool {
            Some(pool) => {
                self.retry
                    .run(&format!("{} connect to {}", self.backend, self.key), || {
                        pool.acquire(&self.key, open)
                    })
                    .await?
            }
            None => {
                self.retry
                    .run(&format!("{} connect to {}", self.backend, self.key), open)
                    .await?
            }
        };

        tracing::debug!(
            "{} connected to {} ({})",
            self.backend,
            self.key,
            if self.is_pooled() { "pooled" } else { "private" }
        );
        *slot = Some(client.clone());
        Ok((client, true))
    }

    /// Release the client. Returns whether a connection was held.
    pub async fn disconnect(&self) -> bool {
        let Some(_client) = self.client.write().await.take() else {
            return false;
        };
        if let Some(pool) = &self.pool {
            pool.release(&self.key).await;
        }
        tracing::debug!("{} disconnected from {}", self.backend, self.key);
        true
    }

    pub async fn is_connected(&self) -> bool {
        self.client.read().await.is_some()
    }

    /// The live client, or [`VectorStoreError::NotConnected`].
    pub async fn client(&self) -> Result<Arc<dyn Transport>> {
        self.client.read().await.clone().ok_or_else(|| {
            VectorStoreError::NotConnected(format!(
                "{} store is not connected; call connect() first",
                self.backend
            ))
        })
    }

    /// Send a request, wrapping transport failures as backend errors.
    pub async fn send(&self, request: TransportRequest) -> Result<TransportResponse> {
        let client = self.client().await?;
        client
            .send(request)
            .await
            .map_err(|e| e.into_backend(self.backend))
    }

    /// Send a request and require a 2xx status, returning the response body.
    pub async fn send_ok(&self, what: &str, request: TransportRequest) -> Result<Value> {
        let response = self.send(request).await?;
        if !response.is_success() {
            return Err(VectorStoreError::backend(
                self.backend,
                format!(
                    "{what} failed with status {}: {}",
                    response.status, response.body
                ),
            ));
        }
        Ok(response.body)
    }
}
