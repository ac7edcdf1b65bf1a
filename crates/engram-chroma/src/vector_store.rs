use std::sync::Arc;

use async_trait::async_trait;
use engram_core::{
    validate_batch, validate_dimension, DistanceMetric, FilterTranslator, FlatPayloadCodec,
    Payload, PayloadCodec, Result, SearchFilters, VectorId, VectorStore, VectorStoreError,
    VectorStoreResult,
};
use engram_pool::{
    ConnectionOptions, ConnectionParams, ConnectionPool, Connector, Endpoint, HealthProbe,
    TransportFactory, TransportRequest,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::RwLock;

use crate::ChromaFilterTranslator;

const BACKEND: &str = "chroma";

/// Configuration for [`ChromaVectorStore`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChromaConfig {
    #[serde(flatten)]
    pub connection: ConnectionParams,
    #[serde(flatten)]
    pub options: ConnectionOptions,
    pub collection_name: String,
    pub dimension: usize,
    #[serde(default)]
    pub metric: DistanceMetric,
}

impl ChromaConfig {
    /// Target `collection_name` on a local Chroma server (`localhost:8000`).
    pub fn new(collection_name: impl Into<String>, dimension: usize) -> Self {
        Self {
            connection: ConnectionParams::new("localhost", 8000),
            options: ConnectionOptions::default(),
            collection_name: collection_name.into(),
            dimension,
            metric: DistanceMetric::default(),
        }
    }

    pub fn with_connection(mut self, connection: ConnectionParams) -> Self {
        self.connection = connection;
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.connection = self.connection.with_api_key(api_key);
        self
    }

    pub fn with_options(mut self, options: ConnectionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_metric(mut self, metric: DistanceMetric) -> Self {
        self.metric = metric;
        self
    }
}

fn space_name(metric: DistanceMetric) -> &'static str {
    match metric {
        DistanceMetric::Cosine => "cosine",
        DistanceMetric::Euclidean => "l2",
        DistanceMetric::Dot => "ip",
    }
}

/// ChromaDB-backed implementation of the [`VectorStore`] trait.
pub struct ChromaVectorStore {
    config: ChromaConfig,
    connector: Connector,
    codec: Arc<dyn PayloadCodec>,
    translator: ChromaFilterTranslator,
    /// Server-assigned collection id, known after connect.
    collection_id: RwLock<Option<String>>,
}

impl ChromaVectorStore {
    pub fn new(config: ChromaConfig) -> Result<Self> {
        let mut endpoint =
            Endpoint::new(config.connection.base_url(), HealthProbe::get("/api/v1/heartbeat"))
                .with_timeout(config.options.timeout());
        if let Some(token) = config.connection.resolve_api_key()? {
            endpoint = endpoint.with_header("Authorization", format!("Bearer {token}"));
        }
        let connector = Connector::new(
            BACKEND,
            endpoint,
            config.connection.key()?,
            config.options.retry_policy(),
        );
        let codec: Arc<dyn PayloadCodec> =
            Arc::new(FlatPayloadCodec::default().with_membership_markers(true));

        Ok(Self {
            config,
            connector,
            translator: ChromaFilterTranslator::new(codec.clone()),
            codec,
            collection_id: RwLock::new(None),
        })
    }

    /// Share connections through `pool` unless `use_pool` is disabled.
    pub fn with_pool(mut self, pool: Arc<ConnectionPool>) -> Self {
        if self.config.options.use_pool {
            self.connector = self.connector.with_pool(pool);
        }
        self
    }

    /// Replace the payload codec. Filters are translated with the same codec.
    pub fn with_codec(mut self, codec: Arc<dyn PayloadCodec>) -> Self {
        self.translator = ChromaFilterTranslator::new(codec.clone());
        self.codec = codec;
        self
    }

    pub fn with_transport_factory(mut self, factory: Arc<dyn TransportFactory>) -> Self {
        self.connector = self.connector.with_factory(factory);
        self
    }

    pub fn config(&self) -> &ChromaConfig {
        &self.config
    }

    /// Get or create the collection and remember its id.
    async fn ensure_collection(&self) -> Result<()> {
        let body = json!({
            "name": self.config.collection_name,
            "metadata": {
                "hnsw:space": space_name(self.config.metric),
                "dimension": self.config.dimension,
            },
            "get_or_create": true,
        });
        let response = self
            .connector
            .send_ok(
                "get or create collection",
                TransportRequest::post("/api/v1/collections", body),
            )
            .await?;

        let id = response["id"].as_str().ok_or_else(|| {
            VectorStoreError::backend(BACKEND, format!("collection response has no id: {response}"))
        })?;
        if let Some(existing) = response["metadata"]["dimension"].as_u64() {
            if existing as usize != self.config.dimension {
                return Err(VectorStoreError::Dimension {
                    expected: self.config.dimension,
                    actual: existing as usize,
                });
            }
        }

        tracing::debug!(
            "using chroma collection '{}' (id={id})",
            self.config.collection_name
        );
        *self.collection_id.write().await = Some(id.to_string());
        Ok(())
    }

    async fn collection_path(&self) -> Result<String> {
        self.connector.client().await?;
        self.collection_id
            .read()
            .await
            .as_ref()
            .map(|id| format!("/api/v1/collections/{id}"))
            .ok_or_else(|| {
                VectorStoreError::NotConnected(
                    "chroma store is not connected; call connect() first".to_string(),
                )
            })
    }

    fn translate(&self, filters: Option<&SearchFilters>) -> Result<Option<Value>> {
        let Some(filters) = filters else {
            return Ok(None);
        };
        if filters.is_empty() {
            filters.validate()?;
            return Ok(None);
        }
        let translated = self.translator.translate(filters)?;
        if translated.used_fallback {
            tracing::warn!(
                "codec writes no membership markers; 'all' filter on collection '{}' matches the first listed value only",
                self.config.collection_name
            );
        }
        Ok(Some(translated.native))
    }

    /// Chroma rejects empty metadata objects.
    fn encode_metadata(&self, payload: &Payload) -> Result<Value> {
        let metadata = self.codec.encode(payload)?;
        Ok(if metadata.is_empty() {
            Value::Null
        } else {
            Value::Object(metadata)
        })
    }

    fn decode_record(
        &self,
        id: &Value,
        metadata: &Value,
        score: f32,
        embedding: Option<&Value>,
    ) -> Option<VectorStoreResult> {
        let Some(id) = id.as_str().map(VectorId::parse) else {
            tracing::warn!("skipping chroma record with non-string id: {id}");
            return None;
        };
        let metadata = metadata.as_object().cloned().unwrap_or_default();
        let payload = match self.codec.decode(&metadata) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!("skipping chroma record {id}: {e}");
                return None;
            }
        };

        let mut result = VectorStoreResult::new(id, score, payload);
        if let Some(vector) = embedding.and_then(parse_vector) {
            result = result.with_vector(vector);
        }
        Some(result)
    }

    /// Decode the column-oriented body returned by `/get`.
    fn decode_get(&self, body: &Value) -> Vec<VectorStoreResult> {
        let ids = body["ids"].as_array().cloned().unwrap_or_default();
        ids.iter()
            .enumerate()
            .filter_map(|(i, id)| {
                self.decode_record(
                    id,
                    &body["metadatas"][i],
                    1.0,
                    body["embeddings"].get(i),
                )
            })
            .collect()
    }
}

fn parse_vector(value: &Value) -> Option<Vec<f32>> {
    value
        .as_array()?
        .iter()
        .map(|x| x.as_f64().map(|f| f as f32))
        .collect()
}

#[async_trait]
impl VectorStore for ChromaVectorStore {
    fn backend_name(&self) -> &'static str {
        BACKEND
    }

    fn collection_name(&self) -> &str {
        &self.config.collection_name
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    /// Also recreates the collection after [`delete_collection`](VectorStore::delete_collection).
    async fn connect(&self) -> Result<()> {
        let (_, newly) = self.connector.connect().await?;
        if newly || self.collection_id.read().await.is_none() {
            if let Err(e) = self.ensure_collection().await {
                self.connector.disconnect().await;
                return Err(e);
            }
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        if self.connector.disconnect().await {
            *self.collection_id.write().await = None;
        }
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.connector.is_connected().await && self.collection_id.read().await.is_some()
    }

    async fn insert(
        &self,
        vectors: &[Vec<f32>],
        ids: &[VectorId],
        payloads: &[Payload],
    ) -> Result<()> {
        let path = self.collection_path().await?;
        validate_batch(vectors, ids, payloads, self.config.dimension)?;
        if ids.is_empty() {
            return Ok(());
        }

        let metadatas = payloads
            .iter()
            .map(|p| self.encode_metadata(p))
            .collect::<Result<Vec<_>>>()?;
        let ids: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
        let body = json!({
            "ids": ids,
            "embeddings": vectors,
            "metadatas": metadatas,
        });

        self.connector
            .send_ok("upsert", TransportRequest::post(format!("{path}/upsert"), body))
            .await?;
        Ok(())
    }

    async fn search(
        &self,
        query: &[f32],
        limit: usize,
        filters: Option<&SearchFilters>,
    ) -> Result<Vec<VectorStoreResult>> {
        let path = self.collection_path().await?;
        validate_dimension(query, self.config.dimension)?;
        let filter = self.translate(filters)?;
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut body = json!({
            "query_embeddings": [query],
            "n_results": limit,
            "include": ["metadatas", "distances"],
        });
        if let Some(filter) = filter {
            body["where"] = filter;
        }

        let response = self
            .connector
            .send_ok("query", TransportRequest::post(format!("{path}/query"), body))
            .await?;

        // Query results are nested one level per query embedding.
        let ids = response["ids"][0].as_array().cloned().unwrap_or_default();
        let mut results: Vec<VectorStoreResult> = ids
            .iter()
            .enumerate()
            .filter_map(|(i, id)| {
                let distance = response["distances"][0][i].as_f64().unwrap_or(1.0) as f32;
                self.decode_record(
                    id,
                    &response["metadatas"][0][i],
                    self.config.metric.score_from_distance(distance),
                    None,
                )
            })
            .collect();
        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(limit);
        Ok(results)
    }

    async fn get(&self, id: &VectorId) -> Result<Option<VectorStoreResult>> {
        let path = self.collection_path().await?;
        let body = json!({
            "ids": [id.to_string()],
            "include": ["metadatas", "embeddings"],
        });
        let response = self
            .connector
            .send_ok("get", TransportRequest::post(format!("{path}/get"), body))
            .await?;
        Ok(self.decode_get(&response).into_iter().next())
    }

    async fn update(&self, id: &VectorId, vector: &[f32], payload: &Payload) -> Result<()> {
        let vectors = [vector.to_vec()];
        self.insert(&vectors, std::slice::from_ref(id), std::slice::from_ref(payload))
            .await
    }

    async fn delete(&self, id: &VectorId) -> Result<()> {
        let path = self.collection_path().await?;
        self.connector
            .send_ok(
                "delete",
                TransportRequest::post(format!("{path}/delete"), json!({ "ids": [id.to_string()] })),
            )
            .await?;
        Ok(())
    }

    async fn delete_collection(&self) -> Result<()> {
        self.connector.client().await?;
        let response = self
            .connector
            .send(TransportRequest::delete(format!(
                "/api/v1/collections/{}",
                self.config.collection_name
            )))
            .await?;
        if !response.is_success() && !response.is_not_found() {
            return Err(VectorStoreError::backend(
                BACKEND,
                format!(
                    "delete collection failed with status {}: {}",
                    response.status, response.body
                ),
            ));
        }
        *self.collection_id.write().await = None;
        tracing::info!("dropped chroma collection '{}'", self.config.collection_name);
        Ok(())
    }

    async fn list(
        &self,
        filters: Option<&SearchFilters>,
        limit: Option<usize>,
    ) -> Result<(Vec<VectorStoreResult>, usize)> {
        let path = self.collection_path().await?;
        let filter = self.translate(filters)?;

        let mut body = json!({ "include": ["metadatas", "embeddings"] });
        match filter {
            // No filtered count endpoint: fetch every match and count locally.
            Some(filter) => {
                body["where"] = filter;
                let response = self
                    .connector
                    .send_ok("get", TransportRequest::post(format!("{path}/get"), body))
                    .await?;
                let total = response["ids"].as_array().map_or(0, Vec::len);
                let mut results = self.decode_get(&response);
                if let Some(limit) = limit {
                    results.truncate(limit);
                }
                Ok((results, total))
            }
            None => {
                let count = self
                    .connector
                    .send_ok("count", TransportRequest::get(format!("{path}/count")))
                    .await?;
                let total = count.as_u64().unwrap_or(0) as usize;
                if let Some(limit) = limit {
                    body["limit"] = json!(limit);
                }
                let response = self
                    .connector
                    .send_ok("get", TransportRequest::post(format!("{path}/get"), body))
                    .await?;
                Ok((self.decode_get(&response), total))
            }
        }
    }
}
