use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use engram_core::{
    validate_batch, validate_dimension, DistanceMetric, FilterTranslator, IdentityCodec, Payload,
    PayloadCodec, Result, SearchFilters, VectorId, VectorStore, VectorStoreError,
    VectorStoreResult,
};
use engram_pool::{
    ConnectionOptions, ConnectionParams, ConnectionPool, Connector, Endpoint, HealthProbe,
    TransportFactory, TransportRequest,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::QdrantFilterTranslator;

const BACKEND: &str = "qdrant";

/// Payload key holding the caller's id when it is not an integer.
pub const ORIGINAL_ID_KEY: &str = "_engram_id";

const SCROLL_PAGE: usize = 256;

/// Configuration for [`QdrantVectorStore`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct QdrantConfig {
    #[serde(flatten)]
    pub connection: ConnectionParams,
    #[serde(flatten)]
    pub options: ConnectionOptions,
    pub collection_name: String,
    pub dimension: usize,
    #[serde(default)]
    pub metric: DistanceMetric,
}

impl QdrantConfig {
    /// Target `collection_name` on a local Qdrant (`localhost:6333`).
    pub fn new(collection_name: impl Into<String>, dimension: usize) -> Self {
        Self {
            connection: ConnectionParams::new("localhost", 6333),
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

fn metric_name(metric: DistanceMetric) -> &'static str {
    match metric {
        DistanceMetric::Cosine => "Cosine",
        DistanceMetric::Euclidean => "Euclid",
        DistanceMetric::Dot => "Dot",
    }
}

/// Qdrant-backed implementation of the [`VectorStore`] trait.
pub struct QdrantVectorStore {
    config: QdrantConfig,
    connector: Connector,
    codec: Arc<dyn PayloadCodec>,
    translator: QdrantFilterTranslator,
    /// Set once the collection is known to exist; cleared when it is dropped.
    collection_ready: AtomicBool,
}

impl QdrantVectorStore {
    /// Create a store for `config`. Nothing is contacted until [`connect`](VectorStore::connect).
    pub fn new(config: QdrantConfig) -> Result<Self> {
        let mut endpoint = Endpoint::new(config.connection.base_url(), HealthProbe::get("/healthz"))
            .with_timeout(config.options.timeout());
        if let Some(api_key) = config.connection.resolve_api_key()? {
            endpoint = endpoint.with_header("api-key", api_key);
        }
        let connector = Connector::new(
            BACKEND,
            endpoint,
            config.connection.key()?,
            config.options.retry_policy(),
        );

        Ok(Self {
            config,
            connector,
            codec: Arc::new(IdentityCodec),
            translator: QdrantFilterTranslator,
            collection_ready: AtomicBool::new(false),
        })
    }

    /// Share connections through `pool` unless `use_pool` is disabled.
    pub fn with_pool(mut self, pool: Arc<ConnectionPool>) -> Self {
        if self.config.options.use_pool {
            self.connector = self.connector.with_pool(pool);
        }
        self
    }

    pub fn with_codec(mut self, codec: Arc<dyn PayloadCodec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_transport_factory(mut self, factory: Arc<dyn TransportFactory>) -> Self {
        self.connector = self.connector.with_factory(factory);
        self
    }

    pub fn config(&self) -> &QdrantConfig {
        &self.config
    }

    fn collection_path(&self) -> String {
        format!("/collections/{}", self.config.collection_name)
    }

    async fn ready(&self) -> Result<()> {
        self.connector.client().await?;
        if !self.collection_ready.load(Ordering::Acquire) {
            return Err(VectorStoreError::NotConnected(format!(
                "qdrant collection '{}' was dropped; call connect() to recreate it",
                self.config.collection_name
            )));
        }
        Ok(())
    }

    /// Create the collection, or check the dimension of an existing one.
    async fn ensure_collection(&self) -> Result<()> {
        let path = self.collection_path();
        let response = self.connector.send(TransportRequest::get(&path)).await?;

        if response.is_not_found() {
            let body = json!({
                "vectors": {
                    "size": self.config.dimension,
                    "distance": metric_name(self.config.metric),
                }
            });
            self.connector
                .send_ok("create collection", TransportRequest::put(&path, body))
                .await?;
            tracing::info!(
                "created qdrant collection '{}' (dimension={})",
                self.config.collection_name,
                self.config.dimension
            );
            return Ok(());
        }
        if !response.is_success() {
            return Err(VectorStoreError::backend(
                BACKEND,
                format!(
                    "describe collection failed with status {}: {}",
                    response.status, response.body
                ),
            ));
        }

        let size = response.body["result"]["config"]["params"]["vectors"]["size"].as_u64();
        match size {
            Some(size) if size as usize != self.config.dimension => {
                Err(VectorStoreError::Dimension {
                    expected: self.config.dimension,
                    actual: size as usize,
                })
            }
            Some(_) => Ok(()),
            None => {
                tracing::warn!(
                    "qdrant collection '{}' does not report a single vector size; skipping dimension check",
                    self.config.collection_name
                );
                Ok(())
            }
        }
    }

    fn translate(&self, filters: Option<&SearchFilters>) -> Result<Option<Value>> {
        match filters {
            Some(filters) if !filters.is_empty() => {
                Ok(Some(self.translator.translate(filters)?.native))
            }
            Some(filters) => {
                filters.validate()?;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    /// Build the point body for one record.
    fn point(&self, id: &VectorId, vector: &[f32], payload: &Payload) -> Result<Value> {
        if payload.contains_key(ORIGINAL_ID_KEY) {
            return Err(VectorStoreError::Codec(format!(
                "payload key '{ORIGINAL_ID_KEY}' is reserved"
            )));
        }
        let mut stored = self.codec.encode(payload)?;
        if let VectorId::Text(text) = id {
            stored.insert(ORIGINAL_ID_KEY.to_string(), json!(text));
        }
        Ok(json!({
            "id": point_id(id),
            "vector": vector,
            "payload": stored,
        }))
    }

    /// Convert a returned point, skipping it with a warning if it cannot be decoded.
    fn parse_point(&self, point: &Value, score: f32) -> Option<VectorStoreResult> {
        let mut payload = point["payload"].as_object().cloned().unwrap_or_default();
        let id = match payload.remove(ORIGINAL_ID_KEY) {
            Some(Value::String(original)) => VectorId::Text(original),
            _ => match VectorId::from_json(&point["id"]) {
                Some(id) => id,
                None => {
                    tracing::warn!("skipping qdrant point with unusable id: {}", point["id"]);
                    return None;
                }
            },
        };

        let payload = match self.codec.decode(&payload) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!("skipping qdrant point {id}: {e}");
                return None;
            }
        };

        let mut result = VectorStoreResult::new(id, score, payload);
        if let Some(vector) = parse_vector(&point["vector"]) {
            result = result.with_vector(vector);
        }
        Some(result)
    }
}

/// Qdrant accepts unsigned integers and UUIDs as point ids.
fn point_id(id: &VectorId) -> Value {
    match id {
        VectorId::Int(n) => json!(n),
        VectorId::Text(text) => {
            json!(Uuid::new_v5(&Uuid::NAMESPACE_OID, text.as_bytes()).to_string())
        }
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
impl VectorStore for QdrantVectorStore {
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
        if newly || !self.collection_ready.load(Ordering::Acquire) {
            if let Err(e) = self.ensure_collection().await {
                self.connector.disconnect().await;
                return Err(e);
            }
            self.collection_ready.store(true, Ordering::Release);
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        if self.connector.disconnect().await {
            self.collection_ready.store(false, Ordering::Release);
        }
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.connector.is_connected().await && self.collection_ready.load(Ordering::Acquire)
    }

    async fn insert(
        &self,
        vectors: &[Vec<f32>],
        ids: &[VectorId],
        payloads: &[Payload],
    ) -> Result<()> {
        self.ready().await?;
        validate_batch(vectors, ids, payloads, self.config.dimension)?;
        if ids.is_empty() {
            return Ok(());
        }

        let points = vectors
            .iter()
            .zip(ids)
            .zip(payloads)
            .map(|((vector, id), payload)| self.point(id, vector, payload))
            .collect::<Result<Vec<_>>>()?;

        self.connector
            .send_ok(
                "upsert",
                TransportRequest::put(
                    format!("{}/points?wait=true", self.collection_path()),
                    json!({ "points": points }),
                ),
            )
            .await?;
        Ok(())
    }

    async fn search(
        &self,
        query: &[f32],
        limit: usize,
        filters: Option<&SearchFilters>,
    ) -> Result<Vec<VectorStoreResult>> {
        self.ready().await?;
        validate_dimension(query, self.config.dimension)?;
        let filter = self.translate(filters)?;
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut body = json!({
            "vector": query,
            "limit": limit,
            "with_payload": true,
        });
        if let Some(filter) = filter {
            body["filter"] = filter;
        }

        let response = self
            .connector
            .send_ok(
                "search",
                TransportRequest::post(format!("{}/points/search", self.collection_path()), body),
            )
            .await?;

        let mut results: Vec<VectorStoreResult> = response["result"]
            .as_array()
            .map(|points| {
                points
                    .iter()
                    .filter_map(|p| {
                        let raw = p["score"].as_f64().unwrap_or(0.0) as f32;
                        self.parse_point(p, self.config.metric.score_from_similarity(raw))
                    })
                    .collect()
            })
            .unwrap_or_default();
        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(limit);
        Ok(results)
    }

    async fn get(&self, id: &VectorId) -> Result<Option<VectorStoreResult>> {
        self.ready().await?;
        let body = json!({
            "ids": [point_id(id)],
            "with_payload": true,
            "with_vector": true,
        });
        let response = self
            .connector
            .send_ok(
                "get",
                TransportRequest::post(format!("{}/points", self.collection_path()), body),
            )
            .await?;

        Ok(response["result"]
            .as_array()
            .and_then(|points| points.first())
            .and_then(|p| self.parse_point(p, 1.0)))
    }

    async fn update(&self, id: &VectorId, vector: &[f32], payload: &Payload) -> Result<()> {
        let vectors = [vector.to_vec()];
        self.insert(&vectors, std::slice::from_ref(id), std::slice::from_ref(payload))
            .await
    }

    async fn delete(&self, id: &VectorId) -> Result<()> {
        self.ready().await?;
        self.connector
            .send_ok(
                "delete",
                TransportRequest::post(
                    format!("{}/points/delete?wait=true", self.collection_path()),
                    json!({ "points": [point_id(id)] }),
                ),
            )
            .await?;
        Ok(())
    }

    async fn delete_collection(&self) -> Result<()> {
        self.connector.client().await?;
        let response = self
            .connector
            .send(TransportRequest::delete(self.collection_path()))
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
        self.collection_ready.store(false, Ordering::Release);
        tracing::info!("dropped qdrant collection '{}'", self.config.collection_name);
        Ok(())
    }

    async fn list(
        &self,
        filters: Option<&SearchFilters>,
        limit: Option<usize>,
    ) -> Result<(Vec<VectorStoreResult>, usize)> {
        self.ready().await?;
        let filter = self.translate(filters)?;

        let mut count_body = json!({ "exact": true });
        if let Some(filter) = &filter {
            count_body["filter"] = filter.clone();
        }
        let count = self
            .connector
            .send_ok(
                "count",
                TransportRequest::post(format!("{}/points/count", self.collection_path()), count_body),
            )
            .await?;
        let total = count["result"]["count"].as_u64().unwrap_or(0) as usize;

        let wanted = limit.unwrap_or(total);
        let mut results = Vec::new();
        let mut offset = Value::Null;
        while results.len() < wanted {
            let mut body = json!({
                "limit": SCROLL_PAGE.min(wanted - results.len()),
                "with_payload": true,
                "with_vector": true,
            });
            if let Some(filter) = &filter {
                body["filter"] = filter.clone();
            }
            if !offset.is_null() {
                body["offset"] = offset.clone();
            }

            let page = self
                .connector
                .send_ok(
                    "scroll",
                    TransportRequest::post(format!("{}/points/scroll", self.collection_path()), body),
                )
                .await?;
            let points = page["result"]["points"].as_array().cloned().unwrap_or_default();
            if points.is_empty() {
                break;
            }
            results.extend(points.iter().filter_map(|p| self.parse_point(p, 1.0)));

            offset = page["result"]["next_page_offset"].clone();
            if offset.is_null() {
                break;
            }
        }
        results.truncate(wanted);
        Ok((results, total))
    }
}
