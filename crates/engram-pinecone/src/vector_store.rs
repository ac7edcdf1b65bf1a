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

use crate::PineconeFilterTranslator;

const BACKEND: &str = "pinecone";

/// Largest `topK` Pinecone accepts.
const MAX_TOP_K: usize = 10_000;

/// Configuration for [`PineconeVectorStore`].
///
/// `collection_name` is the namespace inside the index at `host`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PineconeConfig {
    #[serde(flatten)]
    pub connection: ConnectionParams,
    #[serde(flatten)]
    pub options: ConnectionOptions,
    pub collection_name: String,
    pub dimension: usize,
    /// Metric the index was created with; used to normalize scores.
    #[serde(default)]
    pub metric: DistanceMetric,
}

impl PineconeConfig {
    pub fn new(
        api_key: impl Into<String>,
        host: impl Into<String>,
        collection_name: impl Into<String>,
        dimension: usize,
    ) -> Self {
        let mut connection = ConnectionParams::new(host, 443)
            .with_tls(true)
            .with_api_key(api_key);
        connection.port = None;
        Self {
            connection,
            options: ConnectionOptions::default(),
            collection_name: collection_name.into(),
            dimension,
            metric: DistanceMetric::default(),
        }
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

/// Pinecone-backed implementation of the [`VectorStore`] trait.
pub struct PineconeVectorStore {
    config: PineconeConfig,
    connector: Connector,
    codec: Arc<dyn PayloadCodec>,
    translator: PineconeFilterTranslator,
}

impl PineconeVectorStore {
    pub fn new(config: PineconeConfig) -> Result<Self> {
        let api_key = config.connection.resolve_api_key()?.ok_or_else(|| {
            VectorStoreError::Config("pinecone requires an api_key or api_key_env".to_string())
        })?;
        let endpoint = Endpoint::new(
            config.connection.base_url(),
            HealthProbe::get("/describe_index_stats"),
        )
        .with_header("Api-Key", api_key)
        .with_timeout(config.options.timeout());
        let connector = Connector::new(
            BACKEND,
            endpoint,
            config.connection.key()?,
            config.options.retry_policy(),
        );
        let codec: Arc<dyn PayloadCodec> =
            Arc::new(FlatPayloadCodec::default().with_native_string_lists(true));

        Ok(Self {
            config,
            connector,
            translator: PineconeFilterTranslator::new(codec.clone()),
            codec,
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
        self.translator = PineconeFilterTranslator::new(codec.clone());
        self.codec = codec;
        self
    }

    pub fn with_transport_factory(mut self, factory: Arc<dyn TransportFactory>) -> Self {
        self.connector = self.connector.with_factory(factory);
        self
    }

    pub fn config(&self) -> &PineconeConfig {
        &self.config
    }

    async fn index_stats(&self) -> Result<Value> {
        self.connector
            .send_ok(
                "describe index stats",
                TransportRequest::get("/describe_index_stats"),
            )
            .await
    }

    /// Indexes are provisioned out of band; only the dimension is checked.
    async fn verify_index(&self) -> Result<()> {
        let stats = self.index_stats().await?;
        if let Some(dimension) = stats["dimension"].as_u64() {
            if dimension as usize != self.config.dimension {
                return Err(VectorStoreError::Dimension {
                    expected: self.config.dimension,
                    actual: dimension as usize,
                });
            }
        }
        tracing::debug!(
            "attached to pinecone namespace '{}'",
            self.config.collection_name
        );
        Ok(())
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
                "pinecone has no 'contains all' operator; filter on namespace '{}' matches the first listed value only",
                self.config.collection_name
            );
        }
        Ok(Some(translated.native))
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<Value>,
        include_values: bool,
    ) -> Result<Vec<Value>> {
        let mut body = json!({
            "vector": vector,
            "topK": top_k.min(MAX_TOP_K),
            "namespace": self.config.collection_name,
            "includeMetadata": true,
            "includeValues": include_values,
        });
        if let Some(filter) = filter {
            body["filter"] = filter;
        }
        let response = self
            .connector
            .send_ok("query", TransportRequest::post("/query", body))
            .await?;
        Ok(response["matches"].as_array().cloned().unwrap_or_default())
    }

    fn decode_match(&self, record: &Value, score: f32) -> Option<VectorStoreResult> {
        let Some(id) = record["id"].as_str().map(VectorId::parse) else {
            tracing::warn!("skipping pinecone match without an id");
            return None;
        };
        let metadata = record["metadata"].as_object().cloned().unwrap_or_default();
        let payload = match self.codec.decode(&metadata) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!("skipping pinecone record {id}: {e}");
                return None;
            }
        };

        let mut result = VectorStoreResult::new(id, score, payload);
        if let Some(values) = record["values"].as_array().filter(|v| !v.is_empty()) {
            let vector: Option<Vec<f32>> =
                values.iter().map(|x| x.as_f64().map(|f| f as f32)).collect();
            if let Some(vector) = vector {
                result = result.with_vector(vector);
            }
        }
        Some(result)
    }
}

#[async_trait]
impl VectorStore for PineconeVectorStore {
    fn backend_name(&self) -> &'static str {
        BACKEND
    }

    fn collection_name(&self) -> &str {
        &self.config.collection_name
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    async fn connect(&self) -> Result<()> {
        let (_, newly) = self.connector.connect().await?;
        if newly {
            if let Err(e) = self.verify_index().await {
                self.connector.disconnect().await;
                return Err(e);
            }
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.connector.disconnect().await;
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.connector.is_connected().await
    }

    async fn insert(
        &self,
        vectors: &[Vec<f32>],
        ids: &[VectorId],
        payloads: &[Payload],
    ) -> Result<()> {
        self.connector.client().await?;
        validate_batch(vectors, ids, payloads, self.config.dimension)?;
        if ids.is_empty() {
            return Ok(());
        }

        let records = vectors
            .iter()
            .zip(ids)
            .zip(payloads)
            .map(|((vector, id), payload)| {
                let metadata = self.codec.encode(payload)?;
                let mut record = json!({ "id": id.to_string(), "values": vector });
                if !metadata.is_empty() {
                    record["metadata"] = Value::Object(metadata);
                }
                Ok(record)
            })
            .collect::<Result<Vec<_>>>()?;

        self.connector
            .send_ok(
                "upsert",
                TransportRequest::post(
                    "/vectors/upsert",
                    json!({ "vectors": records, "namespace": self.config.collection_name }),
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
        self.connector.client().await?;
        validate_dimension(query, self.config.dimension)?;
        let filter = self.translate(filters)?;
        if limit == 0 {
            return Ok(Vec::new());
        }

        let matches = self.query(query, limit, filter, false).await?;
        let mut results: Vec<VectorStoreResult> = matches
            .iter()
            .filter_map(|m| {
                let raw = m["score"].as_f64().unwrap_or(0.0) as f32;
                self.decode_match(m, self.config.metric.score_from_similarity(raw))
            })
            .collect();
        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(limit);
        Ok(results)
    }

    async fn get(&self, id: &VectorId) -> Result<Option<VectorStoreResult>> {
        self.connector.client().await?;
        let id = id.to_string();
        let path = format!(
            "/vectors/fetch?ids={}&namespace={}",
            urlencoding::encode(&id),
            urlencoding::encode(&self.config.collection_name)
        );
        let response = self
            .connector
            .send_ok("fetch", TransportRequest::get(path))
            .await?;
        Ok(response["vectors"]
            .get(&id)
            .and_then(|record| self.decode_match(record, 1.0)))
    }

    async fn update(&self, id: &VectorId, vector: &[f32], payload: &Payload) -> Result<()> {
        let vectors = [vector.to_vec()];
        self.insert(&vectors, std::slice::from_ref(id), std::slice::from_ref(payload))
            .await
    }

    async fn delete(&self, id: &VectorId) -> Result<()> {
        self.connector.client().await?;
        self.connector
            .send_ok(
                "delete",
                TransportRequest::post(
                    "/vectors/delete",
                    json!({ "ids": [id.to_string()], "namespace": self.config.collection_name }),
                ),
            )
            .await?;
        Ok(())
    }

    async fn delete_collection(&self) -> Result<()> {
        self.connector.client().await?;
        let response = self
            .connector
            .send(TransportRequest::post(
                "/vectors/delete",
                json!({ "deleteAll": true, "namespace": self.config.collection_name }),
            ))
            .await?;
        if !response.is_success() && !response.is_not_found() {
            return Err(VectorStoreError::backend(
                BACKEND,
                format!(
                    "delete namespace failed with status {}: {}",
                    response.status, response.body
                ),
            ));
        }
        tracing::info!("cleared pinecone namespace '{}'", self.config.collection_name);
        Ok(())
    }

    /// Pinecone has no scan API; records are listed through a query with a
    /// constant vector, so at most 10,000 are reachable.
    async fn list(
        &self,
        filters: Option<&SearchFilters>,
        limit: Option<usize>,
    ) -> Result<(Vec<VectorStoreResult>, usize)> {
        self.connector.client().await?;
        let filter = self.translate(filters)?;
        let constant = vec![1.0f32; self.config.dimension];

        match filter {
            Some(filter) => {
                let matches = self.query(&constant, MAX_TOP_K, Some(filter), true).await?;
                let total = matches.len();
                let mut results: Vec<VectorStoreResult> = matches
                    .iter()
                    .filter_map(|m| self.decode_match(m, 1.0))
                    .collect();
                if let Some(limit) = limit {
                    results.truncate(limit);
                }
                Ok((results, total))
            }
            None => {
                let stats = self.index_stats().await?;
                let total = stats["namespaces"][&self.config.collection_name]["vectorCount"]
                    .as_u64()
                    .unwrap_or(0) as usize;
                let top_k = limit.unwrap_or(total);
                if top_k == 0 {
                    return Ok((Vec::new(), total));
                }
                let matches = self.query(&constant, top_k, None, true).await?;
                let results = matches
                    .iter()
                    .filter_map(|m| self.decode_match(m, 1.0))
                    .collect();
                Ok((results, total))
            }
        }
    }
}
