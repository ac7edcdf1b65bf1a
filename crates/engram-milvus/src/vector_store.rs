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

use crate::filter::PAYLOAD_FIELD;
use crate::MilvusFilterTranslator;

const BACKEND: &str = "milvus";

/// Largest result window a Milvus query returns.
const MAX_QUERY_WINDOW: usize = 16_384;

/// Configuration for [`MilvusVectorStore`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MilvusConfig {
    #[serde(flatten)]
    pub connection: ConnectionParams,
    #[serde(flatten)]
    pub options: ConnectionOptions,
    pub collection_name: String,
    pub dimension: usize,
    #[serde(default)]
    pub metric: DistanceMetric,
    /// Milvus database; the server default when unset.
    #[serde(default)]
    pub database: Option<String>,
}

impl MilvusConfig {
    /// Target `collection_name` on a local Milvus (`localhost:19530`).
    pub fn new(collection_name: impl Into<String>, dimension: usize) -> Self {
        Self {
            connection: ConnectionParams::new("localhost", 19530),
            options: ConnectionOptions::default(),
            collection_name: collection_name.into(),
            dimension,
            metric: DistanceMetric::default(),
            database: None,
        }
    }

    pub fn with_connection(mut self, connection: ConnectionParams) -> Self {
        self.connection = connection;
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

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }
}

fn metric_type(metric: DistanceMetric) -> &'static str {
    match metric {
        DistanceMetric::Cosine => "COSINE",
        DistanceMetric::Euclidean => "L2",
        DistanceMetric::Dot => "IP",
    }
}

/// Check a Milvus response envelope. A non-zero `code` is an error even on HTTP 200.
fn check(body: Value, what: &str) -> Result<Value> {
    let code = body["code"].as_i64().unwrap_or(-1);
    if code != 0 {
        return Err(VectorStoreError::backend(
            BACKEND,
            format!(
                "{what} failed (code={code}): {}",
                body["message"].as_str().unwrap_or("unknown")
            ),
        ));
    }
    Ok(body)
}

/// Milvus-backed implementation of the [`VectorStore`] trait.
pub struct MilvusVectorStore {
    config: MilvusConfig,
    connector: Connector,
    codec: Arc<dyn PayloadCodec>,
    translator: MilvusFilterTranslator,
    collection_ready: AtomicBool,
}

impl MilvusVectorStore {
    pub fn new(config: MilvusConfig) -> Result<Self> {
        let mut endpoint = Endpoint::new(
            config.connection.base_url(),
            HealthProbe::post("/v2/vectordb/collections/list", json!({})),
        )
        .with_timeout(config.options.timeout());

        let token = match (
            config.connection.resolve_api_key()?,
            &config.connection.username,
            &config.connection.password,
        ) {
            (Some(key), _, _) => Some(key),
            (None, Some(user), Some(pass)) => Some(format!("{user}:{pass}")),
            _ => None,
        };
        if let Some(token) = token {
            endpoint = endpoint.with_header("Authorization", format!("Bearer {token}"));
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
            translator: MilvusFilterTranslator,
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

    pub fn config(&self) -> &MilvusConfig {
        &self.config
    }

    /// POST `body` (plus collection and database names) and return the checked envelope.
    async fn call(&self, what: &str, path: &str, mut body: Value) -> Result<Value> {
        body["collectionName"] = json!(self.config.collection_name);
        if let Some(db) = &self.config.database {
            body["dbName"] = json!(db);
        }
        let response = self
            .connector
            .send_ok(what, TransportRequest::post(path, body))
            .await?;
        check(response, what)
    }

    async fn ready(&self) -> Result<()> {
        self.connector.client().await?;
        if !self.collection_ready.load(Ordering::Acquire) {
            return Err(VectorStoreError::NotConnected(format!(
                "milvus collection '{}' was dropped; call connect() to recreate it",
                self.config.collection_name
            )));
        }
        Ok(())
    }

    async fn ensure_collection(&self) -> Result<()> {
        let has = self
            .call("has collection", "/v2/vectordb/collections/has", json!({}))
            .await?;

        if has["data"]["has"].as_bool().unwrap_or(false) {
            let described = self
                .call("describe collection", "/v2/vectordb/collections/describe", json!({}))
                .await?;
            return self.verify_dimension(&described["data"]);
        }

        let body = json!({
            "schema": {
                "autoId": false,
                "enableDynamicField": false,
                "fields": [
                    {
                        "fieldName": "id",
                        "dataType": "VarChar",
                        "isPrimary": true,
                        "elementTypeParams": {"max_length": 512}
                    },
                    {
                        "fieldName": "vector",
                        "dataType": "FloatVector",
                        "elementTypeParams": {"dim": self.config.dimension}
                    },
                    {"fieldName": PAYLOAD_FIELD, "dataType": "JSON"}
                ]
            },
            "indexParams": [{
                "fieldName": "vector",
                "indexName": "vector",
                "indexType": "AUTOINDEX",
                "metricType": metric_type(self.config.metric)
            }]
        });
        self.call("create collection", "/v2/vectordb/collections/create", body)
            .await?;
        tracing::info!(
            "created milvus collection '{}' (dimension={})",
            self.config.collection_name,
            self.config.dimension
        );
        Ok(())
    }

    fn verify_dimension(&self, description: &Value) -> Result<()> {
        let dim = description["fields"]
            .as_array()
            .into_iter()
            .flatten()
            .find(|f| f["name"] == "vector")
            .and_then(|f| f["params"].as_array())
            .into_iter()
            .flatten()
            .find(|p| p["key"] == "dim")
            .and_then(|p| match &p["value"] {
                Value::String(s) => s.parse::<usize>().ok(),
                other => other.as_u64().map(|n| n as usize),
            });

        match dim {
            Some(dim) if dim != self.config.dimension => Err(VectorStoreError::Dimension {
                expected: self.config.dimension,
                actual: dim,
            }),
            Some(_) => Ok(()),
            None => {
                tracing::warn!(
                    "milvus collection '{}' has no 'vector' field dimension; skipping check",
                    self.config.collection_name
                );
                Ok(())
            }
        }
    }

    fn translate(&self, filters: Option<&SearchFilters>) -> Result<Option<String>> {
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

    fn decode_entity(&self, entity: &Value, score: f32) -> Option<VectorStoreResult> {
        let id = match &entity["id"] {
            Value::String(s) => VectorId::parse(s),
            other => match VectorId::from_json(other) {
                Some(id) => id,
                None => {
                    tracing::warn!("skipping milvus entity with unusable id: {other}");
                    return None;
                }
            },
        };

        let stored = match &entity[PAYLOAD_FIELD] {
            Value::Object(map) => map.clone(),
            // Some deployments return JSON fields as strings.
            Value::String(raw) => match serde_json::from_str::<Payload>(raw) {
                Ok(map) => map,
                Err(e) => {
                    tracing::warn!("skipping milvus entity {id}: malformed payload JSON: {e}");
                    return None;
                }
            },
            _ => Payload::new(),
        };
        let payload = match self.codec.decode(&stored) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!("skipping milvus entity {id}: {e}");
                return None;
            }
        };

        let mut result = VectorStoreResult::new(id, score, payload);
        let vector: Option<Vec<f32>> = entity["vector"]
            .as_array()
            .and_then(|v| v.iter().map(|x| x.as_f64().map(|f| f as f32)).collect());
        if let Some(vector) = vector {
            result = result.with_vector(vector);
        }
        Some(result)
    }

    fn decode_entities(&self, body: &Value) -> Vec<VectorStoreResult> {
        body["data"]
            .as_array()
            .map(|entities| {
                entities
                    .iter()
                    .filter_map(|e| self.decode_entity(e, 1.0))
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn id_list(ids: &[&VectorId]) -> String {
    let items: Vec<String> = ids
        .iter()
        .map(|id| Value::String(id.to_string()).to_string())
        .collect();
    format!("[{}]", items.join(", "))
}

#[async_trait]
impl VectorStore for MilvusVectorStore {
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

        let data = vectors
            .iter()
            .zip(ids)
            .zip(payloads)
            .map(|((vector, id), payload)| {
                let stored = self.codec.encode(payload)?;
                Ok(json!({
                    "id": id.to_string(),
                    "vector": vector,
                    PAYLOAD_FIELD: stored,
                }))
            })
            .collect::<Result<Vec<_>>>()?;

        self.call("upsert", "/v2/vectordb/entities/upsert", json!({ "data": data }))
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
            "data": [query],
            "annsField": "vector",
            "limit": limit,
            "outputFields": ["id", PAYLOAD_FIELD],
        });
        if let Some(filter) = filter {
            body["filter"] = json!(filter);
        }

        let response = self
            .call("search", "/v2/vectordb/entities/search", body)
            .await?;
        let mut results: Vec<VectorStoreResult> = response["data"]
            .as_array()
            .map(|hits| {
                hits.iter()
                    .filter_map(|hit| {
                        let raw = hit["distance"].as_f64().unwrap_or(0.0) as f32;
                        self.decode_entity(hit, self.config.metric.score_from_similarity(raw))
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
            "id": [id.to_string()],
            "outputFields": ["id", "vector", PAYLOAD_FIELD],
        });
        let response = self.call("get", "/v2/vectordb/entities/get", body).await?;
        Ok(self.decode_entities(&response).into_iter().next())
    }

    async fn update(&self, id: &VectorId, vector: &[f32], payload: &Payload) -> Result<()> {
        let vectors = [vector.to_vec()];
        self.insert(&vectors, std::slice::from_ref(id), std::slice::from_ref(payload))
            .await
    }

    async fn delete(&self, id: &VectorId) -> Result<()> {
        self.ready().await?;
        let body = json!({ "filter": format!("id in {}", id_list(&[id])) });
        self.call("delete", "/v2/vectordb/entities/delete", body)
            .await?;
        Ok(())
    }

    async fn delete_collection(&self) -> Result<()> {
        self.connector.client().await?;
        self.call("drop collection", "/v2/vectordb/collections/drop", json!({}))
            .await?;
        self.collection_ready.store(false, Ordering::Release);
        tracing::info!("dropped milvus collection '{}'", self.config.collection_name);
        Ok(())
    }

    async fn list(
        &self,
        filters: Option<&SearchFilters>,
        limit: Option<usize>,
    ) -> Result<(Vec<VectorStoreResult>, usize)> {
        self.ready().await?;
        let filter = self.translate(filters)?.unwrap_or_default();

        let counted = self
            .call(
                "count",
                "/v2/vectordb/entities/query",
                json!({ "filter": filter, "outputFields": ["count(*)"] }),
            )
            .await?;
        let total = counted["data"][0]["count(*)"].as_u64().unwrap_or(0) as usize;

        let window = limit.unwrap_or(total).min(MAX_QUERY_WINDOW);
        if window == 0 {
            return Ok((Vec::new(), total));
        }
        let response = self
            .call(
                "query",
                "/v2/vectordb/entities/query",
                json!({
                    "filter": filter,
                    "limit": window,
                    "outputFields": ["id", "vector", PAYLOAD_FIELD],
                }),
            )
            .await?;
        Ok((self.decode_entities(&response), total))
    }
}
