use std::sync::Arc;

use engram_chroma::{ChromaConfig, ChromaFilterTranslator, ChromaVectorStore, FilterTranslator, VectorStore};
use engram_core::filter::json_eq;
use engram_core::{
    DistanceMetric, FlatPayloadCodec, IdentityCodec, Payload, PayloadCodec, SearchFilters,
    VectorId, VectorStoreError,
};
use engram_pool::{FakeTransport, FakeTransportFactory, Method};
use serde_json::{json, Value};

fn payload(v: Value) -> Payload {
    v.as_object().cloned().unwrap()
}

fn store_with(fake: &Arc<FakeTransport>, config: ChromaConfig) -> ChromaVectorStore {
    ChromaVectorStore::new(config)
        .unwrap()
        .with_transport_factory(Arc::new(FakeTransportFactory::new(fake.clone())))
}

async fn connected(fake: &Arc<FakeTransport>) -> ChromaVectorStore {
    fake.push_ok(json!({
        "id": "c-123",
        "name": "mem",
        "metadata": {"hnsw:space": "cosine", "dimension": 3}
    }));
    let store = store_with(fake, ChromaConfig::new("mem", 3));
    store.connect().await.unwrap();
    store
}

#[tokio::test]
async fn connect_gets_or_creates_collection() {
    let fake = Arc::new(FakeTransport::new());
    let _store = connected(&fake).await;

    let request = fake.last_request().await.unwrap();
    assert_eq!(request.method, Method::Post);
    assert_eq!(request.path, "/api/v1/collections");
    assert_eq!(
        request.body,
        Some(json!({
            "name": "mem",
            "metadata": {"hnsw:space": "cosine", "dimension": 3},
            "get_or_create": true
        }))
    );
}

#[tokio::test]
async fn connect_rejects_dimension_mismatch() {
    let fake = Arc::new(FakeTransport::new());
    fake.push_ok(json!({"id": "c-1", "metadata": {"dimension": 1536}}));
    let store = store_with(&fake, ChromaConfig::new("mem", 3));

    let err = store.connect().await.unwrap_err();
    assert!(matches!(err, VectorStoreError::Dimension { expected: 3, actual: 1536 }));
    assert!(!store.is_connected().await);
}

#[tokio::test]
async fn metric_maps_to_hnsw_space() {
    let fake = Arc::new(FakeTransport::new());
    fake.push_ok(json!({"id": "c-1", "metadata": null}));
    let store = store_with(&fake, ChromaConfig::new("mem", 3).with_metric(DistanceMetric::Dot));
    store.connect().await.unwrap();
    let body = fake.last_request().await.unwrap().body.unwrap();
    assert_eq!(body["metadata"]["hnsw:space"], "ip");
}

#[tokio::test]
async fn insert_flattens_payloads() {
    let fake = Arc::new(FakeTransport::new());
    let store = connected(&fake).await;
    fake.push_ok(Value::Bool(true));

    store
        .insert(
            &[vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]],
            &[VectorId::Int(1), VectorId::from("b")],
            &[
                payload(json!({"tags": ["x", "y"], "meta": {"source": "chat"}})),
                Payload::new(),
            ],
        )
        .await
        .unwrap();

    let request = fake.last_request().await.unwrap();
    assert_eq!(request.path, "/api/v1/collections/c-123/upsert");
    let body = request.body.unwrap();
    assert_eq!(body["ids"], json!(["1", "b"]));
    let metadata = &body["metadatas"][0];
    assert_eq!(metadata["tags"], "__list__:x|y");
    assert_eq!(metadata["tags__has__\"x\""], true);
    assert_eq!(metadata["tags__has__\"y\""], true);
    assert_eq!(metadata["meta_source"], "chat");
    assert_eq!(body["metadatas"][1], Value::Null);
}

#[tokio::test]
async fn search_converts_distances_and_decodes() {
    let fake = Arc::new(FakeTransport::new());
    let store = connected(&fake).await;
    fake.push_ok(json!({
        "ids": [["1", "note"]],
        "distances": [[0.0, 0.25]],
        "metadatas": [[
            {"tags": "__list__:x|y", "meta_source": "chat", "__nested__": "[\"meta\"]"},
            null
        ]]
    }));

    let results = store.search(&[1.0, 0.0, 0.0], 5, None).await.unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].id, VectorId::Int(1));
    assert!((results[0].score - 1.0).abs() < 1e-6);
    assert_eq!(
        results[0].payload,
        payload(json!({"tags": ["x", "y"], "meta": {"source": "chat"}}))
    );
    assert_eq!(results[1].id, VectorId::from("note"));
    assert!((results[1].score - 0.75).abs() < 1e-6);

    let body = fake.last_request().await.unwrap().body.unwrap();
    assert_eq!(body["n_results"], 5);
    assert!(body.get("where").is_none());
}

#[tokio::test]
async fn undecodable_records_are_skipped() {
    let fake = Arc::new(FakeTransport::new());
    let store = connected(&fake).await;
    fake.push_ok(json!({
        "ids": [["1", "2"]],
        "distances": [[0.1, 0.2]],
        "metadatas": [[{"bad": "__json__:{not json"}, {"ok": true}]]
    }));

    let results = store.search(&[1.0, 0.0, 0.0], 5, None).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].id, VectorId::Int(2));
}

#[tokio::test]
async fn search_sends_where_clause() {
    let fake = Arc::new(FakeTransport::new());
    let store = connected(&fake).await;
    fake.push_ok(json!({"ids": [[]], "distances": [[]], "metadatas": [[]]}));

    let filters = SearchFilters::new().eq("meta.source", "chat").gte("importance", 0.5);
    store.search(&[1.0, 0.0, 0.0], 3, Some(&filters)).await.unwrap();

    let body = fake.last_request().await.unwrap().body.unwrap();
    assert_eq!(
        body["where"],
        json!({"$and": [
            {"$or": [
                {"meta_source": {"$eq": "chat"}},
                {"meta_source__has__\"chat\"": {"$eq": true}}
            ]},
            {"importance": {"$gte": 0.5}}
        ]})
    );
}

#[tokio::test]
async fn search_matches_list_membership_through_markers() {
    let fake = Arc::new(FakeTransport::new());
    let store = connected(&fake).await;
    fake.push_ok(json!({"ids": [[]], "distances": [[]], "metadatas": [[]]}));

    let filters = SearchFilters::new().any("tags", ["rust", "go"]);
    store.search(&[1.0, 0.0, 0.0], 3, Some(&filters)).await.unwrap();

    let body = fake.last_request().await.unwrap().body.unwrap();
    assert_eq!(
        body["where"],
        json!({"$or": [
            {"tags": {"$in": ["rust", "go"]}},
            {"tags__has__\"rust\"": {"$eq": true}},
            {"tags__has__\"go\"": {"$eq": true}}
        ]})
    );
}

#[tokio::test]
async fn search_with_zero_limit_sends_nothing() {
    let fake = Arc::new(FakeTransport::new());
    let store = connected(&fake).await;
    let before = fake.requests().await.len();

    let results = store.search(&[1.0, 0.0, 0.0], 0, None).await.unwrap();
    assert!(results.is_empty());
    assert_eq!(fake.requests().await.len(), before);

    let err = store.search(&[1.0, 0.0], 0, None).await.unwrap_err();
    assert!(matches!(err, VectorStoreError::Dimension { expected: 3, actual: 2 }));
}

#[tokio::test]
async fn update_rejects_dimension_mismatch() {
    let fake = Arc::new(FakeTransport::new());
    let store = connected(&fake).await;
    let before = fake.requests().await.len();

    let err = store
        .update(&VectorId::Int(1), &[1.0, 0.0], &payload(json!({"kind": "fact"})))
        .await
        .unwrap_err();
    assert!(matches!(err, VectorStoreError::Dimension { expected: 3, actual: 2 }));
    assert_eq!(fake.requests().await.len(), before);
}

#[tokio::test]
async fn get_decodes_columnar_response() {
    let fake = Arc::new(FakeTransport::new());
    let store = connected(&fake).await;
    fake.push_ok(json!({
        "ids": ["7"],
        "metadatas": [{"kind": "fact"}],
        "embeddings": [[0.5, 0.5, 0.0]]
    }));
    let got = store.get(&VectorId::Int(7)).await.unwrap().unwrap();
    assert_eq!(got.vector, Some(vec![0.5, 0.5, 0.0]));
    assert_eq!(got.payload, payload(json!({"kind": "fact"})));

    fake.push_ok(json!({"ids": [], "metadatas": [], "embeddings": []}));
    assert!(store.get(&VectorId::Int(8)).await.unwrap().is_none());
}

#[tokio::test]
async fn list_uses_count_endpoint_without_filters() {
    let fake = Arc::new(FakeTransport::new());
    let store = connected(&fake).await;
    fake.push_ok(json!(12));
    fake.push_ok(json!({"ids": ["1", "2"], "metadatas": [{}, {}], "embeddings": [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]}));

    let (results, total) = store.list(None, Some(2)).await.unwrap();
    assert_eq!(total, 12);
    assert_eq!(results.len(), 2);

    let requests = fake.requests().await;
    let count = &requests[requests.len() - 2];
    assert_eq!(count.method, Method::Get);
    assert_eq!(count.path, "/api/v1/collections/c-123/count");
    assert_eq!(requests.last().unwrap().body.as_ref().unwrap()["limit"], 2);
}

#[tokio::test]
async fn filtered_list_counts_all_matches() {
    let fake = Arc::new(FakeTransport::new());
    let store = connected(&fake).await;
    fake.push_ok(json!({"ids": ["1", "2", "3"], "metadatas": [{}, {}, {}]}));

    let filters = SearchFilters::new().eq("kind", "fact");
    let (results, total) = store.list(Some(&filters), Some(1)).await.unwrap();
    assert_eq!(total, 3);
    assert_eq!(results.len(), 1);
}

#[tokio::test]
async fn delete_collection_uses_name() {
    let fake = Arc::new(FakeTransport::new());
    let store = connected(&fake).await;
    fake.push_ok(Value::Null);
    store.delete_collection().await.unwrap();
    let request = fake.last_request().await.unwrap();
    assert_eq!(request.method, Method::Delete);
    assert_eq!(request.path, "/api/v1/collections/mem");
}

#[tokio::test]
async fn connect_recreates_a_deleted_collection() {
    let fake = Arc::new(FakeTransport::new());
    let store = connected(&fake).await;
    fake.push_ok(Value::Null);
    store.delete_collection().await.unwrap();

    assert!(!store.is_connected().await);
    let err = store.get(&VectorId::Int(1)).await.unwrap_err();
    assert!(matches!(err, VectorStoreError::NotConnected(_)));

    fake.push_ok(json!({"id": "c-456", "metadata": {"dimension": 3}}));
    store.connect().await.unwrap();
    assert!(store.is_connected().await);
    assert_eq!(fake.pending_responses().await, 0);

    fake.push_ok(Value::Bool(true));
    store
        .insert(&[vec![1.0, 0.0, 0.0]], &[VectorId::Int(1)], &[Payload::new()])
        .await
        .unwrap();
    let request = fake.last_request().await.unwrap();
    assert_eq!(request.path, "/api/v1/collections/c-456/upsert");
}

#[tokio::test]
async fn not_connected_before_connect() {
    let fake = Arc::new(FakeTransport::new());
    let store = store_with(&fake, ChromaConfig::new("mem", 3));
    let err = store.delete(&VectorId::Int(1)).await.unwrap_err();
    assert!(matches!(err, VectorStoreError::NotConnected(_)));
}

#[tokio::test]
async fn custom_codec_is_used_for_payloads() {
    let fake = Arc::new(FakeTransport::new());
    fake.push_ok(json!({"id": "c-1"}));
    let store = store_with(&fake, ChromaConfig::new("mem", 3)).with_codec(Arc::new(IdentityCodec));
    store.connect().await.unwrap();
    fake.push_ok(Value::Bool(true));

    store
        .insert(&[vec![1.0, 0.0, 0.0]], &[VectorId::Int(1)], &[payload(json!({"tags": ["a"]}))])
        .await
        .unwrap();
    let body = fake.last_request().await.unwrap().body.unwrap();
    assert_eq!(body["metadatas"][0]["tags"], json!(["a"]));
}

#[test]
fn all_without_markers_degrades_to_first_value_with_flag() {
    let translator = ChromaFilterTranslator::new(Arc::new(FlatPayloadCodec::default()));
    let filters = SearchFilters::new().all("owners", ["alice", "bob"]);
    let translated = translator.translate(&filters).unwrap();
    assert!(translated.used_fallback);
    assert_eq!(translated.native, json!({"owners": {"$eq": "alice"}}));
}

/// Evaluates a Chroma `where` document against stored metadata.
fn where_matches(clause: &Value, metadata: &Payload) -> bool {
    let clause = clause.as_object().unwrap();
    if let Some(all) = clause.get("$and") {
        return all.as_array().unwrap().iter().all(|c| where_matches(c, metadata));
    }
    if let Some(any) = clause.get("$or") {
        return any.as_array().unwrap().iter().any(|c| where_matches(c, metadata));
    }
    let (field, condition) = clause.iter().next().unwrap();
    let Some(stored) = metadata.get(field) else {
        return false;
    };
    let (op, operand) = condition.as_object().unwrap().iter().next().unwrap();
    let compare = |f: fn(f64, f64) -> bool| {
        stored.as_f64().zip(operand.as_f64()).is_some_and(|(a, b)| f(a, b))
    };
    match op.as_str() {
        "$eq" => json_eq(stored, operand),
        "$in" => operand.as_array().unwrap().iter().any(|v| json_eq(stored, v)),
        "$gt" => compare(|a, b| a > b),
        "$gte" => compare(|a, b| a >= b),
        "$lt" => compare(|a, b| a < b),
        "$lte" => compare(|a, b| a <= b),
        other => panic!("unexpected operator {other}"),
    }
}

#[test]
fn translated_filters_agree_with_client_side_matching() {
    let codec = FlatPayloadCodec::default().with_membership_markers(true);
    let translator = ChromaFilterTranslator::new(Arc::new(codec.clone()));

    let records = [
        payload(json!({"tags": ["rust", "memory"], "kind": "fact", "importance": 0.9})),
        payload(json!({"tags": ["python"], "kind": "event", "importance": 0.2})),
        payload(json!({"tags": "rust", "kind": "fact"})),
        payload(json!({"meta": {"langs": ["rust", "go"]}, "scores": [1, 2]})),
        Payload::new(),
    ];
    let filters = [
        SearchFilters::new().any("tags", ["rust"]),
        SearchFilters::new().any("tags", ["go", "python"]),
        SearchFilters::new().all("tags", ["rust", "memory"]),
        SearchFilters::new().all("tags", ["rust", "python"]),
        SearchFilters::new().eq("tags", "memory"),
        SearchFilters::new().any("kind", ["fact"]).gte("importance", 0.5),
        SearchFilters::new().all("kind", ["fact"]),
        SearchFilters::new().all("meta.langs", ["go", "rust"]),
        SearchFilters::new().any("scores", [2.0]),
    ];

    for filter in &filters {
        let translated = translator.translate(filter).unwrap();
        assert!(!translated.used_fallback);
        for record in &records {
            let stored = codec.encode(record).unwrap();
            assert_eq!(
                where_matches(&translated.native, &stored),
                filter.matches(record),
                "filter {filter:?} on {record:?}"
            );
        }
    }
}

#[test]
fn range_bounds_become_separate_clauses() {
    let translator = ChromaFilterTranslator::new(Arc::new(FlatPayloadCodec::default()));
    let filters = SearchFilters::from_value(&json!({
        "importance": {"gt": 0.1, "lte": 0.9},
        "kind": {"any": ["fact", "event"]}
    }))
    .unwrap();
    let translated = translator.translate(&filters).unwrap();
    assert!(!translated.used_fallback);

    let clauses = translated.native["$and"].as_array().unwrap();
    assert_eq!(clauses.len(), 3);
    assert!(clauses.contains(&json!({"importance": {"$gt": 0.1}})));
    assert!(clauses.contains(&json!({"importance": {"$lte": 0.9}})));
    assert!(clauses.contains(&json!({"kind": {"$in": ["fact", "event"]}})));
}

#[test]
fn unknown_shapes_fail_at_translation() {
    let err = SearchFilters::from_value(&json!({"kind": {"regex": "f.*"}})).unwrap_err();
    assert!(matches!(err, VectorStoreError::Filter(_)));
}
