use engram_core::{SearchFilters, VectorStoreError};
use engram_vectorstores::{
    DistanceMetric, InMemoryConfig, InMemoryVectorStore, Payload, VectorId, VectorStore,
};
use serde_json::{json, Value};

fn payload(v: Value) -> Payload {
    v.as_object().cloned().unwrap()
}

async fn connected_store(dimension: usize) -> InMemoryVectorStore {
    let store = InMemoryVectorStore::new(InMemoryConfig::new("test", dimension));
    store.connect().await.unwrap();
    store
}

async fn seeded_store() -> InMemoryVectorStore {
    let store = connected_store(3).await;
    store
        .insert(
            &[vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0], vec![0.9, 0.1, 0.0]],
            &[VectorId::Int(1), VectorId::Int(2), VectorId::Int(3)],
            &[
                payload(json!({"kind": "fact", "importance": 0.9, "tags": ["rust", "db"]})),
                payload(json!({"kind": "event", "importance": 0.2, "tags": ["db"]})),
                payload(json!({"kind": "fact", "importance": 0.5, "meta": {"source": "chat"}})),
            ],
        )
        .await
        .unwrap();
    store
}

#[tokio::test]
async fn nearest_neighbours_in_score_order() {
    let store = seeded_store().await;

    let results = store.search(&[1.0, 0.0, 0.0], 2, None).await.unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].id, VectorId::Int(1));
    assert!((results[0].score - 1.0).abs() < 1e-6);
    assert_eq!(results[1].id, VectorId::Int(3));
    assert!((results[1].score - 0.994).abs() < 1e-3, "score: {}", results[1].score);
}

#[tokio::test]
async fn search_scores_never_increase() {
    let store = seeded_store().await;
    let results = store.search(&[0.5, 0.5, 0.0], 10, None).await.unwrap();
    assert_eq!(results.len(), 3);
    assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
}

#[tokio::test]
async fn get_returns_exact_copy() {
    let store = connected_store(2).await;
    let p = payload(json!({"nested": {"a": [1, 2]}, "name": "x"}));
    store
        .insert(&[vec![0.25, -3.5]], &[VectorId::from("doc")], &[p.clone()])
        .await
        .unwrap();

    let got = store.get(&VectorId::from("doc")).await.unwrap().unwrap();
    assert_eq!(got.vector, Some(vec![0.25, -3.5]));
    assert_eq!(got.payload, p);
    assert_eq!(got.score, 1.0);
}

#[tokio::test]
async fn get_missing_is_none() {
    let store = connected_store(2).await;
    assert!(store.get(&VectorId::Int(42)).await.unwrap().is_none());
}

#[tokio::test]
async fn dimension_mismatch_is_rejected_everywhere() {
    let store = connected_store(3).await;

    let err = store
        .insert(&[vec![1.0, 0.0]], &[VectorId::Int(1)], &[Payload::new()])
        .await
        .unwrap_err();
    assert!(matches!(err, VectorStoreError::Dimension { expected: 3, actual: 2 }));

    let err = store.search(&[1.0; 4], 1, None).await.unwrap_err();
    assert!(matches!(err, VectorStoreError::Dimension { expected: 3, actual: 4 }));

    let err = store
        .update(&VectorId::Int(1), &[1.0], &Payload::new())
        .await
        .unwrap_err();
    assert!(err.is_dimension());
}

#[tokio::test]
async fn batch_length_mismatch_is_store_error() {
    let store = connected_store(1).await;
    let err = store
        .insert(&[vec![1.0], vec![2.0]], &[VectorId::Int(1)], &[Payload::new()])
        .await
        .unwrap_err();
    assert!(matches!(err, VectorStoreError::Store(_)));
}

#[tokio::test]
async fn reinsert_replaces_instead_of_merging() {
    let store = connected_store(2).await;
    let id = VectorId::Int(7);
    store
        .insert(&[vec![1.0, 0.0]], &[id.clone()], &[payload(json!({"a": 1, "b": 2}))])
        .await
        .unwrap();
    store
        .insert(&[vec![0.0, 1.0]], &[id.clone()], &[payload(json!({"c": 3}))])
        .await
        .unwrap();

    let got = store.get(&id).await.unwrap().unwrap();
    assert_eq!(got.vector, Some(vec![0.0, 1.0]));
    assert_eq!(got.payload, payload(json!({"c": 3})));
    assert_eq!(store.len().await, 1);
}

#[tokio::test]
async fn update_is_full_replace() {
    let store = connected_store(2).await;
    let id = VectorId::from("m");
    store
        .insert(&[vec![1.0, 0.0]], &[id.clone()], &[payload(json!({"a": 1}))])
        .await
        .unwrap();
    store
        .update(&id, &[0.5, 0.5], &payload(json!({"b": 2})))
        .await
        .unwrap();

    let got = store.get(&id).await.unwrap().unwrap();
    assert_eq!(got.payload, payload(json!({"b": 2})));
    assert_eq!(got.vector, Some(vec![0.5, 0.5]));
}

#[tokio::test]
async fn delete_then_get_is_none() {
    let store = seeded_store().await;
    store.delete(&VectorId::Int(1)).await.unwrap();
    assert!(store.get(&VectorId::Int(1)).await.unwrap().is_none());
    // Deleting a missing id is fine.
    store.delete(&VectorId::Int(1)).await.unwrap();
    store.delete(&VectorId::from("never")).await.unwrap();
}

#[tokio::test]
async fn operations_before_connect_fail() {
    let store = InMemoryVectorStore::new(InMemoryConfig::new("test", 1));
    assert!(!store.is_connected().await);

    let err = store.search(&[1.0], 1, None).await.unwrap_err();
    assert!(matches!(err, VectorStoreError::NotConnected(_)));
    assert!(store.get(&VectorId::Int(1)).await.is_err());
    assert!(store.list(None, None).await.is_err());
    assert!(store.delete_collection().await.is_err());
}

#[tokio::test]
async fn connect_and_disconnect_are_idempotent() {
    let store = InMemoryVectorStore::new(InMemoryConfig::new("test", 1));
    store.connect().await.unwrap();
    store.connect().await.unwrap();
    assert!(store.is_connected().await);
    store.disconnect().await.unwrap();
    store.disconnect().await.unwrap();
    assert!(!store.is_connected().await);
}

#[tokio::test]
async fn max_vectors_is_a_hard_limit() {
    let store = InMemoryVectorStore::new(InMemoryConfig::new("small", 1).with_max_vectors(2));
    store.connect().await.unwrap();
    store
        .insert(
            &[vec![1.0], vec![2.0]],
            &[VectorId::Int(1), VectorId::Int(2)],
            &[Payload::new(), Payload::new()],
        )
        .await
        .unwrap();

    let err = store
        .insert(&[vec![3.0]], &[VectorId::Int(3)], &[Payload::new()])
        .await
        .unwrap_err();
    assert!(matches!(err, VectorStoreError::Store(_)));
    assert_eq!(store.len().await, 2);

    // Overwriting an existing id does not grow the store.
    store
        .insert(&[vec![9.0]], &[VectorId::Int(2)], &[Payload::new()])
        .await
        .unwrap();
}

#[tokio::test]
async fn caller_mutation_does_not_leak_into_store() {
    let store = connected_store(2).await;
    let mut vector = vec![1.0, 0.0];
    let mut p = payload(json!({"a": 1}));
    store
        .insert(&[vector.clone()], &[VectorId::Int(1)], &[p.clone()])
        .await
        .unwrap();
    vector[0] = 99.0;
    p.insert("a".into(), json!(2));

    let mut got = store.get(&VectorId::Int(1)).await.unwrap().unwrap();
    got.payload.insert("b".into(), json!(true));

    let again = store.get(&VectorId::Int(1)).await.unwrap().unwrap();
    assert_eq!(again.vector, Some(vec![1.0, 0.0]));
    assert_eq!(again.payload, payload(json!({"a": 1})));
}

#[tokio::test]
async fn filtered_search_matches_client_side_filtering() {
    let store = seeded_store().await;
    let filters = SearchFilters::new().eq("kind", "fact").gte("importance", 0.6);

    let filtered = store.search(&[1.0, 0.0, 0.0], 10, Some(&filters)).await.unwrap();
    let unfiltered = store.search(&[1.0, 0.0, 0.0], 100, None).await.unwrap();
    let expected: Vec<_> = unfiltered
        .into_iter()
        .filter(|r| filters.matches(&r.payload))
        .collect();

    assert_eq!(filtered, expected);
    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered[0].id, VectorId::Int(1));
}

#[tokio::test]
async fn set_and_nested_filters() {
    let store = seeded_store().await;

    let any = SearchFilters::new().any("tags", ["rust", "none"]);
    let results = store.search(&[0.0, 1.0, 0.0], 10, Some(&any)).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].id, VectorId::Int(1));

    let all = SearchFilters::new().all("tags", ["rust", "db"]);
    let results = store.search(&[0.0, 1.0, 0.0], 10, Some(&all)).await.unwrap();
    assert_eq!(results.len(), 1);

    let nested = SearchFilters::new().eq("meta.source", "chat");
    let results = store.search(&[0.0, 1.0, 0.0], 10, Some(&nested)).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].id, VectorId::Int(3));
}

#[tokio::test]
async fn invalid_builder_filter_is_rejected() {
    let store = seeded_store().await;
    let empty_any = SearchFilters::new().any("tags", Vec::<String>::new());
    let err = store
        .search(&[1.0, 0.0, 0.0], 1, Some(&empty_any))
        .await
        .unwrap_err();
    assert!(matches!(err, VectorStoreError::Filter(_)));
}

#[tokio::test]
async fn list_total_ignores_limit() {
    let store = seeded_store().await;

    let (results, total) = store.list(None, Some(2)).await.unwrap();
    assert_eq!(total, 3);
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].id, VectorId::Int(1));
    assert_eq!(results[1].id, VectorId::Int(2));

    let filters = SearchFilters::new().eq("kind", "fact");
    let (results, total) = store.list(Some(&filters), Some(1)).await.unwrap();
    assert_eq!(total, 2);
    assert_eq!(results.len(), 1);
}

#[tokio::test]
async fn delete_collection_empties_store() {
    let store = seeded_store().await;
    store.delete_collection().await.unwrap();
    let (results, total) = store.list(None, None).await.unwrap();
    assert!(results.is_empty());
    assert_eq!(total, 0);
}

#[tokio::test]
async fn euclidean_metric_prefers_closest_point() {
    let store = InMemoryVectorStore::new(
        InMemoryConfig::new("l2", 2).with_metric(DistanceMetric::Euclidean),
    );
    store.connect().await.unwrap();
    store
        .insert(
            &[vec![10.0, 0.0], vec![1.0, 0.0]],
            &[VectorId::Int(1), VectorId::Int(2)],
            &[Payload::new(), Payload::new()],
        )
        .await
        .unwrap();

    // Both are collinear with the query; cosine could not tell them apart.
    let results = store.search(&[1.0, 0.0], 2, None).await.unwrap();
    assert_eq!(results[0].id, VectorId::Int(2));
    assert!((results[0].score - 1.0).abs() < 1e-6);
    assert!((results[1].score - 0.1).abs() < 1e-6);
}
