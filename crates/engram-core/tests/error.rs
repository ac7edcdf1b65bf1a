use std::error::Error;

use engram_core::VectorStoreError;

#[test]
fn error_variants_render() {
    let errors = vec![
        VectorStoreError::NotConnected("test".into()),
        VectorStoreError::Store("test".into()),
        VectorStoreError::connection("test", None),
        VectorStoreError::Dimension {
            expected: 3,
            actual: 4,
        },
        VectorStoreError::Filter("test".into()),
        VectorStoreError::Codec("test".into()),
        VectorStoreError::backend("qdrant", "test"),
        VectorStoreError::transport("test", None),
        VectorStoreError::Config("test".into()),
        VectorStoreError::UnknownMemoryType("test".into()),
    ];
    for err in &errors {
        assert!(!err.to_string().is_empty());
    }
}

#[test]
fn dimension_message_names_both_sizes() {
    let err = VectorStoreError::Dimension {
        expected: 1536,
        actual: 768,
    };
    assert_eq!(
        err.to_string(),
        "vector dimension mismatch: expected 1536, got 768"
    );
}

#[test]
fn backend_wrap_preserves_cause() {
    let cause = std::io::Error::new(std::io::ErrorKind::Other, "socket closed");
    let err = VectorStoreError::backend_with_source("chroma", "upsert failed", cause);
    assert_eq!(err.to_string(), "chroma error: upsert failed");
    assert_eq!(err.source().unwrap().to_string(), "socket closed");
}

#[test]
fn transport_errors_are_retagged_per_backend() {
    let err = VectorStoreError::transport("timeout", None).into_backend("milvus");
    assert!(matches!(
        err,
        VectorStoreError::Backend {
            backend: "milvus",
            ..
        }
    ));
    assert!(err.is_retryable());
    assert!(!VectorStoreError::Filter("x".into()).is_retryable());
}
