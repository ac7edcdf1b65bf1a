use crate::{Payload, Result, VectorId, VectorStoreError};

/// Check that `vector` has exactly `expected` components.
pub fn validate_dimension(vector: &[f32], expected: usize) -> Result<()> {
    if vector.len() != expected {
        return Err(VectorStoreError::Dimension {
            expected,
            actual: vector.len(),
        });
    }
    Ok(())
}

/// Validate an insert batch: equal array lengths, then every vector's dimension.
pub fn validate_batch(
    vectors: &[Vec<f32>],
    ids: &[VectorId],
    payloads: &[Payload],
    dimension: usize,
) -> Result<()> {
    if vectors.len() != ids.len() || vectors.len() != payloads.len() {
        return Err(VectorStoreError::Store(format!(
            "vectors, ids and payloads must have equal length (got {}, {}, {})",
            vectors.len(),
            ids.len(),
            payloads.len()
        )));
    }
    for vector in vectors {
        validate_dimension(vector, dimension)?;
    }
    Ok(())
}

/// Validate a collection name for backends that embed it in URLs or expressions.
///
/// Only ASCII alphanumerics, `_` and `-` are accepted.
pub fn validate_collection_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(VectorStoreError::Config(
            "collection name must not be empty".to_string(),
        ));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(VectorStoreError::Config(format!(
            "invalid collection name '{name}': only ASCII letters, digits, '_' and '-' are allowed"
        )));
    }
    Ok(())
}
