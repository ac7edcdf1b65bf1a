use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Arbitrary JSON-like metadata attached to a stored vector.
pub type Payload = Map<String, Value>;

/// Record identifier at the contract boundary.
///
/// Each adapter converts to whatever its backend requires at its edge.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VectorId {
    Int(u64),
    Text(String),
}

impl VectorId {
    /// Parse a backend string id, preferring the integer form when it fits.
    pub fn parse(raw: &str) -> Self {
        match raw.parse::<u64>() {
            Ok(n) if n.to_string() == raw => Self::Int(n),
            _ => Self::Text(raw.to_string()),
        }
    }

    /// Convert a JSON id (number or string) as returned by a backend.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_u64().map(Self::Int),
            Value::String(s) => Some(Self::parse(s)),
            _ => None,
        }
    }
}

impl fmt::Display for VectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<u64> for VectorId {
    fn from(n: u64) -> Self {
        Self::Int(n)
    }
}

impl From<&str> for VectorId {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for VectorId {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

/// A single record returned by `search`, `get` or `list`.
///
/// `score` is normalized so that 1.0 means identical and 0.0 unrelated.
/// Records returned without a query (`get`, `list`) carry a score of 1.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorStoreResult {
    pub id: VectorId,
    pub score: f32,
    pub payload: Payload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector: Option<Vec<f32>>,
}

impl VectorStoreResult {
    pub fn new(id: VectorId, score: f32, payload: Payload) -> Self {
        Self {
            id,
            score,
            payload,
            vector: None,
        }
    }

    pub fn with_vector(mut self, vector: Vec<f32>) -> Self {
        self.vector = Some(vector);
        self
    }
}

/// Similarity metric a collection is created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    #[default]
    Cosine,
    #[serde(alias = "l2", alias = "euclid")]
    Euclidean,
    #[serde(alias = "dot_product", alias = "ip")]
    Dot,
}

impl DistanceMetric {
    /// Convert a raw distance reported by a backend into a similarity score.
    ///
    /// `distance` is interpreted per metric: cosine distance (`1 - cos`),
    /// Euclidean distance, or negated/complemented inner product.
    pub fn score_from_distance(self, distance: f32) -> f32 {
        match self {
            Self::Cosine | Self::Dot => 1.0 - distance,
            Self::Euclidean => 1.0 / (1.0 + distance.max(0.0)),
        }
    }

    /// Convert a raw score reported by a similarity-reporting backend.
    ///
    /// Cosine and dot scores pass through; Euclidean backends report a
    /// distance in their score field.
    pub fn score_from_similarity(self, raw: f32) -> f32 {
        match self {
            Self::Cosine | Self::Dot => raw,
            Self::Euclidean => 1.0 / (1.0 + raw.max(0.0)),
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cosine => f.write_str("cosine"),
            Self::Euclidean => f.write_str("euclidean"),
            Self::Dot => f.write_str("dot"),
        }
    }
}

/// Compute cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    dot / (mag_a * mag_b)
}

pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Score `candidate` against `query` under `metric`, normalized to higher = closer.
pub fn similarity(metric: DistanceMetric, query: &[f32], candidate: &[f32]) -> f32 {
    match metric {
        DistanceMetric::Cosine => cosine_similarity(query, candidate),
        DistanceMetric::Euclidean => {
            DistanceMetric::Euclidean.score_from_distance(euclidean_distance(query, candidate))
        }
        DistanceMetric::Dot => dot_product(query, candidate),
    }
}
