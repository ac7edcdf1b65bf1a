//! Backend-independent filter DSL.
//!
//! A [`SearchFilters`] value is an AND of field predicates. Its JSON form is
//! an object mapping a field (optionally a dotted path into nested payload
//! objects) to either a scalar literal or a predicate object:
//!
//! ```json
//! {
//!   "kind": "fact",
//!   "importance": { "gte": 0.5, "lt": 1.0 },
//!   "tags": { "any": ["rust", "memory"] },
//!   "owners": { "all": ["alice", "bob"] }
//! }
//! ```
//!
//! Anything else is rejected with [`VectorStoreError::Filter`] instead of being
//! silently dropped.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::{Payload, Result, VectorStoreError};

const RANGE_KEYS: [&str; 4] = ["gte", "gt", "lte", "lt"];

/// Numeric bounds of a range predicate. Every bound that is set must hold.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RangeBounds {
    pub gte: Option<f64>,
    pub gt: Option<f64>,
    pub lte: Option<f64>,
    pub lt: Option<f64>,
}

impl RangeBounds {
    pub fn contains(&self, x: f64) -> bool {
        self.gte.map_or(true, |b| x >= b)
            && self.gt.map_or(true, |b| x > b)
            && self.lte.map_or(true, |b| x <= b)
            && self.lt.map_or(true, |b| x < b)
    }

    /// The bounds that are set, as `(operator, value)` pairs.
    pub fn bounds(&self) -> Vec<(&'static str, f64)> {
        [
            ("gte", self.gte),
            ("gt", self.gt),
            ("lte", self.lte),
            ("lt", self.lt),
        ]
        .into_iter()
        .filter_map(|(op, v)| v.map(|v| (op, v)))
        .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.bounds().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Exact match against a scalar literal.
    Eq(Value),
    Range(RangeBounds),
    /// Field is one of the listed values (or, for array fields, contains one of them).
    Any(Vec<Value>),
    /// Array field contains every listed value.
    All(Vec<Value>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldFilter {
    pub field: String,
    pub predicate: Predicate,
}

/// An AND of field predicates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchFilters {
    clauses: Vec<FieldFilter>,
}

impl SearchFilters {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(mut self, field: impl Into<String>, predicate: Predicate) -> Self {
        self.clauses.push(FieldFilter {
            field: field.into(),
            predicate,
        });
        self
    }

    pub fn eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(field, Predicate::Eq(value.into()))
    }

    pub fn range(self, field: impl Into<String>, bounds: RangeBounds) -> Self {
        self.push(field, Predicate::Range(bounds))
    }

    pub fn gte(self, field: impl Into<String>, value: f64) -> Self {
        self.range(
            field,
            RangeBounds {
                gte: Some(value),
                ..Default::default()
            },
        )
    }

    pub fn lte(self, field: impl Into<String>, value: f64) -> Self {
        self.range(
            field,
            RangeBounds {
                lte: Some(value),
                ..Default::default()
            },
        )
    }

    pub fn any<V: Into<Value>>(
        self,
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.push(
            field,
            Predicate::Any(values.into_iter().map(Into::into).collect()),
        )
    }

    pub fn all<V: Into<Value>>(
        self,
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.push(
            field,
            Predicate::All(values.into_iter().map(Into::into).collect()),
        )
    }

    pub fn clauses(&self) -> &[FieldFilter] {
        &self.clauses
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Parse the JSON filter form, rejecting unknown predicate shapes.
    pub fn from_value(value: &Value) -> Result<Self> {
        let obj = value.as_object().ok_or_else(|| {
            VectorStoreError::Filter(format!("filters must be a JSON object, got {value}"))
        })?;

        let mut filters = Self::new();
        for (field, condition) in obj {
            let predicate = parse_predicate(field, condition)?;
            filters = filters.push(field.clone(), predicate);
        }
        Ok(filters)
    }

    /// Validate every clause without translating it.
    ///
    /// Builder-constructed filters can hold shapes the JSON parser rejects
    /// (empty value lists, non-scalar literals); this catches them.
    pub fn validate(&self) -> Result<()> {
        for clause in &self.clauses {
            match &clause.predicate {
                Predicate::Eq(v) => ensure_scalar(&clause.field, v)?,
                Predicate::Range(bounds) if bounds.is_empty() => {
                    return Err(VectorStoreError::Filter(format!(
                        "range on '{}' has no bounds",
                        clause.field
                    )));
                }
                Predicate::Range(_) => {}
                Predicate::Any(values) | Predicate::All(values) => {
                    if values.is_empty() {
                        return Err(VectorStoreError::Filter(format!(
                            "set predicate on '{}' must list at least one value",
                            clause.field
                        )));
                    }
                    for v in values {
                        ensure_scalar(&clause.field, v)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Evaluate the filters client-side against a decoded payload.
    pub fn matches(&self, payload: &Payload) -> bool {
        self.clauses.iter().all(|clause| {
            let Some(value) = lookup_path(payload, &clause.field) else {
                return false;
            };
            match &clause.predicate {
                Predicate::Eq(expected) => match value {
                    Value::Array(items) => items.iter().any(|item| json_eq(item, expected)),
                    other => json_eq(other, expected),
                },
                Predicate::Range(bounds) => value.as_f64().is_some_and(|x| bounds.contains(x)),
                Predicate::Any(candidates) => match value {
                    Value::Array(items) => items
                        .iter()
                        .any(|item| candidates.iter().any(|c| json_eq(item, c))),
                    other => candidates.iter().any(|c| json_eq(other, c)),
                },
                Predicate::All(required) => match value {
                    Value::Array(items) => required
                        .iter()
                        .all(|r| items.iter().any(|item| json_eq(item, r))),
                    other => required.iter().all(|r| json_eq(other, r)),
                },
            }
        })
    }
}

impl TryFrom<Value> for SearchFilters {
    type Error = VectorStoreError;

    fn try_from(value: Value) -> Result<Self> {
        Self::from_value(&value)
    }
}

impl<'de> Deserialize<'de> for SearchFilters {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(&value).map_err(serde::de::Error::custom)
    }
}

fn parse_predicate(field: &str, condition: &Value) -> Result<Predicate> {
    let obj = match condition {
        Value::Object(obj) => obj,
        other => {
            ensure_scalar(field, other)?;
            return Ok(Predicate::Eq(other.clone()));
        }
    };

    if obj.is_empty() {
        return Err(VectorStoreError::Filter(format!(
            "empty predicate for field '{field}'"
        )));
    }

    if obj.keys().all(|k| RANGE_KEYS.contains(&k.as_str())) {
        let mut bounds = RangeBounds::default();
        for (op, v) in obj {
            let n = v.as_f64().ok_or_else(|| {
                VectorStoreError::Filter(format!(
                    "range bound '{op}' on field '{field}' must be a number, got {v}"
                ))
            })?;
            match op.as_str() {
                "gte" => bounds.gte = Some(n),
                "gt" => bounds.gt = Some(n),
                "lte" => bounds.lte = Some(n),
                _ => bounds.lt = Some(n),
            }
        }
        return Ok(Predicate::Range(bounds));
    }

    if obj.len() == 1 {
        if let Some(values) = obj.get("any") {
            return Ok(Predicate::Any(parse_value_list(field, "any", values)?));
        }
        if let Some(values) = obj.get("all") {
            return Ok(Predicate::All(parse_value_list(field, "all", values)?));
        }
    }

    let keys: Vec<&str> = obj.keys().map(String::as_str).collect();
    Err(VectorStoreError::Filter(format!(
        "unsupported predicate on field '{field}': {keys:?}"
    )))
}

fn parse_value_list(field: &str, op: &str, values: &Value) -> Result<Vec<Value>> {
    let items = values.as_array().ok_or_else(|| {
        VectorStoreError::Filter(format!("'{op}' on field '{field}' expects an array"))
    })?;
    if items.is_empty() {
        return Err(VectorStoreError::Filter(format!(
            "'{op}' on field '{field}' must list at least one value"
        )));
    }
    for item in items {
        ensure_scalar(field, item)?;
    }
    Ok(items.clone())
}

fn ensure_scalar(field: &str, value: &Value) -> Result<()> {
    match value {
        Value::String(_) | Value::Number(_) | Value::Bool(_) => Ok(()),
        other => Err(VectorStoreError::Filter(format!(
            "field '{field}' can only be compared with strings, numbers or booleans, got {other}"
        ))),
    }
}

/// Resolve a dotted path (`"a.b"`) inside a payload.
pub fn lookup_path<'a>(payload: &'a Payload, path: &str) -> Option<&'a Value> {
    if let Some(v) = payload.get(path) {
        return Some(v);
    }
    let mut parts = path.split('.');
    let mut current = payload.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

/// JSON equality that treats `1` and `1.0` as equal.
pub fn json_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// A backend-native filter produced by a [`FilterTranslator`].
#[derive(Debug, Clone, PartialEq)]
pub struct TranslatedFilter<T> {
    pub native: T,
    /// Set when an `all` predicate was degraded to matching its first value only.
    pub used_fallback: bool,
}

/// Converts abstract [`SearchFilters`] into one backend's native query shape.
pub trait FilterTranslator: Send + Sync {
    type Native;

    fn translate(&self, filters: &SearchFilters) -> Result<TranslatedFilter<Self::Native>>;
}
