//! Payload codecs.
//!
//! Backends with rich JSON metadata store payloads unchanged
//! ([`IdentityCodec`]). Backends whose metadata only accepts flat scalar
//! values use [`FlatPayloadCodec`], which encodes as follows:
//!
//! | Payload value | Stored as |
//! |---------------|-----------|
//! | bool / number / plain string | unchanged |
//! | array of strings without the delimiter | `"__list__:a|b|c"` |
//! | object whose values are scalars or string arrays | one field per key, `parent_child` |
//! | anything else (null, mixed arrays, deeper nesting) | `"__json__:<json>"` |
//!
//! Flattened parents are recorded in the reserved `__nested__` field so that
//! decoding can rebuild them exactly.
//!
//! With membership markers enabled, every scalar element of a stored array
//! also gets a boolean field `<field>__has__<element>`, where the element is
//! rendered as JSON (`tags__has__"rust"`, `scores__has__3`). Backends without
//! an array-contains operator match list membership through these fields.

use serde_json::Value;

use crate::{Payload, Result, VectorStoreError};

pub const JSON_TAG: &str = "__json__:";
pub const LIST_TAG: &str = "__list__:";
pub const NESTED_KEYS_FIELD: &str = "__nested__";
pub const MEMBER_TAG: &str = "__has__";

/// Converts payloads to and from the metadata shape a backend accepts.
pub trait PayloadCodec: Send + Sync {
    fn encode(&self, payload: &Payload) -> Result<Payload>;

    fn decode(&self, metadata: &Payload) -> Result<Payload>;

    /// Name of the stored metadata field a dotted payload path ends up in.
    fn field_name(&self, path: &str) -> String {
        path.to_string()
    }

    /// Name of the marker field set when the array at `path` holds `value`,
    /// or `None` if the codec writes no such markers.
    fn member_field(&self, _path: &str, _value: &Value) -> Option<String> {
        None
    }
}

/// Stores payloads unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityCodec;

impl PayloadCodec for IdentityCodec {
    fn encode(&self, payload: &Payload) -> Result<Payload> {
        Ok(payload.clone())
    }

    fn decode(&self, metadata: &Payload) -> Result<Payload> {
        Ok(metadata.clone())
    }
}

/// Flattens nested payloads into scalar-only metadata.
#[derive(Debug, Clone)]
pub struct FlatPayloadCodec {
    separator: String,
    delimiter: String,
    native_string_lists: bool,
    membership_markers: bool,
}

impl Default for FlatPayloadCodec {
    fn default() -> Self {
        Self {
            separator: "_".to_string(),
            delimiter: "|".to_string(),
            native_string_lists: false,
            membership_markers: false,
        }
    }
}

impl FlatPayloadCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Separator used to join a parent key and a child key.
    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    /// Delimiter used to join string arrays.
    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = delimiter.into();
        self
    }

    /// Keep arrays of strings as native arrays (for backends that accept string lists).
    pub fn with_native_string_lists(mut self, enabled: bool) -> Self {
        self.native_string_lists = enabled;
        self
    }

    /// Write a `__has__` marker for every scalar element of stored arrays.
    pub fn with_membership_markers(mut self, enabled: bool) -> Self {
        self.membership_markers = enabled;
        self
    }

    fn tagged_json(value: &Value) -> Result<Value> {
        let json = serde_json::to_string(value)
            .map_err(|e| VectorStoreError::Codec(format!("JSON serialize error: {e}")))?;
        Ok(Value::String(format!("{JSON_TAG}{json}")))
    }

    fn is_scalar(value: &Value) -> bool {
        matches!(value, Value::Bool(_) | Value::Number(_) | Value::String(_))
    }

    fn encode_leaf(&self, value: &Value) -> Result<Value> {
        match value {
            Value::Bool(_) | Value::Number(_) => Ok(value.clone()),
            Value::String(s) if s.starts_with(JSON_TAG) || s.starts_with(LIST_TAG) => {
                Self::tagged_json(value)
            }
            Value::String(_) => Ok(value.clone()),
            Value::Array(items) => self.encode_array(value, items),
            Value::Null | Value::Object(_) => Self::tagged_json(value),
        }
    }

    fn encode_array(&self, original: &Value, items: &[Value]) -> Result<Value> {
        let strings: Option<Vec<&str>> = items.iter().map(Value::as_str).collect();
        match strings {
            Some(strings) if !strings.is_empty() => {
                if self.native_string_lists {
                    return Ok(original.clone());
                }
                if strings.iter().all(|s| !s.contains(&self.delimiter)) {
                    return Ok(Value::String(format!(
                        "{LIST_TAG}{}",
                        strings.join(&self.delimiter)
                    )));
                }
                Self::tagged_json(original)
            }
            _ => Self::tagged_json(original),
        }
    }

    /// A nested object is flattened only when every child is a scalar or a
    /// scalar array and no sibling key could be mistaken for one of its children.
    fn can_flatten(&self, key: &str, child: &serde_json::Map<String, Value>, payload: &Payload) -> bool {
        if child.is_empty() {
            return false;
        }
        let shallow = child.values().all(|v| match v {
            Value::Array(items) => items.iter().all(Self::is_scalar),
            other => Self::is_scalar(other),
        });
        if !shallow {
            return false;
        }
        let prefix = format!("{key}{}", self.separator);
        !payload.keys().any(|k| k != key && k.starts_with(&prefix))
    }

    /// Numbers render through `f64` so that `1` and `1.0` share a marker.
    fn member_token(value: &Value) -> Option<String> {
        match value {
            Value::String(_) | Value::Bool(_) => Some(value.to_string()),
            Value::Number(n) => n.as_f64().map(|f| f.to_string()),
            _ => None,
        }
    }

    fn insert_field(&self, out: &mut Payload, key: String, value: &Value) -> Result<()> {
        if self.membership_markers {
            if key.contains(MEMBER_TAG) {
                return Err(VectorStoreError::Codec(format!(
                    "payload key '{key}' contains the reserved '{MEMBER_TAG}' marker"
                )));
            }
            if let Value::Array(items) = value {
                for token in items.iter().filter_map(Self::member_token) {
                    out.insert(format!("{key}{MEMBER_TAG}{token}"), Value::Bool(true));
                }
            }
        }
        out.insert(key, self.encode_leaf(value)?);
        Ok(())
    }

    fn decode_leaf(&self, value: &Value) -> Result<Value> {
        let Some(s) = value.as_str() else {
            return Ok(value.clone());
        };
        if let Some(json) = s.strip_prefix(JSON_TAG) {
            return serde_json::from_str(json)
                .map_err(|e| VectorStoreError::Codec(format!("malformed tagged JSON field: {e}")));
        }
        if let Some(list) = s.strip_prefix(LIST_TAG) {
            return Ok(Value::Array(
                list.split(self.delimiter.as_str())
                    .map(|item| Value::String(item.to_string()))
                    .collect(),
            ));
        }
        Ok(value.clone())
    }
}

impl PayloadCodec for FlatPayloadCodec {
    fn encode(&self, payload: &Payload) -> Result<Payload> {
        if payload.contains_key(NESTED_KEYS_FIELD) {
            return Err(VectorStoreError::Codec(format!(
                "payload key '{NESTED_KEYS_FIELD}' is reserved"
            )));
        }

        let mut out = Payload::new();
        let mut roots: Vec<&str> = Vec::new();

        for (key, value) in payload {
            match value {
                Value::Object(child) if self.can_flatten(key, child, payload) => {
                    for (child_key, child_value) in child {
                        let field = format!("{key}{}{child_key}", self.separator);
                        self.insert_field(&mut out, field, child_value)?;
                    }
                    roots.push(key);
                }
                other => self.insert_field(&mut out, key.clone(), other)?,
            }
        }

        if !roots.is_empty() {
            let recorded = serde_json::to_string(&roots)
                .map_err(|e| VectorStoreError::Codec(format!("JSON serialize error: {e}")))?;
            out.insert(NESTED_KEYS_FIELD.to_string(), Value::String(recorded));
        }

        Ok(out)
    }

    fn decode(&self, metadata: &Payload) -> Result<Payload> {
        let mut roots: Vec<String> = match metadata.get(NESTED_KEYS_FIELD) {
            Some(Value::String(raw)) => serde_json::from_str(raw).map_err(|e| {
                VectorStoreError::Codec(format!("malformed '{NESTED_KEYS_FIELD}' field: {e}"))
            })?,
            Some(other) => {
                return Err(VectorStoreError::Codec(format!(
                    "'{NESTED_KEYS_FIELD}' must be a string, got {other}"
                )))
            }
            None => Vec::new(),
        };
        roots.sort_by_key(|r| std::cmp::Reverse(r.len()));

        let mut out = Payload::new();
        for (key, value) in metadata {
            if key == NESTED_KEYS_FIELD || (self.membership_markers && key.contains(MEMBER_TAG)) {
                continue;
            }
            let decoded = self.decode_leaf(value)?;
            let owner = roots.iter().find_map(|root| {
                key.strip_prefix(root.as_str())
                    .and_then(|rest| rest.strip_prefix(self.separator.as_str()))
                    .map(|child| (root, child))
            });
            match owner {
                Some((root, child)) => {
                    let entry = out
                        .entry(root.clone())
                        .or_insert_with(|| Value::Object(Default::default()));
                    if let Value::Object(map) = entry {
                        map.insert(child.to_string(), decoded);
                    }
                }
                None => {
                    out.insert(key.clone(), decoded);
                }
            }
        }
        Ok(out)
    }

    fn field_name(&self, path: &str) -> String {
        path.replace('.', &self.separator)
    }

    fn member_field(&self, path: &str, value: &Value) -> Option<String> {
        if !self.membership_markers {
            return None;
        }
        let token = Self::member_token(value)?;
        Some(format!("{}{MEMBER_TAG}{token}", self.field_name(path)))
    }
}
