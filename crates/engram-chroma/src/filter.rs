use std::sync::Arc;

use engram_core::{
    FilterTranslator, FlatPayloadCodec, PayloadCodec, Predicate, Result, SearchFilters,
    TranslatedFilter,
};
use serde_json::{json, Value};

/// Translates [`SearchFilters`] into a Chroma `where` document.
///
/// Field paths are mapped through the store's codec so that nested payload
/// fields address their flattened metadata keys. Chroma metadata holds no
/// arrays, so membership in a list field is matched through the codec's
/// `__has__` marker fields. Without markers, `all` falls back to matching the
/// first value.
pub struct ChromaFilterTranslator {
    codec: Arc<dyn PayloadCodec>,
}

impl ChromaFilterTranslator {
    pub fn new(codec: Arc<dyn PayloadCodec>) -> Self {
        Self { codec }
    }
}

impl ChromaFilterTranslator {
    /// `field == value`, or the list at `path` contains `value`.
    fn equals_or_contains(&self, path: &str, field: &str, value: &Value) -> Value {
        let scalar = json!({ field: { "$eq": value } });
        match self.codec.member_field(path, value) {
            Some(marker) => json!({ "$or": [scalar, { marker: { "$eq": true } }] }),
            None => scalar,
        }
    }

    fn markers(&self, path: &str, values: &[Value]) -> Option<Vec<Value>> {
        values
            .iter()
            .map(|v| {
                self.codec
                    .member_field(path, v)
                    .map(|marker| json!({ marker: { "$eq": true } }))
            })
            .collect()
    }
}

impl Default for ChromaFilterTranslator {
    fn default() -> Self {
        Self::new(Arc::new(
            FlatPayloadCodec::default().with_membership_markers(true),
        ))
    }
}

impl FilterTranslator for ChromaFilterTranslator {
    type Native = Value;

    fn translate(&self, filters: &SearchFilters) -> Result<TranslatedFilter<Value>> {
        filters.validate()?;

        let mut used_fallback = false;
        let mut clauses = Vec::new();
        for clause in filters.clauses() {
            let field = self.codec.field_name(&clause.field);
            match &clause.predicate {
                Predicate::Eq(v) => clauses.push(self.equals_or_contains(&clause.field, &field, v)),
                // One operator per clause.
                Predicate::Range(bounds) => {
                    for (op, v) in bounds.bounds() {
                        clauses.push(json!({ field.clone(): { format!("${op}"): v } }));
                    }
                }
                Predicate::Any(values) => {
                    let scalar = json!({ field: { "$in": values } });
                    match self.markers(&clause.field, values) {
                        Some(mut alternatives) => {
                            alternatives.insert(0, scalar);
                            clauses.push(json!({ "$or": alternatives }));
                        }
                        None => clauses.push(scalar),
                    }
                }
                Predicate::All(values) => {
                    if self.markers(&clause.field, values).is_some() {
                        for v in values {
                            clauses.push(self.equals_or_contains(&clause.field, &field, v));
                        }
                    } else {
                        used_fallback = true;
                        clauses.push(json!({ field: { "$eq": values[0] } }));
                    }
                }
            }
        }

        let native = match clauses.len() {
            0 => json!({}),
            1 => clauses.remove(0),
            _ => json!({ "$and": clauses }),
        };
        Ok(TranslatedFilter {
            native,
            used_fallback,
        })
    }
}
