use std::sync::Arc;

use engram_core::{
    FilterTranslator, FlatPayloadCodec, PayloadCodec, Predicate, Result, SearchFilters,
    TranslatedFilter,
};
use serde_json::{json, Map, Value};

/// Translates [`SearchFilters`] into a Pinecone metadata filter.
///
/// `$eq` and `$in` match list fields that contain the value. There is no
/// "contains all" operator, so `all` falls back to its first value.
pub struct PineconeFilterTranslator {
    codec: Arc<dyn PayloadCodec>,
}

impl PineconeFilterTranslator {
    pub fn new(codec: Arc<dyn PayloadCodec>) -> Self {
        Self { codec }
    }
}

impl Default for PineconeFilterTranslator {
    fn default() -> Self {
        Self::new(Arc::new(
            FlatPayloadCodec::default().with_native_string_lists(true),
        ))
    }
}

impl FilterTranslator for PineconeFilterTranslator {
    type Native = Value;

    fn translate(&self, filters: &SearchFilters) -> Result<TranslatedFilter<Value>> {
        filters.validate()?;

        let mut used_fallback = false;
        let mut clauses = Vec::new();
        for clause in filters.clauses() {
            let field = self.codec.field_name(&clause.field);
            let condition = match &clause.predicate {
                Predicate::Eq(v) => json!({ "$eq": v }),
                Predicate::Range(bounds) => {
                    let ops: Map<String, Value> = bounds
                        .bounds()
                        .into_iter()
                        .map(|(op, v)| (format!("${op}"), json!(v)))
                        .collect();
                    Value::Object(ops)
                }
                Predicate::Any(values) => json!({ "$in": values }),
                Predicate::All(values) => {
                    used_fallback = true;
                    json!({ "$eq": values[0] })
                }
            };
            clauses.push(json!({ field: condition }));
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
