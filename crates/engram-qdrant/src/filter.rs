use engram_core::{
    FilterTranslator, Predicate, Result, SearchFilters, TranslatedFilter, VectorStoreError,
};
use serde_json::{json, Map, Value};

/// Translates [`SearchFilters`] into a Qdrant `{"must": [...]}` filter.
///
/// Qdrant supports "contains all" natively (one `match` condition per
/// value), so translation never falls back.
#[derive(Debug, Clone, Copy, Default)]
pub struct QdrantFilterTranslator;

impl FilterTranslator for QdrantFilterTranslator {
    type Native = Value;

    fn translate(&self, filters: &SearchFilters) -> Result<TranslatedFilter<Value>> {
        filters.validate()?;

        let mut must = Vec::new();
        for clause in filters.clauses() {
            let key = &clause.field;
            match &clause.predicate {
                // `match` only handles keywords, integers and booleans.
                Predicate::Eq(v) if is_float(v) => {
                    must.push(json!({"key": key, "range": {"gte": v, "lte": v}}));
                }
                Predicate::Eq(v) => must.push(json!({"key": key, "match": {"value": v}})),
                Predicate::Range(bounds) => {
                    let range: Map<String, Value> = bounds
                        .bounds()
                        .into_iter()
                        .map(|(op, v)| (op.to_string(), json!(v)))
                        .collect();
                    must.push(json!({"key": key, "range": range}));
                }
                Predicate::Any(values) => {
                    reject_floats(key, "any", values)?;
                    must.push(json!({"key": key, "match": {"any": values}}));
                }
                Predicate::All(values) => {
                    reject_floats(key, "all", values)?;
                    for v in values {
                        must.push(json!({"key": key, "match": {"value": v}}));
                    }
                }
            }
        }

        Ok(TranslatedFilter {
            native: json!({ "must": must }),
            used_fallback: false,
        })
    }
}

fn is_float(value: &Value) -> bool {
    matches!(value, Value::Number(n) if !n.is_i64() && !n.is_u64())
}

fn reject_floats(field: &str, op: &str, values: &[Value]) -> Result<()> {
    if values.iter().any(is_float) {
        return Err(VectorStoreError::Filter(format!(
            "qdrant cannot match float values with '{op}' on field '{field}'"
        )));
    }
    Ok(())
}
