use engram_core::{
    FilterTranslator, Predicate, Result, SearchFilters, TranslatedFilter, VectorStoreError,
};
use serde_json::Value;

/// Name of the JSON field payloads are stored in.
pub(crate) const PAYLOAD_FIELD: &str = "payload";

/// Translates [`SearchFilters`] into a Milvus boolean expression over the
/// JSON payload field, e.g. `payload["kind"] == "fact" and payload["n"] >= 2`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MilvusFilterTranslator;

impl FilterTranslator for MilvusFilterTranslator {
    type Native = String;

    fn translate(&self, filters: &SearchFilters) -> Result<TranslatedFilter<String>> {
        filters.validate()?;

        let mut terms = Vec::new();
        for clause in filters.clauses() {
            let path = json_path(&clause.field)?;
            match &clause.predicate {
                // Equality also matches array fields that contain the value.
                Predicate::Eq(v) => {
                    let lit = literal(v)?;
                    terms.push(format!("({path} == {lit} or json_contains({path}, {lit}))"));
                }
                Predicate::Range(bounds) => {
                    for (op, v) in bounds.bounds() {
                        let symbol = match op {
                            "gte" => ">=",
                            "gt" => ">",
                            "lte" => "<=",
                            _ => "<",
                        };
                        terms.push(format!("{path} {symbol} {v}"));
                    }
                }
                Predicate::Any(values) => {
                    let list = literal_list(values)?;
                    terms.push(format!(
                        "({path} in {list} or json_contains_any({path}, {list}))"
                    ));
                }
                Predicate::All(values) => {
                    terms.push(format!("json_contains_all({path}, {})", literal_list(values)?));
                }
            }
        }

        Ok(TranslatedFilter {
            native: terms.join(" and "),
            used_fallback: false,
        })
    }
}

/// `"a.b"` becomes `payload["a"]["b"]`.
fn json_path(field: &str) -> Result<String> {
    let mut path = PAYLOAD_FIELD.to_string();
    for segment in field.split('.') {
        if segment.is_empty() {
            return Err(VectorStoreError::Filter(format!(
                "invalid field path '{field}'"
            )));
        }
        path.push('[');
        path.push_str(&literal(&Value::String(segment.to_string()))?);
        path.push(']');
    }
    Ok(path)
}

fn literal(value: &Value) -> Result<String> {
    serde_json::to_string(value)
        .map_err(|e| VectorStoreError::Filter(format!("cannot render filter value {value}: {e}")))
}

fn literal_list(values: &[Value]) -> Result<String> {
    let items = values.iter().map(literal).collect::<Result<Vec<_>>>()?;
    Ok(format!("[{}]", items.join(", ")))
}
