//! JSON matching logic.
//!
//! Structural containment and JSONPath evaluation over response bodies.

use crate::error::{Error, Result};
use jsonpath_rust::JsonPath;
use serde_json::Value;

/// Whether `subset` is contained in `actual`.
///
/// Every key of a `subset` object must be present in `actual` with a value
/// that is itself contained; extra keys in `actual` are ignored. Anything
/// other than an object (arrays included) must be exactly equal. At the top
/// level, an object subset is also contained in an array that has a
/// containing element.
pub fn json_contains(actual: &Value, subset: &Value) -> bool {
    match (actual, subset) {
        (Value::Array(items), Value::Object(_)) => {
            items.iter().any(|item| object_contains(item, subset))
        }
        _ => object_contains(actual, subset),
    }
}

fn object_contains(actual: &Value, subset: &Value) -> bool {
    match (actual, subset) {
        (Value::Object(actual), Value::Object(subset)) => subset.iter().all(|(key, expected)| {
            actual
                .get(key)
                .is_some_and(|value| object_contains(value, expected))
        }),
        _ => actual == subset,
    }
}

/// Evaluate a JSONPath expression, returning every matched value.
///
/// An empty expression matches nothing.
pub fn json_path_matches(json: &Value, expr: &str) -> Result<Vec<Value>> {
    if expr.trim().is_empty() {
        return Ok(Vec::new());
    }

    let path: JsonPath = JsonPath::try_from(expr).map_err(|e| Error::PathQuery {
        expr: expr.to_string(),
        reason: e.to_string(),
    })?;

    Ok(match path.find(json) {
        Value::Array(found) => found,
        Value::Null => Vec::new(),
        other => vec![other],
    })
}

/// Short description of a JSON value's kind for mismatch reports.
pub(crate) fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
