//! The "then" phase: expectations over the captured response.
//!
//! Every expectation returns `Result<&Then>`, so a chain written with `?`
//! stops at the first mismatch.

use crate::error::{Error, Result};
use crate::matcher::{self, json_contains, json_path_matches};
use crate::response::CapturedResponse;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;

/// Something a JSON body can be validated against.
pub trait Schema {
    /// Check `value`, returning every violation found.
    fn check(&self, value: &Value) -> std::result::Result<(), Vec<String>>;

    /// Short description used in mismatch reports.
    fn describe(&self) -> String;
}

/// A JSON Schema document.
pub struct JsonSchema {
    document: Value,
    validator: jsonschema::Validator,
}

impl JsonSchema {
    /// Compile a schema document. Fails if the document is not a valid schema.
    pub fn new(document: Value) -> Result<Self> {
        let validator = jsonschema::validator_for(&document)
            .map_err(|e| Error::configuration("json_schema", e))?;
        Ok(Self { document, validator })
    }

    pub fn document(&self) -> &Value {
        &self.document
    }
}

impl fmt::Debug for JsonSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonSchema")
            .field("document", &self.document)
            .finish_non_exhaustive()
    }
}

impl Schema for JsonSchema {
    fn check(&self, value: &Value) -> std::result::Result<(), Vec<String>> {
        let violations: Vec<String> = self
            .validator
            .iter_errors(value)
            .map(|e| format!("{} at '{}'", e, e.instance_path))
            .collect();
        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }

    fn describe(&self) -> String {
        format!("body matching schema {}", self.document)
    }
}

/// Validates by deserializing into `T`.
pub struct Model<T>(PhantomData<fn() -> T>);

impl<T> Model<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for Model<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: DeserializeOwned> Schema for Model<T> {
    fn check(&self, value: &Value) -> std::result::Result<(), Vec<String>> {
        T::deserialize(value).map(drop).map_err(|e| vec![e.to_string()])
    }

    fn describe(&self) -> String {
        format!("body deserializable as {}", std::any::type_name::<T>())
    }
}

impl<F> Schema for F
where
    F: Fn(&Value) -> std::result::Result<(), String>,
{
    fn check(&self, value: &Value) -> std::result::Result<(), Vec<String>> {
        self(value).map_err(|e| vec![e])
    }

    fn describe(&self) -> String {
        "body accepted by custom validator".to_string()
    }
}

/// Expectation evaluator bound to one captured response.
#[derive(Debug, Clone, Copy)]
pub struct Then<'a> {
    response: &'a CapturedResponse,
}

impl<'a> Then<'a> {
    pub fn new(response: &'a CapturedResponse) -> Self {
        Self { response }
    }

    /// The response under test, for checks not covered below.
    pub fn response(&self) -> &'a CapturedResponse {
        self.response
    }

    pub fn status(&self, code: u16) -> Result<&Self> {
        let actual = self.response.status();
        if actual != code {
            return Err(Error::mismatch("status", code, actual));
        }
        Ok(self)
    }

    /// Status code in `200..=299`.
    pub fn status_ok(&self) -> Result<&Self> {
        if !self.response.is_success() {
            return Err(Error::mismatch("status_ok", "200..=299", self.response.status()));
        }
        Ok(self)
    }

    /// The full header map equals `expected`. Names compare case-insensitively.
    pub fn headers<K, V, I>(&self, expected: I) -> Result<&Self>
    where
        K: AsRef<str>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        let expected: BTreeMap<String, String> = expected
            .into_iter()
            .map(|(k, v)| (k.as_ref().to_ascii_lowercase(), v.into()))
            .collect();
        let actual = self.response.headers();
        if &expected != actual {
            return Err(Error::mismatch(
                "headers",
                format!("{expected:?}"),
                format!("{actual:?}"),
            ));
        }
        Ok(self)
    }

    /// A single header equals `value`.
    pub fn header(&self, name: &str, value: &str) -> Result<&Self> {
        let actual = self.response.header(name);
        if actual != Some(value) {
            return Err(Error::mismatch(
                format!("header({name})"),
                value,
                actual.unwrap_or("<absent>"),
            ));
        }
        Ok(self)
    }

    pub fn header_content_type(&self, value: &str) -> Result<&Self> {
        let actual = self.response.content_type();
        if actual != Some(value) {
            return Err(Error::mismatch(
                "header_content_type",
                value,
                actual.unwrap_or("<absent>"),
            ));
        }
        Ok(self)
    }

    /// The cookie jar equals `expected`.
    ///
    /// A string is compared with the serialized jar (`a=1; b=2`); a mapping
    /// must hold exactly the jar's cookies, in any order.
    pub fn cookies(&self, expected: impl Into<Value>) -> Result<&Self> {
        let expected = expected.into();
        let matched = match &expected {
            Value::String(serialized) => *serialized == self.response.cookie_string(),
            Value::Object(map) => {
                let jar = self.response.cookies();
                map.len() == jar.len()
                    && jar
                        .iter()
                        .all(|(name, value)| map.get(name).and_then(Value::as_str) == Some(value))
            }
            other => {
                return Err(Error::Usage(format!(
                    "cookies() expects a string or a mapping, got {}",
                    matcher::kind(other)
                )))
            }
        };
        if !matched {
            return Err(Error::mismatch(
                "cookies",
                expected,
                self.response.cookie_string(),
            ));
        }
        Ok(self)
    }

    pub fn cookie(&self, name: &str, value: &str) -> Result<&Self> {
        let actual = self.response.cookie(name);
        if actual != Some(value) {
            return Err(Error::mismatch(
                format!("cookie({name})"),
                value,
                actual.unwrap_or("<absent>"),
            ));
        }
        Ok(self)
    }

    pub fn body_equals(&self, text: &str) -> Result<&Self> {
        let actual = self.response.text();
        if actual != text {
            return Err(Error::mismatch("body_equals", text, actual));
        }
        Ok(self)
    }

    pub fn body_contains(&self, substring: &str) -> Result<&Self> {
        let actual = self.response.text();
        if !actual.contains(substring) {
            return Err(Error::mismatch("body_contains", substring, actual));
        }
        Ok(self)
    }

    /// Raw body bytes equal `bytes`.
    pub fn content(&self, bytes: impl AsRef<[u8]>) -> Result<&Self> {
        let expected = bytes.as_ref();
        let actual = self.response.bytes();
        if actual != expected {
            return Err(Error::mismatch(
                "content",
                format!("{expected:?}"),
                format!("{actual:?}"),
            ));
        }
        Ok(self)
    }

    pub fn json_equals(&self, expected: impl Into<Value>) -> Result<&Self> {
        let expected = expected.into();
        let actual = self.response.json()?;
        if *actual != expected {
            return Err(Error::mismatch("json_equals", expected, actual));
        }
        Ok(self)
    }

    /// The JSON body contains `subset`. See [`json_contains`].
    pub fn json_contains(&self, subset: impl Into<Value>) -> Result<&Self> {
        let subset = subset.into();
        let actual = self.response.json()?;
        if !json_contains(actual, &subset) {
            return Err(Error::mismatch("json_contains", subset, actual));
        }
        Ok(self)
    }

    /// The top-level JSON object has `key`.
    pub fn has_key(&self, key: &str) -> Result<&Self> {
        let object = self.object("has_key")?;
        if !object.contains_key(key) {
            return Err(Error::mismatch(
                "has_key",
                key,
                format!("keys {:?}", object.keys().collect::<Vec<_>>()),
            ));
        }
        Ok(self)
    }

    /// The top-level JSON object has `key` with exactly `value`.
    pub fn key_equals(&self, key: &str, value: impl Into<Value>) -> Result<&Self> {
        let expected = value.into();
        let object = self.object("key_equals")?;
        match object.get(key) {
            Some(actual) if *actual == expected => Ok(self),
            Some(actual) => Err(Error::mismatch(format!("key_equals({key})"), expected, actual)),
            None => Err(Error::mismatch(format!("key_equals({key})"), expected, "<absent>")),
        }
    }

    /// Every value matched by `expr` equals `expected`.
    ///
    /// An expression that matches nothing passes; use
    /// [`json_path_present`](Self::json_path_present) to require a match.
    pub fn json_path(&self, expr: &str, expected: impl Into<Value>) -> Result<&Self> {
        let expected = expected.into();
        let found = json_path_matches(self.response.json()?, expr)?;
        if let Some(wrong) = found.iter().find(|v| **v != expected) {
            return Err(Error::mismatch(format!("json_path({expr})"), expected, wrong));
        }
        Ok(self)
    }

    /// Like [`json_path`](Self::json_path), but at least one value must match.
    pub fn json_path_present(&self, expr: &str, expected: impl Into<Value>) -> Result<&Self> {
        let expected = expected.into();
        let found = json_path_matches(self.response.json()?, expr)?;
        if found.is_empty() {
            return Err(Error::mismatch(
                format!("json_path_present({expr})"),
                expected,
                "no matches",
            ));
        }
        self.json_path(expr, expected)
    }

    /// The JSON body conforms to `schema`.
    pub fn json_schema(&self, schema: &impl Schema) -> Result<&Self> {
        let actual = self.response.json()?;
        if let Err(violations) = schema.check(actual) {
            return Err(Error::mismatch(
                "json_schema",
                schema.describe(),
                violations.join("; "),
            ));
        }
        Ok(self)
    }

    fn object(&self, assertion: &str) -> Result<&'a Map<String, Value>> {
        let json = self.response.json()?;
        json.as_object().ok_or_else(|| {
            Error::mismatch(assertion, "JSON object", matcher::kind(json))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    fn json_response(status: u16, body: &str) -> CapturedResponse {
        CapturedResponse::new(status, [("Content-Type", "application/json")], body)
    }

    #[test]
    fn test_status() {
        let response = json_response(200, "{}");
        let then = Then::new(&response);
        then.status(200).unwrap().status_ok().unwrap();

        match then.status(201).unwrap_err() {
            Error::AssertionMismatch { expected, actual, .. } => {
                assert_eq!(expected, "201");
                assert_eq!(actual, "200");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_status_ok_rejects_non_success() {
        let response = json_response(500, "{}");
        assert!(Then::new(&response).status_ok().unwrap_err().is_mismatch());
    }

    #[test]
    fn test_headers() {
        let response = CapturedResponse::new(
            200,
            [("Content-Type", "application/json"), ("X-Request-Id", "7")],
            "{}",
        );
        let then = Then::new(&response);
        then.header_content_type("application/json")
            .unwrap()
            .header("x-request-id", "7")
            .unwrap()
            .headers([("content-type", "application/json"), ("X-Request-Id", "7")])
            .unwrap();

        assert!(then.headers([("content-type", "application/json")]).is_err());
        assert!(then.header_content_type("text/plain").is_err());
        assert!(then.header("x-missing", "1").is_err());
    }

    #[test]
    fn test_cookies() {
        let response = CapturedResponse::new(
            200,
            [("Set-Cookie", "a=1; Path=/"), ("Set-Cookie", "b=2")],
            "",
        );
        let then = Then::new(&response);
        then.cookies("a=1; b=2")
            .unwrap()
            .cookies(json!({"b": "2", "a": "1"}))
            .unwrap()
            .cookie("a", "1")
            .unwrap();

        assert!(then.cookies(json!({"a": "1"})).unwrap_err().is_mismatch());
        assert!(then.cookie("c", "3").is_err());
        assert!(matches!(then.cookies(json!(1)), Err(Error::Usage(_))));
    }

    #[test]
    fn test_body() {
        let response = CapturedResponse::new(200, [("Content-Type", "text/plain")], "hello world");
        let then = Then::new(&response);
        then.body_equals("hello world")
            .unwrap()
            .body_contains("lo wo")
            .unwrap()
            .content(b"hello world")
            .unwrap();

        assert!(then.body_equals("hello").is_err());
        assert!(then.body_contains("bye").is_err());
        assert!(then.content("hello").is_err());
    }

    #[test]
    fn test_json_expectations() {
        let response = json_response(200, r#"{"userId": 1, "id": 1, "tags": ["a"]}"#);
        let then = Then::new(&response);
        then.json_equals(json!({"userId": 1, "id": 1, "tags": ["a"]}))
            .unwrap()
            .json_contains(json!({"userId": 1}))
            .unwrap()
            .has_key("tags")
            .unwrap()
            .key_equals("id", 1)
            .unwrap();

        assert!(then.json_equals(json!({"userId": 1})).is_err());
        assert!(then.has_key("title").is_err());
        assert!(then.key_equals("id", 2).is_err());
        assert!(then.key_equals("title", "x").is_err());
    }

    #[test]
    fn test_json_contains_reports_both_sides() {
        let response = json_response(200, r#"{"a": 2}"#);
        match Then::new(&response).json_contains(json!({"a": 1})).unwrap_err() {
            Error::AssertionMismatch { expected, actual, .. } => {
                assert_eq!(expected, r#"{"a":1}"#);
                assert_eq!(actual, r#"{"a":2}"#);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_non_json_body_fails_on_json_access() {
        let response = CapturedResponse::new(200, [("Content-Type", "text/html")], "<html>");
        let then = Then::new(&response);
        then.status(200).unwrap().body_contains("html").unwrap();
        assert!(matches!(then.json_contains(json!({})), Err(Error::JsonParse(_))));
        assert!(matches!(then.has_key("a"), Err(Error::JsonParse(_))));
    }

    #[test]
    fn test_has_key_on_array_body() {
        let response = json_response(200, "[1, 2]");
        assert!(Then::new(&response).has_key("a").unwrap_err().is_mismatch());
    }

    #[test]
    fn test_json_path() {
        let response = json_response(200, r#"{"userId": 1, "id": 1}"#);
        let then = Then::new(&response);
        then.json_path("$.userId", 1).unwrap();
        assert!(then.json_path("$.userId", 2).unwrap_err().is_mismatch());
        assert!(matches!(then.json_path("$.a[", 1), Err(Error::PathQuery { .. })));
    }

    #[test]
    fn test_json_path_zero_matches_passes() {
        let response = json_response(200, "{}");
        let then = Then::new(&response);
        then.json_path("$.userId", 1).unwrap();
        assert!(then.json_path_present("$.userId", 1).unwrap_err().is_mismatch());
    }

    #[test]
    fn test_json_path_every_match_must_equal() {
        let response = json_response(200, r#"[{"userId": 1}, {"userId": 1}, {"userId": 2}]"#);
        let then = Then::new(&response);
        assert!(then.json_path("$[*].userId", 1).is_err());
        then.json_path_present("$[0].userId", 1).unwrap();
    }

    #[test]
    fn test_json_schema_document() {
        let schema = JsonSchema::new(json!({
            "type": "object",
            "required": ["userId", "id"],
            "properties": {
                "userId": {"type": "integer"},
                "id": {"type": "integer"}
            }
        }))
        .unwrap();

        let good = json_response(200, r#"{"userId": 1, "id": 1}"#);
        Then::new(&good).json_schema(&schema).unwrap();

        let bad = json_response(200, r#"{"userId": "one"}"#);
        assert!(Then::new(&bad).json_schema(&schema).unwrap_err().is_mismatch());
    }

    #[test]
    fn test_invalid_schema_document() {
        let err = JsonSchema::new(json!({"type": 12})).unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[test]
    fn test_json_schema_model() {
        #[derive(Deserialize)]
        #[allow(dead_code)]
        struct Post {
            #[serde(rename = "userId")]
            user_id: u32,
            id: u32,
        }

        let good = json_response(200, r#"{"userId": 1, "id": 1, "title": "x"}"#);
        Then::new(&good).json_schema(&Model::<Post>::new()).unwrap();

        let bad = json_response(200, r#"{"id": 1}"#);
        assert!(Then::new(&bad)
            .json_schema(&Model::<Post>::new())
            .unwrap_err()
            .is_mismatch());
    }

    #[test]
    fn test_json_schema_closure() {
        let positive_id = |value: &Value| match value["id"].as_i64() {
            Some(id) if id > 0 => Ok(()),
            _ => Err("id must be a positive integer".to_string()),
        };

        let good = json_response(200, r#"{"id": 3}"#);
        Then::new(&good).json_schema(&positive_id).unwrap();
        let bad = json_response(200, r#"{"id": -3}"#);
        assert!(Then::new(&bad).json_schema(&positive_id).is_err());
    }
}
