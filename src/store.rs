//! Validated option store.
//!
//! Holds the transmittable request options (`params`, `headers`, `json`, ...)
//! accumulated by a chain. Every write goes through the same validation, so
//! the transport only ever sees well-formed keys and JSON-representable values.

use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Option keys understood by the transport.
pub mod keys {
    pub const PARAMS: &str = "params";
    pub const DATA: &str = "data";
    pub const JSON: &str = "json";
    pub const HEADERS: &str = "headers";
    pub const COOKIES: &str = "cookies";
    pub const AUTH: &str = "auth";
    pub const FILES: &str = "files";
    pub const PROXIES: &str = "proxies";
    pub const STREAM: &str = "stream";
    pub const VERIFY: &str = "verify";
    pub const CERT: &str = "cert";
    pub const TIMEOUT: &str = "timeout";
    pub const ALLOW_REDIRECTS: &str = "allow_redirects";
}

static KEY_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

/// Key → value map of request options with last-write-wins semantics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigurationStore {
    entries: BTreeMap<String, Value>,
}

impl ConfigurationStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a store from a YAML mapping of option keys to values.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let entries: BTreeMap<String, Value> = serde_yaml::from_str(yaml)
            .map_err(|e| Error::configuration("<yaml>", e))?;
        let mut store = Self::new();
        store.update(entries)?;
        Ok(store)
    }

    /// Validate and merge entries. Later entries overwrite earlier ones.
    ///
    /// Nothing is written unless every entry is valid.
    pub fn update<K, V, I>(&mut self, entries: I) -> Result<()>
    where
        K: Into<String>,
        V: Serialize,
        I: IntoIterator<Item = (K, V)>,
    {
        let validated = entries
            .into_iter()
            .map(|(key, value)| validate(key.into(), &value))
            .collect::<Result<Vec<_>>>()?;
        self.entries.extend(validated);
        Ok(())
    }

    /// Validate and write a single entry.
    pub fn set(&mut self, key: impl Into<String>, value: impl Serialize) -> Result<()> {
        let (key, value) = validate(key.into(), &value)?;
        self.entries.insert(key, value);
        Ok(())
    }

    /// Write an already-JSON value under one of the fixed [`keys`].
    pub(crate) fn put(&mut self, key: &'static str, value: Value) {
        debug_assert!(KEY_PATTERN.is_match(key));
        self.entries.insert(key.to_string(), value);
    }

    /// Look up an entry.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Whether an entry exists and holds something other than null.
    pub fn is_set(&self, key: &str) -> bool {
        self.entries.get(key).is_some_and(|v| !v.is_null())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.entries.remove(key)
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// An independent store holding the same entries.
    pub fn copy(&self) -> Self {
        self.clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

fn validate(key: String, value: &impl Serialize) -> Result<(String, Value)> {
    if !KEY_PATTERN.is_match(&key) {
        return Err(Error::configuration(
            key,
            "key must be a non-empty identifier",
        ));
    }
    match serde_json::to_value(value) {
        Ok(value) => Ok((key, value)),
        Err(e) => Err(Error::configuration(
            key,
            format!("value is not a string, number, boolean, mapping, sequence or null ({e})"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn test_update_then_get_returns_value() {
        let mut store = ConfigurationStore::new();
        let values = [
            json!("text"),
            json!(42),
            json!(1.5),
            json!(true),
            json!({"a": 1}),
            json!([1, "two"]),
            Value::Null,
        ];
        for value in values {
            store.update([("params", value.clone())]).unwrap();
            assert_eq!(store.get("params"), Some(&value));
        }
    }

    #[test]
    fn test_unsupported_value_is_rejected() {
        let mut store = ConfigurationStore::new();
        let mut bad = HashMap::new();
        bad.insert((1, 2), "tuple keys cannot become JSON");

        let err = store.set("files", &bad).unwrap_err();
        match err {
            Error::Configuration { key, .. } => assert_eq!(key, "files"),
            other => panic!("unexpected error: {other}"),
        }
        assert!(store.is_empty());
    }

    #[test]
    fn test_invalid_key_is_rejected() {
        let mut store = ConfigurationStore::new();
        assert!(store.set("", 1).is_err());
        assert!(store.set("9lives", 1).is_err());
        assert!(store.set("has-dash", 1).is_err());
        assert!(store.set("allow_redirects", false).is_ok());
    }

    #[test]
    fn test_update_is_all_or_nothing() {
        let mut store = ConfigurationStore::new();
        let err = store.update([("params", json!({"a": 1})), ("", json!(2))]);
        assert!(err.is_err());
        assert!(store.get("params").is_none());
    }

    #[test]
    fn test_update_last_write_wins() {
        let mut store = ConfigurationStore::new();
        store.update([("params", json!({"a": 1}))]).unwrap();
        store.update([("params", json!({"a": 2}))]).unwrap();
        assert_eq!(store.get("params"), Some(&json!({"a": 2})));
    }

    #[test]
    fn test_clear_empties_store() {
        let mut store = ConfigurationStore::new();
        store.set("headers", json!({"X": "1"})).unwrap();
        store.set("stream", true).unwrap();
        store.clear();
        assert!(store.is_empty());
        store.clear();
        assert!(store.is_empty());
    }

    #[test]
    fn test_copy_is_independent() {
        let mut original = ConfigurationStore::new();
        original.set("params", json!({"a": 1})).unwrap();

        let mut copy = original.copy();
        copy.set("params", json!({"a": 2})).unwrap();
        copy.set("stream", true).unwrap();
        assert_eq!(original.get("params"), Some(&json!({"a": 1})));
        assert!(!original.contains("stream"));

        original.clear();
        assert_eq!(copy.len(), 2);
    }

    #[test]
    fn test_is_set_ignores_null() {
        let mut store = ConfigurationStore::new();
        store.set("data", Value::Null).unwrap();
        assert!(store.contains("data"));
        assert!(!store.is_set("data"));
    }

    #[test]
    fn test_from_yaml() {
        let yaml = r#"
headers:
  Accept: application/json
params:
  userId: 1
verify: false
"#;
        let store = ConfigurationStore::from_yaml(yaml).unwrap();
        assert_eq!(store.get("headers"), Some(&json!({"Accept": "application/json"})));
        assert_eq!(store.get("verify"), Some(&json!(false)));
        let keys: Vec<_> = store.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["headers", "params", "verify"]);
    }
}
