//! The response captured by the last dispatched request.

use crate::error::{Error, Result};
use once_cell::sync::OnceCell;
use serde_json::Value;
use std::collections::BTreeMap;

/// Immutable snapshot of an HTTP response.
///
/// Header names are stored lower-cased; repeated headers are joined with
/// `", "`. The JSON body is parsed on first access, so a non-JSON body only
/// becomes an error when a JSON expectation asks for it.
#[derive(Debug, Clone)]
pub struct CapturedResponse {
    status: u16,
    headers: BTreeMap<String, String>,
    cookies: Vec<(String, String)>,
    bytes: Vec<u8>,
    text: String,
    json: OnceCell<Result<Value, String>>,
}

impl CapturedResponse {
    /// Build a response from raw header pairs and body bytes.
    ///
    /// Cookies are taken from `Set-Cookie` headers.
    pub fn new<K, V, I>(status: u16, headers: I, body: impl Into<Vec<u8>>) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut header_map: BTreeMap<String, String> = BTreeMap::new();
        let mut cookies = Vec::new();

        for (name, value) in headers {
            let name = name.as_ref().to_ascii_lowercase();
            let value = value.as_ref();
            if name == "set-cookie" {
                if let Some(cookie) = parse_set_cookie(value) {
                    cookies.retain(|(n, _): &(String, String)| *n != cookie.0);
                    cookies.push(cookie);
                }
            }
            header_map
                .entry(name)
                .and_modify(|existing| {
                    existing.push_str(", ");
                    existing.push_str(value);
                })
                .or_insert_with(|| value.to_string());
        }

        let bytes = body.into();
        let text = String::from_utf8_lossy(&bytes).into_owned();

        Self {
            status,
            headers: header_map,
            cookies,
            bytes,
            text,
            json: OnceCell::new(),
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    /// Whether the status code is in `200..=299`.
    pub fn is_success(&self) -> bool {
        (200..=299).contains(&self.status)
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Cookies set by the response, in the order they were received.
    pub fn cookies(&self) -> &[(String, String)] {
        &self.cookies
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// The cookie jar serialized as `name=value; name2=value2`.
    pub fn cookie_string(&self) -> String {
        self.cookies
            .iter()
            .map(|(n, v)| format!("{n}={v}"))
            .collect::<Vec<_>>()
            .join("; ")
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Body decoded as UTF-8, with invalid sequences replaced.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Body parsed as JSON. Parsed once; later calls reuse the result.
    pub fn json(&self) -> Result<&Value> {
        self.json
            .get_or_init(|| serde_json::from_slice(&self.bytes).map_err(|e| e.to_string()))
            .as_ref()
            .map_err(|e| Error::JsonParse(e.clone()))
    }
}

fn parse_set_cookie(header: &str) -> Option<(String, String)> {
    let pair = header.split(';').next()?;
    let (name, value) = pair.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), value.trim().trim_matches('"').to_string()))
}
