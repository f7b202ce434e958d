//! The "when" phase: dispatching requests.

use crate::error::{Error, Result};
use crate::expect::Then;
use crate::given::{BasicAuth, ClientCert, TlsVerify};
use crate::response::CapturedResponse;
use crate::store::{keys, ConfigurationStore};
use crate::transport::{Transport, TransportFailure};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, info_span, Span};
use url::Url;

/// HTTP request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
    Trace,
    Connect,
}

impl Method {
    pub const ALL: [Method; 9] = [
        Method::Get,
        Method::Post,
        Method::Put,
        Method::Delete,
        Method::Patch,
        Method::Head,
        Method::Options,
        Method::Trace,
        Method::Connect,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Patch => "PATCH",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
            Method::Trace => "TRACE",
            Method::Connect => "CONNECT",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Method::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::Usage(format!("unknown HTTP method '{s}'")))
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
            Method::Patch => reqwest::Method::PATCH,
            Method::Head => reqwest::Method::HEAD,
            Method::Options => reqwest::Method::OPTIONS,
            Method::Trace => reqwest::Method::TRACE,
            Method::Connect => reqwest::Method::CONNECT,
        }
    }
}

/// Per-call option overrides.
///
/// Applied after the options accumulated by [`Given`](crate::Given), so a key
/// set here wins over the same key set earlier in the chain. Accepted
/// overrides are merged into the chain's store and persist for later calls;
/// a call rejected before sending leaves the store unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overrides {
    entries: Vec<(String, Value)>,
}

impl Overrides {
    pub fn new() -> Self {
        Self::default()
    }

    fn with(mut self, key: &str, value: Value) -> Self {
        self.entries.retain(|(k, _)| k != key);
        self.entries.push((key.to_string(), value));
        self
    }

    pub fn params(self, params: impl Into<Value>) -> Self {
        self.with(keys::PARAMS, params.into())
    }

    pub fn data(self, data: impl Into<Value>) -> Self {
        self.with(keys::DATA, data.into())
    }

    pub fn json(self, json: impl Into<Value>) -> Self {
        self.with(keys::JSON, json.into())
    }

    pub fn headers(self, headers: impl Into<Value>) -> Self {
        self.with(keys::HEADERS, headers.into())
    }

    pub fn cookies(self, cookies: impl Into<Value>) -> Self {
        self.with(keys::COOKIES, cookies.into())
    }

    pub fn files(self, files: impl Into<Value>) -> Self {
        self.with(keys::FILES, files.into())
    }

    pub fn proxies(self, proxies: impl Into<Value>) -> Self {
        self.with(keys::PROXIES, proxies.into())
    }

    pub fn auth(self, auth: BasicAuth) -> Self {
        self.with(keys::AUTH, Value::from(&auth))
    }

    pub fn stream(self, stream: bool) -> Self {
        self.with(keys::STREAM, Value::Bool(stream))
    }

    pub fn verify(self, verify: TlsVerify) -> Self {
        self.with(keys::VERIFY, Value::from(&verify))
    }

    pub fn cert(self, cert: ClientCert) -> Self {
        self.with(keys::CERT, Value::from(&cert))
    }

    /// Timeout for the whole request, in seconds.
    pub fn timeout(self, seconds: f64) -> Self {
        self.with(keys::TIMEOUT, Value::from(seconds))
    }

    pub fn allow_redirects(self, allow: bool) -> Self {
        self.with(keys::ALLOW_REDIRECTS, Value::Bool(allow))
    }

    /// Any other option. The key is validated when the overrides are applied.
    pub fn option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        self.entries.retain(|(k, _)| *k != key);
        self.entries.push((key, value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_entries(self) -> Vec<(String, Value)> {
        self.entries
    }
}

/// Join an endpoint onto a base URL with standard relative-reference rules.
///
/// `/posts` replaces the base path; `posts` is resolved against the base
/// path's last `/`. Without a base URL the endpoint must be absolute.
pub fn resolve_url(base: Option<&Url>, endpoint: &str) -> Result<Url> {
    let resolved = match base {
        Some(base) => base.join(endpoint),
        None => Url::parse(endpoint),
    };
    resolved.map_err(|e| Error::Url {
        base: base.map(Url::to_string).unwrap_or_default(),
        endpoint: endpoint.to_string(),
        reason: e.to_string(),
    })
}

/// Request dispatcher for one chain.
///
/// Owns the chain's option store and transport session. Each verb merges its
/// overrides into the store, sends the request and replaces the captured
/// response.
pub struct When<T> {
    base_url: Option<Url>,
    store: ConfigurationStore,
    transport: T,
    response: Option<CapturedResponse>,
    span: Span,
}

impl<T> fmt::Debug for When<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("When")
            .field("base_url", &self.base_url.as_ref().map(Url::as_str))
            .field("store", &self.store)
            .field("response", &self.response)
            .finish_non_exhaustive()
    }
}

impl<T: Transport> When<T> {
    pub(crate) fn new(base_url: Option<&str>, store: ConfigurationStore, transport: T) -> Result<Self> {
        let base_url = base_url
            .map(|base| {
                Url::parse(base).map_err(|e| Error::Url {
                    base: base.to_string(),
                    endpoint: String::new(),
                    reason: e.to_string(),
                })
            })
            .transpose()?;

        let span = info_span!(
            "dispatcher",
            base_url = base_url.as_ref().map(Url::as_str).unwrap_or("")
        );

        Ok(Self {
            base_url,
            store,
            transport,
            response: None,
            span,
        })
    }

    pub fn get(&mut self, endpoint: &str, overrides: impl Into<Option<Overrides>>) -> Result<&mut Self> {
        self.request(Method::Get, endpoint, overrides)
    }

    pub fn post(&mut self, endpoint: &str, overrides: impl Into<Option<Overrides>>) -> Result<&mut Self> {
        self.request(Method::Post, endpoint, overrides)
    }

    pub fn put(&mut self, endpoint: &str, overrides: impl Into<Option<Overrides>>) -> Result<&mut Self> {
        self.request(Method::Put, endpoint, overrides)
    }

    pub fn delete(&mut self, endpoint: &str, overrides: impl Into<Option<Overrides>>) -> Result<&mut Self> {
        self.request(Method::Delete, endpoint, overrides)
    }

    pub fn patch(&mut self, endpoint: &str, overrides: impl Into<Option<Overrides>>) -> Result<&mut Self> {
        self.request(Method::Patch, endpoint, overrides)
    }

    pub fn head(&mut self, endpoint: &str, overrides: impl Into<Option<Overrides>>) -> Result<&mut Self> {
        self.request(Method::Head, endpoint, overrides)
    }

    pub fn options(&mut self, endpoint: &str, overrides: impl Into<Option<Overrides>>) -> Result<&mut Self> {
        self.request(Method::Options, endpoint, overrides)
    }

    pub fn trace(&mut self, endpoint: &str, overrides: impl Into<Option<Overrides>>) -> Result<&mut Self> {
        self.request(Method::Trace, endpoint, overrides)
    }

    pub fn connect(&mut self, endpoint: &str, overrides: impl Into<Option<Overrides>>) -> Result<&mut Self> {
        self.request(Method::Connect, endpoint, overrides)
    }

    /// Send a request with any method.
    pub fn request(
        &mut self,
        method: Method,
        endpoint: &str,
        overrides: impl Into<Option<Overrides>>,
    ) -> Result<&mut Self> {
        let span = self.span.clone();
        let _entered = span.enter();

        self.response = None;

        // Overrides are merged into a copy and committed only once accepted.
        let mut merged = self.store.copy();
        if let Some(overrides) = overrides.into() {
            merged.update(overrides.into_entries())?;
        }

        if merged.is_set(keys::DATA) && merged.is_set(keys::JSON) {
            return Err(Error::Usage(
                "both 'data' and 'json' bodies are set; a request can carry only one".to_string(),
            ));
        }
        self.store = merged;

        let url = resolve_url(self.base_url.as_ref(), endpoint)?;
        info!(%method, %url, options = ?self.store, "Sending request");

        let response = self
            .transport
            .send(method, &url, &self.store)
            .map_err(|failure| match failure {
                TransportFailure::InvalidOption { key, reason } => Error::Configuration { key, reason },
                TransportFailure::Network(source) => Error::Transport {
                    method,
                    url: url.to_string(),
                    source,
                },
            })?;

        if !response.is_success() {
            debug!(
                status = response.status(),
                body = response.text(),
                "Response status outside 200-299"
            );
        }

        self.response = Some(response);
        Ok(self)
    }

    /// Move on to verifying the last captured response.
    pub fn then(&self) -> Result<Then<'_>> {
        self.response
            .as_ref()
            .map(Then::new)
            .ok_or_else(|| Error::Usage("then() called before any request was sent".to_string()))
    }

    /// Release the transport's pooled connections.
    pub fn close(&mut self) -> &mut Self {
        self.transport.close();
        self
    }

    /// Drop every accumulated option.
    pub fn clear(&mut self) -> &mut Self {
        self.store.clear();
        self
    }

    /// An independent copy of the accumulated options.
    pub fn copy(&self) -> ConfigurationStore {
        self.store.copy()
    }

    pub fn store(&self) -> &ConfigurationStore {
        &self.store
    }

    pub fn base_url(&self) -> Option<&Url> {
        self.base_url.as_ref()
    }

    pub fn response(&self) -> Option<&CapturedResponse> {
        self.response.as_ref()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }
}
