//! The "given" phase: accumulating a request specification.
//!
//! Every setter takes `impl Into<Option<T>>`. Passing `None` (or a JSON
//! null) means "not provided" and leaves both the specification field and
//! the mirrored store entry untouched; an explicit empty map or `false` is
//! stored as given.

use crate::dispatch::When;
use crate::error::Result;
use crate::store::{keys, ConfigurationStore};
use crate::transport::{ReqwestTransport, Transport};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Username/password pair sent as HTTP basic authentication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicAuth(pub String, pub String);

impl BasicAuth {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self(username.into(), password.into())
    }

    pub fn username(&self) -> &str {
        &self.0
    }

    pub fn password(&self) -> &str {
        &self.1
    }
}

/// TLS verification setting: a toggle, or a CA bundle to verify against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TlsVerify {
    /// Verify against the default roots (`true`) or not at all (`false`).
    Toggle(bool),
    /// Path to a PEM bundle of trusted CA certificates.
    CaBundle(PathBuf),
}

/// Client certificate used for mutual TLS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClientCert {
    /// A single PEM file holding the certificate chain and private key.
    Pem(PathBuf),
    /// Separate certificate and key files.
    Pair(PathBuf, PathBuf),
}

/// Everything the "given" phase has been told about the request.
///
/// `None` fields were never provided.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestSpecification {
    pub base_url: Option<String>,
    pub query_params: Option<Value>,
    pub body_data: Option<Value>,
    pub json_body: Option<Value>,
    pub headers: Option<Value>,
    pub cookies: Option<Value>,
    pub auth: Option<BasicAuth>,
    pub files: Option<Value>,
    pub proxies: Option<Value>,
    pub stream: Option<bool>,
    pub tls_verify: Option<TlsVerify>,
    pub client_cert: Option<ClientCert>,
}

/// Start a chain, optionally bound to a base URL.
///
/// ```no_run
/// use rest_in_rust::given;
/// use serde_json::json;
///
/// # fn main() -> rest_in_rust::Result<()> {
/// given("https://jsonplaceholder.typicode.com")
///     .headers(json!({"Content-Type": "application/json"}))
///     .params(json!({"userId": 1}))
///     .when()?
///     .get("/posts", None)?
///     .then()?
///     .status(200)?
///     .json_contains(json!({"userId": 1}))?;
/// # Ok(())
/// # }
/// ```
pub fn given<'a>(base_url: impl Into<Option<&'a str>>) -> Given {
    Given::new(base_url)
}

/// Specification builder for one chain.
#[derive(Debug, Clone, Default)]
pub struct Given {
    spec: RequestSpecification,
    store: ConfigurationStore,
}

macro_rules! value_setter {
    ($(#[$doc:meta])* $name:ident, $field:ident, $key:expr) => {
        $(#[$doc])*
        pub fn $name(mut self, value: impl Into<Option<Value>>) -> Self {
            if let Some(value) = value.into().filter(|v| !v.is_null()) {
                self.store.put($key, value.clone());
                self.spec.$field = Some(value);
            }
            self
        }
    };
}

impl Given {
    pub fn new<'a>(base_url: impl Into<Option<&'a str>>) -> Self {
        Self::default().base_url(base_url)
    }

    /// Base URL endpoints are resolved against. Not sent as an option.
    pub fn base_url<'a>(mut self, base_url: impl Into<Option<&'a str>>) -> Self {
        if let Some(base_url) = base_url.into() {
            self.spec.base_url = Some(base_url.to_string());
        }
        self
    }

    value_setter!(
        /// Query parameters: a mapping, a list of `[key, value]` pairs, or a raw query string.
        params, query_params, keys::PARAMS
    );
    value_setter!(
        /// Request body: a raw string, or a mapping sent form-encoded.
        data, body_data, keys::DATA
    );
    value_setter!(
        /// JSON request body.
        json_body, json_body, keys::JSON
    );
    value_setter!(headers, headers, keys::HEADERS);
    value_setter!(
        /// Cookies as a mapping or a `"a=1; b=2"` string.
        cookies, cookies, keys::COOKIES
    );
    value_setter!(
        /// Multipart uploads as a mapping of field name to file path.
        files, files, keys::FILES
    );
    value_setter!(
        /// Proxies as a mapping of scheme (`http`, `https`, `all`) to proxy URL.
        proxies, proxies, keys::PROXIES
    );

    pub fn auth(mut self, auth: impl Into<Option<BasicAuth>>) -> Self {
        if let Some(auth) = auth.into() {
            self.store.put(keys::AUTH, Value::from(&auth));
            self.spec.auth = Some(auth);
        }
        self
    }

    /// Read the response body in chunks (`true`) or in one piece.
    pub fn stream(mut self, stream: impl Into<Option<bool>>) -> Self {
        if let Some(stream) = stream.into() {
            self.store.put(keys::STREAM, Value::Bool(stream));
            self.spec.stream = Some(stream);
        }
        self
    }

    pub fn tls_verify(mut self, verify: impl Into<Option<TlsVerify>>) -> Self {
        if let Some(verify) = verify.into() {
            self.store.put(keys::VERIFY, Value::from(&verify));
            self.spec.tls_verify = Some(verify);
        }
        self
    }

    pub fn cert(mut self, cert: impl Into<Option<ClientCert>>) -> Self {
        if let Some(cert) = cert.into() {
            self.store.put(keys::CERT, Value::from(&cert));
            self.spec.client_cert = Some(cert);
        }
        self
    }

    /// Merge arbitrary transport options (e.g. `timeout`) into the store.
    pub fn extend_options<K, I>(mut self, entries: I) -> Result<Self>
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        self.store.update(entries)?;
        Ok(self)
    }

    pub fn specification(&self) -> &RequestSpecification {
        &self.spec
    }

    pub fn options(&self) -> &ConfigurationStore {
        &self.store
    }

    /// Finish the specification and open the default HTTP transport.
    pub fn when(self) -> Result<When<ReqwestTransport>> {
        self.when_with(ReqwestTransport::new())
    }

    /// Finish the specification using a caller-supplied transport.
    pub fn when_with<T: Transport>(self, transport: T) -> Result<When<T>> {
        When::new(self.spec.base_url.as_deref(), self.store, transport)
    }
}

fn path_value(path: &Path) -> Value {
    Value::from(path.to_string_lossy().into_owned())
}

impl From<&BasicAuth> for Value {
    fn from(auth: &BasicAuth) -> Self {
        Value::from(vec![auth.0.clone(), auth.1.clone()])
    }
}

impl From<&TlsVerify> for Value {
    fn from(verify: &TlsVerify) -> Self {
        match verify {
            TlsVerify::Toggle(on) => Value::Bool(*on),
            TlsVerify::CaBundle(path) => path_value(path),
        }
    }
}

impl From<&ClientCert> for Value {
    fn from(cert: &ClientCert) -> Self {
        match cert {
            ClientCert::Pem(path) => path_value(path),
            ClientCert::Pair(cert, key) => Value::Array(vec![path_value(cert), path_value(key)]),
        }
    }
}
