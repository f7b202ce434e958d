//! HTTP transport.
//!
//! The dispatcher hands every request to a [`Transport`]. The default one is
//! backed by reqwest and interprets the merged options the way a
//! conventional HTTP client does (query encoding, form and multipart bodies,
//! proxies, TLS settings).

use crate::dispatch::Method;
use crate::error::BoxError;
use crate::given::{BasicAuth, ClientCert, TlsVerify};
use crate::response::CapturedResponse;
use crate::store::{keys, ConfigurationStore};
use reqwest::header::{HeaderName, HeaderValue};
use reqwest::{Certificate, Client, Identity, Proxy};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::Runtime;
use tracing::{debug, warn};
use url::Url;

/// Why a transport could not produce a response.
#[derive(Debug, Error)]
pub enum TransportFailure {
    /// An option value has the wrong shape for the transport.
    #[error("invalid value for option '{key}': {reason}")]
    InvalidOption { key: String, reason: String },

    /// Connection, DNS, TLS, timeout or I/O failure.
    #[error(transparent)]
    Network(BoxError),
}

impl TransportFailure {
    fn invalid(key: &str, reason: impl ToString) -> Self {
        Self::InvalidOption {
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<reqwest::Error> for TransportFailure {
    fn from(e: reqwest::Error) -> Self {
        Self::Network(Box::new(e))
    }
}

/// Sends one request and blocks until the whole response is captured.
pub trait Transport {
    fn send(
        &mut self,
        method: Method,
        url: &Url,
        options: &ConfigurationStore,
    ) -> Result<CapturedResponse, TransportFailure>;

    /// Release pooled connections. The transport stays usable.
    fn close(&mut self);
}

const CLIENT_KEYS: [&str; 4] = [keys::PROXIES, keys::VERIFY, keys::CERT, keys::ALLOW_REDIRECTS];

const REQUEST_KEYS: [&str; 9] = [
    keys::PARAMS,
    keys::DATA,
    keys::JSON,
    keys::HEADERS,
    keys::COOKIES,
    keys::AUTH,
    keys::FILES,
    keys::STREAM,
    keys::TIMEOUT,
];

/// Options that shape the client itself rather than a single request.
#[derive(Debug, Clone, PartialEq)]
struct ClientSettings {
    proxies: Vec<(String, String)>,
    verify: TlsVerify,
    cert: Option<ClientCert>,
    allow_redirects: bool,
}

impl ClientSettings {
    fn from_options(options: &ConfigurationStore) -> Result<Self, TransportFailure> {
        let proxies = match options.get(keys::PROXIES) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Object(map)) => map
                .iter()
                .map(|(scheme, url)| Ok((scheme.clone(), scalar(keys::PROXIES, url)?)))
                .collect::<Result<_, TransportFailure>>()?,
            Some(other) => return Err(TransportFailure::invalid(keys::PROXIES, expected("mapping", other))),
        };

        Ok(Self {
            proxies,
            verify: typed(options, keys::VERIFY)?.unwrap_or(TlsVerify::Toggle(true)),
            cert: typed(options, keys::CERT)?,
            allow_redirects: typed(options, keys::ALLOW_REDIRECTS)?.unwrap_or(true),
        })
    }

    fn build(&self) -> Result<Client, TransportFailure> {
        let mut builder = Client::builder().user_agent(concat!("rest-in-rust/", env!("CARGO_PKG_VERSION")));

        for (scheme, url) in &self.proxies {
            let proxy = match scheme.as_str() {
                "http" => Proxy::http(url.as_str()),
                "https" => Proxy::https(url.as_str()),
                "all" => Proxy::all(url.as_str()),
                other => {
                    return Err(TransportFailure::invalid(
                        keys::PROXIES,
                        format!("unsupported proxy scheme '{other}' (use http, https or all)"),
                    ))
                }
            }
            .map_err(|e| TransportFailure::invalid(keys::PROXIES, e))?;
            builder = builder.proxy(proxy);
        }

        match &self.verify {
            TlsVerify::Toggle(true) => {}
            TlsVerify::Toggle(false) => builder = builder.danger_accept_invalid_certs(true),
            TlsVerify::CaBundle(path) => {
                let pem = std::fs::read(path).map_err(|e| TransportFailure::invalid(keys::VERIFY, e))?;
                let certs = Certificate::from_pem_bundle(&pem)
                    .map_err(|e| TransportFailure::invalid(keys::VERIFY, e))?;
                if certs.is_empty() {
                    return Err(TransportFailure::invalid(
                        keys::VERIFY,
                        format!("{} holds no certificates", path.display()),
                    ));
                }
                // The bundle replaces the built-in roots.
                builder = builder.tls_built_in_root_certs(false);
                for cert in certs {
                    builder = builder.add_root_certificate(cert);
                }
            }
        }

        if let Some(cert) = &self.cert {
            let pem = match cert {
                ClientCert::Pem(path) => {
                    std::fs::read(path).map_err(|e| TransportFailure::invalid(keys::CERT, e))?
                }
                ClientCert::Pair(cert, key) => {
                    let mut pem = std::fs::read(cert).map_err(|e| TransportFailure::invalid(keys::CERT, e))?;
                    pem.push(b'\n');
                    pem.extend(std::fs::read(key).map_err(|e| TransportFailure::invalid(keys::CERT, e))?);
                    pem
                }
            };
            let identity = Identity::from_pem(&pem).map_err(|e| TransportFailure::invalid(keys::CERT, e))?;
            builder = builder.identity(identity);
        }

        if !self.allow_redirects {
            builder = builder.redirect(reqwest::redirect::Policy::none());
        }

        Ok(builder.build()?)
    }
}

/// reqwest-backed transport with a synchronous interface.
///
/// The client (and its connection pool) is reused across calls until a
/// client-level option (`proxies`, `verify`, `cert`, `allow_redirects`)
/// changes. Called from async code, each request runs on a helper thread
/// with a one-off client instead.
#[derive(Default)]
pub struct ReqwestTransport {
    runtime: Option<Runtime>,
    session: Option<(ClientSettings, Client)>,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn client_for(&mut self, settings: ClientSettings) -> Result<Client, TransportFailure> {
        if let Some((current, client)) = &self.session {
            if *current == settings {
                return Ok(client.clone());
            }
        }
        debug!(?settings, "Building HTTP client");
        let client = settings.build()?;
        self.session = Some((settings, client.clone()));
        Ok(client)
    }

    fn runtime(&mut self) -> Result<&Runtime, TransportFailure> {
        let runtime = match self.runtime.take() {
            Some(runtime) => runtime,
            None => current_thread_runtime()?,
        };
        Ok(self.runtime.insert(runtime))
    }
}

impl Drop for ReqwestTransport {
    fn drop(&mut self) {
        // Dropping a runtime from async code panics; shutting down in the background does not.
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

fn current_thread_runtime() -> Result<Runtime, TransportFailure> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| TransportFailure::Network(Box::new(e)))
}

impl Transport for ReqwestTransport {
    fn send(
        &mut self,
        method: Method,
        url: &Url,
        options: &ConfigurationStore,
    ) -> Result<CapturedResponse, TransportFailure> {
        for (key, _) in options.iter() {
            if !CLIENT_KEYS.contains(&key) && !REQUEST_KEYS.contains(&key) {
                warn!(option = key, "Ignoring option the transport does not understand");
            }
        }

        let settings = ClientSettings::from_options(options)?;
        let stream: bool = typed(options, keys::STREAM)?.unwrap_or(false);

        if tokio::runtime::Handle::try_current().is_ok() {
            // Called from async code: block_on would panic here, so the
            // exchange runs on a helper thread with a runtime of its own.
            debug!("Inside a tokio runtime, sending from a helper thread");
            let client = settings.build()?;
            let request = build_request(&client, method, url, options)?;
            return std::thread::scope(|scope| {
                scope
                    .spawn(move || current_thread_runtime()?.block_on(exchange(request, stream)))
                    .join()
            })
            .map_err(|_| TransportFailure::Network("transport thread panicked".into()))?;
        }

        let client = self.client_for(settings)?;
        let request = build_request(&client, method, url, options)?;
        self.runtime()?.block_on(exchange(request, stream))
    }

    fn close(&mut self) {
        self.session = None;
    }
}

async fn exchange(
    request: reqwest::RequestBuilder,
    stream: bool,
) -> Result<CapturedResponse, TransportFailure> {
    let mut response = request.send().await?;

    let status = response.status().as_u16();
    // Header values that are not visible ASCII are dropped.
    let headers: Vec<(String, String)> = response
        .headers()
        .iter()
        .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
        .collect();

    let body = if stream {
        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            body.extend_from_slice(&chunk);
        }
        body
    } else {
        response.bytes().await?.to_vec()
    };

    Ok(CapturedResponse::new(status, headers, body))
}

fn build_request(
    client: &Client,
    method: Method,
    url: &Url,
    options: &ConfigurationStore,
) -> Result<reqwest::RequestBuilder, TransportFailure> {
    let mut url = url.clone();
    match options.get(keys::PARAMS) {
        None | Some(Value::Null) => {}
        Some(Value::String(raw)) => {
            let query = match url.query() {
                Some(existing) if !existing.is_empty() => format!("{existing}&{raw}"),
                _ => raw.clone(),
            };
            url.set_query(Some(&query));
        }
        Some(params) => {
            let pairs = pairs(keys::PARAMS, params)?;
            url.query_pairs_mut().extend_pairs(pairs);
        }
    }

    let mut request = client.request(method.into(), url);

    if let Some(headers) = options.get(keys::HEADERS).filter(|v| !v.is_null()) {
        for (name, value) in pairs(keys::HEADERS, headers)? {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| TransportFailure::invalid(keys::HEADERS, e))?;
            let value = HeaderValue::from_str(&value).map_err(|e| TransportFailure::invalid(keys::HEADERS, e))?;
            request = request.header(name, value);
        }
    }

    match options.get(keys::COOKIES) {
        None | Some(Value::Null) => {}
        Some(Value::String(raw)) => request = request.header(reqwest::header::COOKIE, raw.as_str()),
        Some(cookies) => {
            let header = pairs(keys::COOKIES, cookies)?
                .into_iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("; ");
            request = request.header(reqwest::header::COOKIE, header);
        }
    }

    if let Some(BasicAuth(username, password)) = typed(options, keys::AUTH)? {
        request = request.basic_auth(username, Some(password));
    }

    if let Some(seconds) = typed::<f64>(options, keys::TIMEOUT)? {
        let timeout = Duration::try_from_secs_f64(seconds).map_err(|e| TransportFailure::invalid(keys::TIMEOUT, e))?;
        request = request.timeout(timeout);
    }

    let files = match options.get(keys::FILES) {
        None | Some(Value::Null) => Vec::new(),
        Some(files) => pairs(keys::FILES, files)?,
    };

    let data = options.get(keys::DATA).filter(|v| !v.is_null());

    if !files.is_empty() {
        let mut form = reqwest::multipart::Form::new();
        if let Some(data) = data {
            for (name, value) in pairs(keys::DATA, data)? {
                form = form.text(name, value);
            }
        }
        for (field, path) in files {
            let bytes = std::fs::read(&path).map_err(|e| TransportFailure::invalid(keys::FILES, format!("{path}: {e}")))?;
            let file_name = std::path::Path::new(&path)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| field.clone());
            form = form.part(field, reqwest::multipart::Part::bytes(bytes).file_name(file_name));
        }
        request = request.multipart(form);
    } else if let Some(data) = data {
        request = match data {
            Value::String(raw) => request.body(raw.clone()),
            Value::Object(_) | Value::Array(_) => request.form(&pairs(keys::DATA, data)?),
            other => request.body(other.to_string()),
        };
    }

    if let Some(json) = options.get(keys::JSON).filter(|v| !v.is_null()) {
        request = request.json(json);
    }

    Ok(request)
}

/// Flatten a mapping (or list of `[key, value]` pairs) into string pairs.
///
/// Array values in a mapping repeat the key, as query strings conventionally do.
fn pairs(key: &str, value: &Value) -> Result<Vec<(String, String)>, TransportFailure> {
    let mut out = Vec::new();
    match value {
        Value::Object(map) => {
            for (name, value) in map {
                match value {
                    Value::Null => {}
                    Value::Array(items) => {
                        for item in items {
                            out.push((name.clone(), scalar(key, item)?));
                        }
                    }
                    other => out.push((name.clone(), scalar(key, other)?)),
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                match item {
                    Value::Array(pair) if pair.len() == 2 => {
                        out.push((scalar(key, &pair[0])?, scalar(key, &pair[1])?));
                    }
                    other => return Err(TransportFailure::invalid(key, expected("[key, value] pair", other))),
                }
            }
        }
        other => return Err(TransportFailure::invalid(key, expected("mapping", other))),
    }
    Ok(out)
}

fn scalar(key: &str, value: &Value) -> Result<String, TransportFailure> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(TransportFailure::invalid(key, expected("string, number or boolean", other))),
    }
}

fn typed<T: serde::de::DeserializeOwned>(
    options: &ConfigurationStore,
    key: &str,
) -> Result<Option<T>, TransportFailure> {
    match options.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => T::deserialize(value)
            .map(Some)
            .map_err(|e| TransportFailure::invalid(key, e)),
    }
}

fn expected(what: &str, found: &Value) -> String {
    format!("expected {what}, found {}", crate::matcher::kind(found))
}
