//! Rest in Rust
//!
//! A fluent given/when/then DSL for specifying an HTTP request, sending it
//! and verifying the response from test code.
//!
//! # Phases
//!
//! - **given**: [`given`] returns a [`Given`] builder that accumulates the
//!   request specification and mirrors each setting into a validated
//!   [`ConfigurationStore`].
//! - **when**: [`Given::when`] opens a transport and returns a [`When`]
//!   dispatcher with one method per HTTP verb. Per-call [`Overrides`] win
//!   over builder settings.
//! - **then**: [`When::then`] returns a [`Then`] evaluator over the last
//!   captured response. Every expectation returns `Result`, so `?` stops the
//!   chain at the first mismatch.
//!
//! # Example
//!
//! ```no_run
//! use rest_in_rust::{given, Overrides};
//! use serde_json::json;
//!
//! # fn main() -> rest_in_rust::Result<()> {
//! let mut when = given("https://jsonplaceholder.typicode.com")
//!     .headers(json!({"Accept": "application/json"}))
//!     .when()?;
//!
//! when.post("/posts", Overrides::new().json(json!({"title": "foo", "userId": 1})))?
//!     .then()?
//!     .status(201)?
//!     .json_path("$.title", "foo")?;
//! # Ok(())
//! # }
//! ```
//!
//! # Scenario files
//!
//! The `rip` binary runs the same chains from YAML:
//!
//! ```yaml
//! base_url: https://jsonplaceholder.typicode.com
//! scenarios:
//!   - name: single post
//!     request:
//!       endpoint: /posts/1
//!     expect:
//!       status: 200
//!       json_contains:
//!         userId: 1
//! ```

pub mod dispatch;
pub mod error;
pub mod expect;
pub mod given;
pub mod logging;
pub mod matcher;
pub mod response;
pub mod runner;
pub mod scenario;
pub mod store;
pub mod transport;

pub use dispatch::{Method, Overrides, When};
pub use error::{Error, Result};
pub use expect::{JsonSchema, Model, Schema, Then};
pub use given::{given, BasicAuth, ClientCert, Given, RequestSpecification, TlsVerify};
pub use response::CapturedResponse;
pub use scenario::ScenarioFile;
pub use store::ConfigurationStore;
pub use transport::{ReqwestTransport, Transport, TransportFailure};
