//! Error types shared by every phase of a chain.

use crate::dispatch::Method;
use thiserror::Error;

/// Boxed cause carried by transport failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Everything that can abort a given/when/then chain.
#[derive(Debug, Error)]
pub enum Error {
    /// An option key or value was rejected before it reached the store.
    #[error("invalid option '{key}': {reason}")]
    Configuration { key: String, reason: String },

    /// The request never produced a response.
    #[error("{method} {url} failed: {source}")]
    Transport {
        method: Method,
        url: String,
        #[source]
        source: BoxError,
    },

    /// The chain was used in an order or combination that cannot work.
    #[error("usage error: {0}")]
    Usage(String),

    /// An expectation did not hold.
    #[error("expectation `{assertion}` failed\n  expected: {expected}\n    actual: {actual}")]
    AssertionMismatch {
        assertion: String,
        expected: String,
        actual: String,
    },

    /// The response body was needed as JSON but is not valid JSON.
    #[error("response body is not valid JSON: {0}")]
    JsonParse(String),

    /// A JSONPath expression could not be parsed.
    #[error("invalid JSONPath expression '{expr}': {reason}")]
    PathQuery { expr: String, reason: String },

    /// The base URL or endpoint could not be turned into a request URL.
    #[error("cannot resolve '{endpoint}' against '{base}': {reason}")]
    Url {
        base: String,
        endpoint: String,
        reason: String,
    },
}

impl Error {
    pub(crate) fn configuration(key: impl Into<String>, reason: impl ToString) -> Self {
        Self::Configuration {
            key: key.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn mismatch(
        assertion: impl Into<String>,
        expected: impl ToString,
        actual: impl ToString,
    ) -> Self {
        Self::AssertionMismatch {
            assertion: assertion.into(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Whether this error is a failed expectation rather than a setup problem.
    pub fn is_mismatch(&self) -> bool {
        matches!(self, Self::AssertionMismatch { .. })
    }
}
