//! Typed errors for the aggregation pipeline.
//!
//! Library code returns these; `anyhow` is reserved for the binaries and config loading.

use std::time::Duration;
use thiserror::Error;

/// Provider call failed. Never escapes an adapter: it is logged and turned into an
/// empty result at the adapter boundary.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request to {url} failed: {reason}")]
    Request { url: String, reason: String },

    #[error("{url} responded with status {status}")]
    Status { url: String, status: u16, body: String },

    #[error("malformed response from {url}: {reason}")]
    Malformed { url: String, reason: String },
}

/// One article rejected by the processor. The rest of the batch carries on.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid url: {0:?}")]
    InvalidUrl(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("an article with fingerprint {0} already exists")]
    DuplicateFingerprint(String),

    #[error("article {0} not found")]
    NotFound(u64),

    #[error("transaction already closed")]
    TransactionClosed,
}

#[derive(Debug, Error)]
pub enum AggregatorError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("source {name} timed out after {after:?}")]
    Timeout { name: String, after: Duration },

    #[error("rate limit exceeded for {name} ({limit} requests per day)")]
    RateLimited { name: String, limit: u32 },

    #[error("unknown source: {0}")]
    UnknownSource(String),

    #[error("adapter {name} failed: {reason}")]
    Adapter { name: String, reason: String },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("aggregate operation cancelled")]
    Cancelled,
}

impl AggregatorError {
    pub fn adapter(name: impl Into<String>, reason: impl ToString) -> Self {
        Self::Adapter {
            name: name.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T, E = AggregatorError> = std::result::Result<T, E>;
