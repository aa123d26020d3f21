// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod api;
pub mod articles;
pub mod bootstrap;
pub mod cache;
pub mod config;
pub mod error;
pub mod ingest;
pub mod metrics;
pub mod store;

// ---- Re-exports for stable public API ----
pub use crate::api::router;
pub use crate::bootstrap::AppRuntime;
pub use crate::error::{AggregatorError, Result};
pub use crate::ingest::{Aggregator, AggregatorSettings, ArticleRecord, NewsSourceAdapter};
