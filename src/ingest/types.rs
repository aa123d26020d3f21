// src/ingest/types.rs
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Open key/value map carried alongside every article.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Canonical article as produced by an adapter and cleaned by the processor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArticleRecord {
    pub title: String,
    pub description: Option<String>,
    pub content: Option<String>,
    pub author: Option<String>,
    pub source_name: String, // e.g. "NewsAPI", "guardian"
    pub source_id: String,
    pub category: Option<String>,
    pub url: String,
    pub image_url: Option<String>,
    pub published_at: DateTime<Utc>,
    pub external_id: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl ArticleRecord {
    /// Minimal record; optional fields start empty.
    pub fn new(
        title: impl Into<String>,
        url: impl Into<String>,
        source_name: impl Into<String>,
        published_at: DateTime<Utc>,
    ) -> Self {
        let source_name = source_name.into();
        Self {
            title: title.into(),
            description: None,
            content: None,
            author: None,
            source_id: source_name.to_ascii_lowercase(),
            source_name,
            category: None,
            url: url.into(),
            image_url: None,
            published_at,
            external_id: None,
            metadata: Metadata::new(),
        }
    }

    pub fn fingerprint(&self) -> String {
        crate::ingest::dedup::fingerprint(self)
    }
}

/// Parameters for a provider's "latest articles" call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FetchParams {
    pub page_size: Option<u32>,
    /// Extra provider query params, passed through verbatim.
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

impl FetchParams {
    pub fn with_page_size(page_size: u32) -> Self {
        Self {
            page_size: Some(page_size),
            extra: BTreeMap::new(),
        }
    }
}

/// Filters for a cross-source search; each adapter maps what it understands.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchFilters {
    /// Restrict the fan-out to these registered source names. `None` means all.
    pub sources: Option<Vec<String>>,
    pub page_size: Option<u32>,
    pub page: Option<u32>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub sort: Option<String>,
    pub category: Option<String>,
}

/// Outcome of one source's fetch.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FetchResult {
    pub total_fetched: usize,
    pub saved_count: usize,
    pub duplicate_count: usize,
    pub rejected_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FetchResult {
    pub fn failed(error: impl ToString) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Self::default()
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Outcome of a fetch across every registered source.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AggregateResult {
    pub success_count: usize,
    pub duplicate_count: usize,
    pub rejected_count: usize,
    pub failed_source_count: usize,
    pub purged_count: u64,
    pub per_source: BTreeMap<String, FetchResult>,
}

impl AggregateResult {
    pub(crate) fn absorb(&mut self, name: String, result: FetchResult) {
        if result.is_error() {
            self.failed_source_count += 1;
        } else {
            self.success_count += result.saved_count;
            self.duplicate_count += result.duplicate_count;
            self.rejected_count += result.rejected_count;
        }
        self.per_source.insert(name, result);
    }
}

/// Read-only view of a registry entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceSnapshot {
    pub name: String,
    pub available: bool,
    pub categories: Vec<String>,
    pub rate_limit: Option<u32>,
    pub requests_today: u32,
    pub last_fetched_at: Option<DateTime<Utc>>,
}

/// One remote news provider.
///
/// Implementations swallow transport failures (log + empty result). An `Err` is reserved
/// for failures the adapter cannot absorb; the aggregator isolates it to this source.
#[async_trait::async_trait]
pub trait NewsSourceAdapter: Send + Sync {
    async fn fetch_articles(&self, params: &FetchParams) -> Result<Vec<ArticleRecord>>;
    async fn search_articles(
        &self,
        query: &str,
        filters: &SearchFilters,
    ) -> Result<Vec<ArticleRecord>>;
    fn categories(&self) -> Vec<String>;
    fn source_name(&self) -> &str;
    /// Short liveness check. Never fails; unreachable means `false`.
    async fn is_available(&self) -> bool;
}
