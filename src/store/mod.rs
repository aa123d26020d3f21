//! Article persistence contract.
//!
//! The aggregator only talks to [`ArticleStore`]. Fingerprint uniqueness is enforced
//! here, not by callers: `create` refuses an existing fingerprint and `upsert` updates
//! the row it matches.

pub mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::ingest::types::ArticleRecord;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredArticle {
    pub id: u64,
    pub fingerprint: String,
    #[serde(flatten)]
    pub record: ArticleRecord,
    pub view_count: u64,
    pub is_featured: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    PublishedAt,
    ViewCount,
    CreatedAt,
}

/// Read-side filters. Every set field must match; results are sorted descending.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArticleFilters {
    pub source_names: Option<Vec<String>>,
    pub source_id: Option<String>,
    pub category: Option<String>,
    pub author: Option<String>,
    pub is_featured: Option<bool>,
    /// Case-insensitive substring over title, description and content.
    pub query: Option<String>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    #[serde(default)]
    pub sort_by: SortField,
}

impl ArticleFilters {
    pub fn matches(&self, a: &StoredArticle) -> bool {
        let r = &a.record;
        if let Some(names) = &self.source_names {
            if !names.iter().any(|n| n == &r.source_name) {
                return false;
            }
        }
        if self.source_id.as_ref().is_some_and(|s| s != &r.source_id) {
            return false;
        }
        if self
            .category
            .as_ref()
            .is_some_and(|c| r.category.as_ref() != Some(c))
        {
            return false;
        }
        if self
            .author
            .as_ref()
            .is_some_and(|au| r.author.as_ref() != Some(au))
        {
            return false;
        }
        if self.is_featured.is_some_and(|f| f != a.is_featured) {
            return false;
        }
        if self.date_from.is_some_and(|from| r.published_at < from) {
            return false;
        }
        if self.date_to.is_some_and(|to| r.published_at > to) {
            return false;
        }
        if let Some(q) = self.query.as_deref().map(str::to_lowercase) {
            let hit = [Some(&r.title), r.description.as_ref(), r.content.as_ref()]
                .into_iter()
                .flatten()
                .any(|field| field.to_lowercase().contains(&q));
            if !hit {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PageRequest {
    /// 1-based.
    pub page: usize,
    pub per_page: usize,
}

impl PageRequest {
    pub fn new(page: usize, per_page: usize) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.clamp(1, 100),
        }
    }

    pub fn offset(&self) -> usize {
        (self.page - 1) * self.per_page
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(1, 20)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub page: usize,
    pub per_page: usize,
    pub last_page: usize,
}

impl<T> Page<T> {
    pub fn from_all(all: Vec<T>, req: PageRequest) -> Self {
        let total = all.len();
        let last_page = total.div_ceil(req.per_page).max(1);
        let items = all
            .into_iter()
            .skip(req.offset())
            .take(req.per_page)
            .collect();
        Self {
            items,
            total,
            page: req.page,
            per_page: req.per_page,
            last_page,
        }
    }
}

/// Staged batch of upserts. Nothing is visible until `commit`; dropping without commit
/// discards the batch.
#[async_trait]
pub trait ArticleTransaction: Send {
    async fn upsert(&mut self, fingerprint: &str, record: ArticleRecord) -> Result<(), StoreError>;
    /// Apply every staged upsert atomically. Returns how many rows were written.
    async fn commit(&mut self) -> Result<usize, StoreError>;
    async fn rollback(&mut self);
}

#[async_trait]
pub trait ArticleStore: Send + Sync {
    async fn create(&self, record: ArticleRecord) -> Result<StoredArticle, StoreError>;
    async fn find_by_id(&self, id: u64) -> Result<Option<StoredArticle>, StoreError>;
    async fn find_by_fingerprint(&self, fp: &str) -> Result<Option<StoredArticle>, StoreError>;
    /// Insert, or update the row whose fingerprint equals `fingerprint`.
    async fn upsert(&self, fingerprint: &str, record: ArticleRecord)
        -> Result<StoredArticle, StoreError>;
    async fn begin(&self) -> Result<Box<dyn ArticleTransaction>, StoreError>;
    /// Delete articles published before `cutoff`. Returns the number removed.
    async fn delete_older_than(
        &self,
        cutoff: DateTime<Utc>,
        exclude_featured: bool,
    ) -> Result<u64, StoreError>;
    async fn increment_view_count(&self, id: u64) -> Result<(), StoreError>;
    async fn set_featured(&self, id: u64, featured: bool) -> Result<(), StoreError>;
    async fn query_by_filters(
        &self,
        filters: &ArticleFilters,
        page: PageRequest,
    ) -> Result<Page<StoredArticle>, StoreError>;
    async fn query_popular(&self, limit: usize) -> Result<Vec<StoredArticle>, StoreError>;
    async fn query_latest_by_source(
        &self,
        source: &str,
        limit: usize,
    ) -> Result<Vec<StoredArticle>, StoreError>;
}
