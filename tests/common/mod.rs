// tests/common/mod.rs
// Shared doubles for the integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use news_aggregator::cache::ArticleCache;
use news_aggregator::error::{AggregatorError, Result, StoreError};
use news_aggregator::ingest::{
    Aggregator, AggregatorSettings, ArticleRecord, FetchParams, NewsSourceAdapter, SearchFilters,
};
use news_aggregator::store::{
    ArticleFilters, ArticleStore, ArticleTransaction, MemoryStore, Page, PageRequest,
    StoredArticle,
};

/// Raw record published now, so retention never touches it.
pub fn fresh(title: &str, url: &str, source: &str) -> ArticleRecord {
    ArticleRecord::new(title, url, source, Utc::now())
}

pub fn published(title: &str, url: &str, source: &str, at: DateTime<Utc>) -> ArticleRecord {
    ArticleRecord::new(title, url, source, at)
}

/// Scripted adapter: returns its articles, or fails, optionally after a delay.
pub struct MockAdapter {
    pub name: String,
    pub articles: Vec<ArticleRecord>,
    pub search_results: Vec<ArticleRecord>,
    pub fail: bool,
    pub delay: Option<Duration>,
    pub fetch_calls: AtomicUsize,
    pub search_calls: AtomicUsize,
}

impl MockAdapter {
    pub fn new(name: &str, articles: Vec<ArticleRecord>) -> Self {
        Self {
            name: name.to_string(),
            search_results: articles.clone(),
            articles,
            fail: false,
            delay: None,
            fetch_calls: AtomicUsize::new(0),
            search_calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(name: &str) -> Self {
        Self {
            fail: true,
            ..Self::new(name, Vec::new())
        }
    }

    pub fn slow(name: &str, articles: Vec<ArticleRecord>, delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::new(name, articles)
        }
    }

    pub fn with_search_results(mut self, results: Vec<ArticleRecord>) -> Self {
        self.search_results = results;
        self
    }

    pub fn fetches(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
    }
}

#[async_trait]
impl NewsSourceAdapter for MockAdapter {
    async fn fetch_articles(&self, _params: &FetchParams) -> Result<Vec<ArticleRecord>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if self.fail {
            return Err(AggregatorError::adapter(&self.name, "provider exploded"));
        }
        Ok(self.articles.clone())
    }

    async fn search_articles(
        &self,
        _query: &str,
        _filters: &SearchFilters,
    ) -> Result<Vec<ArticleRecord>> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if self.fail {
            return Err(AggregatorError::adapter(&self.name, "search exploded"));
        }
        Ok(self.search_results.clone())
    }

    fn categories(&self) -> Vec<String> {
        vec!["general".into()]
    }

    fn source_name(&self) -> &str {
        &self.name
    }

    async fn is_available(&self) -> bool {
        !self.fail
    }
}

/// MemoryStore whose transactions fail on the n-th staged upsert (1-based).
pub struct FlakyStore {
    pub inner: MemoryStore,
    pub fail_on_upsert: usize,
}

impl FlakyStore {
    pub fn new(fail_on_upsert: usize) -> Self {
        Self {
            inner: MemoryStore::new(),
            fail_on_upsert,
        }
    }
}

struct FlakyTx {
    inner: Box<dyn ArticleTransaction>,
    staged: usize,
    fail_on: usize,
}

#[async_trait]
impl ArticleTransaction for FlakyTx {
    async fn upsert(
        &mut self,
        fingerprint: &str,
        record: ArticleRecord,
    ) -> std::result::Result<(), StoreError> {
        self.staged += 1;
        if self.staged == self.fail_on {
            return Err(StoreError::Unavailable("disk on fire".into()));
        }
        self.inner.upsert(fingerprint, record).await
    }

    async fn commit(&mut self) -> std::result::Result<usize, StoreError> {
        self.inner.commit().await
    }

    async fn rollback(&mut self) {
        self.inner.rollback().await
    }
}

#[async_trait]
impl ArticleStore for FlakyStore {
    async fn create(&self, record: ArticleRecord) -> std::result::Result<StoredArticle, StoreError> {
        self.inner.create(record).await
    }
    async fn find_by_id(&self, id: u64) -> std::result::Result<Option<StoredArticle>, StoreError> {
        self.inner.find_by_id(id).await
    }
    async fn find_by_fingerprint(
        &self,
        fp: &str,
    ) -> std::result::Result<Option<StoredArticle>, StoreError> {
        self.inner.find_by_fingerprint(fp).await
    }
    async fn upsert(
        &self,
        fingerprint: &str,
        record: ArticleRecord,
    ) -> std::result::Result<StoredArticle, StoreError> {
        self.inner.upsert(fingerprint, record).await
    }
    async fn begin(&self) -> std::result::Result<Box<dyn ArticleTransaction>, StoreError> {
        Ok(Box::new(FlakyTx {
            inner: self.inner.begin().await?,
            staged: 0,
            fail_on: self.fail_on_upsert,
        }))
    }
    async fn delete_older_than(
        &self,
        cutoff: DateTime<Utc>,
        exclude_featured: bool,
    ) -> std::result::Result<u64, StoreError> {
        self.inner.delete_older_than(cutoff, exclude_featured).await
    }
    async fn increment_view_count(&self, id: u64) -> std::result::Result<(), StoreError> {
        self.inner.increment_view_count(id).await
    }
    async fn set_featured(&self, id: u64, featured: bool) -> std::result::Result<(), StoreError> {
        self.inner.set_featured(id, featured).await
    }
    async fn query_by_filters(
        &self,
        filters: &ArticleFilters,
        page: PageRequest,
    ) -> std::result::Result<Page<StoredArticle>, StoreError> {
        self.inner.query_by_filters(filters, page).await
    }
    async fn query_popular(&self, limit: usize) -> std::result::Result<Vec<StoredArticle>, StoreError> {
        self.inner.query_popular(limit).await
    }
    async fn query_latest_by_source(
        &self,
        source: &str,
        limit: usize,
    ) -> std::result::Result<Vec<StoredArticle>, StoreError> {
        self.inner.query_latest_by_source(source, limit).await
    }
}

pub fn cache() -> Arc<ArticleCache> {
    Arc::new(ArticleCache::in_memory(Duration::from_secs(600)))
}

/// Aggregator over a fresh MemoryStore. Returns the store handle too.
pub fn aggregator() -> (Arc<Aggregator>, MemoryStore) {
    aggregator_with(AggregatorSettings::default())
}

pub fn aggregator_with(settings: AggregatorSettings) -> (Arc<Aggregator>, MemoryStore) {
    let store = MemoryStore::new();
    let agg = Aggregator::new(Arc::new(store.clone()), cache(), settings);
    (Arc::new(agg), store)
}
