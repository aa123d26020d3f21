//! Read side: cached queries over the store plus live search fallback.

use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};

use crate::cache::ArticleCache;
use crate::error::{Result, StoreError};
use crate::ingest::dedup::hex;
use crate::ingest::{Aggregator, SearchFilters};
use crate::store::{ArticleFilters, ArticleStore, Page, PageRequest, StoredArticle};

pub const POPULAR_TTL: Duration = Duration::from_secs(1800);
pub const LATEST_BY_SOURCE_TTL: Duration = Duration::from_secs(600);
/// Below this many stored matches a live search is worth the provider calls.
pub const LIVE_SEARCH_THRESHOLD: usize = 10;

pub struct ArticleService {
    store: Arc<dyn ArticleStore>,
    aggregator: Arc<Aggregator>,
    cache: Arc<ArticleCache>,
    live_search_enabled: bool,
}

impl ArticleService {
    pub fn new(aggregator: Arc<Aggregator>, live_search_enabled: bool) -> Self {
        Self {
            store: Arc::clone(aggregator.store()),
            cache: Arc::clone(aggregator.cache()),
            aggregator,
            live_search_enabled,
        }
    }

    /// Filtered, paginated listing. Cached for the default TTL under a key derived from
    /// the filters and the page.
    pub async fn latest(
        &self,
        filters: &ArticleFilters,
        page: PageRequest,
    ) -> Result<Page<StoredArticle>> {
        let key = format!("articles_{}", filters_digest(filters, page));
        let store = Arc::clone(&self.store);
        self.cache
            .remember_or_compute(&key, None, || async move {
                store.query_by_filters(filters, page).await
            })
            .await
            .map_err(Into::into)
    }

    pub async fn by_category(&self, category: &str, page: PageRequest) -> Result<Page<StoredArticle>> {
        let filters = ArticleFilters {
            category: Some(category.to_string()),
            ..ArticleFilters::default()
        };
        self.latest(&filters, page).await
    }

    pub async fn popular(&self, limit: usize) -> Result<Vec<StoredArticle>> {
        let store = Arc::clone(&self.store);
        self.cache
            .remember_or_compute(&format!("popular_{limit}"), Some(POPULAR_TTL), || async move {
                store.query_popular(limit).await
            })
            .await
            .map_err(Into::into)
    }

    pub async fn latest_by_source(&self, source: &str, limit: usize) -> Result<Vec<StoredArticle>> {
        let store = Arc::clone(&self.store);
        self.cache
            .remember_or_compute(
                &format!("latest_{source}_{limit}"),
                Some(LATEST_BY_SOURCE_TTL),
                || async move { store.query_latest_by_source(source, limit).await },
            )
            .await
            .map_err(Into::into)
    }

    /// Substring search over stored articles. With `live` set (and live search enabled),
    /// a thin result triggers a cross-source search and the store is queried again.
    pub async fn search(
        &self,
        query: &str,
        live: bool,
        page: PageRequest,
    ) -> Result<Page<StoredArticle>> {
        let filters = ArticleFilters {
            query: Some(query.to_string()),
            ..ArticleFilters::default()
        };
        let found = self.store.query_by_filters(&filters, page).await?;
        if found.total >= LIVE_SEARCH_THRESHOLD || !live || !self.live_search_enabled {
            return Ok(found);
        }

        tracing::info!(target: "api", query, stored = found.total, "running live search");
        self.aggregator
            .search_across_sources(query, &SearchFilters::default())
            .await?;
        Ok(self.store.query_by_filters(&filters, page).await?)
    }

    /// Fetch one article and count the view. `None` if it does not exist.
    pub async fn show(&self, id: u64) -> Result<Option<StoredArticle>> {
        match self.store.increment_view_count(id).await {
            Ok(()) => Ok(self.store.find_by_id(id).await?),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn set_featured(&self, id: u64, featured: bool) -> Result<()> {
        self.store.set_featured(id, featured).await?;
        Ok(())
    }
}

fn filters_digest(filters: &ArticleFilters, page: PageRequest) -> String {
    let encoded = serde_json::to_string(&(filters, page)).unwrap_or_default();
    let mut id = hex(&Sha256::digest(encoded.as_bytes()));
    id.truncate(32);
    id
}
