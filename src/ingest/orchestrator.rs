//! Fetch orchestration: registry of adapters, per-source batches, cross-source search.
//!
//! A source batch is processed inside one store transaction. Anything that goes wrong
//! for one source (adapter error, timeout, store failure mid-batch, exhausted daily
//! budget) becomes that source's `FetchResult::error`; the other sources carry on.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, NaiveDate, Utc};
use futures::stream::{self, StreamExt};
use metrics::{counter, gauge, histogram};
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use crate::cache::ArticleCache;
use crate::error::{AggregatorError, Result, StoreError};
use crate::ingest::dedup::{fingerprint, DuplicationChecker, WorkingSet};
use crate::ingest::ensure_metrics_described;
use crate::ingest::processor::ArticleProcessor;
use crate::ingest::providers::canonical_source_name;
use crate::ingest::types::{
    AggregateResult, ArticleRecord, FetchParams, FetchResult, NewsSourceAdapter, SearchFilters,
    SourceSnapshot,
};
use crate::store::{ArticleStore, ArticleTransaction};

/// Rows per transaction when persisting search results.
pub const SEARCH_CHUNK_SIZE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregatorSettings {
    pub retention_days: u32,
    pub max_concurrency: usize,
    pub adapter_timeout: Duration,
    pub articles_per_fetch: u32,
}

impl Default for AggregatorSettings {
    fn default() -> Self {
        Self {
            retention_days: 30,
            max_concurrency: 4,
            adapter_timeout: Duration::from_secs(30),
            articles_per_fetch: 50,
        }
    }
}

/// Requests made against a provider on one UTC day.
#[derive(Debug, Clone, Copy)]
struct DailyUsage {
    day: NaiveDate,
    count: u32,
}

impl DailyUsage {
    fn today() -> Self {
        Self {
            day: Utc::now().date_naive(),
            count: 0,
        }
    }

    fn roll_over(&mut self) {
        let today = Utc::now().date_naive();
        if self.day != today {
            self.day = today;
            self.count = 0;
        }
    }
}

struct SourceRegistration {
    name: String,
    adapter: Arc<dyn NewsSourceAdapter>,
    available: bool,
    categories: Vec<String>,
    rate_limit: Option<u32>,
    usage: DailyUsage,
    last_fetched_at: Option<DateTime<Utc>>,
}

impl SourceRegistration {
    fn snapshot(&self) -> SourceSnapshot {
        let mut usage = self.usage;
        usage.roll_over();
        SourceSnapshot {
            name: self.name.clone(),
            available: self.available,
            categories: self.categories.clone(),
            rate_limit: self.rate_limit,
            requests_today: usage.count,
            last_fetched_at: self.last_fetched_at,
        }
    }
}

/// Registry access never poisons: a panic while the lock is held leaves the entries as
/// they were and later readers carry on.
pub struct Aggregator {
    registry: RwLock<Vec<SourceRegistration>>,
    store: Arc<dyn ArticleStore>,
    cache: Arc<ArticleCache>,
    processor: ArticleProcessor,
    checker: DuplicationChecker,
    settings: AggregatorSettings,
}

impl Aggregator {
    pub fn new(
        store: Arc<dyn ArticleStore>,
        cache: Arc<ArticleCache>,
        settings: AggregatorSettings,
    ) -> Self {
        ensure_metrics_described();
        Self {
            registry: RwLock::new(Vec::new()),
            checker: DuplicationChecker::new(Arc::clone(&store)),
            store,
            cache,
            processor: ArticleProcessor::new(),
            settings,
        }
    }

    pub fn store(&self) -> &Arc<dyn ArticleStore> {
        &self.store
    }

    pub fn cache(&self) -> &Arc<ArticleCache> {
        &self.cache
    }

    pub fn settings(&self) -> &AggregatorSettings {
        &self.settings
    }

    pub fn register_adapter(&self, adapter: Arc<dyn NewsSourceAdapter>) {
        self.register_adapter_with_limit(adapter, None);
    }

    /// Insert or replace by source name. Replacing keeps today's usage and the last
    /// fetch time.
    pub fn register_adapter_with_limit(
        &self,
        adapter: Arc<dyn NewsSourceAdapter>,
        daily_limit: Option<u32>,
    ) {
        let name = adapter.source_name().to_string();
        let categories = adapter.categories();
        let mut reg = self.registry.write();
        match reg.iter_mut().find(|r| r.name == name) {
            Some(existing) => {
                existing.adapter = adapter;
                existing.categories = categories;
                existing.rate_limit = daily_limit;
            }
            None => reg.push(SourceRegistration {
                name: name.clone(),
                adapter,
                available: true,
                categories,
                rate_limit: daily_limit,
                usage: DailyUsage::today(),
                last_fetched_at: None,
            }),
        }
        tracing::info!(target: "ingest", source = %name, ?daily_limit, "adapter registered");
    }

    pub fn sources(&self) -> Vec<SourceSnapshot> {
        let reg = self.registry.read();
        reg.iter().map(SourceRegistration::snapshot).collect()
    }

    /// Ask every adapter whether it is reachable and record the answers.
    pub async fn refresh_availability(&self) -> Vec<SourceSnapshot> {
        let checks: Vec<_> = self
            .registered_adapters()
            .into_iter()
            .map(|a| self.check_one(a))
            .collect();
        let answers = futures::future::join_all(checks).await;

        let mut reg = self.registry.write();
        for (name, available) in answers {
            if let Some(r) = reg.iter_mut().find(|r| r.name == name) {
                r.available = available;
            }
        }
        reg.iter().map(SourceRegistration::snapshot).collect()
    }

    /// Re-check one source and return its entry. `None` when nothing is registered
    /// under `name` (matched like [`Aggregator::adapter_named`]).
    pub async fn source_status(&self, name: &str) -> Option<SourceSnapshot> {
        let adapter = self.adapter_named(name)?;
        let (name, available) = self.check_one(adapter).await;

        let mut reg = self.registry.write();
        let r = reg.iter_mut().find(|r| r.name == name)?;
        r.available = available;
        Some(r.snapshot())
    }

    /// Sorted, de-duplicated union of every registered source's categories.
    pub fn categories(&self) -> Vec<String> {
        let reg = self.registry.read();
        let mut all: Vec<String> = reg.iter().flat_map(|r| r.categories.iter().cloned()).collect();
        all.sort();
        all.dedup();
        all
    }

    async fn check_one(&self, adapter: Arc<dyn NewsSourceAdapter>) -> (String, bool) {
        let available = adapter.is_available().await;
        if !available {
            tracing::debug!(target: "ingest", source = %adapter.source_name(), "source unreachable");
        }
        (adapter.source_name().to_string(), available)
    }

    /// Look up a registered adapter by its source name, case-insensitively, or by its
    /// short config key ("newsapi", "guardian", "nyt").
    pub fn adapter_named(&self, name: &str) -> Option<Arc<dyn NewsSourceAdapter>> {
        let canonical = canonical_source_name(name);
        let reg = self.registry.read();
        reg.iter()
            .find(|r| r.name.eq_ignore_ascii_case(name) || Some(r.name.as_str()) == canonical)
            .map(|r| Arc::clone(&r.adapter))
    }

    fn registered_adapters(&self) -> Vec<Arc<dyn NewsSourceAdapter>> {
        let reg = self.registry.read();
        reg.iter().map(|r| Arc::clone(&r.adapter)).collect()
    }

    /// Count one request against the source's daily ceiling. Unregistered sources are
    /// not metered.
    fn consume_budget(&self, name: &str) -> Result<()> {
        let mut reg = self.registry.write();
        let Some(r) = reg.iter_mut().find(|r| r.name == name) else {
            return Ok(());
        };
        r.usage.roll_over();
        if let Some(limit) = r.rate_limit {
            if r.usage.count >= limit {
                return Err(AggregatorError::RateLimited {
                    name: name.to_string(),
                    limit,
                });
            }
        }
        r.usage.count += 1;
        Ok(())
    }

    fn mark_fetched(&self, name: &str, at: DateTime<Utc>) {
        let mut reg = self.registry.write();
        if let Some(r) = reg.iter_mut().find(|r| r.name == name) {
            r.last_fetched_at = Some(at);
        }
    }

    pub async fn fetch_from_source_named(&self, name: &str) -> Result<FetchResult> {
        let adapter = self
            .adapter_named(name)
            .ok_or_else(|| AggregatorError::UnknownSource(name.to_string()))?;
        self.fetch_from_source(&adapter).await
    }

    /// Fetch one source's latest articles and persist the new ones in a single
    /// transaction.
    pub async fn fetch_from_source(
        &self,
        adapter: &Arc<dyn NewsSourceAdapter>,
    ) -> Result<FetchResult> {
        let name = adapter.source_name().to_string();
        self.consume_budget(&name)?;

        let t0 = Instant::now();
        let params = FetchParams::with_page_size(self.settings.articles_per_fetch);
        let raw = tokio::time::timeout(
            self.settings.adapter_timeout,
            adapter.fetch_articles(&params),
        )
        .await
        .map_err(|_| AggregatorError::Timeout {
            name: name.clone(),
            after: self.settings.adapter_timeout,
        })??;

        let mut result = FetchResult {
            total_fetched: raw.len(),
            ..FetchResult::default()
        };

        let mut tx = self.store.begin().await?;
        let working = WorkingSet::new();
        match self.stage_batch(tx.as_mut(), raw, &working, &mut result).await {
            Ok(()) => {
                if let Err(e) = tx.commit().await {
                    tx.rollback().await;
                    return Err(e.into());
                }
            }
            Err(e) => {
                tx.rollback().await;
                tracing::warn!(target: "ingest", source = %name, error = %e, "batch rolled back");
                return Err(e.into());
            }
        }

        self.mark_fetched(&name, Utc::now());

        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("ingest_fetch_ms", "source" => name.clone()).record(ms);
        counter!("ingest_saved_total", "source" => name.clone()).increment(result.saved_count as u64);
        counter!("ingest_duplicates_total", "source" => name.clone())
            .increment(result.duplicate_count as u64);
        counter!("ingest_rejected_total", "source" => name.clone())
            .increment(result.rejected_count as u64);

        tracing::info!(
            target: "ingest",
            source = %name,
            total = result.total_fetched,
            saved = result.saved_count,
            duplicates = result.duplicate_count,
            rejected = result.rejected_count,
            ms,
            "source fetched"
        );
        Ok(result)
    }

    async fn stage_batch(
        &self,
        tx: &mut dyn ArticleTransaction,
        raw: Vec<ArticleRecord>,
        working: &WorkingSet,
        result: &mut FetchResult,
    ) -> std::result::Result<(), StoreError> {
        for article in raw {
            let processed = match self.processor.process(&article) {
                Ok(p) => p,
                Err(e) => {
                    tracing::debug!(target: "ingest", source = %article.source_name, error = %e, "article rejected");
                    result.rejected_count += 1;
                    continue;
                }
            };
            if self.checker.is_duplicate(&processed, working).await? {
                result.duplicate_count += 1;
                continue;
            }
            tx.upsert(&fingerprint(&processed), processed).await?;
            result.saved_count += 1;
        }
        Ok(())
    }

    pub async fn fetch_from_all_sources(&self) -> Result<AggregateResult> {
        self.fetch_from_all_sources_with_cancel(CancellationToken::new())
            .await
    }

    /// Fetch every registered source concurrently, then purge expired articles and flush
    /// the cache namespace. Firing `cancel` abandons the in-flight work; batches that
    /// already committed stay committed.
    pub async fn fetch_from_all_sources_with_cancel(
        &self,
        cancel: CancellationToken,
    ) -> Result<AggregateResult> {
        let adapters = self.registered_adapters();
        let limit = self.settings.max_concurrency.max(1);

        let run = async {
            let fetches: Vec<_> = adapters.into_iter().map(|a| self.fetch_one(a)).collect();
            let outcomes: Vec<(String, FetchResult)> = stream::iter(fetches)
                .buffer_unordered(limit)
                .collect()
                .await;

            let mut agg = AggregateResult::default();
            for (name, res) in outcomes {
                agg.absorb(name, res);
            }

            agg.purged_count = self.cleanup_old_articles().await?;
            self.cache.flush_namespace().await;
            gauge!("ingest_pipeline_last_run_ts").set(Utc::now().timestamp() as f64);

            tracing::info!(
                target: "ingest",
                saved = agg.success_count,
                duplicates = agg.duplicate_count,
                rejected = agg.rejected_count,
                failed_sources = agg.failed_source_count,
                purged = agg.purged_count,
                "fetch-all finished"
            );
            Ok::<_, AggregatorError>(agg)
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::warn!(target: "ingest", "fetch-all cancelled");
                Err(AggregatorError::Cancelled)
            }
            res = run => res,
        }
    }

    /// One source's share of a fetch-all. Failures become the source's result.
    async fn fetch_one(&self, adapter: Arc<dyn NewsSourceAdapter>) -> (String, FetchResult) {
        let name = adapter.source_name().to_string();
        let res = match self.fetch_from_source(&adapter).await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(target: "ingest", source = %name, error = %e, "source failed");
                counter!("ingest_source_failures_total", "source" => name.clone()).increment(1);
                FetchResult::failed(e)
            }
        };
        (name, res)
    }

    /// Delete non-featured articles older than the retention window.
    pub async fn cleanup_old_articles(&self) -> Result<u64> {
        let cutoff = Utc::now() - chrono::Duration::days(i64::from(self.settings.retention_days));
        let purged = self.store.delete_older_than(cutoff, true).await?;
        counter!("ingest_purged_total").increment(purged);
        Ok(purged)
    }

    /// Query the selected sources live, persist unique results, return them. Persisting
    /// anything flushes the cache namespace, like a fetch-all does.
    ///
    /// A failing or slow source is logged and left out of the merge. Results keep the
    /// selection order (`filters.sources`, else registration order).
    pub async fn search_across_sources(
        &self,
        query: &str,
        filters: &SearchFilters,
    ) -> Result<Vec<ArticleRecord>> {
        let selected = self.select_for_search(filters);
        let calls: Vec<_> = selected
            .iter()
            .cloned()
            .map(|adapter| self.search_one(adapter, query, filters))
            .collect();
        let merged: Vec<ArticleRecord> = futures::future::join_all(calls)
            .await
            .into_iter()
            .flatten()
            .collect();

        let processed: Vec<ArticleRecord> = merged
            .iter()
            .filter_map(|a| self.processor.process(a).ok())
            .collect();
        let rejected = merged.len() - processed.len();

        let working = WorkingSet::new();
        let unique = self.checker.remove_duplicates(processed, &working).await?;

        for chunk in unique.chunks(SEARCH_CHUNK_SIZE) {
            let mut tx = self.store.begin().await?;
            for article in chunk {
                if let Err(e) = tx.upsert(&fingerprint(article), article.clone()).await {
                    tx.rollback().await;
                    return Err(e.into());
                }
            }
            tx.commit().await?;
        }
        if !unique.is_empty() {
            self.cache.flush_namespace().await;
        }

        tracing::info!(
            target: "ingest",
            query,
            sources = selected.len(),
            merged = merged.len(),
            rejected,
            unique = unique.len(),
            "live search persisted"
        );
        Ok(unique)
    }

    async fn search_one(
        &self,
        adapter: Arc<dyn NewsSourceAdapter>,
        query: &str,
        filters: &SearchFilters,
    ) -> Vec<ArticleRecord> {
        let name = adapter.source_name().to_string();
        if let Err(e) = self.consume_budget(&name) {
            tracing::warn!(target: "ingest", source = %name, error = %e, "search skipped");
            return Vec::new();
        }
        let timeout = self.settings.adapter_timeout;
        match tokio::time::timeout(timeout, adapter.search_articles(query, filters)).await {
            Ok(Ok(found)) => found,
            Ok(Err(e)) => {
                tracing::warn!(target: "ingest", source = %name, error = %e, "search failed");
                Vec::new()
            }
            Err(_) => {
                tracing::warn!(target: "ingest", source = %name, ?timeout, "search timed out");
                Vec::new()
            }
        }
    }

    fn select_for_search(&self, filters: &SearchFilters) -> Vec<Arc<dyn NewsSourceAdapter>> {
        match &filters.sources {
            Some(names) => names.iter().filter_map(|n| self.adapter_named(n)).collect(),
            None => self.registered_adapters(),
        }
    }
}
