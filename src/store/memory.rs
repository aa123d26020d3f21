//! In-memory [`ArticleStore`]. Used by the binaries and the test-suite.
//!
//! Transactions stage upserts and apply them under a single write lock on commit, so a
//! batch is either fully visible or not at all.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::StoreError;
use crate::ingest::types::ArticleRecord;
use crate::store::{
    ArticleFilters, ArticleStore, ArticleTransaction, Page, PageRequest, SortField, StoredArticle,
};

#[derive(Debug, Default)]
struct Inner {
    rows: BTreeMap<u64, StoredArticle>,
    by_fingerprint: HashMap<String, u64>,
    next_id: u64,
}

impl Inner {
    fn upsert(&mut self, fingerprint: &str, record: ArticleRecord, now: DateTime<Utc>) -> StoredArticle {
        if let Some(id) = self.by_fingerprint.get(fingerprint).copied() {
            if let Some(row) = self.rows.get_mut(&id) {
                row.record = record;
                row.updated_at = now;
                return row.clone();
            }
        }
        self.insert(fingerprint, record, now)
    }

    fn insert(&mut self, fingerprint: &str, record: ArticleRecord, now: DateTime<Utc>) -> StoredArticle {
        self.next_id += 1;
        let row = StoredArticle {
            id: self.next_id,
            fingerprint: fingerprint.to_string(),
            record,
            view_count: 0,
            is_featured: false,
            created_at: now,
            updated_at: now,
        };
        self.by_fingerprint.insert(row.fingerprint.clone(), row.id);
        self.rows.insert(row.id, row.clone());
        row
    }

    fn sorted(&self, filters: &ArticleFilters) -> Vec<StoredArticle> {
        let mut out: Vec<StoredArticle> = self
            .rows
            .values()
            .filter(|a| filters.matches(a))
            .cloned()
            .collect();
        sort_desc(&mut out, filters.sort_by);
        out
    }
}

fn sort_desc(rows: &mut [StoredArticle], by: SortField) {
    match by {
        SortField::PublishedAt => rows.sort_by(|a, b| {
            b.record
                .published_at
                .cmp(&a.record.published_at)
                .then(b.id.cmp(&a.id))
        }),
        SortField::ViewCount => {
            rows.sort_by(|a, b| b.view_count.cmp(&a.view_count).then(b.id.cmp(&a.id)))
        }
        SortField::CreatedAt => {
            rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)))
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.read().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read()
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write()
    }
}

#[async_trait]
impl ArticleStore for MemoryStore {
    async fn create(&self, record: ArticleRecord) -> Result<StoredArticle, StoreError> {
        let fp = record.fingerprint();
        let mut inner = self.write();
        if inner.by_fingerprint.contains_key(&fp) {
            return Err(StoreError::DuplicateFingerprint(fp));
        }
        Ok(inner.insert(&fp, record, Utc::now()))
    }

    async fn find_by_id(&self, id: u64) -> Result<Option<StoredArticle>, StoreError> {
        Ok(self.read().rows.get(&id).cloned())
    }

    async fn find_by_fingerprint(&self, fp: &str) -> Result<Option<StoredArticle>, StoreError> {
        let inner = self.read();
        Ok(inner
            .by_fingerprint
            .get(fp)
            .and_then(|id| inner.rows.get(id))
            .cloned())
    }

    async fn upsert(
        &self,
        fingerprint: &str,
        record: ArticleRecord,
    ) -> Result<StoredArticle, StoreError> {
        Ok(self.write().upsert(fingerprint, record, Utc::now()))
    }

    async fn begin(&self) -> Result<Box<dyn ArticleTransaction>, StoreError> {
        Ok(Box::new(MemoryTransaction {
            inner: Arc::clone(&self.inner),
            staged: Vec::new(),
            closed: false,
        }))
    }

    async fn delete_older_than(
        &self,
        cutoff: DateTime<Utc>,
        exclude_featured: bool,
    ) -> Result<u64, StoreError> {
        let mut inner = self.write();
        let doomed: Vec<(u64, String)> = inner
            .rows
            .values()
            .filter(|a| a.record.published_at < cutoff && !(exclude_featured && a.is_featured))
            .map(|a| (a.id, a.fingerprint.clone()))
            .collect();
        for (id, fp) in &doomed {
            inner.rows.remove(id);
            inner.by_fingerprint.remove(fp);
        }
        Ok(doomed.len() as u64)
    }

    async fn increment_view_count(&self, id: u64) -> Result<(), StoreError> {
        let mut inner = self.write();
        let row = inner.rows.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        row.view_count = row.view_count.saturating_add(1);
        Ok(())
    }

    async fn set_featured(&self, id: u64, featured: bool) -> Result<(), StoreError> {
        let mut inner = self.write();
        let row = inner.rows.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        row.is_featured = featured;
        Ok(())
    }

    async fn query_by_filters(
        &self,
        filters: &ArticleFilters,
        page: PageRequest,
    ) -> Result<Page<StoredArticle>, StoreError> {
        let all = self.read().sorted(filters);
        Ok(Page::from_all(all, page))
    }

    async fn query_popular(&self, limit: usize) -> Result<Vec<StoredArticle>, StoreError> {
        let filters = ArticleFilters {
            sort_by: SortField::ViewCount,
            ..ArticleFilters::default()
        };
        let mut all = self.read().sorted(&filters);
        all.truncate(limit);
        Ok(all)
    }

    async fn query_latest_by_source(
        &self,
        source: &str,
        limit: usize,
    ) -> Result<Vec<StoredArticle>, StoreError> {
        let filters = ArticleFilters {
            source_names: Some(vec![source.to_string()]),
            ..ArticleFilters::default()
        };
        let mut all = self.read().sorted(&filters);
        all.truncate(limit);
        Ok(all)
    }
}

struct MemoryTransaction {
    inner: Arc<RwLock<Inner>>,
    staged: Vec<(String, ArticleRecord)>,
    closed: bool,
}

#[async_trait]
impl ArticleTransaction for MemoryTransaction {
    async fn upsert(&mut self, fingerprint: &str, record: ArticleRecord) -> Result<(), StoreError> {
        if self.closed {
            return Err(StoreError::TransactionClosed);
        }
        self.staged.push((fingerprint.to_string(), record));
        Ok(())
    }

    async fn commit(&mut self) -> Result<usize, StoreError> {
        if self.closed {
            return Err(StoreError::TransactionClosed);
        }
        self.closed = true;
        let staged = std::mem::take(&mut self.staged);
        let mut inner = self.inner.write();
        let now = Utc::now();
        let written = staged.len();
        for (fp, record) in staged {
            inner.upsert(&fp, record, now);
        }
        Ok(written)
    }

    async fn rollback(&mut self) {
        self.closed = true;
        self.staged.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn rec(title: &str, url: &str) -> ArticleRecord {
        ArticleRecord::new(title, url, "X", Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap())
    }

    #[tokio::test]
    async fn upsert_updates_in_place() {
        let store = MemoryStore::new();
        let r = rec("Budget 2025", "https://x/a");
        let fp = r.fingerprint();
        let first = store.upsert(&fp, r.clone()).await.unwrap();

        let mut changed = r.clone();
        changed.description = Some("updated".into());
        let second = store.upsert(&fp, changed).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(store.len(), 1);
        assert_eq!(second.record.description.as_deref(), Some("updated"));
    }

    #[tokio::test]
    async fn create_rejects_existing_fingerprint() {
        let store = MemoryStore::new();
        store.create(rec("Budget 2025", "https://x/a")).await.unwrap();
        let err = store.create(rec("budget 2025", "https://x/a")).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateFingerprint(_)));
    }

    #[tokio::test]
    async fn uncommitted_transaction_is_invisible() {
        let store = MemoryStore::new();
        let r = rec("Budget 2025", "https://x/a");
        let mut tx = store.begin().await.unwrap();
        tx.upsert(&r.fingerprint(), r.clone()).await.unwrap();
        assert!(store.is_empty());
        tx.rollback().await;
        assert!(store.is_empty());
        assert_eq!(
            tx.upsert(&r.fingerprint(), r).await.unwrap_err(),
            StoreError::TransactionClosed
        );
    }

    #[tokio::test]
    async fn delete_older_than_spares_featured() {
        let store = MemoryStore::new();
        let old = store.create(rec("Old story here", "https://x/old")).await.unwrap();
        let old_featured = store.create(rec("Old featured one", "https://x/feat")).await.unwrap();
        store.set_featured(old_featured.id, true).await.unwrap();

        let mut fresh = rec("Fresh story here", "https://x/new");
        fresh.published_at = Utc::now();
        store.create(fresh).await.unwrap();

        let removed = store
            .delete_older_than(Utc::now() - Duration::days(30), true)
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(store.find_by_id(old.id).await.unwrap().is_none());
        assert!(store.find_by_id(old_featured.id).await.unwrap().is_some());
        assert_eq!(store.len(), 2);
    }
}
