//! Fingerprinting and duplicate detection.
//!
//! Durable knowledge always comes from the store. The only in-process memory is a
//! [`WorkingSet`], created for one aggregator operation and dropped with it.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use crate::error::StoreError;
use crate::ingest::types::ArticleRecord;
use crate::store::ArticleStore;

/// hex(sha256(lowercase(title) ++ url ++ source_name)).
///
/// Used as both the dedup key and the upsert key, on fetch and search paths alike.
pub fn fingerprint(article: &ArticleRecord) -> String {
    let mut hasher = Sha256::new();
    hasher.update(article.title.to_lowercase().as_bytes());
    hasher.update(article.url.as_bytes());
    hasher.update(article.source_name.as_bytes());
    hex(&hasher.finalize())
}

pub(crate) fn hex(bytes: &[u8]) -> String {
    use std::fmt::Write as _;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// Batch-scoped set of fingerprints already claimed in this operation.
///
/// Cheap to clone; clones share the same set so concurrent tasks of one fan-out see
/// each other's claims.
#[derive(Debug, Clone, Default)]
pub struct WorkingSet {
    seen: Arc<Mutex<HashSet<String>>>,
}

impl WorkingSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically claim `fp`. Returns `false` if it was already claimed.
    pub fn claim(&self, fp: &str) -> bool {
        let mut seen = self.seen.lock();
        seen.insert(fp.to_string())
    }

    pub fn contains(&self, fp: &str) -> bool {
        let seen = self.seen.lock();
        seen.contains(fp)
    }

    pub fn len(&self) -> usize {
        self.seen.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Clone)]
pub struct DuplicationChecker {
    store: Arc<dyn ArticleStore>,
}

impl DuplicationChecker {
    pub fn new(store: Arc<dyn ArticleStore>) -> Self {
        Self { store }
    }

    /// True if the article is already stored or already claimed in `working`.
    /// A `false` answer leaves the fingerprint claimed in `working`.
    pub async fn is_duplicate(
        &self,
        article: &ArticleRecord,
        working: &WorkingSet,
    ) -> Result<bool, StoreError> {
        let fp = fingerprint(article);
        // Claim before the store round-trip so a concurrent twin in the same batch loses.
        if !working.claim(&fp) {
            return Ok(true);
        }
        Ok(self.store.find_by_fingerprint(&fp).await?.is_some())
    }

    /// Order-preserving filter: drops items seen earlier in `articles` or already stored.
    pub async fn remove_duplicates(
        &self,
        articles: Vec<ArticleRecord>,
        working: &WorkingSet,
    ) -> Result<Vec<ArticleRecord>, StoreError> {
        let mut unique = Vec::with_capacity(articles.len());
        for article in articles {
            if !self.is_duplicate(&article, working).await? {
                unique.push(article);
            }
        }
        Ok(unique)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn rec(title: &str, url: &str, source: &str) -> ArticleRecord {
        ArticleRecord::new(title, url, source, Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap())
    }

    #[test]
    fn fingerprint_is_stable_and_title_case_insensitive() {
        let a = rec("Budget 2025", "https://x/a", "X");
        let b = rec("BUDGET 2025", "https://x/a", "X");
        assert_eq!(fingerprint(&a), fingerprint(&a));
        assert_eq!(fingerprint(&a), fingerprint(&b));
        assert_eq!(fingerprint(&a).len(), 64);
    }

    #[test]
    fn fingerprint_depends_on_url_and_source() {
        let a = rec("Budget 2025", "https://x/a", "X");
        assert_ne!(fingerprint(&a), fingerprint(&rec("Budget 2025", "https://x/b", "X")));
        assert_ne!(fingerprint(&a), fingerprint(&rec("Budget 2025", "https://x/a", "Y")));
    }

    #[test]
    fn working_set_claims_once() {
        let ws = WorkingSet::new();
        let twin = ws.clone();
        assert!(ws.claim("abc"));
        assert!(!twin.claim("abc"));
        assert!(twin.contains("abc"));
        assert_eq!(ws.len(), 1);
    }
}
