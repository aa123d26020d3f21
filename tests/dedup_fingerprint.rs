// tests/dedup_fingerprint.rs
mod common;

use std::sync::Arc;

use common::fresh;
use news_aggregator::ingest::dedup::{fingerprint, DuplicationChecker, WorkingSet};
use news_aggregator::store::{ArticleStore, MemoryStore};

#[tokio::test]
async fn remove_duplicates_keeps_first_occurrence_in_order() {
    let store = MemoryStore::new();
    let checker = DuplicationChecker::new(Arc::new(store.clone()));
    let a = fresh("First distinct headline", "https://d.test/1", "D");
    let b = fresh("Second distinct headline", "https://d.test/2", "D");
    let a_shouting = fresh("FIRST DISTINCT HEADLINE", "https://d.test/1", "D");

    let out = checker
        .remove_duplicates(vec![a.clone(), b.clone(), a_shouting], &WorkingSet::new())
        .await
        .unwrap();

    assert_eq!(out, vec![a, b]);
}

#[tokio::test]
async fn filtering_is_idempotent_against_the_store() {
    let store = MemoryStore::new();
    let checker = DuplicationChecker::new(Arc::new(store.clone()));
    let batch = vec![
        fresh("Stored already, skip me", "https://d.test/s", "D"),
        fresh("Brand new, keep me please", "https://d.test/n", "D"),
    ];
    store
        .upsert(&fingerprint(&batch[0]), batch[0].clone())
        .await
        .unwrap();

    let once = checker
        .remove_duplicates(batch.clone(), &WorkingSet::new())
        .await
        .unwrap();
    let twice = checker
        .remove_duplicates(once.clone(), &WorkingSet::new())
        .await
        .unwrap();

    assert_eq!(once.len(), 1);
    assert_eq!(once, twice);
}

#[tokio::test]
async fn concurrent_twins_are_claimed_once() {
    let store = MemoryStore::new();
    let checker = DuplicationChecker::new(Arc::new(store));
    let working = WorkingSet::new();
    let twin = fresh("Raced headline from two tasks", "https://d.test/race", "D");

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let checker = checker.clone();
            let working = working.clone();
            let twin = twin.clone();
            tokio::spawn(async move { checker.is_duplicate(&twin, &working).await.unwrap() })
        })
        .collect();

    let mut fresh_claims = 0;
    for t in tasks {
        if !t.await.unwrap() {
            fresh_claims += 1;
        }
    }
    assert_eq!(fresh_claims, 1);
    assert_eq!(working.len(), 1);
}

#[test]
fn record_fingerprint_matches_free_function() {
    let a = fresh("Budget 2025", "https://x/a", "X");
    assert_eq!(a.fingerprint(), fingerprint(&a));
}
