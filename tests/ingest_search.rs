// tests/ingest_search.rs
mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use common::{aggregator, fresh, MockAdapter};
use news_aggregator::ingest::{ArticleRecord, SearchFilters};

fn hits(source: &str, n: usize) -> Vec<ArticleRecord> {
    (0..n)
        .map(|i| {
            fresh(
                &format!("Search hit {i} from {source}"),
                &format!("https://{}.test/search/{i}", source.to_lowercase()),
                source,
            )
        })
        .collect()
}

fn only(names: &[&str]) -> SearchFilters {
    SearchFilters {
        sources: Some(names.iter().map(|s| s.to_string()).collect()),
        ..SearchFilters::default()
    }
}

#[tokio::test]
async fn results_follow_the_requested_source_order() {
    let (agg, store) = aggregator();
    agg.register_adapter(Arc::new(MockAdapter::new("A", Vec::new()).with_search_results(hits("A", 2))));
    agg.register_adapter(Arc::new(MockAdapter::new("B", Vec::new()).with_search_results(hits("B", 2))));

    let found = agg
        .search_across_sources("rates", &only(&["B", "A"]))
        .await
        .unwrap();

    let sources: Vec<&str> = found.iter().map(|a| a.source_name.as_str()).collect();
    assert_eq!(sources, ["B", "B", "A", "A"]);
    assert_eq!(store.len(), 4);
}

#[tokio::test]
async fn failing_source_is_left_out_of_the_merge() {
    let (agg, _store) = aggregator();
    agg.register_adapter(Arc::new(MockAdapter::new("A", Vec::new()).with_search_results(hits("A", 3))));
    agg.register_adapter(Arc::new(MockAdapter::failing("B")));

    let found = agg
        .search_across_sources("rates", &SearchFilters::default())
        .await
        .unwrap();

    assert_eq!(found.len(), 3);
    assert!(found.iter().all(|a| a.source_name == "A"));
}

#[tokio::test]
async fn unknown_source_names_are_ignored() {
    let (agg, _store) = aggregator();
    let a = Arc::new(MockAdapter::new("A", Vec::new()).with_search_results(hits("A", 1)));
    let b = Arc::new(MockAdapter::new("B", Vec::new()).with_search_results(hits("B", 1)));
    agg.register_adapter(a.clone());
    agg.register_adapter(b.clone());

    let found = agg
        .search_across_sources("rates", &only(&["A", "bbc"]))
        .await
        .unwrap();

    assert_eq!(found.len(), 1);
    assert_eq!(a.search_calls.load(Ordering::SeqCst), 1);
    assert_eq!(b.search_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn duplicates_across_sources_and_within_one_are_merged() {
    let (agg, store) = aggregator();
    let mut a_hits = hits("A", 2);
    a_hits.push(a_hits[0].clone());
    agg.register_adapter(Arc::new(MockAdapter::new("A", Vec::new()).with_search_results(a_hits)));

    let found = agg
        .search_across_sources("rates", &SearchFilters::default())
        .await
        .unwrap();

    assert_eq!(found.len(), 2);
    assert_eq!(store.len(), 2);
}

#[tokio::test]
async fn large_result_sets_are_persisted_in_chunks() {
    let (agg, store) = aggregator();
    agg.register_adapter(Arc::new(MockAdapter::new("A", Vec::new()).with_search_results(hits("A", 250))));

    let found = agg
        .search_across_sources("everything", &SearchFilters::default())
        .await
        .unwrap();

    assert_eq!(found.len(), 250);
    assert_eq!(store.len(), 250);
}

#[tokio::test]
async fn invalid_results_are_dropped_before_persisting() {
    let (agg, store) = aggregator();
    let mut a_hits = hits("A", 2);
    a_hits.push(fresh("A search hit without a link", "ftp://nowhere", "A"));
    agg.register_adapter(Arc::new(MockAdapter::new("A", Vec::new()).with_search_results(a_hits)));

    let found = agg
        .search_across_sources("rates", &SearchFilters::default())
        .await
        .unwrap();

    assert_eq!(found.len(), 2);
    assert_eq!(store.len(), 2);
}

#[tokio::test]
async fn already_stored_results_are_not_returned_again() {
    let (agg, store) = aggregator();
    agg.register_adapter(Arc::new(MockAdapter::new("A", Vec::new()).with_search_results(hits("A", 3))));

    let first = agg
        .search_across_sources("rates", &SearchFilters::default())
        .await
        .unwrap();
    let second = agg
        .search_across_sources("rates", &SearchFilters::default())
        .await
        .unwrap();

    assert_eq!(first.len(), 3);
    assert!(second.is_empty());
    assert_eq!(store.len(), 3);
}

#[tokio::test]
async fn exhausted_budget_skips_the_source() {
    let (agg, _store) = aggregator();
    let limited = Arc::new(MockAdapter::new("A", Vec::new()).with_search_results(hits("A", 2)));
    agg.register_adapter_with_limit(limited.clone(), Some(0));
    agg.register_adapter(Arc::new(MockAdapter::new("B", Vec::new()).with_search_results(hits("B", 1))));

    let found = agg
        .search_across_sources("rates", &SearchFilters::default())
        .await
        .unwrap();

    assert_eq!(found.len(), 1);
    assert_eq!(limited.search_calls.load(Ordering::SeqCst), 0);
}
