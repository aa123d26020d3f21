// src/ingest/mod.rs
pub mod dedup;
pub mod http;
pub mod orchestrator;
pub mod processor;
pub mod providers;
pub mod scheduler;
pub mod types;

pub use dedup::{fingerprint, DuplicationChecker, WorkingSet};
pub use orchestrator::{Aggregator, AggregatorSettings};
pub use processor::ArticleProcessor;
pub use types::{
    AggregateResult, ArticleRecord, FetchParams, FetchResult, Metadata, NewsSourceAdapter,
    SearchFilters, SourceSnapshot,
};

use metrics::{describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::OnceCell;
use regex::Regex;

/// One-time metrics registration (so series show up on /metrics).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "ingest_articles_fetched_total",
            "Raw articles returned by providers."
        );
        describe_counter!("ingest_saved_total", "Articles upserted as new.");
        describe_counter!(
            "ingest_duplicates_total",
            "Articles skipped because their fingerprint was already known."
        );
        describe_counter!(
            "ingest_rejected_total",
            "Articles rejected by validation (e.g. invalid URL)."
        );
        describe_counter!(
            "ingest_provider_errors_total",
            "Provider transport/parse errors swallowed at the adapter boundary."
        );
        describe_counter!(
            "ingest_source_failures_total",
            "Source batches that failed and were rolled back."
        );
        describe_counter!("ingest_purged_total", "Articles removed by retention cleanup.");
        describe_counter!("ingest_runs_total", "Scheduled fetch-all runs started.");
        describe_histogram!("ingest_fetch_ms", "Per-source fetch time in milliseconds.");
        describe_histogram!(
            "ingest_provider_ms",
            "Provider HTTP call plus parse time in milliseconds."
        );
        describe_gauge!(
            "ingest_pipeline_last_run_ts",
            "Unix ts when the fetch-all pipeline last ran."
        );
    });
}

fn re_tags() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"(?is)</?[a-z!][^>]*>").expect("tag regex"))
}

fn re_ws() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("whitespace regex"))
}

/// Decode HTML entities and drop every tag.
pub fn strip_markup(s: &str) -> String {
    let decoded = html_escape::decode_html_entities(s);
    re_tags().replace_all(&decoded, "").into_owned()
}

/// Collapse runs of whitespace into one space and trim.
pub fn collapse_whitespace(s: &str) -> String {
    re_ws().replace_all(s, " ").trim().to_string()
}

/// Cap `s` at `max` chars; a truncated value ends in "..." and still fits in `max`.
pub fn limit_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let keep = max.saturating_sub(3);
    let mut out: String = s.chars().take(keep).collect();
    out.truncate(out.trim_end().len());
    out.push_str("...");
    out
}

/// `None` for missing or blank strings.
pub(crate) fn non_blank(s: Option<String>) -> Option<String> {
    s.filter(|v| !v.trim().is_empty())
}
