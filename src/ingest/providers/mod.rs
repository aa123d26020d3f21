// src/ingest/providers/mod.rs
pub mod guardian;
pub mod newsapi;
pub mod nyt;

pub use guardian::GuardianAdapter;
pub use newsapi::NewsApiAdapter;
pub use nyt::NytAdapter;

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use metrics::counter;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::config::ProvidersConfig;
use crate::error::TransportError;
use crate::ingest::dedup::hex;
use crate::ingest::http::RequestExecutor;
use crate::ingest::types::NewsSourceAdapter;

/// Adapter plus its daily request ceiling, ready for registration.
pub type ConfiguredAdapter = (Arc<dyn NewsSourceAdapter>, Option<u32>);

/// Build an adapter for every provider that has a credential. Providers without one are
/// skipped with a log line. Every adapter shares `http`, so its retry schedule should
/// already fit the aggregator's per-source deadline.
pub fn build_adapters(cfg: &ProvidersConfig, http: &RequestExecutor) -> Vec<ConfiguredAdapter> {
    let mut out: Vec<ConfiguredAdapter> = Vec::new();

    match cfg.newsapi.key() {
        Some(key) => {
            let mut a = NewsApiAdapter::new(key).with_executor(http.clone());
            if let Some(url) = &cfg.newsapi.base_url {
                a = a.with_base_url(url);
            }
            out.push((Arc::new(a), cfg.newsapi.rate_limit));
        }
        None => skip("newsapi"),
    }

    match cfg.guardian.key() {
        Some(key) => {
            let mut a = GuardianAdapter::new(key).with_executor(http.clone());
            if let Some(url) = &cfg.guardian.base_url {
                a = a.with_base_url(url);
            }
            out.push((Arc::new(a), cfg.guardian.rate_limit));
        }
        None => skip("guardian"),
    }

    match cfg.nyt.key() {
        Some(key) => {
            let mut a = NytAdapter::new(key).with_executor(http.clone());
            if let Some(url) = &cfg.nyt.base_url {
                a = a.with_base_url(url);
            }
            out.push((Arc::new(a), cfg.nyt.rate_limit));
        }
        None => skip("nyt"),
    }

    out
}

/// Registered source name for a short config key ("newsapi", "guardian", "nyt").
pub fn canonical_source_name(key: &str) -> Option<&'static str> {
    match key.trim().to_ascii_lowercase().as_str() {
        "newsapi" => Some(newsapi::SOURCE_NAME),
        "guardian" => Some(guardian::SOURCE_NAME),
        "nyt" => Some(nyt::SOURCE_NAME),
        _ => None,
    }
}

fn skip(provider: &str) {
    tracing::info!(target: "ingest", provider, "no credential configured; adapter not registered");
}

/// Adapter-boundary handling of a transport failure: log, count, carry on empty.
pub(crate) fn swallow(provider: &str, err: &TransportError) {
    tracing::warn!(target: "ingest", provider, error = %err, "provider request failed");
    counter!("ingest_provider_errors_total", "provider" => provider.to_string()).increment(1);
}

/// Provider timestamps: RFC 3339, then offsets without a colon, then a bare date.
pub fn parse_published_at(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%z") {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Stable id for providers that do not ship one: first 32 hex chars of sha256(url).
pub fn external_id_for(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    let mut id = hex(&digest);
    id.truncate(32);
    id
}

/// Non-blank string at a JSON pointer.
pub(crate) fn str_at(v: &Value, pointer: &str) -> Option<String> {
    v.pointer(pointer)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Array at a JSON pointer, or empty.
pub(crate) fn items_at<'a>(v: &'a Value, pointer: &str) -> &'a [Value] {
    v.pointer(pointer)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

pub(crate) fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_provider_timestamp_shapes() {
        let want = Utc.with_ymd_and_hms(2025, 3, 4, 10, 0, 0).unwrap();
        assert_eq!(parse_published_at("2025-03-04T10:00:00Z"), Some(want));
        assert_eq!(parse_published_at("2025-03-04T05:00:00-05:00"), Some(want));
        assert_eq!(parse_published_at("2025-03-04T10:00:00+0000"), Some(want));
        assert_eq!(
            parse_published_at("2025-03-04"),
            Some(Utc.with_ymd_and_hms(2025, 3, 4, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_published_at("yesterday"), None);
    }

    #[test]
    fn external_id_is_short_and_stable() {
        let a = external_id_for("https://x/a");
        assert_eq!(a.len(), 32);
        assert_eq!(a, external_id_for("https://x/a"));
        assert_ne!(a, external_id_for("https://x/b"));
    }

    #[test]
    fn config_keys_map_to_source_names() {
        assert_eq!(canonical_source_name("NYT"), Some("The New York Times"));
        assert_eq!(canonical_source_name("newsapi"), Some("NewsAPI"));
        assert_eq!(canonical_source_name("bbc"), None);
    }

    #[test]
    fn endpoint_joins_without_double_slash() {
        assert_eq!(endpoint("https://h/v2/", "/everything"), "https://h/v2/everything");
        assert_eq!(endpoint("https://h", "search"), "https://h/search");
    }
}
