// src/bootstrap.rs
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::articles::ArticleService;
use crate::cache::ArticleCache;
use crate::config::AggregatorConfig;
use crate::ingest::http::RequestExecutor;
use crate::ingest::providers::build_adapters;
use crate::ingest::Aggregator;
use crate::store::{ArticleStore, MemoryStore};

pub const DEFAULT_LOG_FILTER: &str = "news_aggregator=info,ingest=info,api=info,warn";

/// Install the global subscriber: compact lines by default, JSON with `LOG_FORMAT=json`.
/// `RUST_LOG` overrides the filter. Safe to call twice; the second call is a no-op.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    let res = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
    if res.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

/// Everything a binary needs: config, aggregator with its adapters, read-side service.
pub struct AppRuntime {
    pub config: AggregatorConfig,
    pub aggregator: Arc<Aggregator>,
    pub articles: Arc<ArticleService>,
}

impl AppRuntime {
    pub fn load_default() -> anyhow::Result<Self> {
        Ok(Self::from_config(AggregatorConfig::load_default()?))
    }

    pub fn from_config(config: AggregatorConfig) -> Self {
        Self::with_store(config, Arc::new(MemoryStore::new()))
    }

    pub fn with_store(config: AggregatorConfig, store: Arc<dyn ArticleStore>) -> Self {
        let cache = Arc::new(ArticleCache::in_memory(config.cache_ttl()));
        let settings = config.settings();
        let http = RequestExecutor::new().fit_within(settings.adapter_timeout);
        let aggregator = Arc::new(Aggregator::new(store, cache, settings));
        for (adapter, limit) in build_adapters(&config.providers, &http) {
            aggregator.register_adapter_with_limit(adapter, limit);
        }
        // Safe diagnostics only: names and counts, never keys.
        let names: Vec<String> = aggregator.sources().into_iter().map(|s| s.name).collect();
        info!(
            sources = ?names,
            retention_days = config.days_to_keep,
            fetch_interval_min = config.fetch_interval_minutes,
            live_search = config.enable_live_search,
            "runtime ready"
        );
        let articles = Arc::new(ArticleService::new(
            Arc::clone(&aggregator),
            config.enable_live_search,
        ));
        Self {
            config,
            aggregator,
            articles,
        }
    }
}
