use async_trait::async_trait;
use metrics::{counter, histogram};
use serde_json::{json, Value};

use crate::error::Result;
use crate::ingest::http::RequestExecutor;
use crate::ingest::providers::{
    endpoint, external_id_for, items_at, parse_published_at, str_at, swallow,
};
use crate::ingest::types::{ArticleRecord, FetchParams, Metadata, NewsSourceAdapter, SearchFilters};

pub const SOURCE_NAME: &str = "NewsAPI";
pub const DEFAULT_BASE_URL: &str = "https://newsapi.org/v2";

const CATEGORIES: [&str; 7] = [
    "business",
    "entertainment",
    "general",
    "health",
    "science",
    "sports",
    "technology",
];
const DEFAULT_PAGE_SIZE: u32 = 50;
const SEARCH_PAGE_SIZE: u32 = 100;

pub struct NewsApiAdapter {
    api_key: String,
    base_url: String,
    http: RequestExecutor,
}

impl NewsApiAdapter {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            http: RequestExecutor::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_executor(mut self, http: RequestExecutor) -> Self {
        self.http = http;
        self
    }

    async fn call(&self, path: &str, mut query: Vec<(String, String)>) -> Vec<ArticleRecord> {
        let t0 = std::time::Instant::now();
        query.push(("apiKey".into(), self.api_key.clone()));
        let url = endpoint(&self.base_url, path);
        let out = match self.http.get_json(&url, &query).await {
            Ok(body) => parse_articles(&body),
            Err(e) => {
                swallow(SOURCE_NAME, &e);
                Vec::new()
            }
        };
        histogram!("ingest_provider_ms", "provider" => SOURCE_NAME)
            .record(t0.elapsed().as_secs_f64() * 1_000.0);
        counter!("ingest_articles_fetched_total", "provider" => SOURCE_NAME)
            .increment(out.len() as u64);
        out
    }
}

/// Map a `top-headlines` / `everything` response body. Items without a URL or a
/// parseable `publishedAt` are skipped.
pub fn parse_articles(body: &Value) -> Vec<ArticleRecord> {
    let mut out = Vec::new();
    for item in items_at(body, "/articles") {
        let Some(url) = str_at(item, "/url") else {
            continue;
        };
        let Some(published_at) = str_at(item, "/publishedAt").and_then(|s| parse_published_at(&s))
        else {
            tracing::debug!(target: "ingest", provider = SOURCE_NAME, %url, "unparseable publishedAt; skipped");
            continue;
        };

        let title = str_at(item, "/title").unwrap_or_default();
        let mut rec = ArticleRecord::new(title, url.clone(), SOURCE_NAME, published_at);
        rec.description = str_at(item, "/description");
        rec.content = str_at(item, "/content");
        rec.author = str_at(item, "/author");
        rec.source_id = str_at(item, "/source/id")
            .or_else(|| str_at(item, "/source/name"))
            .unwrap_or_else(|| "unknown".to_string());
        rec.category = Some(category_from_url(&url));
        rec.image_url = str_at(item, "/urlToImage");
        rec.external_id = Some(external_id_for(&url));

        let mut metadata = Metadata::new();
        metadata.insert(
            "source_details".into(),
            item.get("source").cloned().unwrap_or_else(|| json!({})),
        );
        rec.metadata = metadata;
        out.push(rec);
    }
    out
}

/// First declared category that appears in the URL, else "general".
fn category_from_url(url: &str) -> String {
    CATEGORIES
        .iter()
        .find(|c| url.contains(*c))
        .unwrap_or(&"general")
        .to_string()
}

#[async_trait]
impl NewsSourceAdapter for NewsApiAdapter {
    async fn fetch_articles(&self, params: &FetchParams) -> Result<Vec<ArticleRecord>> {
        let mut query: Vec<(String, String)> = vec![(
            "pageSize".into(),
            params.page_size.unwrap_or(DEFAULT_PAGE_SIZE).to_string(),
        )];
        // top-headlines needs at least one of country/sources/category/q.
        let scoped = ["country", "sources", "category", "q"]
            .iter()
            .any(|k| params.extra.contains_key(*k));
        if !scoped {
            query.push(("country".into(), "us".into()));
        }
        query.extend(params.extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(self.call("top-headlines", query).await)
    }

    async fn search_articles(
        &self,
        query: &str,
        filters: &SearchFilters,
    ) -> Result<Vec<ArticleRecord>> {
        let mut q: Vec<(String, String)> = vec![
            ("q".into(), query.to_string()),
            (
                "sortBy".into(),
                filters.sort.clone().unwrap_or_else(|| "publishedAt".into()),
            ),
            (
                "pageSize".into(),
                filters.page_size.unwrap_or(SEARCH_PAGE_SIZE).to_string(),
            ),
        ];
        if let Some(page) = filters.page {
            q.push(("page".into(), page.to_string()));
        }
        if let Some(from) = filters.from {
            q.push(("from".into(), from.to_rfc3339()));
        }
        if let Some(to) = filters.to {
            q.push(("to".into(), to.to_rfc3339()));
        }
        Ok(self.call("everything", q).await)
    }

    fn categories(&self) -> Vec<String> {
        CATEGORIES.iter().map(|c| c.to_string()).collect()
    }

    fn source_name(&self) -> &str {
        SOURCE_NAME
    }

    async fn is_available(&self) -> bool {
        if self.api_key.trim().is_empty() {
            return false;
        }
        self.http.is_reachable(&self.base_url).await
    }
}
