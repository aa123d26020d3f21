use async_trait::async_trait;
use metrics::{counter, histogram};
use serde_json::{json, Value};

use crate::error::Result;
use crate::ingest::http::RequestExecutor;
use crate::ingest::providers::{endpoint, items_at, parse_published_at, str_at, swallow};
use crate::ingest::types::{ArticleRecord, FetchParams, Metadata, NewsSourceAdapter, SearchFilters};

pub const SOURCE_NAME: &str = "guardian";
pub const DEFAULT_BASE_URL: &str = "https://content.guardianapis.com";

const CATEGORIES: [&str; 11] = [
    "world",
    "uk-news",
    "politics",
    "sport",
    "football",
    "business",
    "technology",
    "science",
    "environment",
    "culture",
    "lifeandstyle",
];
const DEFAULT_PAGE_SIZE: u32 = 50;

pub struct GuardianAdapter {
    api_key: String,
    base_url: String,
    http: RequestExecutor,
}

impl GuardianAdapter {
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

    async fn search_endpoint(&self, mut query: Vec<(String, String)>) -> Vec<ArticleRecord> {
        let t0 = std::time::Instant::now();
        query.push(("api-key".into(), self.api_key.clone()));
        query.push(("show-fields".into(), "all".into()));
        let url = endpoint(&self.base_url, "search");
        let out = match self.http.get_json(&url, &query).await {
            Ok(body) => parse_results(&body),
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

/// Map a Content API `search` body (`response.results`).
pub fn parse_results(body: &Value) -> Vec<ArticleRecord> {
    let mut out = Vec::new();
    for item in items_at(body, "/response/results") {
        let Some(url) = str_at(item, "/webUrl") else {
            continue;
        };
        let Some(published_at) =
            str_at(item, "/webPublicationDate").and_then(|s| parse_published_at(&s))
        else {
            continue;
        };

        let title = str_at(item, "/webTitle").unwrap_or_default();
        let mut rec = ArticleRecord::new(title, url, SOURCE_NAME, published_at);
        rec.description = str_at(item, "/fields/trailText");
        rec.content = str_at(item, "/fields/bodyText").or_else(|| str_at(item, "/fields/body"));
        rec.author = str_at(item, "/fields/byline");
        rec.image_url = str_at(item, "/fields/thumbnail");
        rec.category = str_at(item, "/sectionName");
        rec.external_id = str_at(item, "/id");

        let mut metadata = Metadata::new();
        metadata.insert("section_id".into(), json!(str_at(item, "/sectionId")));
        metadata.insert("type".into(), json!(str_at(item, "/type")));
        metadata.insert(
            "tags".into(),
            item.get("tags").cloned().unwrap_or_else(|| json!([])),
        );
        rec.metadata = metadata;
        out.push(rec);
    }
    out
}

#[async_trait]
impl NewsSourceAdapter for GuardianAdapter {
    async fn fetch_articles(&self, params: &FetchParams) -> Result<Vec<ArticleRecord>> {
        let mut query: Vec<(String, String)> = vec![
            (
                "page-size".into(),
                params.page_size.unwrap_or(DEFAULT_PAGE_SIZE).to_string(),
            ),
            ("order-by".into(), "newest".into()),
        ];
        query.extend(params.extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(self.search_endpoint(query).await)
    }

    async fn search_articles(
        &self,
        query: &str,
        filters: &SearchFilters,
    ) -> Result<Vec<ArticleRecord>> {
        let mut q: Vec<(String, String)> = vec![
            ("q".into(), query.to_string()),
            (
                "page-size".into(),
                filters.page_size.unwrap_or(DEFAULT_PAGE_SIZE).to_string(),
            ),
            (
                "order-by".into(),
                filters.sort.clone().unwrap_or_else(|| "newest".into()),
            ),
        ];
        if let Some(page) = filters.page {
            q.push(("page".into(), page.to_string()));
        }
        if let Some(from) = filters.from {
            q.push(("from-date".into(), from.format("%Y-%m-%d").to_string()));
        }
        if let Some(to) = filters.to {
            q.push(("to-date".into(), to.format("%Y-%m-%d").to_string()));
        }
        if let Some(section) = &filters.category {
            q.push(("section".into(), section.clone()));
        }
        Ok(self.search_endpoint(q).await)
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
