use async_trait::async_trait;
use metrics::{counter, histogram};
use serde_json::{json, Value};

use crate::error::Result;
use crate::ingest::http::RequestExecutor;
use crate::ingest::providers::{endpoint, items_at, parse_published_at, str_at, swallow};
use crate::ingest::types::{ArticleRecord, FetchParams, Metadata, NewsSourceAdapter, SearchFilters};

pub const SOURCE_NAME: &str = "The New York Times";
pub const SOURCE_ID: &str = "nyt";
pub const DEFAULT_BASE_URL: &str = "https://api.nytimes.com/svc";

const TOP_STORIES: &str = "topstories/v2/home.json";
const ARTICLE_SEARCH: &str = "search/v2/articlesearch.json";
const IMAGE_FORMAT: &str = "mediumThreeByTwo440";
const IMAGE_HOST: &str = "https://www.nytimes.com/";

const SECTIONS: [&str; 23] = [
    "arts",
    "automobiles",
    "books",
    "business",
    "fashion",
    "food",
    "health",
    "home",
    "insider",
    "opinion",
    "magazine",
    "movies",
    "world",
    "politics",
    "technology",
    "science",
    "sports",
    "obituaries",
    "travel",
    "realestate",
    "sundayreview",
    "upshot",
    "theater",
];

pub struct NytAdapter {
    api_key: String,
    base_url: String,
    http: RequestExecutor,
}

impl NytAdapter {
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

    async fn call(
        &self,
        path: &str,
        mut query: Vec<(String, String)>,
        parse: fn(&Value) -> Vec<ArticleRecord>,
    ) -> Vec<ArticleRecord> {
        let t0 = std::time::Instant::now();
        query.push(("api-key".into(), self.api_key.clone()));
        let url = endpoint(&self.base_url, path);
        let out = match self.http.get_json(&url, &query).await {
            Ok(body) => parse(&body),
            Err(e) => {
                swallow(SOURCE_NAME, &e);
                Vec::new()
            }
        };
        histogram!("ingest_provider_ms", "provider" => SOURCE_ID)
            .record(t0.elapsed().as_secs_f64() * 1_000.0);
        counter!("ingest_articles_fetched_total", "provider" => SOURCE_ID)
            .increment(out.len() as u64);
        out
    }
}

/// Map a Top Stories body (`results`).
pub fn parse_top_stories(body: &Value) -> Vec<ArticleRecord> {
    let mut out = Vec::new();
    for item in items_at(body, "/results") {
        let Some(url) = str_at(item, "/url").or_else(|| str_at(item, "/short_url")) else {
            continue;
        };
        let Some(published_at) = str_at(item, "/published_date")
            .or_else(|| str_at(item, "/created_date"))
            .and_then(|s| parse_published_at(&s))
        else {
            continue;
        };

        let title = str_at(item, "/title").unwrap_or_else(|| "Untitled".into());
        let mut rec = ArticleRecord::new(title, url, SOURCE_NAME, published_at);
        rec.source_id = SOURCE_ID.into();
        rec.description = str_at(item, "/abstract");
        rec.author = str_at(item, "/byline");
        rec.category = str_at(item, "/section");
        rec.image_url = items_at(item, "/multimedia")
            .iter()
            .find(|m| m.get("format").and_then(Value::as_str) == Some(IMAGE_FORMAT))
            .and_then(|m| str_at(m, "/url"));
        rec.external_id = str_at(item, "/uri");

        let mut metadata = Metadata::new();
        metadata.insert("section".into(), json!(str_at(item, "/section")));
        metadata.insert("subsection".into(), json!(str_at(item, "/subsection")));
        metadata.insert(
            "material_type".into(),
            json!(str_at(item, "/material_type_facet")),
        );
        rec.metadata = metadata;
        out.push(rec);
    }
    out
}

/// Map an Article Search body (`response.docs`).
pub fn parse_search_docs(body: &Value) -> Vec<ArticleRecord> {
    let mut out = Vec::new();
    for doc in items_at(body, "/response/docs") {
        let Some(url) = str_at(doc, "/web_url") else {
            continue;
        };
        let Some(published_at) = str_at(doc, "/pub_date").and_then(|s| parse_published_at(&s))
        else {
            continue;
        };

        let title = str_at(doc, "/headline/main").unwrap_or_else(|| "Untitled".into());
        let mut rec = ArticleRecord::new(title, url, SOURCE_NAME, published_at);
        rec.source_id = SOURCE_ID.into();
        rec.description = str_at(doc, "/abstract").or_else(|| str_at(doc, "/lead_paragraph"));
        rec.content = str_at(doc, "/lead_paragraph");
        rec.author = str_at(doc, "/byline/original");
        rec.category = str_at(doc, "/section_name");
        rec.image_url = items_at(doc, "/multimedia")
            .first()
            .and_then(|m| str_at(m, "/url"))
            .map(|u| absolute_image_url(&u));
        rec.external_id = str_at(doc, "/_id");

        let mut metadata = Metadata::new();
        metadata.insert("document_type".into(), json!(str_at(doc, "/document_type")));
        metadata.insert("news_desk".into(), json!(str_at(doc, "/news_desk")));
        metadata.insert(
            "word_count".into(),
            doc.get("word_count").cloned().unwrap_or_else(|| json!(0)),
        );
        rec.metadata = metadata;
        out.push(rec);
    }
    out
}

fn absolute_image_url(path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        path.to_string()
    } else {
        format!("{IMAGE_HOST}{}", path.trim_start_matches('/'))
    }
}

#[async_trait]
impl NewsSourceAdapter for NytAdapter {
    async fn fetch_articles(&self, params: &FetchParams) -> Result<Vec<ArticleRecord>> {
        // Top Stories has no page size; the whole section comes back.
        let query = params
            .extra
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Ok(self.call(TOP_STORIES, query, parse_top_stories).await)
    }

    async fn search_articles(
        &self,
        query: &str,
        filters: &SearchFilters,
    ) -> Result<Vec<ArticleRecord>> {
        let mut q: Vec<(String, String)> = vec![
            ("q".into(), query.to_string()),
            (
                "sort".into(),
                filters.sort.clone().unwrap_or_else(|| "newest".into()),
            ),
            ("page".into(), filters.page.unwrap_or(0).to_string()),
        ];
        if let Some(from) = filters.from {
            q.push(("begin_date".into(), from.format("%Y%m%d").to_string()));
        }
        if let Some(to) = filters.to {
            q.push(("end_date".into(), to.format("%Y%m%d").to_string()));
        }
        if let Some(section) = &filters.category {
            q.push(("fq".into(), format!("section_name:(\"{section}\")")));
        }
        Ok(self.call(ARTICLE_SEARCH, q, parse_search_docs).await)
    }

    fn categories(&self) -> Vec<String> {
        SECTIONS.iter().map(|c| c.to_string()).collect()
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
