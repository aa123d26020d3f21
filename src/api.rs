use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::CorsLayer;

use crate::articles::ArticleService;
use crate::bootstrap::AppRuntime;
use crate::error::{AggregatorError, StoreError};
use crate::ingest::{AggregateResult, Aggregator, FetchResult, SourceSnapshot};
use crate::store::{ArticleFilters, Page, PageRequest, SortField, StoredArticle};

const DEFAULT_POPULAR_LIMIT: usize = 10;
const MAX_LIMIT: usize = 100;

#[derive(Clone)]
pub struct AppState {
    pub articles: Arc<ArticleService>,
    pub aggregator: Arc<Aggregator>,
    pub default_page_size: usize,
}

impl AppState {
    pub fn from_runtime(rt: &AppRuntime) -> Self {
        Self {
            articles: Arc::clone(&rt.articles),
            aggregator: Arc::clone(&rt.aggregator),
            default_page_size: rt.config.default_page_size,
        }
    }

    fn page(&self, page: Option<usize>, per_page: Option<usize>) -> PageRequest {
        PageRequest::new(page.unwrap_or(1), per_page.unwrap_or(self.default_page_size))
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/sources", get(list_sources))
        .route("/sources/categories", get(list_categories))
        .route("/sources/{source}/status", get(source_status))
        .route("/admin/fetch", post(admin_fetch))
        .route("/admin/articles/{id}/featured", post(admin_set_featured))
        .route("/articles", get(list_articles))
        .route("/articles/popular", get(popular_articles))
        .route("/articles/search", get(search_articles))
        .route("/articles/category/{category}", get(articles_by_category))
        .route("/articles/source/{source}", get(articles_by_source))
        .route("/articles/{id}", get(show_article))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    TooManyRequests(String),
    Unavailable(String),
    Internal(String),
}

impl From<AggregatorError> for ApiError {
    fn from(e: AggregatorError) -> Self {
        match &e {
            AggregatorError::UnknownSource(_) | AggregatorError::Store(StoreError::NotFound(_)) => {
                ApiError::NotFound(e.to_string())
            }
            AggregatorError::RateLimited { .. } => ApiError::TooManyRequests(e.to_string()),
            AggregatorError::Timeout { .. } | AggregatorError::Cancelled => {
                ApiError::Unavailable(e.to_string())
            }
            _ => ApiError::Internal(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, msg) = match self {
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::TooManyRequests(m) => (StatusCode::TOO_MANY_REQUESTS, m),
            ApiError::Unavailable(m) => (StatusCode::SERVICE_UNAVAILABLE, m),
            ApiError::Internal(m) => {
                tracing::error!(target: "api", error = %m, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, m)
            }
        };
        (status, Json(json!({ "error": msg }))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Every source is re-checked before answering, so `available` is never stale.
async fn list_sources(State(state): State<AppState>) -> Json<Vec<SourceSnapshot>> {
    Json(state.aggregator.refresh_availability().await)
}

async fn list_categories(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.aggregator.categories())
}

async fn source_status(
    State(state): State<AppState>,
    Path(source): Path<String>,
) -> ApiResult<SourceSnapshot> {
    state
        .aggregator
        .source_status(&source)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::from(AggregatorError::UnknownSource(source)))
}

#[derive(Deserialize)]
struct FetchQuery {
    #[serde(default)]
    source: Option<String>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum FetchOutcome {
    All(AggregateResult),
    One(FetchResult),
}

async fn admin_fetch(
    State(state): State<AppState>,
    Query(q): Query<FetchQuery>,
) -> ApiResult<FetchOutcome> {
    let source = q.source.unwrap_or_else(|| "all".to_string());
    tracing::info!(target: "api", %source, "manual fetch requested");
    if source.eq_ignore_ascii_case("all") {
        let res = state.aggregator.fetch_from_all_sources().await?;
        Ok(Json(FetchOutcome::All(res)))
    } else {
        let res = state.aggregator.fetch_from_source_named(&source).await?;
        Ok(Json(FetchOutcome::One(res)))
    }
}

#[derive(Deserialize)]
struct FeaturedQuery {
    #[serde(default = "yes")]
    value: bool,
}

fn yes() -> bool {
    true
}

async fn admin_set_featured(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Query(q): Query<FeaturedQuery>,
) -> ApiResult<serde_json::Value> {
    state.articles.set_featured(id, q.value).await?;
    Ok(Json(json!({ "id": id, "is_featured": q.value })))
}

#[derive(Deserialize)]
struct ListQuery {
    /// Comma-separated source names.
    source: Option<String>,
    source_id: Option<String>,
    category: Option<String>,
    author: Option<String>,
    q: Option<String>,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
    sort_by: Option<SortField>,
    featured: Option<bool>,
    page: Option<usize>,
    per_page: Option<usize>,
}

impl ListQuery {
    fn filters(&self) -> ArticleFilters {
        ArticleFilters {
            source_names: self.source.as_deref().map(|s| {
                s.split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(str::to_string)
                    .collect()
            }),
            source_id: self.source_id.clone(),
            category: self.category.clone(),
            author: self.author.clone(),
            is_featured: self.featured,
            query: self.q.clone().filter(|q| !q.trim().is_empty()),
            date_from: self.from,
            date_to: self.to,
            sort_by: self.sort_by.unwrap_or_default(),
        }
    }
}

async fn list_articles(
    State(state): State<AppState>,
    Query(q): Query<ListQuery>,
) -> ApiResult<Page<StoredArticle>> {
    if let (Some(from), Some(to)) = (q.from, q.to) {
        if from > to {
            return Err(ApiError::BadRequest("`from` must not be after `to`".into()));
        }
    }
    let page = state.page(q.page, q.per_page);
    Ok(Json(state.articles.latest(&q.filters(), page).await?))
}

#[derive(Deserialize)]
struct LimitQuery {
    limit: Option<usize>,
}

async fn popular_articles(
    State(state): State<AppState>,
    Query(q): Query<LimitQuery>,
) -> ApiResult<Vec<StoredArticle>> {
    let limit = q.limit.unwrap_or(DEFAULT_POPULAR_LIMIT).clamp(1, MAX_LIMIT);
    Ok(Json(state.articles.popular(limit).await?))
}

#[derive(Deserialize)]
struct SearchQuery {
    q: Option<String>,
    #[serde(default)]
    live: bool,
    page: Option<usize>,
    per_page: Option<usize>,
}

async fn search_articles(
    State(state): State<AppState>,
    Query(q): Query<SearchQuery>,
) -> ApiResult<Page<StoredArticle>> {
    let query = q.q.as_deref().map(str::trim).unwrap_or_default();
    if query.is_empty() {
        return Err(ApiError::BadRequest("query parameter `q` is required".into()));
    }
    let page = state.page(q.page, q.per_page);
    Ok(Json(state.articles.search(query, q.live, page).await?))
}

#[derive(Deserialize)]
struct PageQuery {
    page: Option<usize>,
    per_page: Option<usize>,
}

async fn articles_by_category(
    State(state): State<AppState>,
    Path(category): Path<String>,
    Query(q): Query<PageQuery>,
) -> ApiResult<Page<StoredArticle>> {
    let page = state.page(q.page, q.per_page);
    Ok(Json(state.articles.by_category(&category, page).await?))
}

async fn articles_by_source(
    State(state): State<AppState>,
    Path(source): Path<String>,
    Query(q): Query<LimitQuery>,
) -> ApiResult<Vec<StoredArticle>> {
    let limit = q.limit.unwrap_or(DEFAULT_POPULAR_LIMIT).clamp(1, MAX_LIMIT);
    Ok(Json(state.articles.latest_by_source(&source, limit).await?))
}

async fn show_article(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> ApiResult<StoredArticle> {
    match state.articles.show(id).await? {
        Some(a) => Ok(Json(a)),
        None => Err(ApiError::NotFound(format!("article {id} not found"))),
    }
}
