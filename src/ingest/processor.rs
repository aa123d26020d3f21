//! Article normalization: one record in, one cleaned record (or a rejection) out.
//!
//! Rule order is fixed: title, description/content, author, category, url, image url,
//! metadata. Only an invalid article URL rejects the record; everything else degrades to
//! a default.

use chrono::Utc;
use once_cell::sync::OnceCell;
use regex::Regex;
use url::Url;

use crate::error::ValidationError;
use crate::ingest::types::{ArticleRecord, Metadata};
use crate::ingest::{collapse_whitespace, limit_chars, non_blank, strip_markup};

pub const PROCESSOR_VERSION: &str = "1.0";

pub const TITLE_MIN_CHARS: usize = 10;
pub const TITLE_MAX_CHARS: usize = 255;
pub const DESCRIPTION_MAX_CHARS: usize = 500;
pub const AUTHOR_MAX_CHARS: usize = 100;
pub const DEFAULT_CATEGORY: &str = "general";

const TITLE_SUFFIX: &str = " - Article";

/// Aliases applied after lowercasing and removing separators.
const CATEGORY_ALIASES: &[(&str, &str)] = &[
    ("tech", "technology"),
    ("technews", "technology"),
    ("technology", "technology"),
    ("sports", "sport"),
    ("biz", "business"),
    ("businessnews", "business"),
    ("worldnews", "world"),
    ("politics", "politics"),
    ("entertainment", "entertainment"),
    ("science", "science"),
    ("health", "health"),
];

#[derive(Debug, Clone, Default)]
pub struct ArticleProcessor;

impl ArticleProcessor {
    pub fn new() -> Self {
        Self
    }

    pub fn process(&self, article: &ArticleRecord) -> Result<ArticleRecord, ValidationError> {
        let url = validate_url(&article.url)?;

        Ok(ArticleRecord {
            title: clean_title(&article.title),
            description: clean_description(article.description.as_deref()),
            content: clean_content(article.content.as_deref()),
            author: normalize_author(article.author.as_deref()),
            source_name: article.source_name.clone(),
            source_id: article.source_id.clone(),
            category: Some(normalize_category(article.category.as_deref())),
            url,
            image_url: validate_image_url(article.image_url.as_deref()),
            published_at: article.published_at,
            external_id: article.external_id.clone(),
            metadata: enrich_metadata(&article.metadata),
        })
    }
}

pub fn clean_title(title: &str) -> String {
    let mut out = collapse_whitespace(&strip_markup(title));
    if out.is_empty() {
        out.push_str("Untitled");
    }
    if out.chars().count() < TITLE_MIN_CHARS {
        out.push_str(TITLE_SUFFIX);
    }
    limit_chars(&out, TITLE_MAX_CHARS)
}

pub fn clean_description(description: Option<&str>) -> Option<String> {
    let cleaned = collapse_whitespace(&strip_markup(description?));
    non_blank(Some(limit_chars(&cleaned, DESCRIPTION_MAX_CHARS)))
}

/// Plain text that keeps paragraph and line-break tags only.
pub fn clean_content(content: Option<&str>) -> Option<String> {
    static RE_BLOCKS: OnceCell<Regex> = OnceCell::new();
    static RE_ANY_TAG: OnceCell<Regex> = OnceCell::new();
    let re_blocks = RE_BLOCKS.get_or_init(|| {
        Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>|<style\b[^>]*>.*?</style\s*>")
            .expect("script/style regex")
    });
    let re_any_tag = RE_ANY_TAG.get_or_init(|| {
        Regex::new(r"(?is)<(/?)([a-z][a-z0-9]*)\b[^>]*?(/?)>|<!--.*?-->").expect("tag regex")
    });

    let without_blocks = re_blocks.replace_all(content?, "");
    let kept = re_any_tag.replace_all(&without_blocks, |caps: &regex::Captures| {
        let name = caps
            .get(2)
            .map(|m| m.as_str().to_ascii_lowercase())
            .unwrap_or_default();
        match name.as_str() {
            "p" => format!("<{}p>", &caps[1]),
            "br" => "<br>".to_string(),
            _ => String::new(),
        }
    });
    non_blank(Some(kept.trim().to_string()))
}

pub fn normalize_author(author: Option<&str>) -> Option<String> {
    static RE_BY: OnceCell<Regex> = OnceCell::new();
    let re_by = RE_BY.get_or_init(|| Regex::new(r"(?i)^by\s+").expect("byline regex"));

    let trimmed = author?.trim();
    let stripped = re_by.replace(trimmed, "");
    non_blank(Some(limit_chars(stripped.trim(), AUTHOR_MAX_CHARS)))
}

pub fn normalize_category(category: Option<&str>) -> String {
    let Some(raw) = category.filter(|c| !c.trim().is_empty()) else {
        return DEFAULT_CATEGORY.to_string();
    };
    let key: String = raw
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '_'))
        .collect();

    CATEGORY_ALIASES
        .iter()
        .find(|(alias, _)| *alias == key)
        .map(|(_, canonical)| canonical.to_string())
        .unwrap_or(key)
}

/// Absolute http(s) URL with a host; returned trimmed but otherwise untouched so the
/// fingerprint sees the provider's spelling.
pub fn validate_url(raw: &str) -> Result<String, ValidationError> {
    let trimmed = raw.trim();
    if is_valid_url(trimmed) {
        Ok(trimmed.to_string())
    } else {
        Err(ValidationError::InvalidUrl(raw.to_string()))
    }
}

pub fn validate_image_url(raw: Option<&str>) -> Option<String> {
    let trimmed = raw?.trim();
    if !is_valid_url(trimmed) {
        return None;
    }
    match trimmed.strip_prefix("http://") {
        Some(rest) => Some(format!("https://{rest}")),
        None => Some(trimmed.to_string()),
    }
}

fn is_valid_url(s: &str) -> bool {
    Url::parse(s)
        .map(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some_and(|h| !h.is_empty()))
        .unwrap_or(false)
}

fn enrich_metadata(metadata: &Metadata) -> Metadata {
    let mut out = metadata.clone();
    out.insert(
        "processed_at".to_string(),
        serde_json::Value::String(Utc::now().to_rfc3339()),
    );
    out.insert(
        "processor_version".to_string(),
        serde_json::Value::String(PROCESSOR_VERSION.to_string()),
    );
    out
}
