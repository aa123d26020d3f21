// src/config/news.rs
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use std::{env, fs};

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::ingest::AggregatorSettings;

pub const ENV_CONFIG_PATH: &str = "NEWS_CONFIG_PATH";

const DEFAULT_TOML: &str = "config/news.toml";
const DEFAULT_JSON: &str = "config/news.json";

/// Credentials and endpoint for one provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProviderConfig {
    /// Literal key, or "ENV" to read it from the provider's environment variable.
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    /// Requests per UTC day.
    pub rate_limit: Option<u32>,
}

impl ProviderConfig {
    /// The usable credential, if any.
    pub fn key(&self) -> Option<String> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProvidersConfig {
    pub newsapi: ProviderConfig,
    pub guardian: ProviderConfig,
    pub nyt: ProviderConfig,
}

impl ProvidersConfig {
    fn entries_mut(&mut self) -> [(&'static str, u32, &mut ProviderConfig); 3] {
        [
            ("NEWSAPI_KEY", 500, &mut self.newsapi),
            ("GUARDIAN_KEY", 5000, &mut self.guardian),
            ("NYT_KEY", 500, &mut self.nyt),
        ]
    }

    /// Resolve "ENV" keys, pick up env keys the file omitted, fill default ceilings.
    fn resolve(&mut self) {
        for (var, default_limit, p) in self.entries_mut() {
            let wants_env = p
                .api_key
                .as_deref()
                .map(|k| k.trim().eq_ignore_ascii_case("env"))
                .unwrap_or(true);
            if wants_env {
                p.api_key = env::var(var).ok().filter(|v| !v.trim().is_empty());
                if p.api_key.is_none() {
                    tracing::debug!(var, "provider key not set");
                }
            }
            if p.rate_limit.is_none() {
                p.rate_limit = Some(default_limit);
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AggregatorConfig {
    pub days_to_keep: u32,
    pub fetch_interval_minutes: u64,
    pub articles_per_fetch: u32,
    pub enable_live_search: bool,
    pub cache_ttl_secs: u64,
    pub default_page_size: usize,
    pub max_concurrency: usize,
    pub adapter_timeout_secs: u64,
    pub providers: ProvidersConfig,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            days_to_keep: 30,
            fetch_interval_minutes: 30,
            articles_per_fetch: 50,
            enable_live_search: true,
            cache_ttl_secs: 600,
            default_page_size: 20,
            max_concurrency: 4,
            adapter_timeout_secs: 30,
            providers: ProvidersConfig::default(),
        }
    }
}

impl AggregatorConfig {
    /// Load from an explicit path (TOML or JSON), then apply env overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading news config from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let mut cfg = parse(&content, &ext)?;
        cfg.finalize()?;
        Ok(cfg)
    }

    /// Resolution order:
    /// 1) $NEWS_CONFIG_PATH
    /// 2) config/news.toml
    /// 3) config/news.json
    /// 4) built-in defaults
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                bail!("{ENV_CONFIG_PATH} points to non-existent path {}", pb.display());
            }
            return Self::load_from(&pb);
        }
        for candidate in [DEFAULT_TOML, DEFAULT_JSON] {
            let pb = PathBuf::from(candidate);
            if pb.exists() {
                return Self::load_from(&pb);
            }
        }
        let mut cfg = Self::default();
        cfg.finalize()?;
        Ok(cfg)
    }

    fn finalize(&mut self) -> Result<()> {
        self.apply_env_overrides()?;
        self.providers.resolve();
        if self.max_concurrency == 0 {
            self.max_concurrency = 1;
        }
        Ok(())
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        override_from_env("NEWS_DAYS_TO_KEEP", &mut self.days_to_keep)?;
        override_from_env("NEWS_FETCH_INTERVAL", &mut self.fetch_interval_minutes)?;
        override_from_env("NEWS_ARTICLES_PER_FETCH", &mut self.articles_per_fetch)?;
        override_from_env("NEWS_ENABLE_LIVE_SEARCH", &mut self.enable_live_search)?;
        override_from_env("NEWS_CACHE_TTL", &mut self.cache_ttl_secs)?;
        override_from_env("NEWS_DEFAULT_PAGE_SIZE", &mut self.default_page_size)?;
        override_from_env("NEWS_MAX_CONCURRENCY", &mut self.max_concurrency)?;
        override_from_env("NEWS_ADAPTER_TIMEOUT", &mut self.adapter_timeout_secs)?;
        Ok(())
    }

    pub fn settings(&self) -> AggregatorSettings {
        AggregatorSettings {
            retention_days: self.days_to_keep,
            max_concurrency: self.max_concurrency.max(1),
            adapter_timeout: Duration::from_secs(self.adapter_timeout_secs.max(1)),
            articles_per_fetch: self.articles_per_fetch,
        }
    }

    pub fn fetch_interval(&self) -> Duration {
        Duration::from_secs(self.fetch_interval_minutes.max(1) * 60)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

fn parse(s: &str, hint_ext: &str) -> Result<AggregatorConfig> {
    match hint_ext {
        "toml" => toml::from_str(s).context("parsing news config as TOML"),
        "json" => serde_json::from_str(s).context("parsing news config as JSON"),
        _ => serde_json::from_str(s)
            .or_else(|_| toml::from_str(s))
            .map_err(|_| anyhow!("unsupported news config format")),
    }
}

fn override_from_env<T>(var: &str, slot: &mut T) -> Result<()>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Ok(raw) = env::var(var) else {
        return Ok(());
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(());
    }
    *slot = raw
        .parse()
        .map_err(|e| anyhow!("invalid value {raw:?} for {var}: {e}"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toml_and_json_parse_to_the_same_config() {
        let toml = r#"
            days_to_keep = 7
            [providers.guardian]
            api_key = "g-key"
            rate_limit = 10
        "#;
        let json = r#"{"days_to_keep": 7, "providers": {"guardian": {"api_key": "g-key", "rate_limit": 10}}}"#;
        let a = parse(toml, "toml").unwrap();
        let b = parse(json, "json").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.articles_per_fetch, 50);
        assert_eq!(a.providers.guardian.key().as_deref(), Some("g-key"));
    }

    #[test]
    fn unknown_extension_sniffs_format() {
        assert_eq!(parse("days_to_keep = 3", "").unwrap().days_to_keep, 3);
        assert!(parse("<xml/>", "").is_err());
    }

    #[test]
    fn blank_key_is_no_key() {
        let p = ProviderConfig {
            api_key: Some("   ".into()),
            ..ProviderConfig::default()
        };
        assert_eq!(p.key(), None);
    }
}
