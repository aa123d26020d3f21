// tests/config_load.rs
use std::env;
use std::fs;

use news_aggregator::config::{AggregatorConfig, ENV_CONFIG_PATH};
use serial_test::serial;
use tempfile::TempDir;

const VARS: &[&str] = &[
    ENV_CONFIG_PATH,
    "NEWSAPI_KEY",
    "GUARDIAN_KEY",
    "NYT_KEY",
    "NEWS_DAYS_TO_KEEP",
    "NEWS_FETCH_INTERVAL",
    "NEWS_ENABLE_LIVE_SEARCH",
    "NEWS_MAX_CONCURRENCY",
];

fn clear_env() {
    for v in VARS {
        env::remove_var(v);
    }
}

/// Run `f` with the working directory set to `dir`, restoring it afterwards.
fn in_dir<T>(dir: &TempDir, f: impl FnOnce() -> T) -> T {
    let prev = env::current_dir().unwrap();
    env::set_current_dir(dir.path()).unwrap();
    let out = f();
    env::set_current_dir(prev).unwrap();
    out
}

#[test]
#[serial]
fn defaults_when_nothing_is_configured() {
    clear_env();
    let dir = TempDir::new().unwrap();

    let cfg = in_dir(&dir, AggregatorConfig::load_default).unwrap();

    assert_eq!(cfg.days_to_keep, 30);
    assert_eq!(cfg.fetch_interval().as_secs(), 30 * 60);
    assert!(cfg.enable_live_search);
    assert_eq!(cfg.providers.newsapi.key(), None);
    assert_eq!(cfg.providers.guardian.rate_limit, Some(5000));
}

#[test]
#[serial]
fn local_toml_wins_over_json() {
    clear_env();
    let dir = TempDir::new().unwrap();
    fs::create_dir(dir.path().join("config")).unwrap();
    fs::write(dir.path().join("config/news.toml"), "days_to_keep = 7\n").unwrap();
    fs::write(dir.path().join("config/news.json"), r#"{"days_to_keep": 9}"#).unwrap();

    let cfg = in_dir(&dir, AggregatorConfig::load_default).unwrap();

    assert_eq!(cfg.days_to_keep, 7);
}

#[test]
#[serial]
fn env_path_takes_precedence() {
    clear_env();
    let dir = TempDir::new().unwrap();
    fs::create_dir(dir.path().join("config")).unwrap();
    fs::write(dir.path().join("config/news.toml"), "days_to_keep = 7\n").unwrap();
    let explicit = dir.path().join("custom.json");
    fs::write(&explicit, r#"{"days_to_keep": 2, "max_concurrency": 0}"#).unwrap();
    env::set_var(ENV_CONFIG_PATH, &explicit);

    let cfg = in_dir(&dir, AggregatorConfig::load_default).unwrap();
    clear_env();

    assert_eq!(cfg.days_to_keep, 2);
    assert_eq!(cfg.max_concurrency, 1);
}

#[test]
#[serial]
fn missing_env_path_is_an_error() {
    clear_env();
    env::set_var(ENV_CONFIG_PATH, "/definitely/not/here/news.toml");

    let err = AggregatorConfig::load_default().unwrap_err();
    clear_env();

    assert!(err.to_string().contains(ENV_CONFIG_PATH));
}

#[test]
#[serial]
fn env_keys_are_resolved() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("news.toml");
    fs::write(
        &path,
        r#"
            [providers.newsapi]
            api_key = "ENV"
            rate_limit = 100

            [providers.guardian]
            api_key = "literal-guardian"

            [providers.nyt]
            api_key = "ENV"
        "#,
    )
    .unwrap();
    env::set_var("NEWSAPI_KEY", "from-env");

    let cfg = AggregatorConfig::load_from(&path).unwrap();
    clear_env();

    assert_eq!(cfg.providers.newsapi.key().as_deref(), Some("from-env"));
    assert_eq!(cfg.providers.newsapi.rate_limit, Some(100));
    assert_eq!(cfg.providers.guardian.key().as_deref(), Some("literal-guardian"));
    // NYT_KEY unset: the provider stays unconfigured
    assert_eq!(cfg.providers.nyt.key(), None);
    assert_eq!(cfg.providers.nyt.rate_limit, Some(500));
}

#[test]
#[serial]
fn env_overrides_file_values() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("news.json");
    fs::write(&path, r#"{"days_to_keep": 10, "enable_live_search": true}"#).unwrap();
    env::set_var("NEWS_DAYS_TO_KEEP", "3");
    env::set_var("NEWS_ENABLE_LIVE_SEARCH", "false");
    env::set_var("NEWS_FETCH_INTERVAL", "5");

    let cfg = AggregatorConfig::load_from(&path).unwrap();
    clear_env();

    assert_eq!(cfg.days_to_keep, 3);
    assert!(!cfg.enable_live_search);
    assert_eq!(cfg.fetch_interval().as_secs(), 300);
    assert_eq!(cfg.settings().retention_days, 3);
}

#[test]
#[serial]
fn unparseable_override_is_an_error() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("news.toml");
    fs::write(&path, "days_to_keep = 10\n").unwrap();
    env::set_var("NEWS_DAYS_TO_KEEP", "a fortnight");

    let err = AggregatorConfig::load_from(&path).unwrap_err();
    clear_env();

    assert!(err.to_string().contains("NEWS_DAYS_TO_KEEP"));
}

#[test]
#[serial]
fn malformed_file_is_an_error() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("news.toml");
    fs::write(&path, "days_to_keep = [not toml").unwrap();

    assert!(AggregatorConfig::load_from(&path).is_err());
}
