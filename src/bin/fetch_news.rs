//! One-off fetch from the command line. Prints the result as JSON.
//!
//!   fetch-news                  # every configured source
//!   fetch-news --source nyt     # one source, by config key or source name

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use news_aggregator::bootstrap::{init_tracing, AppRuntime};
use news_aggregator::config::AggregatorConfig;

#[derive(Parser, Debug)]
#[command(name = "fetch-news", about = "Fetch latest news articles from configured sources")]
struct Args {
    /// "all" or a single source (newsapi, guardian, nyt, or its display name).
    #[arg(long, default_value = "all")]
    source: String,

    /// Config file (TOML or JSON). Defaults to the usual lookup.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();
    let args = Args::parse();

    let cfg = match &args.config {
        Some(p) => AggregatorConfig::load_from(p)?,
        None => AggregatorConfig::load_default()?,
    };
    let rt = AppRuntime::from_config(cfg);
    if rt.aggregator.sources().is_empty() {
        tracing::warn!("no sources configured; set NEWSAPI_KEY, GUARDIAN_KEY or NYT_KEY");
    }

    let out = if args.source.eq_ignore_ascii_case("all") {
        let res = rt.aggregator.fetch_from_all_sources().await?;
        serde_json::to_string_pretty(&res)
    } else {
        let res = rt
            .aggregator
            .fetch_from_source_named(&args.source)
            .await
            .with_context(|| format!("fetching from {}", args.source))?;
        serde_json::to_string_pretty(&res)
    }?;
    println!("{out}");
    Ok(())
}
