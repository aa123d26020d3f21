//! News aggregator service: binary entrypoint.
//! Boots the Axum HTTP server, the periodic fetch scheduler and the /metrics exporter.

use news_aggregator::api::{self, AppState};
use news_aggregator::bootstrap::{init_tracing, AppRuntime};
use news_aggregator::ingest::scheduler::spawn_fetch_scheduler;
use news_aggregator::metrics::Metrics;
use shuttle_axum::ShuttleAxum;
use tokio_util::sync::CancellationToken;

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    init_tracing();

    let rt = AppRuntime::load_default()?;
    let metrics = Metrics::init(rt.config.cache_ttl_secs)?;

    // Lives as long as the process; the runtime tears the task down on exit.
    let _scheduler = spawn_fetch_scheduler(
        rt.aggregator.clone(),
        rt.config.fetch_interval(),
        CancellationToken::new(),
    );

    let router = api::router(AppState::from_runtime(&rt)).merge(metrics.router());
    Ok(router.into())
}
