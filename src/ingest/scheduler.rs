// src/ingest/scheduler.rs
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::ingest::Aggregator;

/// Spawn the periodic fetch-all loop. The first run happens immediately; a run that
/// overruns the interval delays the next tick instead of stacking up.
///
/// Each run re-checks which sources are reachable before fetching. Cancelling `shutdown`
/// stops the loop and aborts a run in progress.
pub fn spawn_fetch_scheduler(
    aggregator: Arc<Aggregator>,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            counter!("ingest_runs_total").increment(1);
            let checked = tokio::select! {
                _ = shutdown.cancelled() => break,
                snap = aggregator.refresh_availability() => snap,
            };
            let down: Vec<&str> = checked
                .iter()
                .filter(|s| !s.available)
                .map(|s| s.name.as_str())
                .collect();
            if !down.is_empty() {
                tracing::warn!(target: "ingest", ?down, "sources unreachable");
            }

            match aggregator
                .fetch_from_all_sources_with_cancel(shutdown.child_token())
                .await
            {
                Ok(res) => {
                    for (source, r) in &res.per_source {
                        match &r.error {
                            Some(e) => tracing::warn!(target: "ingest", %source, error = %e, "scheduled fetch failed"),
                            None => tracing::info!(
                                target: "ingest",
                                %source,
                                saved = r.saved_count,
                                duplicates = r.duplicate_count,
                                "scheduled fetch"
                            ),
                        }
                    }
                }
                Err(e) => tracing::error!(target: "ingest", error = %e, "scheduled fetch-all failed"),
            }
        }
        tracing::info!(target: "ingest", "fetch scheduler stopped");
    })
}
