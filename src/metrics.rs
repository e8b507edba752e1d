use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Install the Prometheus recorder and serve `/metrics` on the given port.
/// Must be called from within a tokio runtime.
pub fn start_metrics_server(port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("Failed to install Prometheus exporter")?;

    info!("Serving metrics on http://{}/metrics", addr);
    Ok(())
}

/// Start the exporter, then zero the ingest counters against it.
///
/// `counter!` resolves the global recorder at call time, so zeroing before
/// `install()` would land in the no-op recorder and be lost.
pub fn start_ingest_metrics(port: u16) -> Result<()> {
    start_metrics_server(port)?;
    initialize_ingest_metrics();
    Ok(())
}

/// Initialize ingest metrics to zero so they appear in Prometheus before the first cycle
pub fn initialize_ingest_metrics() {
    // Poll cycle outcomes
    metrics::counter!("opensky.cycle.completed_total").absolute(0);
    metrics::counter!("opensky.cycle.failed_total").absolute(0);
    metrics::counter!("opensky.rate_limited_total").absolute(0);
    metrics::counter!("opensky.no_data_total").absolute(0);

    // Auth
    metrics::counter!("opensky.token.refreshed_total").absolute(0);

    // State vectors
    metrics::counter!("opensky.states.rejected_total").absolute(0);
    metrics::counter!("opensky.states.persisted_total").absolute(0);
    metrics::counter!("opensky.states.pruned_total").absolute(0);
}
