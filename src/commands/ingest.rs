use anyhow::{Context, Result};
use opensky_tracker::aircraft_states_repo::AircraftStatesRepository;
use opensky_tracker::config::{DatabaseConfig, IngestConfig};
use opensky_tracker::database::{build_pool, run_migrations};
use opensky_tracker::instance_lock::InstanceLock;
use opensky_tracker::metrics::start_ingest_metrics;
use opensky_tracker::opensky_client::{OpenSkyAuthClient, OpenSkyClient, TokenManager};
use opensky_tracker::poll_loop::{PollLoop, PollSettings};
use tracing::info;

use super::shutdown_signal;

/// One connection for the poll loop, one spare for migrations at startup
const INGEST_POOL_SIZE: u32 = 2;

pub async fn handle_ingest() -> Result<()> {
    let config = IngestConfig::from_env().context("Invalid ingest configuration")?;
    let db_config = DatabaseConfig::from_env().context("Invalid database configuration")?;

    info!("Starting OpenSky ingest: {:?}", config);

    if let Some(port) = config.metrics_port {
        start_ingest_metrics(port)?;
    }

    let _lock = InstanceLock::new("opensky-ingest")?;

    let pool = build_pool(&db_config, INGEST_POOL_SIZE)?;
    let migrate_pool = pool.clone();
    tokio::task::spawn_blocking(move || run_migrations(&migrate_pool))
        .await
        .context("Migration task panicked")??;

    let http = reqwest::Client::builder()
        .user_agent(concat!("opensky-tracker/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")?;

    let tokens = TokenManager::new(OpenSkyAuthClient::new(
        http.clone(),
        config.credentials.clone(),
    ))
    .await?;

    let poll_loop = PollLoop::new(
        tokens,
        OpenSkyClient::new(http),
        AircraftStatesRepository::new(pool),
        PollSettings::from(&config),
    );

    tokio::select! {
        _ = poll_loop.run() => {}
        _ = shutdown_signal() => {}
    }

    info!("Ingest stopped");
    Ok(())
}
