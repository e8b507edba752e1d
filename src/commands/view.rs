use anyhow::{Context, Result};
use opensky_tracker::aircraft_states_repo::AircraftStatesRepository;
use opensky_tracker::config::{DatabaseConfig, ViewerConfig};
use opensky_tracker::database::build_pool;
use opensky_tracker::viewer::{CLEAR_SCREEN, render_snapshot};
use std::io::Write;
use tracing::{error, info};

use super::shutdown_signal;

pub async fn handle_view() -> Result<()> {
    let config = ViewerConfig::from_env().context("Invalid viewer configuration")?;
    let db_config = DatabaseConfig::from_env().context("Invalid database configuration")?;

    info!(
        "Showing the {} most recent aircraft every {:?} ({})",
        config.limit,
        config.refresh,
        config.timezone.name()
    );

    let repo = AircraftStatesRepository::new(build_pool(&db_config, 1)?);

    let refresh_loop = async {
        loop {
            match repo.get_recent(config.limit).await {
                Ok(rows) => {
                    let frame = render_snapshot(&rows, config.limit, config.timezone);
                    let mut stdout = std::io::stdout().lock();
                    if let Err(e) = write!(stdout, "{}{}", CLEAR_SCREEN, frame)
                        .and_then(|_| stdout.flush())
                    {
                        error!("Failed to write to terminal: {}", e);
                    }
                }
                Err(e) => error!("Failed to read aircraft states: {}", e),
            }
            tokio::time::sleep(config.refresh).await;
        }
    };

    tokio::select! {
        _ = refresh_loop => {}
        _ = shutdown_signal() => {}
    }
    Ok(())
}
