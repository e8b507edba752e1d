use anyhow::{Context, Result};
use opensky_tracker::config::DatabaseConfig;
use opensky_tracker::database::{build_pool, run_migrations};
use tracing::info;

pub async fn handle_migrate() -> Result<()> {
    let db_config = DatabaseConfig::from_env().context("Invalid database configuration")?;
    let pool = build_pool(&db_config, 1)?;

    let applied = tokio::task::spawn_blocking(move || run_migrations(&pool))
        .await
        .context("Migration task panicked")??;

    info!("Migrations complete ({} applied)", applied);
    Ok(())
}
