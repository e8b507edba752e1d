use anyhow::{Context, Result};
use diesel::pg::PgConnection;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use std::time::Duration;
use tracing::info;

use crate::aircraft_states_repo::PgPool;
use crate::config::DatabaseConfig;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations/");

/// Upper bound on waiting for a pooled connection, so an unreachable
/// database fails a cycle instead of hanging it
const CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Build a connection pool. Connections are opened lazily, so this
/// succeeds even while the database is down.
pub fn build_pool(config: &DatabaseConfig, max_size: u32) -> Result<PgPool> {
    let manager = ConnectionManager::<PgConnection>::new(config.connection_string());
    let pool = Pool::builder()
        .max_size(max_size)
        .min_idle(Some(0))
        .connection_timeout(CONNECTION_TIMEOUT)
        .build_unchecked(manager);
    Ok(pool)
}

/// Apply any pending embedded migrations
pub fn run_migrations(pool: &PgPool) -> Result<usize> {
    let mut conn = pool
        .get()
        .context("Failed to get database connection for migrations")?;

    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(|e| anyhow::anyhow!("Failed to run database migrations: {}", e))?;

    for version in &applied {
        info!("Applied migration {}", version);
    }
    if applied.is_empty() {
        info!("Database schema is up to date");
    }
    Ok(applied.len())
}
