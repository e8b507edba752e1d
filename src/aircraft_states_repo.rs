use async_trait::async_trait;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool, PoolError};
use diesel::sql_types;
use diesel::upsert::excluded;
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, info};

use crate::aircraft_states::{AircraftState, NewAircraftState};
use crate::schema::aircraft_states;

pub type PgPool = Pool<ConnectionManager<PgConnection>>;

/// Rows per INSERT statement. 13 bound columns keeps this well under the
/// 65535 parameter limit.
const UPSERT_CHUNK_SIZE: usize = 1000;

/// Keep the newest `$1` rows; ties on `updated_at` keep the lower icao24
const PRUNE_SQL: &str = r#"
    DELETE FROM aircraft_states
    WHERE icao24 IN (
        SELECT icao24
        FROM aircraft_states
        ORDER BY updated_at DESC, icao24 ASC
        OFFSET $1
    )
"#;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Failed to get database connection: {0}")]
    Pool(#[from] PoolError),

    #[error("Database query failed: {0}")]
    Query(#[from] diesel::result::Error),

    #[error("Database task panicked: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// What one `upsert_and_prune` call changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertSummary {
    /// Rows inserted or overwritten
    pub written: usize,
    /// Rows removed by the retention prune
    pub pruned: usize,
}

/// Durable store for the latest aircraft states
#[async_trait]
pub trait AircraftStateStore: Send + Sync {
    /// Upsert `records` and prune to the newest `max_rows` as one transaction.
    /// `max_rows <= 0` disables pruning.
    async fn upsert_and_prune(
        &self,
        records: Vec<NewAircraftState>,
        max_rows: i64,
    ) -> Result<UpsertSummary, PersistenceError>;
}

#[derive(Clone)]
pub struct AircraftStatesRepository {
    pool: PgPool,
}

impl AircraftStatesRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The most recently updated aircraft, newest first
    pub async fn get_recent(&self, limit: i64) -> Result<Vec<AircraftState>, PersistenceError> {
        let pool = self.pool.clone();

        tokio::task::spawn_blocking(move || -> Result<_, PersistenceError> {
            let mut conn = pool.get()?;
            let rows = aircraft_states::table
                .order((
                    aircraft_states::updated_at.desc(),
                    aircraft_states::icao24.asc(),
                ))
                .limit(limit)
                .select(AircraftState::as_select())
                .load(&mut conn)?;
            Ok(rows)
        })
        .await?
    }

    pub async fn count(&self) -> Result<i64, PersistenceError> {
        let pool = self.pool.clone();

        tokio::task::spawn_blocking(move || -> Result<i64, PersistenceError> {
            let mut conn = pool.get()?;
            Ok(aircraft_states::table.count().get_result(&mut conn)?)
        })
        .await?
    }

    pub async fn get_by_icao24(
        &self,
        icao24: &str,
    ) -> Result<Option<AircraftState>, PersistenceError> {
        let pool = self.pool.clone();
        let icao24 = icao24.to_string();

        tokio::task::spawn_blocking(move || -> Result<Option<AircraftState>, PersistenceError> {
            let mut conn = pool.get()?;
            Ok(aircraft_states::table
                .filter(aircraft_states::icao24.eq(&icao24))
                .select(AircraftState::as_select())
                .first(&mut conn)
                .optional()?)
        })
        .await?
    }
}

#[async_trait]
impl AircraftStateStore for AircraftStatesRepository {
    async fn upsert_and_prune(
        &self,
        records: Vec<NewAircraftState>,
        max_rows: i64,
    ) -> Result<UpsertSummary, PersistenceError> {
        let pool = self.pool.clone();
        let records = dedupe_last_wins(records);

        tokio::task::spawn_blocking(move || -> Result<UpsertSummary, PersistenceError> {
            // The lease is returned to the pool when this task ends, before the loop sleeps
            let mut conn = pool.get()?;
            conn.transaction::<_, PersistenceError, _>(|conn| {
                let mut written = 0;
                for chunk in records.chunks(UPSERT_CHUNK_SIZE) {
                    written += upsert_chunk(conn, chunk)?;
                }

                let pruned = if max_rows > 0 {
                    diesel::sql_query(PRUNE_SQL)
                        .bind::<sql_types::BigInt, _>(max_rows)
                        .execute(conn)?
                } else {
                    0
                };

                debug!("Upserted {} aircraft states, pruned {}", written, pruned);
                Ok(UpsertSummary { written, pruned })
            })
        })
        .await?
    }
}

/// Insert new rows; on conflict overwrite every column and restamp `updated_at`
fn upsert_chunk(
    conn: &mut PgConnection,
    chunk: &[NewAircraftState],
) -> Result<usize, diesel::result::Error> {
    diesel::insert_into(aircraft_states::table)
        .values(chunk)
        .on_conflict(aircraft_states::icao24)
        .do_update()
        .set((
            aircraft_states::callsign.eq(excluded(aircraft_states::callsign)),
            aircraft_states::origin_country.eq(excluded(aircraft_states::origin_country)),
            aircraft_states::longitude.eq(excluded(aircraft_states::longitude)),
            aircraft_states::latitude.eq(excluded(aircraft_states::latitude)),
            aircraft_states::baro_altitude.eq(excluded(aircraft_states::baro_altitude)),
            aircraft_states::on_ground.eq(excluded(aircraft_states::on_ground)),
            aircraft_states::velocity.eq(excluded(aircraft_states::velocity)),
            aircraft_states::true_track.eq(excluded(aircraft_states::true_track)),
            aircraft_states::vertical_rate.eq(excluded(aircraft_states::vertical_rate)),
            aircraft_states::geo_altitude.eq(excluded(aircraft_states::geo_altitude)),
            aircraft_states::squawk.eq(excluded(aircraft_states::squawk)),
            aircraft_states::spi.eq(excluded(aircraft_states::spi)),
            aircraft_states::updated_at.eq(diesel::dsl::now),
        ))
        .execute(conn)
}

/// PostgreSQL refuses to touch the same row twice in one ON CONFLICT
/// statement, so collapse repeated identifiers to their last occurrence.
fn dedupe_last_wins(records: Vec<NewAircraftState>) -> Vec<NewAircraftState> {
    let total = records.len();
    let mut position: HashMap<String, usize> = HashMap::with_capacity(total);
    let mut unique: Vec<NewAircraftState> = Vec::with_capacity(total);

    for record in records {
        match position.get(&record.icao24) {
            Some(&index) => unique[index] = record,
            None => {
                position.insert(record.icao24.clone(), unique.len());
                unique.push(record);
            }
        }
    }

    if unique.len() != total {
        info!(
            "Collapsed {} duplicate aircraft states in batch",
            total - unique.len()
        );
    }
    unique
}
