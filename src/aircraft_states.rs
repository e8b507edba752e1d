use chrono::{DateTime, Utc};
use diesel::prelude::*;

/// Latest known state of one aircraft as stored in `aircraft_states`.
///
/// `updated_at` is assigned by the database on every successful upsert and
/// is the only ordering the retention prune and the viewer rely on.
#[derive(Debug, Clone, PartialEq, Queryable, Selectable)]
#[diesel(table_name = crate::schema::aircraft_states)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct AircraftState {
    pub icao24: String,
    pub callsign: Option<String>,
    pub origin_country: Option<String>,
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
    pub baro_altitude: Option<f64>,
    pub on_ground: Option<bool>,
    pub velocity: Option<f64>,
    pub true_track: Option<f64>,
    pub vertical_rate: Option<f64>,
    pub geo_altitude: Option<f64>,
    pub squawk: Option<String>,
    pub spi: Option<bool>,
    pub updated_at: DateTime<Utc>,
}

/// A normalized state vector ready to be upserted.
///
/// Carries every column except `updated_at`, which the database stamps.
#[derive(Debug, Clone, PartialEq, Insertable)]
#[diesel(table_name = crate::schema::aircraft_states)]
pub struct NewAircraftState {
    pub icao24: String,
    pub callsign: Option<String>,
    pub origin_country: Option<String>,
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
    pub baro_altitude: Option<f64>,
    pub on_ground: Option<bool>,
    pub velocity: Option<f64>,
    pub true_track: Option<f64>,
    pub vertical_rate: Option<f64>,
    pub geo_altitude: Option<f64>,
    pub squawk: Option<String>,
    pub spi: Option<bool>,
}

impl NewAircraftState {
    /// A record with only the identifier populated
    pub fn with_icao24(icao24: impl Into<String>) -> Self {
        Self {
            icao24: icao24.into(),
            callsign: None,
            origin_country: None,
            longitude: None,
            latitude: None,
            baro_altitude: None,
            on_ground: None,
            velocity: None,
            true_track: None,
            vertical_rate: None,
            geo_altitude: None,
            squawk: None,
            spi: None,
        }
    }
}
