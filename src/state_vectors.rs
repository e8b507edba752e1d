//! Normalization of OpenSky state vectors.
//!
//! OpenSky returns each aircraft as a positional JSON array rather than an
//! object. Only the positions below are consumed; positions 3 (time_position),
//! 4 (last_contact), 12 (sensors) and anything past 15 are ignored.

use serde_json::Value;
use tracing::trace;

use crate::aircraft_states::NewAircraftState;

/// Minimum number of positional fields in a well-formed state vector
pub const MIN_STATE_VECTOR_FIELDS: usize = 16;

const ICAO24: usize = 0;
const CALLSIGN: usize = 1;
const ORIGIN_COUNTRY: usize = 2;
const LONGITUDE: usize = 5;
const LATITUDE: usize = 6;
const BARO_ALTITUDE: usize = 7;
const ON_GROUND: usize = 8;
const VELOCITY: usize = 9;
const TRUE_TRACK: usize = 10;
const VERTICAL_RATE: usize = 11;
const GEO_ALTITUDE: usize = 13;
const SQUAWK: usize = 14;
const SPI: usize = 15;

/// Result of normalizing a whole snapshot
#[derive(Debug, Default, Clone, PartialEq)]
pub struct NormalizedBatch {
    pub records: Vec<NewAircraftState>,
    /// Entries dropped as malformed. Informational only.
    pub rejected: usize,
}

/// Convert one raw state vector into a record, or `None` if it is malformed.
///
/// An entry is rejected when it is not an array, has fewer than
/// [`MIN_STATE_VECTOR_FIELDS`] fields, or has an empty/non-string icao24.
/// Telemetry fields of an unexpected JSON type are treated as absent.
pub fn normalize_state_vector(raw: &Value) -> Option<NewAircraftState> {
    let fields = raw.as_array()?;
    if fields.len() < MIN_STATE_VECTOR_FIELDS {
        trace!("Rejecting state vector with {} fields", fields.len());
        return None;
    }

    let icao24 = fields[ICAO24].as_str().filter(|s| !s.is_empty())?;

    Some(NewAircraftState {
        icao24: icao24.to_string(),
        callsign: fields[CALLSIGN]
            .as_str()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string),
        origin_country: string_at(fields, ORIGIN_COUNTRY),
        longitude: fields[LONGITUDE].as_f64(),
        latitude: fields[LATITUDE].as_f64(),
        baro_altitude: fields[BARO_ALTITUDE].as_f64(),
        on_ground: fields[ON_GROUND].as_bool(),
        velocity: fields[VELOCITY].as_f64(),
        true_track: fields[TRUE_TRACK].as_f64(),
        vertical_rate: fields[VERTICAL_RATE].as_f64(),
        geo_altitude: fields[GEO_ALTITUDE].as_f64(),
        squawk: string_at(fields, SQUAWK),
        spi: fields[SPI].as_bool(),
    })
}

/// Normalize every entry of a snapshot, silently dropping rejects.
pub fn normalize_state_vectors(raw: &[Value]) -> NormalizedBatch {
    let mut batch = NormalizedBatch::default();
    for entry in raw {
        match normalize_state_vector(entry) {
            Some(record) => batch.records.push(record),
            None => batch.rejected += 1,
        }
    }
    batch
}

fn string_at(fields: &[Value], index: usize) -> Option<String> {
    fields[index].as_str().map(str::to_string)
}
