//! Plain-text rendering of the most recently updated aircraft.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::fmt::{Display, Write};

use crate::aircraft_states::AircraftState;

/// Clears the terminal and homes the cursor
pub const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";

/// e.g. `Jan 05, 2026 03:07 PM`
pub const TIMESTAMP_FORMAT: &str = "%b %d, %Y %I:%M %p";

const ABSENT: &str = "-";

pub fn format_timestamp(ts: DateTime<Utc>, tz: Tz) -> String {
    ts.with_timezone(&tz).format(TIMESTAMP_FORMAT).to_string()
}

fn opt<T: Display>(value: &Option<T>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => ABSENT.to_string(),
    }
}

fn opt_f64(value: Option<f64>, precision: usize) -> String {
    match value {
        Some(v) => format!("{:.*}", precision, v),
        None => ABSENT.to_string(),
    }
}

/// One aircraft as a single fixed-width line
pub fn render_row(state: &AircraftState, tz: Tz) -> String {
    format!(
        "{:<6} {:<8} {:<20} {:>11} {:>10} {:>8} {:<5} {:>7} {:>6} {:>6} {:>8} {:<4} {:<5} {}",
        state.icao24,
        opt(&state.callsign),
        opt(&state.origin_country),
        opt_f64(state.longitude, 5),
        opt_f64(state.latitude, 5),
        opt_f64(state.baro_altitude, 1),
        opt(&state.on_ground),
        opt_f64(state.velocity, 1),
        opt_f64(state.true_track, 1),
        opt_f64(state.vertical_rate, 1),
        opt_f64(state.geo_altitude, 1),
        opt(&state.squawk),
        opt(&state.spi),
        format_timestamp(state.updated_at, tz),
    )
}

/// Full snapshot: header, column legend and one line per aircraft
pub fn render_snapshot(states: &[AircraftState], limit: i64, tz: Tz) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Most recent aircraft (limit={})", limit);
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "{:<6} {:<8} {:<20} {:>11} {:>10} {:>8} {:<5} {:>7} {:>6} {:>6} {:>8} {:<4} {:<5} {}",
        "icao24",
        "callsign",
        "country",
        "lon",
        "lat",
        "baro_m",
        "gnd",
        "vel_ms",
        "trk",
        "vr_ms",
        "geo_m",
        "sqk",
        "spi",
        "updated",
    );

    if states.is_empty() {
        let _ = writeln!(out, "(no aircraft stored)");
    }
    for state in states {
        let _ = writeln!(out, "{}", render_row(state, tz));
    }
    out
}
