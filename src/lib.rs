//! OpenSky flight tracker.
//!
//! Polls the OpenSky Network state vector API for a fixed geofence, keeps
//! the latest state per aircraft in PostgreSQL, and renders the most
//! recently updated aircraft in a terminal.

pub mod aircraft_states;
pub mod aircraft_states_repo;
pub mod config;
pub mod database;
pub mod instance_lock;
pub mod log_format;
pub mod metrics;
pub mod opensky_client;
pub mod poll_loop;
pub mod schema;
pub mod state_vectors;
pub mod viewer;

pub use aircraft_states::{AircraftState, NewAircraftState};
pub use aircraft_states_repo::{
    AircraftStateStore, AircraftStatesRepository, PersistenceError, PgPool, UpsertSummary,
};
pub use poll_loop::{LoopState, PollLoop, PollSettings};
