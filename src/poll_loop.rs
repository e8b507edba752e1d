//! The ingest control loop.
//!
//! One cycle is fetch → normalize → upsert/prune, run to completion before
//! the loop sleeps. Every failure inside a cycle is absorbed here: the loop
//! never returns.

use anyhow::{Context, Result};
use std::time::Duration;
use tracing::{Instrument, error, info, warn};

use crate::aircraft_states_repo::AircraftStateStore;
use crate::config::{BoundingBox, IngestConfig};
use crate::opensky_client::{FetchError, StateSource, StatesSnapshot, TokenIssuer, TokenManager};
use crate::state_vectors::normalize_state_vectors;

/// Pause after a 429 before the next cycle
pub const RATE_LIMIT_COOLDOWN: Duration = Duration::from_secs(60);
/// Pause after a failed cycle before returning to polling
pub const ERROR_COOLDOWN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct PollSettings {
    pub bbox: BoundingBox,
    pub poll_interval: Duration,
    pub max_rows: i64,
    pub rate_limit_cooldown: Duration,
    pub error_cooldown: Duration,
}

impl From<&IngestConfig> for PollSettings {
    fn from(config: &IngestConfig) -> Self {
        Self {
            bbox: config.bbox,
            poll_interval: config.poll_interval,
            max_rows: config.max_rows,
            rate_limit_cooldown: RATE_LIMIT_COOLDOWN,
            error_cooldown: ERROR_COOLDOWN,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Polling,
    ErrorBackoff,
}

/// How a cycle that did not fail ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Persisted {
        written: usize,
        pruned: usize,
        rejected: usize,
    },
    NoData,
    RateLimited,
}

pub struct PollLoop<I, S, P> {
    tokens: TokenManager<I>,
    source: S,
    store: P,
    settings: PollSettings,
    state: LoopState,
    cycle: u64,
}

impl<I, S, P> PollLoop<I, S, P>
where
    I: TokenIssuer,
    S: StateSource,
    P: AircraftStateStore,
{
    pub fn new(tokens: TokenManager<I>, source: S, store: P, settings: PollSettings) -> Self {
        Self {
            tokens,
            source,
            store,
            settings,
            state: LoopState::Polling,
            cycle: 0,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Run cycles until the process is terminated
    pub async fn run(mut self) {
        info!(
            "Polling OpenSky every {:?} for {:?}, retaining {} aircraft",
            self.settings.poll_interval, self.settings.bbox, self.settings.max_rows
        );
        loop {
            self.step().await;
        }
    }

    /// Run one cycle, then sleep for however long its outcome dictates.
    /// Returns the state the loop was in while sleeping.
    pub async fn step(&mut self) -> LoopState {
        self.cycle += 1;
        let span = tracing::info_span!("poll_cycle", cycle = self.cycle);
        let result = self.run_cycle().instrument(span.clone()).await;

        let delay = span.in_scope(|| self.transition(result));
        tokio::time::sleep(delay).await;

        let slept_in = self.state;
        self.state = LoopState::Polling;
        slept_in
    }

    fn transition(&mut self, result: Result<CycleOutcome>) -> Duration {
        match result {
            Ok(CycleOutcome::Persisted {
                written,
                pruned,
                rejected,
            }) => {
                metrics::counter!("opensky.cycle.completed_total").increment(1);
                info!(
                    "Upserted {} aircraft rows ({} pruned, {} rejected)",
                    written, pruned, rejected
                );
                self.state = LoopState::Polling;
                self.settings.poll_interval
            }
            Ok(CycleOutcome::NoData) => {
                metrics::counter!("opensky.cycle.completed_total").increment(1);
                metrics::counter!("opensky.no_data_total").increment(1);
                info!("No states returned (states=null)");
                self.state = LoopState::Polling;
                self.settings.poll_interval
            }
            Ok(CycleOutcome::RateLimited) => {
                metrics::counter!("opensky.rate_limited_total").increment(1);
                warn!(
                    "Rate limited (429), sleeping {:?} before the next cycle",
                    self.settings.rate_limit_cooldown
                );
                self.state = LoopState::Polling;
                self.settings.rate_limit_cooldown
            }
            Err(e) => {
                metrics::counter!("opensky.cycle.failed_total").increment(1);
                error!(
                    "Poll cycle failed: {:#} - sleeping {:?} then continuing",
                    e, self.settings.error_cooldown
                );
                self.state = LoopState::ErrorBackoff;
                self.settings.error_cooldown
            }
        }
    }

    async fn run_cycle(&mut self) -> Result<CycleOutcome> {
        let snapshot = match self.fetch_with_token_retry().await {
            Ok(snapshot) => snapshot,
            Err(FetchError::RateLimited) => return Ok(CycleOutcome::RateLimited),
            Err(e) => return Err(e).context("Failed to fetch OpenSky states"),
        };

        let raw = match snapshot {
            StatesSnapshot::States(raw) => raw,
            StatesSnapshot::NoData => return Ok(CycleOutcome::NoData),
        };

        let batch = normalize_state_vectors(&raw);
        metrics::counter!("opensky.states.rejected_total").increment(batch.rejected as u64);

        let summary = self
            .store
            .upsert_and_prune(batch.records, self.settings.max_rows)
            .await
            .context("Failed to persist aircraft states")?;
        metrics::counter!("opensky.states.persisted_total").increment(summary.written as u64);
        metrics::counter!("opensky.states.pruned_total").increment(summary.pruned as u64);

        Ok(CycleOutcome::Persisted {
            written: summary.written,
            pruned: summary.pruned,
            rejected: batch.rejected,
        })
    }

    /// Fetch with the held token; on 401 refresh once and fetch again.
    /// A second 401, or a failed refresh, is returned as an ordinary error.
    async fn fetch_with_token_retry(&mut self) -> Result<StatesSnapshot, FetchError> {
        let bbox = self.settings.bbox;
        let first = self
            .source
            .fetch_states(&bbox, self.tokens.ensure_token())
            .await;

        match first {
            Err(FetchError::TokenExpired) => {
                warn!("Got 401 (token expired?), refreshing token");
                let token = self
                    .tokens
                    .refresh()
                    .await
                    .map_err(FetchError::Refresh)?;
                self.source.fetch_states(&bbox, token).await
            }
            other => other,
        }
    }
}
