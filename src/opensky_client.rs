//! OpenSky Network API client.
//!
//! Two collaborators live here: the OAuth2 client-credentials exchange
//! against the OpenSky identity provider, and the bounded-box state vector
//! query. Both sit behind traits so the poll loop can run against fakes.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::{BoundingBox, OpenSkyCredentials};

pub const STATES_URL: &str = "https://opensky-network.org/api/states/all";
pub const TOKEN_URL: &str =
    "https://auth.opensky-network.org/auth/realms/opensky-network/protocol/openid-connect/token";

/// Per-request timeout for both the token and the state endpoints
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Bearer token issued by the identity provider
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken(String);

impl BearerToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BearerToken(<{} bytes>)", self.0.len())
    }
}

/// Failure modes of a state vector query the poll loop branches on
#[derive(Debug, Error)]
pub enum FetchError {
    /// 401: the bearer token was rejected, refresh and retry once
    #[error("OpenSky rejected the bearer token (401)")]
    TokenExpired,

    /// 429: upstream backpressure, cool down and skip the cycle
    #[error("Rate limited by OpenSky API (429)")]
    RateLimited,

    #[error("OpenSky API error {status}: {body}")]
    Status { status: StatusCode, body: String },

    /// Transport failure, including the request timeout
    #[error("HTTP request to OpenSky failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to parse OpenSky states response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The token exchange triggered by a 401 failed
    #[error("Token refresh after 401 failed")]
    Refresh(#[source] anyhow::Error),
}

/// Outcome of a successful state vector query
#[derive(Debug, Clone, PartialEq)]
pub enum StatesSnapshot {
    /// Raw positional entries, one per aircraft
    States(Vec<serde_json::Value>),
    /// The API answered with `"states": null`
    NoData,
}

/// `/api/states/all` response body
#[derive(Debug, Deserialize)]
pub struct StatesResponse {
    pub time: Option<i64>,
    #[serde(default)]
    pub states: Option<Vec<serde_json::Value>>,
}

impl From<StatesResponse> for StatesSnapshot {
    fn from(response: StatesResponse) -> Self {
        match response.states {
            Some(states) => StatesSnapshot::States(states),
            None => StatesSnapshot::NoData,
        }
    }
}

/// Source of fresh bearer tokens
#[async_trait]
pub trait TokenIssuer: Send + Sync {
    /// Perform one credential exchange
    async fn issue_token(&self) -> Result<BearerToken>;
}

/// Source of state vector snapshots
#[async_trait]
pub trait StateSource: Send + Sync {
    async fn fetch_states(
        &self,
        bbox: &BoundingBox,
        token: &BearerToken,
    ) -> Result<StatesSnapshot, FetchError>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<u64>,
}

/// Client-credentials exchange against the OpenSky identity provider
#[derive(Clone)]
pub struct OpenSkyAuthClient {
    client: Client,
    token_url: String,
    credentials: OpenSkyCredentials,
}

impl OpenSkyAuthClient {
    pub fn new(client: Client, credentials: OpenSkyCredentials) -> Self {
        Self {
            client,
            token_url: TOKEN_URL.to_string(),
            credentials,
        }
    }
}

#[async_trait]
impl TokenIssuer for OpenSkyAuthClient {
    async fn issue_token(&self) -> Result<BearerToken> {
        let response = self
            .client
            .post(&self.token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret.as_str()),
            ])
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .context("Failed to send token request to OpenSky identity provider")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("OpenSky token endpoint error {}: {}", status, body);
        }

        let token: TokenResponse = response
            .json()
            .await
            .context("Failed to parse OpenSky token response")?;

        // Expiry is detected reactively through 401s; the declared lifetime is informational
        debug!("Obtained OpenSky access token (expires_in: {:?}s)", token.expires_in);

        Ok(BearerToken::new(token.access_token))
    }
}

/// Holds the current bearer token and replaces it on demand.
///
/// There is no proactive expiry tracking: the data API's 401 is the only
/// signal that a refresh is needed.
pub struct TokenManager<I> {
    issuer: I,
    token: BearerToken,
}

impl<I: TokenIssuer> TokenManager<I> {
    /// Perform the initial exchange. A failure here is fatal for the caller.
    pub async fn new(issuer: I) -> Result<Self> {
        let token = issuer
            .issue_token()
            .await
            .context("Initial OpenSky token exchange failed")?;
        info!("Obtained initial OpenSky access token");
        Ok(Self { issuer, token })
    }

    /// The token currently held
    pub fn ensure_token(&self) -> &BearerToken {
        &self.token
    }

    /// Exchange credentials again and replace the held token
    pub async fn refresh(&mut self) -> Result<&BearerToken> {
        let token = self
            .issuer
            .issue_token()
            .await
            .context("OpenSky token refresh failed")?;
        self.token = token;
        metrics::counter!("opensky.token.refreshed_total").increment(1);
        info!("Refreshed OpenSky access token");
        Ok(&self.token)
    }
}

/// Bounded-box query against `/api/states/all`
#[derive(Clone)]
pub struct OpenSkyClient {
    client: Client,
    states_url: String,
}

impl OpenSkyClient {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            states_url: STATES_URL.to_string(),
        }
    }
}

#[async_trait]
impl StateSource for OpenSkyClient {
    async fn fetch_states(
        &self,
        bbox: &BoundingBox,
        token: &BearerToken,
    ) -> Result<StatesSnapshot, FetchError> {
        debug!("Fetching OpenSky states for {:?}", bbox);

        let response = self
            .client
            .get(&self.states_url)
            .query(&bbox.query_params())
            .bearer_auth(token.as_str())
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;

        let status = response.status();
        if let Some(err) = classify_status(status) {
            return Err(match err {
                FetchError::Status { status, .. } => FetchError::Status {
                    status,
                    body: response.text().await.unwrap_or_default(),
                },
                other => other,
            });
        }

        let body = response.bytes().await?;
        parse_states(&body)
    }
}

/// Map a response status to the error the caller must handle, if any.
/// The returned `Status` variant carries an empty body; the caller fills it.
pub fn classify_status(status: StatusCode) -> Option<FetchError> {
    match status {
        StatusCode::UNAUTHORIZED => Some(FetchError::TokenExpired),
        StatusCode::TOO_MANY_REQUESTS => Some(FetchError::RateLimited),
        s if !s.is_success() => Some(FetchError::Status {
            status: s,
            body: String::new(),
        }),
        _ => None,
    }
}

/// Decode a `/api/states/all` body
pub fn parse_states(body: &[u8]) -> Result<StatesSnapshot, FetchError> {
    let response: StatesResponse = serde_json::from_slice(body)?;
    Ok(response.into())
}
