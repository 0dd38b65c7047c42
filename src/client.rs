//! Simulation server transport.
//!
//! [`SimulationSource`] is the seam between the poll loop and the network.
//! [`HttpSimulationClient`] is the real implementation over `reqwest`; tests
//! substitute an in-memory source.

use crate::error::{FetchError, Result, SyncError};
use crate::protocol::{
    self, endpoints, CarsInGrid, CarsReachedDestination, InitRequest, InitResponse, ServerRecord,
    StepResponse,
};
use crate::registry;
use crate::types::EntityKind;
use bytes::Bytes;
use log::debug;
use std::future::Future;
use std::time::Duration;

/// Longest slice of an error body kept in [`FetchError::Status`].
const MAX_ERROR_BODY: usize = 256;

// ---------------------------------------------------------------------------
// Source trait
// ---------------------------------------------------------------------------

/// Everything the poller needs from the simulation server.
///
/// Each call is a single request: no retries, no backoff.
pub trait SimulationSource: Send + Sync + 'static {
    /// `POST /init`.
    fn init(
        &self,
        request: &InitRequest,
    ) -> impl Future<Output = std::result::Result<InitResponse, FetchError>> + Send;

    /// `GET` the list endpoint of `kind`.
    fn fetch(
        &self,
        kind: EntityKind,
    ) -> impl Future<Output = std::result::Result<Vec<ServerRecord>, FetchError>> + Send;

    /// `GET /update` — advance the simulation one step.
    fn step(&self) -> impl Future<Output = std::result::Result<StepResponse, FetchError>> + Send;

    fn cars_in_grid(&self) -> impl Future<Output = std::result::Result<u64, FetchError>> + Send;

    fn cars_reached_destination(
        &self,
    ) -> impl Future<Output = std::result::Result<u64, FetchError>> + Send;
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct HttpSimulationClient {
    http: reqwest::Client,
    /// Server root, always ending in `/`.
    base_url: String,
}

impl HttpSimulationClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Config(format!("cannot build HTTP client: {e}")))?;

        let mut base_url = base_url.trim().to_string();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }

        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    async fn get(&self, endpoint: &str) -> std::result::Result<Bytes, FetchError> {
        debug!("GET {}", self.url(endpoint));
        let response = self
            .http
            .get(self.url(endpoint))
            .send()
            .await
            .map_err(|e| transport(endpoint, e))?;
        read_body(endpoint, response).await
    }
}

impl SimulationSource for HttpSimulationClient {
    async fn init(&self, request: &InitRequest) -> std::result::Result<InitResponse, FetchError> {
        debug!("POST {}", self.url(endpoints::INIT));
        let response = self
            .http
            .post(self.url(endpoints::INIT))
            .json(request)
            .send()
            .await
            .map_err(|e| transport(endpoints::INIT, e))?;
        let body = read_body(endpoints::INIT, response).await?;
        protocol::decode_json(endpoints::INIT, &body)
    }

    async fn fetch(&self, kind: EntityKind) -> std::result::Result<Vec<ServerRecord>, FetchError> {
        let profile = registry::profile(kind);
        let body = self.get(profile.endpoint).await?;
        protocol::decode_records(profile.endpoint, profile.list_keys, &body)
    }

    async fn step(&self) -> std::result::Result<StepResponse, FetchError> {
        let body = self.get(endpoints::UPDATE).await?;
        protocol::decode_json(endpoints::UPDATE, &body)
    }

    async fn cars_in_grid(&self) -> std::result::Result<u64, FetchError> {
        let body = self.get(endpoints::COUNT_CARS_IN_GRID).await?;
        protocol::decode_json::<CarsInGrid>(endpoints::COUNT_CARS_IN_GRID, &body)
            .map(|c| c.cars_in_grid)
    }

    async fn cars_reached_destination(&self) -> std::result::Result<u64, FetchError> {
        let body = self.get(endpoints::COUNT_CARS_REACHED_DESTINATION).await?;
        protocol::decode_json::<CarsReachedDestination>(
            endpoints::COUNT_CARS_REACHED_DESTINATION,
            &body,
        )
        .map(|c| c.cars_reached_destination)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn transport(endpoint: &str, err: reqwest::Error) -> FetchError {
    FetchError::Transport {
        endpoint: endpoint.to_string(),
        message: err.to_string(),
    }
}

/// Read the whole body, turning non-2xx statuses into [`FetchError::Status`].
async fn read_body(
    endpoint: &str,
    response: reqwest::Response,
) -> std::result::Result<Bytes, FetchError> {
    let status = response.status();
    let body = response.bytes().await.map_err(|e| transport(endpoint, e))?;

    if !status.is_success() {
        return Err(FetchError::Status {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
            body: String::from_utf8_lossy(&body)
                .chars()
                .take(MAX_ERROR_BODY)
                .collect(),
        });
    }

    Ok(body)
}
