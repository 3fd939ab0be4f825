//! Temperature API route handlers.
//!
//! State is shared via `Arc<ServiceState>`.

use axum::{
    extract::{ConnectInfo, OriginalUri, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn, Instrument};

use crate::aggregator::{AggregateHealth, Aggregator};
use crate::publisher::OutcomePublisher;
use crate::types::{client_host, OutcomeRecord, OutcomeStatus, TemperatureResult, WeatherError};

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

pub struct ServiceState {
    pub aggregator: Aggregator,
    pub publisher: OutcomePublisher,
}

impl ServiceState {
    pub fn new(aggregator: Aggregator, publisher: OutcomePublisher) -> Self {
        Self { aggregator, publisher }
    }
}

pub type AppState = Arc<ServiceState>;

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub city_name: String,
    pub error: String,
}

/// Publishes the outcome of one request exactly once.
///
/// If the handler is dropped before `finish` (client went away), the
/// request is published as a failure on drop.
struct PendingOutcome {
    publisher: OutcomePublisher,
    endpoint: String,
    client: String,
    published: bool,
}

impl PendingOutcome {
    fn new(publisher: &OutcomePublisher, endpoint: String, client: String) -> Self {
        Self { publisher: publisher.clone(), endpoint, client, published: false }
    }

    fn publish(&mut self, status: OutcomeStatus) {
        if self.published {
            return;
        }
        self.published = true;
        let record = OutcomeRecord::new(
            std::mem::take(&mut self.endpoint),
            std::mem::take(&mut self.client),
            status,
        );
        self.publisher.publish(record);
    }
}

impl Drop for PendingOutcome {
    fn drop(&mut self) {
        // Spawning needs a runtime; there is none left during shutdown.
        if !self.published && tokio::runtime::Handle::try_current().is_ok() {
            warn!(endpoint = %self.endpoint, "Request dropped before completion");
            self.publish(OutcomeStatus::Failure);
        }
    }
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /api/temperature/:city
pub async fn get_temperature(
    State(state): State<AppState>,
    Path(city): Path<String>,
    OriginalUri(uri): OriginalUri,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
) -> Response {
    let request_id = uuid::Uuid::new_v4();
    let span = tracing::info_span!("temperature", %request_id, city = %city);

    let endpoint = uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string());
    let mut outcome = PendingOutcome::new(&state.publisher, endpoint, client_host(&peer.to_string()));

    async move {
        let aggregate = state.aggregator.temperature(&city).await;

        let response = match aggregate.health() {
            AggregateHealth::TotalFailure => {
                let e = WeatherError::NoReadings { city: city.clone() };
                warn!(error = %e, "Responding with 502");
                (
                    StatusCode::BAD_GATEWAY,
                    Json(ErrorResponse { city_name: city.clone(), error: e.to_string() }),
                )
                    .into_response()
            }
            coverage => {
                let result = TemperatureResult::from_celsius(city.clone(), aggregate.celsius);
                info!(coverage = ?coverage, "Temperature of {result}");
                Json(result).into_response()
            }
        };

        outcome.publish(aggregate.status);
        response
    }
    .instrument(span)
    .await
}

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
