//! Shared types for the weather service.
//!
//! The response body, the outcome event and the error taxonomy live here
//! so that providers, the aggregator and the HTTP layer can depend on them
//! without depending on each other.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Offset between Celsius and Kelvin.
pub const KELVIN_OFFSET: f64 = 273.15;

/// Timestamp layout used in outcome events.
pub const OUTCOME_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// ---------------------------------------------------------------------------
// Temperature result
// ---------------------------------------------------------------------------

/// Temperature for one city in the three common scales.
///
/// Always derived from a Celsius value; never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemperatureResult {
    #[serde(rename = "city_name")]
    pub city: String,
    #[serde(rename = "celsius_temp")]
    pub celsius: f64,
    #[serde(rename = "kelvin_temp")]
    pub kelvin: f64,
    #[serde(rename = "fahrenheit_temp")]
    pub fahrenheit: f64,
}

impl TemperatureResult {
    pub fn from_celsius(city: impl Into<String>, celsius: f64) -> Self {
        Self {
            city: city.into(),
            celsius,
            kelvin: celsius + KELVIN_OFFSET,
            fahrenheit: celsius * 1.8 + 32.0,
        }
    }
}

impl fmt::Display for TemperatureResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {:.2}°C / {:.2}K / {:.2}°F",
            self.city, self.celsius, self.kelvin, self.fahrenheit
        )
    }
}

// ---------------------------------------------------------------------------
// Outcome event
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutcomeStatus {
    Success,
    Failure,
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutcomeStatus::Success => write!(f, "Success"),
            OutcomeStatus::Failure => write!(f, "Failure"),
        }
    }
}

/// One event per served request, handed to the outcome publisher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeRecord {
    /// Request path and query as received.
    pub endpoint: String,
    #[serde(rename = "time")]
    pub timestamp: String,
    /// Client host with the port stripped.
    #[serde(rename = "ip")]
    pub client_address: String,
    pub status: OutcomeStatus,
}

impl OutcomeRecord {
    /// Build a record stamped with the current local time.
    pub fn new(
        endpoint: impl Into<String>,
        client_address: impl Into<String>,
        status: OutcomeStatus,
    ) -> Self {
        Self::at(Local::now(), endpoint, client_address, status)
    }

    pub fn at(
        when: DateTime<Local>,
        endpoint: impl Into<String>,
        client_address: impl Into<String>,
        status: OutcomeStatus,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            timestamp: when.format(OUTCOME_TIME_FORMAT).to_string(),
            client_address: client_address.into(),
            status,
        }
    }
}

impl fmt::Display for OutcomeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} from {} → {}",
            self.timestamp, self.endpoint, self.client_address, self.status
        )
    }
}

/// Strip the port from a `host:port` peer address.
///
/// Bracketed IPv6 peers (`[::1]:8080`) come back without brackets.
/// Input without a port is returned unchanged.
pub fn client_host(remote_addr: &str) -> String {
    if let Ok(addr) = remote_addr.parse::<std::net::SocketAddr>() {
        return addr.ip().to_string();
    }
    match remote_addr.rsplit_once(':') {
        Some((host, port))
            if !host.is_empty()
                && !host.contains(':')
                && port.chars().all(|c| c.is_ascii_digit()) =>
        {
            host.to_string()
        }
        _ => remote_addr.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types.
#[derive(Debug, thiserror::Error)]
pub enum WeatherError {
    #[error("Provider error ({provider}): {message}")]
    Provider { provider: String, message: String },

    #[error("Provider {provider} timed out after {}ms", .after.as_millis())]
    Timeout { provider: String, after: Duration },

    #[error("No usable temperature readings for {city}")]
    NoReadings { city: String },

    #[error("Publish error: {0}")]
    Publish(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl WeatherError {
    pub fn provider(provider: &str, message: impl Into<String>) -> Self {
        WeatherError::Provider {
            provider: provider.to_string(),
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
