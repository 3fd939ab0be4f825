//! Temperature providers.
//!
//! Defines the `TemperatureProvider` trait and one implementation per
//! upstream weather API. Providers hold only immutable configuration and
//! an HTTP client, so a single instance is shared by all requests.

pub mod apixu;
pub mod openweathermap;
pub mod weatherbit;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::{AppConfig, ProviderEntry, ProvidersConfig};
use crate::types::WeatherError;

/// Abstraction over current-temperature sources.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TemperatureProvider: Send + Sync {
    /// Provider name for logging and readings.
    fn name(&self) -> &'static str;

    /// Current temperature in Celsius for a named city.
    async fn get_temperature(&self, city: &str) -> Result<f64>;
}

/// Ordered, immutable set of providers queried for every request.
pub type ProviderSet = Vec<Arc<dyn TemperatureProvider>>;

/// Fixed connection settings for one provider.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub base_url: String,
    pub api_key: SecretString,
}

impl ProviderConfig {
    /// The base URL must be a bare endpoint: providers append their own
    /// query (key and city), so an existing query or fragment is rejected.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        let base_url = base_url.into();
        let base_url = base_url.strip_suffix('?').unwrap_or(&base_url).to_string();
        let parsed = Url::parse(&base_url)
            .map_err(|e| WeatherError::Config(format!("invalid provider URL {base_url}: {e}")))?;
        if parsed.query().is_some() || parsed.fragment().is_some() {
            return Err(WeatherError::Config(format!(
                "provider URL {base_url} must not carry a query string"
            ))
            .into());
        }
        Ok(Self {
            base_url,
            api_key: SecretString::new(api_key.into()),
        })
    }
}

/// HTTP client shared by the provider implementations.
pub(crate) fn http_client(provider: &str) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(15))
        .user_agent("weather-services/0.1.0")
        .build()
        .with_context(|| format!("Failed to build {provider} HTTP client"))
}

/// Turn a non-2xx response into a provider error, including the body text.
pub(crate) async fn check_status(provider: &str, resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    let snippet: String = body.chars().take(200).collect();
    Err(WeatherError::provider(provider, format!("HTTP {status}: {snippet}")).into())
}

/// Reject readings that cannot be a temperature at all.
pub(crate) fn finite_reading(provider: &str, value: f64) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(WeatherError::provider(provider, format!("non-finite temperature {value}")).into())
    }
}

/// Send a provider request with the URL stripped from transport errors.
///
/// The request URL carries the API key, and reqwest includes the URL in
/// the error's Display.
pub(crate) async fn send(provider: &str, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
    request
        .send()
        .await
        .map_err(reqwest::Error::without_url)
        .with_context(|| format!("{provider} request failed"))
}

/// Read a response body with the URL stripped from errors.
pub(crate) async fn read_body(provider: &str, resp: reqwest::Response) -> Result<String> {
    resp.text()
        .await
        .map_err(reqwest::Error::without_url)
        .with_context(|| format!("Failed to read {provider} body"))
}

type Constructor = fn(ProviderConfig) -> Result<Arc<dyn TemperatureProvider>>;

/// Build the provider set from configuration, in declaration order.
///
/// Providers that are disabled or whose key variable is unset are skipped.
pub fn build_providers(cfg: &ProvidersConfig) -> Result<ProviderSet> {
    let mut set: ProviderSet = Vec::new();

    let entries: [(&str, Option<&ProviderEntry>, Constructor); 3] = [
        (openweathermap::NAME, cfg.openweathermap.as_ref(), |c| {
            Ok(Arc::new(openweathermap::OpenWeatherMapProvider::new(c)?) as Arc<dyn TemperatureProvider>)
        }),
        (apixu::NAME, cfg.apixu.as_ref(), |c| {
            Ok(Arc::new(apixu::ApixuProvider::new(c)?) as Arc<dyn TemperatureProvider>)
        }),
        (weatherbit::NAME, cfg.weatherbit.as_ref(), |c| {
            Ok(Arc::new(weatherbit::WeatherbitProvider::new(c)?) as Arc<dyn TemperatureProvider>)
        }),
    ];

    for (name, entry, construct) in entries {
        let Some(entry) = entry.filter(|e| e.enabled) else {
            continue;
        };
        let key = match AppConfig::resolve_env(&entry.api_key_env) {
            Ok(k) => k,
            Err(e) => {
                warn!(provider = name, error = %e, "Skipping provider without API key");
                continue;
            }
        };
        let provider = construct(ProviderConfig::new(entry.base_url.clone(), key)?)?;
        info!(provider = name, base_url = %entry.base_url, "Provider enabled");
        set.push(provider);
    }

    if set.is_empty() {
        return Err(WeatherError::Config("no temperature providers configured".into()).into());
    }
    Ok(set)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
