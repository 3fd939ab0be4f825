//! OpenWeatherMap current weather provider.
//!
//! API: `https://api.openweathermap.org/data/2.5/weather`
//! Auth: `appid` query parameter.
//! Units: requested as metric, so `main.temp` is Celsius.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::Deserialize;
use tracing::debug;

use super::{check_status, finite_reading, http_client, read_body, send, ProviderConfig, TemperatureProvider};
use crate::types::WeatherError;

pub const NAME: &str = "openweathermap";

#[derive(Debug, Deserialize)]
struct OwmResponse {
    #[serde(default)]
    main: Option<OwmMain>,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OwmMain {
    temp: f64,
}

pub struct OpenWeatherMapProvider {
    http: Client,
    config: ProviderConfig,
}

impl OpenWeatherMapProvider {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        Ok(Self {
            http: http_client(NAME)?,
            config,
        })
    }

    fn request_url(&self, city: &str) -> String {
        format!(
            "{}?appid={}&q={}&units=metric",
            self.config.base_url,
            self.config.api_key.expose_secret(),
            urlencoding::encode(city)
        )
    }

    fn extract(body: &str) -> Result<f64> {
        let data: OwmResponse = serde_json::from_str(body)
            .context("Failed to parse OpenWeatherMap response")?;
        let main = data
            .main
            .ok_or_else(|| WeatherError::provider(NAME, "response has no `main` block"))?;
        debug!(station = ?data.name, temp = main.temp, "OpenWeatherMap reading");
        finite_reading(NAME, main.temp)
    }
}

#[async_trait]
impl TemperatureProvider for OpenWeatherMapProvider {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn get_temperature(&self, city: &str) -> Result<f64> {
        let resp = send(NAME, self.http.get(self.request_url(city))).await?;
        let resp = check_status(NAME, resp).await?;
        let body = read_body(NAME, resp).await?;
        Self::extract(&body)
    }
}
