//! Weatherbit current observations provider.
//!
//! API: `https://api.weatherbit.io/v2.0/current`
//! Auth: `key` query parameter. Default units are metric.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::Deserialize;
use tracing::debug;

use super::{check_status, finite_reading, http_client, read_body, send, ProviderConfig, TemperatureProvider};
use crate::types::WeatherError;

pub const NAME: &str = "weatherbit";

#[derive(Debug, Deserialize)]
struct WeatherbitResponse {
    #[serde(default)]
    data: Vec<WeatherbitObservation>,
}

#[derive(Debug, Deserialize)]
struct WeatherbitObservation {
    temp: f64,
    #[serde(default)]
    city_name: Option<String>,
}

pub struct WeatherbitProvider {
    http: Client,
    config: ProviderConfig,
}

impl WeatherbitProvider {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        Ok(Self {
            http: http_client(NAME)?,
            config,
        })
    }

    fn request_url(&self, city: &str) -> String {
        format!(
            "{}?key={}&city={}",
            self.config.base_url,
            self.config.api_key.expose_secret(),
            urlencoding::encode(city)
        )
    }

    fn extract(body: &str) -> Result<f64> {
        let data: WeatherbitResponse =
            serde_json::from_str(body).context("Failed to parse Weatherbit response")?;
        let obs = data
            .data
            .into_iter()
            .next()
            .ok_or_else(|| WeatherError::provider(NAME, "no observations returned"))?;
        debug!(city = ?obs.city_name, temp = obs.temp, "Weatherbit reading");
        finite_reading(NAME, obs.temp)
    }
}

#[async_trait]
impl TemperatureProvider for WeatherbitProvider {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn get_temperature(&self, city: &str) -> Result<f64> {
        let resp = send(NAME, self.http.get(self.request_url(city))).await?;
        let resp = check_status(NAME, resp).await?;
        // Unknown cities come back as 204 with an empty body.
        let body = read_body(NAME, resp).await?;
        if body.trim().is_empty() {
            return Err(WeatherError::provider(NAME, "empty response").into());
        }
        Self::extract(&body)
    }
}
