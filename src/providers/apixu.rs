//! Apixu current weather provider.
//!
//! API: `https://api.apixu.com/v1/current.json` (the same `current.json`
//! contract is served by weatherapi.com, so either base URL works).
//! Auth: `key` query parameter.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::Deserialize;
use tracing::debug;

use super::{finite_reading, http_client, read_body, send, ProviderConfig, TemperatureProvider};
use crate::types::WeatherError;

pub const NAME: &str = "apixu";

#[derive(Debug, Deserialize)]
struct ApixuResponse {
    #[serde(default)]
    location: Option<ApixuLocation>,
    #[serde(default)]
    current: Option<ApixuCurrent>,
    #[serde(default)]
    error: Option<ApixuError>,
}

#[derive(Debug, Deserialize)]
struct ApixuLocation {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct ApixuCurrent {
    temp_c: f64,
}

#[derive(Debug, Deserialize)]
struct ApixuError {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

pub struct ApixuProvider {
    http: Client,
    config: ProviderConfig,
}

impl ApixuProvider {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        Ok(Self {
            http: http_client(NAME)?,
            config,
        })
    }

    fn request_url(&self, city: &str) -> String {
        format!(
            "{}?key={}&q={}",
            self.config.base_url,
            self.config.api_key.expose_secret(),
            urlencoding::encode(city)
        )
    }

    /// Apixu reports lookup failures in the body, sometimes with a 4xx status,
    /// so the body is inspected before the status code.
    fn extract(body: &str) -> Result<f64> {
        let data: ApixuResponse =
            serde_json::from_str(body).context("Failed to parse Apixu response")?;

        if let Some(err) = data.error {
            return Err(WeatherError::provider(NAME, format!("{} (code {})", err.message, err.code)).into());
        }

        let current = data
            .current
            .ok_or_else(|| WeatherError::provider(NAME, "response has no `current` block"))?;
        debug!(
            location = data.location.as_ref().map(|l| l.name.as_str()).unwrap_or("?"),
            temp_c = current.temp_c,
            "Apixu reading"
        );
        finite_reading(NAME, current.temp_c)
    }
}

#[async_trait]
impl TemperatureProvider for ApixuProvider {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn get_temperature(&self, city: &str) -> Result<f64> {
        let resp = send(NAME, self.http.get(self.request_url(city))).await?;
        let status = resp.status();
        let body = read_body(NAME, resp).await?;

        match Self::extract(&body) {
            Ok(temp) if status.is_success() => Ok(temp),
            Ok(_) => Err(WeatherError::provider(NAME, format!("HTTP {status}")).into()),
            Err(e) => Err(e),
        }
    }
}
