//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Provider API keys are referenced by env-var name in the config and
//! resolved at startup via `std::env::var`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::time::Duration;

use crate::aggregator::ReadingFilter;
use crate::types::WeatherError;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub aggregator: AggregatorConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct BrokerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_broker_url")]
    pub url: String,
    #[serde(default = "default_channel")]
    pub channel: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: default_broker_url(),
            channel: default_channel(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AggregatorConfig {
    /// Deadline for each individual provider call.
    #[serde(default = "default_provider_timeout_secs")]
    pub provider_timeout_secs: u64,
    /// `positive_only` or `any_finite`.
    #[serde(default = "default_reading_filter")]
    pub reading_filter: String,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            provider_timeout_secs: default_provider_timeout_secs(),
            reading_filter: default_reading_filter(),
        }
    }
}

impl AggregatorConfig {
    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }

    pub fn filter(&self) -> Result<ReadingFilter> {
        self.reading_filter
            .parse::<ReadingFilter>()
            .map_err(|e| WeatherError::Config(e).into())
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ProvidersConfig {
    pub openweathermap: Option<ProviderEntry>,
    pub apixu: Option<ProviderEntry>,
    pub weatherbit: Option<ProviderEntry>,
}

/// One provider table in `config.toml`.
#[derive(Debug, Deserialize, Clone)]
pub struct ProviderEntry {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub base_url: String,
    pub api_key_env: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    9000
}

fn default_true() -> bool {
    true
}

fn default_broker_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_channel() -> String {
    "CALL-REST-API".to_string()
}

fn default_provider_timeout_secs() -> u64 {
    10
}

fn default_reading_filter() -> String {
    "positive_only".to_string()
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::parse(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    /// Parse configuration from TOML text and validate it.
    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.aggregator.filter()?;
        if config.aggregator.provider_timeout_secs == 0 {
            return Err(WeatherError::Config("provider_timeout_secs must be positive".into()).into());
        }
        Ok(config)
    }

    /// Resolve an environment variable name to its value.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}
