//! weather-services entry point.
//!
//! Loads configuration, initialises structured logging, builds the
//! provider set and the outcome publisher, then serves the HTTP API
//! until Ctrl+C.

use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};

use weather_services::aggregator::Aggregator;
use weather_services::config::{self, BrokerConfig};
use weather_services::providers;
use weather_services::publisher::{LogSink, OutcomePublisher, OutcomeSink, RedisSink};
use weather_services::server::{self, ServiceState};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let config_path = std::env::var("WEATHER_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    let cfg = config::AppConfig::load(&config_path)?;

    init_logging();

    let providers = providers::build_providers(&cfg.providers)?;
    let aggregator = Aggregator::new(
        providers,
        cfg.aggregator.provider_timeout(),
        cfg.aggregator.filter()?,
    );
    let publisher = OutcomePublisher::new(outcome_sink(&cfg.broker).await, cfg.broker.channel.clone());

    info!(
        providers = aggregator.provider_count(),
        provider_timeout_secs = cfg.aggregator.provider_timeout_secs,
        filter = ?aggregator.filter(),
        channel = publisher.channel(),
        "weather-services starting up"
    );

    let state = Arc::new(ServiceState::new(aggregator, publisher));

    server::serve(state, &cfg.server.host, cfg.server.port).await?;

    info!("weather-services shut down cleanly.");
    Ok(())
}

/// Connect to the broker, falling back to log-only events when it is
/// disabled or unreachable.
async fn outcome_sink(broker: &BrokerConfig) -> Arc<dyn OutcomeSink> {
    if !broker.enabled {
        info!("Broker disabled; outcome events will be logged only");
        return Arc::new(LogSink);
    }
    match RedisSink::connect(&broker.url).await {
        Ok(sink) => Arc::new(sink),
        Err(e) => {
            warn!(url = %broker.url, error = format!("{e:#}"), "Broker unavailable; outcome events will be logged only");
            Arc::new(LogSink)
        }
    }
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("weather_services=info,tower_http=info"));

    let json_logging = std::env::var("WEATHER_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
