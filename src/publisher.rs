//! Outcome event publishing.
//!
//! Every served request produces one `OutcomeRecord`, published as a JSON
//! message on a pub/sub channel. Publishing is fire-and-forget: it runs
//! in a spawned task, is attempted exactly once, and failures are only
//! logged.

use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::types::{OutcomeRecord, WeatherError};

/// Destination for serialized outcome messages.
#[async_trait]
pub trait OutcomeSink: Send + Sync {
    /// Deliver one message on `channel`.
    async fn send(&self, channel: &str, payload: String) -> Result<()>;

    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Redis
// ---------------------------------------------------------------------------

/// Publishes over a single shared, auto-reconnecting Redis connection.
///
/// `ConnectionManager` is multiplexed, so concurrent publishes share one
/// connection and each `PUBLISH` is sent as a single command.
#[derive(Clone)]
pub struct RedisSink {
    conn: ConnectionManager,
}

impl RedisSink {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)
            .with_context(|| format!("Invalid Redis URL: {url}"))?;
        let conn = ConnectionManager::new(client)
            .await
            .with_context(|| format!("Failed to connect to Redis at {url}"))?;
        info!(url, "Connected to Redis");
        Ok(Self { conn })
    }
}

#[async_trait]
impl OutcomeSink for RedisSink {
    async fn send(&self, channel: &str, payload: String) -> Result<()> {
        let mut conn = self.conn.clone();
        let receivers: i64 = conn
            .publish(channel, payload)
            .await
            .map_err(|e| WeatherError::Publish(e.to_string()))?;
        debug!(channel, receivers, "Outcome published");
        Ok(())
    }

    fn name(&self) -> &str {
        "redis"
    }
}

// ---------------------------------------------------------------------------
// Log-only
// ---------------------------------------------------------------------------

/// Writes outcome messages to the log instead of a broker.
#[derive(Debug, Default, Clone)]
pub struct LogSink;

#[async_trait]
impl OutcomeSink for LogSink {
    async fn send(&self, channel: &str, payload: String) -> Result<()> {
        info!(channel, payload = %payload, "Outcome event");
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}

// ---------------------------------------------------------------------------
// Publisher
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct OutcomePublisher {
    sink: Arc<dyn OutcomeSink>,
    channel: String,
}

impl OutcomePublisher {
    pub fn new(sink: Arc<dyn OutcomeSink>, channel: impl Into<String>) -> Self {
        Self {
            sink,
            channel: channel.into(),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Hand a record to the sink without waiting for delivery.
    ///
    /// The returned handle carries no result; callers are free to drop it.
    pub fn publish(&self, record: OutcomeRecord) -> JoinHandle<()> {
        let sink = Arc::clone(&self.sink);
        let channel = self.channel.clone();
        tokio::spawn(async move {
            debug!(%record, "Publishing outcome");
            let payload = match serde_json::to_string(&record) {
                Ok(p) => p,
                Err(e) => {
                    warn!(error = %e, "Failed to serialise outcome record");
                    return;
                }
            };
            if let Err(e) = sink.send(&channel, payload).await {
                warn!(
                    sink = sink.name(),
                    channel = %channel,
                    endpoint = %record.endpoint,
                    error = %e,
                    "Outcome publish failed"
                );
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
