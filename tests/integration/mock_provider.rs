//! Mock provider and sink for integration testing.
//!
//! Provides a deterministic `TemperatureProvider` whose answer, delay and
//! call count are controllable from test code, plus an in-memory
//! `OutcomeSink` that records every published message.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use weather_services::providers::TemperatureProvider;
use weather_services::publisher::OutcomeSink;

/// What the mock answers with.
#[derive(Debug, Clone)]
pub enum Reply {
    Celsius(f64),
    Error(String),
}

pub struct MockProvider {
    name: &'static str,
    reply: Mutex<Reply>,
    delay: Duration,
    calls: AtomicUsize,
    cities: Mutex<Vec<String>>,
}

impl MockProvider {
    pub fn celsius(name: &'static str, value: f64) -> Arc<Self> {
        Self::build(name, Reply::Celsius(value), Duration::ZERO)
    }

    pub fn failing(name: &'static str) -> Arc<Self> {
        Self::build(name, Reply::Error(format!("{name} is down")), Duration::ZERO)
    }

    pub fn delayed(name: &'static str, value: f64, delay: Duration) -> Arc<Self> {
        Self::build(name, Reply::Celsius(value), delay)
    }

    fn build(name: &'static str, reply: Reply, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            name,
            reply: Mutex::new(reply),
            delay,
            calls: AtomicUsize::new(0),
            cities: Mutex::new(Vec::new()),
        })
    }

    /// Change the answer for subsequent calls.
    pub fn set_reply(&self, reply: Reply) {
        *self.reply.lock().unwrap() = reply;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn cities(&self) -> Vec<String> {
        self.cities.lock().unwrap().clone()
    }
}

#[async_trait]
impl TemperatureProvider for MockProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn get_temperature(&self, city: &str) -> Result<f64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.cities.lock().unwrap().push(city.to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let reply = self.reply.lock().unwrap().clone();
        match reply {
            Reply::Celsius(v) => Ok(v),
            Reply::Error(msg) => Err(anyhow!(msg)),
        }
    }
}

/// Records every message handed to it.
#[derive(Default)]
pub struct MemorySink {
    messages: Mutex<Vec<(String, String)>>,
}

impl MemorySink {
    pub fn messages(&self) -> Vec<(String, String)> {
        self.messages.lock().unwrap().clone()
    }

    /// Wait until at least `n` messages arrived or the retries run out.
    pub async fn wait_for(&self, n: usize) -> Vec<serde_json::Value> {
        for _ in 0..100 {
            if self.messages.lock().unwrap().len() >= n {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        self.messages()
            .into_iter()
            .map(|(_, payload)| serde_json::from_str(&payload).unwrap())
            .collect()
    }
}

#[async_trait]
impl OutcomeSink for MemorySink {
    async fn send(&self, channel: &str, payload: String) -> Result<()> {
        self.messages.lock().unwrap().push((channel.to_string(), payload));
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
