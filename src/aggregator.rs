//! Concurrent multi-provider temperature aggregation.
//!
//! One task is spawned per provider; each task sends exactly one tagged
//! reading back over an mpsc channel. The coordinator collects one reading
//! per provider slot and folds them into an average and an outcome status.
//! Provider errors, timeouts and panics all become ordinary failed
//! readings, so a single bad upstream only degrades the answer.
//!
//! The tasks live in a `JoinSet` owned by the coordinator, so dropping a
//! request aborts any provider calls still in flight.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::providers::{ProviderSet, TemperatureProvider};
use crate::types::{OutcomeStatus, WeatherError};

/// Returned as the average when no reading could be used.
pub const NO_READING_SENTINEL: f64 = 0.0;

// ---------------------------------------------------------------------------
// Readings
// ---------------------------------------------------------------------------

/// What a single provider produced for one request.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadingOutcome {
    Celsius(f64),
    Failed(String),
    TimedOut(Duration),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProviderReading {
    pub provider: &'static str,
    pub outcome: ReadingOutcome,
}

impl ProviderReading {
    pub fn celsius(provider: &'static str, value: f64) -> Self {
        Self { provider, outcome: ReadingOutcome::Celsius(value) }
    }

    pub fn failed(provider: &'static str, reason: impl Into<String>) -> Self {
        Self { provider, outcome: ReadingOutcome::Failed(reason.into()) }
    }

    pub fn is_failure(&self) -> bool {
        !matches!(self.outcome, ReadingOutcome::Celsius(_))
    }
}

impl fmt::Display for ProviderReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            ReadingOutcome::Celsius(c) => write!(f, "{}: {c:.2}°C", self.provider),
            ReadingOutcome::Failed(reason) => write!(f, "{}: failed ({reason})", self.provider),
            ReadingOutcome::TimedOut(after) => {
                write!(f, "{}: timed out after {}ms", self.provider, after.as_millis())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Averaging policy
// ---------------------------------------------------------------------------

/// Which successful readings count towards the average.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadingFilter {
    /// Only readings strictly above zero. Zero and sub-zero readings are
    /// dropped as if the provider had not answered.
    #[default]
    PositiveOnly,
    /// Every finite reading.
    AnyFinite,
}

impl ReadingFilter {
    pub fn accepts(self, celsius: f64) -> bool {
        if !celsius.is_finite() {
            return false;
        }
        match self {
            ReadingFilter::PositiveOnly => celsius > 0.0,
            ReadingFilter::AnyFinite => true,
        }
    }
}

impl FromStr for ReadingFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "positive_only" | "positive" => Ok(ReadingFilter::PositiveOnly),
            "any_finite" | "any" | "all" => Ok(ReadingFilter::AnyFinite),
            other => Err(format!("unknown reading filter: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Aggregate
// ---------------------------------------------------------------------------

/// Coarse classification of an aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateHealth {
    /// Every provider answered and at least one reading was used.
    Complete,
    /// Some providers failed; the average covers the rest.
    Degraded { failed: usize },
    /// No reading could be used; the average is the sentinel.
    TotalFailure,
}

/// Result of one aggregation.
#[derive(Debug, Clone)]
pub struct Aggregate {
    pub celsius: f64,
    pub status: OutcomeStatus,
    /// Number of readings that went into the average.
    pub included: usize,
    pub readings: Vec<ProviderReading>,
}

impl Aggregate {
    /// Fold a set of readings into an average and a status.
    ///
    /// Order of `readings` has no effect on the result.
    pub fn from_readings(readings: Vec<ProviderReading>, filter: ReadingFilter) -> Self {
        let mut sum = 0.0;
        let mut included = 0usize;
        let mut failed = 0usize;

        for reading in &readings {
            match reading.outcome {
                ReadingOutcome::Celsius(c) if filter.accepts(c) => {
                    sum += c;
                    included += 1;
                }
                ReadingOutcome::Celsius(c) => {
                    debug!(provider = reading.provider, celsius = c, "Reading excluded by filter");
                }
                ReadingOutcome::Failed(_) | ReadingOutcome::TimedOut(_) => failed += 1,
            }
        }

        let celsius = if included > 0 {
            sum / included as f64
        } else {
            NO_READING_SENTINEL
        };
        let status = if failed == 0 && included > 0 {
            OutcomeStatus::Success
        } else {
            OutcomeStatus::Failure
        };

        Self { celsius, status, included, readings }
    }

    pub fn failed(&self) -> usize {
        self.readings.iter().filter(|r| r.is_failure()).count()
    }

    pub fn has_average(&self) -> bool {
        self.included > 0
    }

    pub fn health(&self) -> AggregateHealth {
        if !self.has_average() {
            return AggregateHealth::TotalFailure;
        }
        match self.failed() {
            0 => AggregateHealth::Complete,
            failed => AggregateHealth::Degraded { failed },
        }
    }
}

// ---------------------------------------------------------------------------
// Aggregator
// ---------------------------------------------------------------------------

pub struct Aggregator {
    providers: ProviderSet,
    provider_timeout: Duration,
    filter: ReadingFilter,
}

impl Aggregator {
    pub fn new(providers: ProviderSet, provider_timeout: Duration, filter: ReadingFilter) -> Self {
        Self { providers, provider_timeout, filter }
    }

    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }

    pub fn filter(&self) -> ReadingFilter {
        self.filter
    }

    /// Query every provider concurrently and combine the answers.
    pub async fn temperature(&self, city: &str) -> Aggregate {
        let n = self.providers.len();
        let (tx, mut rx) = mpsc::channel::<(usize, ProviderReading)>(n.max(1));
        let mut tasks = JoinSet::new();

        for (slot, provider) in self.providers.iter().enumerate() {
            let tx = tx.clone();
            let provider = Arc::clone(provider);
            let city = city.to_string();
            let deadline = self.provider_timeout;
            tasks.spawn(async move {
                let reading = query_provider(provider, &city, deadline).await;
                let _ = tx.send((slot, reading)).await;
            });
        }
        drop(tx);

        let mut slots: Vec<Option<ProviderReading>> = vec![None; n];
        let mut received = 0;
        while received < n {
            let Some((slot, reading)) = rx.recv().await else {
                break;
            };
            if slots[slot].is_none() {
                slots[slot] = Some(reading);
                received += 1;
            }
        }
        // Surface panicked tasks in the log.
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                debug!(city, error = %e, "Provider task did not complete");
            }
        }

        let readings: Vec<ProviderReading> = slots
            .into_iter()
            .zip(self.providers.iter())
            .map(|(slot, provider)| {
                slot.unwrap_or_else(|| {
                    warn!(provider = provider.name(), city, "Provider task ended without reporting");
                    ProviderReading::failed(provider.name(), "task ended without reporting")
                })
            })
            .collect();

        let aggregate = Aggregate::from_readings(readings, self.filter);
        info!(
            city,
            celsius = aggregate.celsius,
            included = aggregate.included,
            failed = aggregate.failed(),
            providers = n,
            status = %aggregate.status,
            "Aggregation complete"
        );
        aggregate
    }
}

/// Run one provider call under its deadline and tag the outcome.
async fn query_provider(
    provider: Arc<dyn TemperatureProvider>,
    city: &str,
    deadline: Duration,
) -> ProviderReading {
    let name = provider.name();
    match tokio::time::timeout(deadline, provider.get_temperature(city)).await {
        Ok(Ok(celsius)) => {
            debug!(provider = name, city, celsius, "Provider reading");
            ProviderReading::celsius(name, celsius)
        }
        Ok(Err(e)) => {
            warn!(provider = name, city, error = %e, "Provider failed");
            ProviderReading::failed(name, format!("{e:#}"))
        }
        Err(_) => {
            let e = WeatherError::Timeout { provider: name.to_string(), after: deadline };
            warn!(provider = name, city, error = %e, "Provider timed out");
            ProviderReading { provider: name, outcome: ReadingOutcome::TimedOut(deadline) }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
