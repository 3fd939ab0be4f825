//! weather-services: current temperature from several upstream providers.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod aggregator;
pub mod config;
pub mod providers;
pub mod publisher;
pub mod server;
pub mod types;
