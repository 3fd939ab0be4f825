//! Integration test harness.

mod mock_provider;
mod scenarios;
