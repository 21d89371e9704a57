//! Marionette Test Harness
//!
//! Tools for exercising the avatar controller without a live host:
//! - Chaos connector (seeded refusals, dispatch failures, latency)
//! - End-to-end scenarios against the scripted host
//!
//! Benchmarks for the per-tick pipeline live under `benches/`.

pub mod chaos;
pub mod integration;

pub use chaos::{ChaosConfig, ChaosConnector, ChaosStats, JitterDistribution};
pub use integration::{fast_config, TestRig};
