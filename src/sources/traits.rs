//! Upstream source abstractions
//!
//! The publisher and web handlers depend on these traits rather than on the
//! concrete HTTP-backed implementations, so a location can be made to fail
//! or stall in tests without touching the network.

use async_trait::async_trait;

use crate::models::{LatencyReading, ProbeDetail, ProbeLocation};

/// Resolves the set of probe locations to report on
#[async_trait]
pub trait ProbeSource: Send + Sync {
    /// Never empty and never fails; falls back to a static set
    async fn resolve_probes(&self) -> Vec<ProbeLocation>;

    /// Probe rows for the regions listing
    async fn list_probe_details(&self) -> Vec<ProbeDetail>;
}

/// Fetches latency percentiles per location
#[async_trait]
pub trait LatencyProvider: Send + Sync {
    /// Hourly percentiles over the last day for one location
    async fn fetch_latency(&self, code: &str) -> LatencyReading;

    /// Current (15 minute) percentiles for many locations, in input order
    async fn fetch_latency_batch(&self, codes: &[String]) -> Vec<(String, LatencyReading)>;
}
