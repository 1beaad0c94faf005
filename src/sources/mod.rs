//! Upstream latency sources
//!
//! - [`probes`]: probe locations from the synthetic-monitoring API, with a
//!   file cache and a static fallback
//! - [`radar`]: latency percentiles from the edge-quality radar API
//!
//! Neither source returns errors to callers. Missing credentials, timeouts
//! and malformed responses degrade to fallback or tagged readings.

pub mod probes;
pub mod radar;
pub mod traits;

pub use probes::{ProbeDirectory, ProbeResolution};
pub use radar::RadarClient;
pub use traits::*;
