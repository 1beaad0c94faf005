//! Real-time network latency aggregation and streaming.
//!
//! Probe locations are resolved, latency percentiles fetched per location,
//! enriched with the nearest exchange servers and pushed to consumers over
//! Server-Sent Events. The [`client`] module is the consuming side.

pub mod client;
pub mod config;
pub mod errors;
pub mod geo;
pub mod history;
pub mod models;
pub mod reference;
pub mod sources;
pub mod streaming;
pub mod topology;
pub mod utils;
pub mod web;
