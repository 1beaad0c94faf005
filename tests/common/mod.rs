//! Shared fixtures for route tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use globe_latency::{
    client::{SseDecoder, parse_event},
    config::Config,
    models::{
        CountryCoordinate, LatencyReading, LatencySample, ProbeDetail, ProbeLocation,
        ServerRecord, StreamEvent,
    },
    reference::ReferenceData,
    sources::{LatencyProvider, ProbeSource},
    web::AppState,
};

pub struct FixedProbes(pub Vec<&'static str>);

#[async_trait]
impl ProbeSource for FixedProbes {
    async fn resolve_probes(&self) -> Vec<ProbeLocation> {
        self.0.iter().map(|code| ProbeLocation::new(*code)).collect()
    }

    async fn list_probe_details(&self) -> Vec<ProbeDetail> {
        self.0
            .iter()
            .map(|code| ProbeDetail {
                name: format!("Probe {code}"),
                country: code.to_string(),
                ipv4: Some("192.0.2.1".to_string()),
                ipv6: None,
            })
            .collect()
    }
}

/// 10/20/30 ms everywhere except `GB`, which has no credential-backed data
pub struct FixedLatency;

impl FixedLatency {
    fn reading(code: &str) -> LatencyReading {
        match code {
            "GB" => LatencyReading::Synthetic(LatencySample::new(40.0, 45.5, 60.0)),
            _ => LatencyReading::Live(LatencySample::new(10.0, 20.0, 30.0)),
        }
    }
}

#[async_trait]
impl LatencyProvider for FixedLatency {
    async fn fetch_latency(&self, code: &str) -> LatencyReading {
        Self::reading(code)
    }

    async fn fetch_latency_batch(&self, codes: &[String]) -> Vec<(String, LatencyReading)> {
        codes
            .iter()
            .map(|code| (code.clone(), Self::reading(code)))
            .collect()
    }
}

pub fn reference() -> Arc<ReferenceData> {
    let server = |id: &str, provider: &str, lat: f64, lng: f64| ServerRecord {
        id: id.to_lowercase(),
        name: id.to_string(),
        provider: provider.to_string(),
        region: format!("{}-region", id.to_lowercase()),
        lat,
        lng,
    };
    let servers = vec![
        server("NEAR", "AWS", 38.0, -97.0),
        server("MID", "GCP", 40.7, -74.0),
        server("FAR", "Azure", 35.6, 139.6),
    ];
    let countries = HashMap::from([
        (
            "US".to_string(),
            CountryCoordinate {
                country: "United States".to_string(),
                lat: 37.0902,
                lng: -95.7129,
            },
        ),
        (
            "GB".to_string(),
            CountryCoordinate {
                country: "United Kingdom".to_string(),
                lat: 55.3781,
                lng: -3.436,
            },
        ),
    ]);
    Arc::new(ReferenceData::new(servers, countries))
}

pub fn test_config(data_dir: &Path) -> Config {
    let mut config = Config::default();
    config.web.host = "127.0.0.1".to_string();
    config.web.port = 0;
    config.stream.nearest_k = 2;
    config.storage.history_dir = data_dir.join("history");
    config.storage.probe_cache_path = data_dir.join("probe-cache.json");
    config
}

pub fn test_state(data_dir: &Path) -> AppState {
    AppState::new(
        test_config(data_dir),
        reference(),
        Arc::new(FixedProbes(vec!["US", "GB"])),
        Arc::new(FixedLatency),
    )
}

/// Decode a complete SSE body into events, keeping the `event:` name
pub fn decode_events(body: &str) -> Vec<(String, StreamEvent)> {
    let mut decoder = SseDecoder::new();
    decoder
        .feed(body.as_bytes())
        .iter()
        .filter_map(|frame| {
            let name = frame.event.clone().unwrap_or_default();
            parse_event(frame).map(|event| (name, event))
        })
        .collect()
}
