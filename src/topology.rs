//! Nearest-server enrichment and arc construction

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::geo::{GeoPoint, haversine_km, round2};
use crate::models::{
    CountryCoordinate, LatencyReading, LatencySample, LocationUpdate, NearbyServer, ServerRecord,
};

pub const SOURCE_TYPE: &str = "Probe Server";
pub const TARGET_TYPE: &str = "Exchange Server";

/// Below this latency (ms) an arc is tagged `Low`
pub const LOW_LATENCY_MS: f64 = 30.0;
/// Below this latency (ms) an arc is tagged `Medium`
pub const MEDIUM_LATENCY_MS: f64 = 50.0;

/// Three-bucket latency classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ColorTag {
    Low,
    Medium,
    High,
}

impl ColorTag {
    /// Display colour for globe renderers
    pub fn hex(&self) -> &'static str {
        match self {
            Self::Low => "#00FF99",
            Self::Medium => "#FFB020",
            Self::High => "#FF4040",
        }
    }
}

pub fn classify_latency(latency_ms: f64) -> ColorTag {
    if latency_ms < LOW_LATENCY_MS {
        ColorTag::Low
    } else if latency_ms < MEDIUM_LATENCY_MS {
        ColorTag::Medium
    } else {
        ColorTag::High
    }
}

/// The `k` servers closest to `origin`, ascending by distance.
///
/// Equal distances keep reference order.
pub fn nearest_servers(origin: GeoPoint, servers: &[ServerRecord], k: usize) -> Vec<NearbyServer> {
    let mut ranked: Vec<(f64, &ServerRecord)> = servers
        .iter()
        .map(|server| (haversine_km(origin, server.point()), server))
        .collect();
    ranked.sort_by(|a, b| a.0.total_cmp(&b.0));

    ranked
        .into_iter()
        .take(k)
        .map(|(distance, server)| NearbyServer {
            id: server.id.clone(),
            name: server.name.clone(),
            lat: server.lat,
            lng: server.lng,
            provider: server.provider.clone(),
            distance_km: round2(distance),
        })
        .collect()
}

/// Pick a percentile per distance: nearer servers get p25, farther p75.
///
/// Distances are normalized over the set; a single distance (or all equal)
/// normalizes to 0 and therefore maps to p25.
pub fn select_percentile(distances: &[f64], sample: &LatencySample) -> Vec<f64> {
    let min = distances.iter().copied().fold(f64::INFINITY, f64::min);
    let max = distances.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;

    distances
        .iter()
        .map(|d| {
            let normalized = if range > 0.0 { (d - min) / range } else { 0.0 };
            if normalized < 0.33 {
                sample.p25
            } else if normalized < 0.66 {
                sample.p50
            } else {
                sample.p75
            }
        })
        .collect()
}

/// Attaches nearby servers to a latency reading
#[derive(Debug, Clone, Copy)]
pub struct TopologyEnricher {
    nearest_k: usize,
}

impl TopologyEnricher {
    pub fn new(nearest_k: usize) -> Self {
        Self { nearest_k }
    }

    pub fn nearest_k(&self) -> usize {
        self.nearest_k
    }

    pub fn enrich(
        &self,
        code: &str,
        coordinate: &CountryCoordinate,
        reading: &LatencyReading,
        servers: &[ServerRecord],
    ) -> LocationUpdate {
        LocationUpdate {
            location: code.to_string(),
            country: coordinate.country.clone(),
            lat: coordinate.lat,
            lng: coordinate.lng,
            latency: reading.sample(),
            source: reading.source(),
            exchanges: nearest_servers(coordinate.point(), servers, self.nearest_k),
            timestamp: Utc::now(),
        }
    }
}

/// A probe-to-server edge as rendered on the globe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatencyArc {
    pub id: String,
    pub start_lat: f64,
    pub start_lng: f64,
    pub end_lat: f64,
    pub end_lng: f64,
    pub latency: f64,
    pub color: ColorTag,
    pub source: String,
    pub target: String,
    pub target_provider: String,
    pub distance: f64,
    pub source_type: String,
    pub target_type: String,
    pub source_location: String,
    pub target_location: String,
}

impl LatencyArc {
    pub fn arc_id(location: &str, server_name: &str) -> String {
        format!("{location}-{server_name}")
    }
}

/// Turn one `location` update into arcs, one per nearby server
pub fn build_arcs(update: &LocationUpdate) -> Vec<LatencyArc> {
    let distances: Vec<f64> = update.exchanges.iter().map(|ex| ex.distance_km).collect();
    let latencies = select_percentile(&distances, &update.latency);

    update
        .exchanges
        .iter()
        .zip(latencies)
        .map(|(ex, latency)| LatencyArc {
            id: LatencyArc::arc_id(&update.location, &ex.name),
            start_lat: update.lat,
            start_lng: update.lng,
            end_lat: ex.lat,
            end_lng: ex.lng,
            latency,
            color: classify_latency(latency),
            source: update.country.clone(),
            target: ex.name.clone(),
            target_provider: ex.provider.clone(),
            distance: ex.distance_km,
            source_type: SOURCE_TYPE.to_string(),
            target_type: TARGET_TYPE.to_string(),
            source_location: update.location.clone(),
            target_location: format!("{} - {}", ex.provider, ex.name),
        })
        .collect()
}
