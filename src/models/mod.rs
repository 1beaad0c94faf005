use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::GeoPoint;

/// A probe location identified by ISO country code
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProbeLocation {
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ProbeLocation {
    pub fn new<S: Into<String>>(code: S) -> Self {
        Self {
            code: code.into(),
            name: None,
        }
    }
}

/// One row of the regions listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeDetail {
    pub name: String,
    pub country: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv4: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv6: Option<String>,
}

/// Latency percentiles in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LatencySample {
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
}

impl LatencySample {
    pub fn new(p25: f64, p50: f64, p75: f64) -> Self {
        Self { p25, p50, p75 }
    }

    /// The all-zero sample sent on the wire when no data is available
    pub fn unavailable() -> Self {
        Self::default()
    }

    /// All-zero samples mean "no data", never a real zero-latency reading
    pub fn is_unavailable(&self) -> bool {
        self.p25 == 0.0 && self.p50 == 0.0 && self.p75 == 0.0
    }
}

/// Where a latency reading came from
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, strum::Display, strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ReadingSource {
    #[default]
    Live,
    Synthetic,
    Unavailable,
}

/// Result of a latency fetch. Never an error: upstream trouble becomes
/// `Unavailable` with a reason for the logs.
#[derive(Debug, Clone, PartialEq)]
pub enum LatencyReading {
    Live(LatencySample),
    /// Random placeholder served when no radar credential is configured
    Synthetic(LatencySample),
    Unavailable(String),
}

impl LatencyReading {
    pub fn unavailable<S: Into<String>>(reason: S) -> Self {
        Self::Unavailable(reason.into())
    }

    /// Sample for the wire; `Unavailable` maps to all zeros
    pub fn sample(&self) -> LatencySample {
        match self {
            Self::Live(sample) | Self::Synthetic(sample) => *sample,
            Self::Unavailable(_) => LatencySample::unavailable(),
        }
    }

    pub fn source(&self) -> ReadingSource {
        match self {
            Self::Live(_) => ReadingSource::Live,
            Self::Synthetic(_) => ReadingSource::Synthetic,
            Self::Unavailable(_) => ReadingSource::Unavailable,
        }
    }
}

/// Exchange or datacenter server from the reference set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerRecord {
    pub id: String,
    pub name: String,
    pub provider: String,
    pub region: String,
    pub lat: f64,
    pub lng: f64,
}

impl ServerRecord {
    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lng)
    }
}

/// Representative coordinates of a country
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountryCoordinate {
    pub country: String,
    pub lat: f64,
    pub lng: f64,
}

impl CountryCoordinate {
    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lng)
    }
}

/// A server annotated with its distance from a probe location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NearbyServer {
    pub id: String,
    pub name: String,
    pub lat: f64,
    pub lng: f64,
    pub provider: String,
    /// Rounded to two decimal places
    pub distance_km: f64,
}

/// Per-location payload of a `location` event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationUpdate {
    pub location: String,
    pub country: String,
    pub lat: f64,
    pub lng: f64,
    pub latency: LatencySample,
    #[serde(default)]
    pub source: ReadingSource,
    pub exchanges: Vec<NearbyServer>,
    pub timestamp: DateTime<Utc>,
}

/// Events pushed to stream consumers, tagged by `type` on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEvent {
    Location(LocationUpdate),
    Info {
        message: String,
        /// Milliseconds spent before the event was emitted
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration: Option<u64>,
    },
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        location: Option<String>,
        message: String,
    },
    End {
        message: String,
    },
}

impl StreamEvent {
    pub fn info<S: Into<String>>(message: S, duration: Option<u64>) -> Self {
        Self::Info {
            message: message.into(),
            duration,
        }
    }

    pub fn error<S: Into<String>>(location: Option<String>, message: S) -> Self {
        Self::Error {
            location,
            message: message.into(),
        }
    }

    pub fn end() -> Self {
        Self::End {
            message: "done".to_string(),
        }
    }

    /// SSE `event:` name
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Location(_) => "location",
            Self::Info { .. } => "info",
            Self::Error { .. } => "error",
            Self::End { .. } => "end",
        }
    }

    /// Whether the stream ends after this event
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::End { .. } | Self::Info { .. })
    }
}
