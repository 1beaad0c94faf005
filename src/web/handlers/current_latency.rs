//! Point-in-time latency for a list of locations

use axum::{
    Json,
    extract::{Query, State},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::LocationsQuery;
use crate::errors::WebError;
use crate::geo::round2;
use crate::models::ReadingSource;
use crate::web::{AppState, handle_error};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentLatency {
    pub code: String,
    /// Falls back to the code when the location has no coordinates
    pub country: String,
    pub lat: f64,
    pub lng: f64,
    /// Median, rounded to two decimals
    pub current_latency: f64,
    pub source: ReadingSource,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentLatencyResponse {
    pub updated: DateTime<Utc>,
    pub count: usize,
    pub data: Vec<CurrentLatency>,
}

/// Batched 15 minute percentiles; 400 when `locations` is missing or empty
pub async fn current_latency(
    Query(query): Query<LocationsQuery>,
    State(state): State<AppState>,
) -> Response {
    let codes = match query.codes() {
        Some(codes) if !codes.is_empty() => codes,
        _ => return handle_error(WebError::missing_parameter("locations").into()),
    };

    let readings = state.latency.fetch_latency_batch(&codes).await;
    let now = Utc::now();

    let data: Vec<CurrentLatency> = readings
        .into_iter()
        .map(|(code, reading)| {
            let coordinate = state.reference.coordinate(&code);
            CurrentLatency {
                country: coordinate
                    .map(|c| c.country.clone())
                    .unwrap_or_else(|| code.clone()),
                lat: coordinate.map(|c| c.lat).unwrap_or_default(),
                lng: coordinate.map(|c| c.lng).unwrap_or_default(),
                current_latency: round2(reading.sample().p50),
                source: reading.source(),
                timestamp: now,
                code,
            }
        })
        .collect();

    Json(CurrentLatencyResponse {
        updated: now,
        count: data.len(),
        data,
    })
    .into_response()
}
