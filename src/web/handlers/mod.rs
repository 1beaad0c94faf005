//! HTTP request handlers organized by endpoint

pub mod current_latency;
pub mod health;
pub mod history;
pub mod latency_stream;
pub mod regions;

use serde::Deserialize;

use crate::streaming::normalize_codes;

/// `?locations=US,GB` query shared by the latency endpoints
#[derive(Debug, Default, Deserialize)]
pub struct LocationsQuery {
    pub locations: Option<String>,
}

impl LocationsQuery {
    /// `None` when the parameter is absent; an explicit empty value yields an
    /// empty list
    pub fn codes(&self) -> Option<Vec<String>> {
        self.locations.as_deref().map(parse_locations)
    }
}

/// Split a comma separated location list into normalized codes
pub fn parse_locations(raw: &str) -> Vec<String> {
    normalize_codes(raw.split(',').map(str::to_string).collect())
}
