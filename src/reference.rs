use rust_embed::RustEmbed;
use std::collections::HashMap;
use tracing::debug;

use crate::errors::{AppError, AppResult};
use crate::models::{CountryCoordinate, ServerRecord};

/// Embedded static reference data (exchange servers, country coordinates)
#[derive(RustEmbed)]
#[folder = "reference/"]
pub struct ReferenceAssets;

const EXCHANGES_FILE: &str = "exchanges.json";
const COUNTRIES_FILE: &str = "country_coordinates.json";

/// Static lookup tables shared by the publisher and the web handlers
#[derive(Debug, Clone, Default)]
pub struct ReferenceData {
    servers: Vec<ServerRecord>,
    countries: HashMap<String, CountryCoordinate>,
}

impl ReferenceAssets {
    fn read(path: &str) -> AppResult<std::borrow::Cow<'static, [u8]>> {
        Self::get(path)
            .map(|file| file.data)
            .ok_or_else(|| AppError::not_found("reference asset", path))
    }
}

impl ReferenceData {
    pub fn new(servers: Vec<ServerRecord>, countries: HashMap<String, CountryCoordinate>) -> Self {
        let countries = countries
            .into_iter()
            .map(|(code, coord)| (code.to_ascii_uppercase(), coord))
            .collect();
        Self { servers, countries }
    }

    /// Load the reference set compiled into the binary
    pub fn embedded() -> AppResult<Self> {
        let servers: Vec<ServerRecord> =
            serde_json::from_slice(&ReferenceAssets::read(EXCHANGES_FILE)?)?;
        let countries: HashMap<String, CountryCoordinate> =
            serde_json::from_slice(&ReferenceAssets::read(COUNTRIES_FILE)?)?;

        debug!(
            servers = servers.len(),
            countries = countries.len(),
            "Loaded embedded reference data"
        );
        Ok(Self::new(servers, countries))
    }

    /// Servers in reference order
    pub fn servers(&self) -> &[ServerRecord] {
        &self.servers
    }

    /// Coordinates for an ISO country code, case-insensitive
    pub fn coordinate(&self, code: &str) -> Option<&CountryCoordinate> {
        self.countries.get(&code.trim().to_ascii_uppercase())
    }

    pub fn country_count(&self) -> usize {
        self.countries.len()
    }
}
