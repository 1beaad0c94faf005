use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::errors::{AppError, AppResult};

pub mod defaults;
pub mod duration_serde;

use defaults::*;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub web: WebConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub history: HistoryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Third-party latency APIs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL of the edge-quality radar API
    #[serde(default = "default_radar_base_url")]
    pub radar_base_url: String,
    /// Base URL of the synthetic-monitoring probe API
    #[serde(default = "default_probe_base_url")]
    pub probe_base_url: String,
    /// Bearer token for the radar API; synthetic samples are served without it
    #[serde(default)]
    pub radar_token: Option<String>,
    /// Bearer token for the probe API; the static probe list is used without it
    #[serde(default)]
    pub probe_token: Option<String>,
    /// Total timeout for a single outbound request
    #[serde(default = "default_request_timeout", with = "duration_serde::duration")]
    pub request_timeout: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Number of nearest servers attached to each location
    #[serde(default = "default_nearest_k")]
    pub nearest_k: usize,
    /// Budget for fetching and enriching one location
    #[serde(default = "default_location_timeout", with = "duration_serde::duration")]
    pub location_timeout: Duration,
    /// Events buffered between the publisher and a slow consumer
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    /// SSE comment heartbeat interval
    #[serde(default = "default_keep_alive", with = "duration_serde::duration")]
    pub keep_alive: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_probe_cache_path")]
    pub probe_cache_path: PathBuf,
    #[serde(default = "default_history_dir")]
    pub history_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Append one snapshot per streamed location event
    #[serde(default = "default_history_enabled")]
    pub enabled: bool,
}

// Web defaults
fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

// Upstream defaults
fn default_radar_base_url() -> String {
    DEFAULT_RADAR_BASE_URL.to_string()
}

fn default_probe_base_url() -> String {
    DEFAULT_PROBE_BASE_URL.to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS)
}

// Stream defaults
fn default_nearest_k() -> usize {
    DEFAULT_NEAREST_K
}

fn default_location_timeout() -> Duration {
    Duration::from_secs(DEFAULT_LOCATION_TIMEOUT_SECS)
}

fn default_channel_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}

fn default_keep_alive() -> Duration {
    Duration::from_secs(DEFAULT_KEEP_ALIVE_SECS)
}

// Storage defaults
fn default_probe_cache_path() -> PathBuf {
    PathBuf::from(DEFAULT_PROBE_CACHE_PATH)
}

fn default_history_dir() -> PathBuf {
    PathBuf::from(DEFAULT_HISTORY_DIR)
}

fn default_history_enabled() -> bool {
    DEFAULT_HISTORY_ENABLED
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            radar_base_url: default_radar_base_url(),
            probe_base_url: default_probe_base_url(),
            radar_token: None,
            probe_token: None,
            request_timeout: default_request_timeout(),
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            nearest_k: default_nearest_k(),
            location_timeout: default_location_timeout(),
            channel_capacity: default_channel_capacity(),
            keep_alive: default_keep_alive(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            probe_cache_path: default_probe_cache_path(),
            history_dir: default_history_dir(),
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            enabled: default_history_enabled(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            web: WebConfig::default(),
            upstream: UpstreamConfig::default(),
            stream: StreamConfig::default(),
            storage: StorageConfig::default(),
            history: HistoryConfig::default(),
        }
    }
}

impl UpstreamConfig {
    /// Radar token, treating blank strings as absent
    pub fn radar_token(&self) -> Option<&str> {
        non_blank(self.radar_token.as_deref())
    }

    /// Probe token, treating blank strings as absent
    pub fn probe_token(&self) -> Option<&str> {
        non_blank(self.probe_token.as_deref())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

impl Config {
    /// Load configuration layered as defaults, then the TOML file (if it
    /// exists), then `GLOBE_LATENCY_*` environment variables.
    pub fn load(config_file: Option<&Path>) -> AppResult<Self> {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        if let Some(path) = config_file {
            if path.exists() {
                info!("Loading configuration from {}", path.display());
                figment = figment.merge(Toml::file(path));
            } else {
                debug!("Config file {} not found, using defaults", path.display());
            }
        }

        let mut config: Config = figment
            .merge(Env::prefixed(ENV_PREFIX).split(ENV_SEPARATOR))
            .extract()
            .map_err(|e| AppError::configuration(e.to_string()))?;

        config.apply_credential_fallbacks(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Fill empty tokens from the conventional upstream variables
    pub fn apply_credential_fallbacks<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.upstream.radar_token().is_none() {
            self.upstream.radar_token =
                lookup(RADAR_TOKEN_ENV).filter(|v| !v.trim().is_empty());
        }
        if self.upstream.probe_token().is_none() {
            self.upstream.probe_token =
                lookup(PROBE_TOKEN_ENV).filter(|v| !v.trim().is_empty());
        }
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.stream.nearest_k == 0 {
            return Err(AppError::configuration("stream.nearest_k must be at least 1"));
        }
        if self.stream.channel_capacity == 0 {
            return Err(AppError::configuration(
                "stream.channel_capacity must be at least 1",
            ));
        }
        if self.stream.location_timeout.is_zero() {
            return Err(AppError::configuration(
                "stream.location_timeout must be greater than zero",
            ));
        }
        for (key, value) in [
            ("upstream.radar_base_url", &self.upstream.radar_base_url),
            ("upstream.probe_base_url", &self.upstream.probe_base_url),
        ] {
            url::Url::parse(value)
                .map_err(|e| AppError::configuration(format!("{key} is not a valid URL: {e}")))?;
        }
        Ok(())
    }
}
