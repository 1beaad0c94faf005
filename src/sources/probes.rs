use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::UpstreamConfig;
use crate::errors::{AppResult, SourceResult};
use crate::models::{ProbeDetail, ProbeLocation};
use crate::sources::traits::ProbeSource;
use crate::utils::StandardHttpClient;

/// Used when neither the cache nor the probe API produce anything
pub const FALLBACK_PROBE_CODES: [&str; 5] = ["US", "GB", "SG", "IN", "DE"];

const SERVICE: &str = "probe_api";

/// How a probe list was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ProbeResolution {
    Cached,
    Live,
    Fallback,
}

/// On-disk probe cache
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ProbeCache {
    pub locations: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeListResponse {
    #[serde(default)]
    probes: Vec<ProbeEntry>,
}

#[derive(Debug, Deserialize)]
struct ProbeEntry {
    #[serde(default)]
    active: bool,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    countryiso: Option<String>,
    #[serde(default, alias = "ip")]
    ipv4: Option<String>,
    #[serde(default)]
    ipv6: Option<String>,
}

/// Probe locations backed by a file cache, the probe API and a static list
pub struct ProbeDirectory {
    http: StandardHttpClient,
    base_url: String,
    token: Option<String>,
    cache_path: PathBuf,
}

impl ProbeDirectory {
    pub fn new(upstream: &UpstreamConfig, cache_path: impl Into<PathBuf>) -> AppResult<Self> {
        Ok(Self {
            http: StandardHttpClient::with_timeout(SERVICE, upstream.request_timeout)?,
            base_url: upstream.probe_base_url.trim_end_matches('/').to_string(),
            token: upstream.probe_token().map(str::to_string),
            cache_path: cache_path.into(),
        })
    }

    /// Resolve probes and report which tier answered
    pub async fn resolve(&self) -> (Vec<ProbeLocation>, ProbeResolution) {
        if let Some(codes) = read_cache(&self.cache_path).await {
            return (to_locations(codes), ProbeResolution::Cached);
        }

        let Some(token) = self.token.as_deref() else {
            debug!("No probe API token configured, using fallback probes");
            return (fallback_locations(), ProbeResolution::Fallback);
        };

        match self.fetch_probes(token).await {
            Ok(probes) => {
                let codes = active_country_codes(&probes);
                if codes.is_empty() {
                    warn!("Probe API returned no active probes, using fallback probes");
                    return (fallback_locations(), ProbeResolution::Fallback);
                }
                if let Err(e) = write_cache(&self.cache_path, &codes).await {
                    warn!(
                        path = %self.cache_path.display(),
                        error = %e,
                        "Failed to persist probe cache"
                    );
                }
                (to_locations(codes), ProbeResolution::Live)
            }
            Err(e) => {
                warn!(error = %e, "Probe API request failed, using fallback probes");
                (fallback_locations(), ProbeResolution::Fallback)
            }
        }
    }

    async fn fetch_probes(&self, token: &str) -> SourceResult<Vec<ProbeEntry>> {
        let url = format!("{}/probes", self.base_url);
        let response: ProbeListResponse = self.http.fetch_json(&url, &[], Some(token)).await?;
        Ok(response.probes)
    }
}

#[async_trait]
impl ProbeSource for ProbeDirectory {
    async fn resolve_probes(&self) -> Vec<ProbeLocation> {
        let (locations, resolution) = self.resolve().await;
        info!(
            resolution = %resolution,
            count = locations.len(),
            "Resolved probe locations"
        );
        locations
    }

    async fn list_probe_details(&self) -> Vec<ProbeDetail> {
        let Some(token) = self.token.as_deref() else {
            return fallback_details();
        };

        match self.fetch_probes(token).await {
            Ok(probes) => probes
                .into_iter()
                .filter(|p| p.active)
                .map(|p| ProbeDetail {
                    name: p.name.unwrap_or_default(),
                    country: p.country.unwrap_or_default(),
                    ipv4: p.ipv4,
                    ipv6: p.ipv6,
                })
                .collect(),
            Err(e) => {
                warn!(error = %e, "Probe API request failed, using fallback probe details");
                fallback_details()
            }
        }
    }
}

/// Country codes of active probes, blanks dropped, first-seen order kept
fn active_country_codes(probes: &[ProbeEntry]) -> Vec<String> {
    let mut seen = HashSet::new();
    probes
        .iter()
        .filter(|p| p.active)
        .filter_map(|p| p.countryiso.as_deref())
        .map(|code| code.trim().to_ascii_uppercase())
        .filter(|code| !code.is_empty())
        .filter(|code| seen.insert(code.clone()))
        .collect()
}

async fn read_cache(path: &Path) -> Option<Vec<String>> {
    let contents = match tokio::fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read probe cache");
            return None;
        }
    };

    match serde_json::from_str::<ProbeCache>(&contents) {
        Ok(cache) => {
            let codes: Vec<String> = cache
                .locations
                .into_iter()
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect();
            (!codes.is_empty()).then_some(codes)
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Ignoring unreadable probe cache");
            None
        }
    }
}

async fn write_cache(path: &Path, codes: &[String]) -> AppResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let body = serde_json::to_vec_pretty(&ProbeCache {
        locations: codes.to_vec(),
    })?;
    tokio::fs::write(path, body).await?;
    debug!(path = %path.display(), count = codes.len(), "Wrote probe cache");
    Ok(())
}

fn to_locations(codes: Vec<String>) -> Vec<ProbeLocation> {
    codes.into_iter().map(ProbeLocation::new).collect()
}

fn fallback_locations() -> Vec<ProbeLocation> {
    FALLBACK_PROBE_CODES
        .iter()
        .map(|code| ProbeLocation::new(*code))
        .collect()
}

fn fallback_details() -> Vec<ProbeDetail> {
    [
        ("US East", "US", "23.111.159.174"),
        ("Amsterdam", "NL", "94.75.211.73"),
        ("Singapore", "SG", "52.197.31.124"),
    ]
    .into_iter()
    .map(|(name, country, ipv4)| ProbeDetail {
        name: name.to_string(),
        country: country.to_string(),
        ipv4: Some(ipv4.to_string()),
        ipv6: None,
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::time::Duration;
    use tempfile::TempDir;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn upstream(base: &str, token: Option<&str>) -> UpstreamConfig {
        UpstreamConfig {
            probe_base_url: base.to_string(),
            probe_token: token.map(str::to_string),
            request_timeout: Duration::from_secs(5),
            ..UpstreamConfig::default()
        }
    }

    fn codes(locations: &[ProbeLocation]) -> Vec<&str> {
        locations.iter().map(|l| l.code.as_str()).collect()
    }

    fn probe_body() -> serde_json::Value {
        json!({
            "probes": [
                {"active": true, "name": "Dallas", "country": "United States", "countryiso": "US", "ip": "1.1.1.1"},
                {"active": true, "name": "London", "country": "United Kingdom", "countryiso": "GB", "ipv6": "::1"},
                {"active": false, "name": "Paris", "country": "France", "countryiso": "FR"},
                {"active": true, "name": "Chicago", "country": "United States", "countryiso": "US"},
                {"active": true, "name": "Nowhere", "country": "", "countryiso": ""},
                {"active": true, "name": "Tokyo", "country": "Japan", "countryiso": "JP"}
            ]
        })
    }

    #[tokio::test]
    async fn test_cache_hit_skips_network() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(probe_body()))
            .expect(0)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let cache = dir.path().join("probe-cache.json");
        std::fs::write(&cache, r#"{"locations":["JP","AU"]}"#).unwrap();

        let directory = ProbeDirectory::new(&upstream(&server.uri(), Some("t")), &cache).unwrap();
        let (locations, resolution) = directory.resolve().await;

        assert_eq!(resolution, ProbeResolution::Cached);
        assert_eq!(codes(&locations), vec!["JP", "AU"]);
    }

    #[tokio::test]
    async fn test_live_fetch_filters_dedupes_and_persists() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/probes"))
            .and(header("authorization", "Bearer token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(probe_body()))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let cache = dir.path().join("nested").join("probe-cache.json");
        let directory =
            ProbeDirectory::new(&upstream(&server.uri(), Some("token")), &cache).unwrap();

        let (locations, resolution) = directory.resolve().await;
        assert_eq!(resolution, ProbeResolution::Live);
        assert_eq!(codes(&locations), vec!["US", "GB", "JP"]);

        let persisted: ProbeCache =
            serde_json::from_str(&std::fs::read_to_string(&cache).unwrap()).unwrap();
        assert_eq!(persisted.locations, vec!["US", "GB", "JP"]);
    }

    #[tokio::test]
    async fn test_empty_cache_falls_through_to_fallback_without_token() {
        let dir = TempDir::new().unwrap();
        let cache = dir.path().join("probe-cache.json");
        std::fs::write(&cache, r#"{"locations":[]}"#).unwrap();

        let directory = ProbeDirectory::new(&upstream("http://127.0.0.1:9", None), &cache).unwrap();
        let (locations, resolution) = directory.resolve().await;

        assert_eq!(resolution, ProbeResolution::Fallback);
        assert_eq!(codes(&locations), FALLBACK_PROBE_CODES.to_vec());
    }

    #[tokio::test]
    async fn test_missing_cache_without_token_uses_fallback() {
        let dir = TempDir::new().unwrap();
        let cache = dir.path().join("absent").join("probe-cache.json");

        let directory = ProbeDirectory::new(&upstream("http://127.0.0.1:9", None), &cache).unwrap();
        let (locations, resolution) = directory.resolve().await;

        assert_eq!(resolution, ProbeResolution::Fallback);
        assert_eq!(codes(&locations), FALLBACK_PROBE_CODES.to_vec());
        assert!(!cache.exists());
    }

    #[tokio::test]
    async fn test_upstream_failure_falls_back() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let directory = ProbeDirectory::new(
            &upstream(&server.uri(), Some("token")),
            dir.path().join("probe-cache.json"),
        )
        .unwrap();

        let locations = directory.resolve_probes().await;
        assert_eq!(codes(&locations), FALLBACK_PROBE_CODES.to_vec());
        assert!(!dir.path().join("probe-cache.json").exists());
    }

    #[tokio::test]
    async fn test_no_active_probes_falls_back() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "probes": [{"active": false, "countryiso": "FR"}]
            })))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let directory = ProbeDirectory::new(
            &upstream(&server.uri(), Some("token")),
            dir.path().join("probe-cache.json"),
        )
        .unwrap();

        let (_, resolution) = directory.resolve().await;
        assert_eq!(resolution, ProbeResolution::Fallback);
    }

    #[tokio::test]
    async fn test_probe_details_live_and_fallback() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(probe_body()))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let cache = dir.path().join("probe-cache.json");

        let live = ProbeDirectory::new(&upstream(&server.uri(), Some("t")), &cache).unwrap();
        let details = live.list_probe_details().await;
        assert_eq!(details.len(), 5);
        assert_eq!(details[0].ipv4.as_deref(), Some("1.1.1.1"));
        assert_eq!(details[1].ipv6.as_deref(), Some("::1"));

        let offline = ProbeDirectory::new(&upstream(&server.uri(), None), &cache).unwrap();
        let details = offline.list_probe_details().await;
        assert_eq!(
            details.iter().map(|d| d.country.as_str()).collect::<Vec<_>>(),
            vec!["US", "NL", "SG"]
        );
    }
}
