use async_trait::async_trait;
use rand::Rng;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::config::UpstreamConfig;
use crate::errors::{AppResult, SourceError, SourceResult};
use crate::models::{LatencyReading, LatencySample};
use crate::sources::traits::LatencyProvider;
use crate::utils::StandardHttpClient;

/// Upper bound of locations per batched radar call
pub const MAX_LOCATIONS_PER_CALL: usize = 10;

const SERVICE: &str = "radar_api";
const TIMESERIES_PATH: &str = "/radar/quality/iqi/timeseries_groups";
const AGG_INTERVAL_HOURLY: &str = "1h";
const AGG_INTERVAL_CURRENT: &str = "15m";

#[derive(Debug, Deserialize)]
struct TimeseriesResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    result: Option<Map<String, Value>>,
}

/// Latency percentiles from the edge-quality radar API
pub struct RadarClient {
    http: StandardHttpClient,
    base_url: String,
    token: Option<String>,
}

impl RadarClient {
    pub fn new(upstream: &UpstreamConfig) -> AppResult<Self> {
        Ok(Self {
            http: StandardHttpClient::with_timeout(SERVICE, upstream.request_timeout)?,
            base_url: upstream.radar_base_url.trim_end_matches('/').to_string(),
            token: upstream.radar_token().map(str::to_string),
        })
    }

    pub fn has_credentials(&self) -> bool {
        self.token.is_some()
    }

    async fn fetch_series(
        &self,
        token: &str,
        location: &str,
        agg_interval: &str,
    ) -> SourceResult<Map<String, Value>> {
        let url = format!("{}{}", self.base_url, TIMESERIES_PATH);
        let query = [
            ("metric", "LATENCY"),
            ("aggInterval", agg_interval),
            ("location", location),
            ("dateRange", "1d"),
            ("format", "JSON"),
        ];

        let response: TimeseriesResponse = self.http.fetch_json(&url, &query, Some(token)).await?;
        if !response.success {
            return Err(SourceError::Unsuccessful {
                service: SERVICE.to_string(),
                message: format!("success flag not set for {location}"),
            });
        }
        response
            .result
            .ok_or_else(|| SourceError::parse(SERVICE, "response has no result"))
    }

    async fn fetch_chunk(&self, token: &str, chunk: &[String]) -> Vec<(String, LatencyReading)> {
        let joined = chunk.join(",");
        match self.fetch_series(token, &joined, AGG_INTERVAL_CURRENT).await {
            Ok(result) => readings_for_chunk(&result, chunk),
            Err(e) => {
                warn!(locations = %joined, error = %e, "Radar batch request failed");
                chunk
                    .iter()
                    .map(|code| (code.clone(), LatencyReading::unavailable(e.to_string())))
                    .collect()
            }
        }
    }
}

#[async_trait]
impl LatencyProvider for RadarClient {
    async fn fetch_latency(&self, code: &str) -> LatencyReading {
        let Some(token) = self.token.as_deref() else {
            return synthetic_reading();
        };

        match self.fetch_series(token, code, AGG_INTERVAL_HOURLY).await {
            Ok(result) => match result.get("serie_0") {
                Some(serie) => LatencyReading::Live(sample_from_serie(serie)),
                None => LatencyReading::unavailable("response has no serie_0"),
            },
            Err(e) => {
                warn!(location = %code, error = %e, "Radar request failed");
                LatencyReading::unavailable(e.to_string())
            }
        }
    }

    async fn fetch_latency_batch(&self, codes: &[String]) -> Vec<(String, LatencyReading)> {
        let Some(token) = self.token.as_deref() else {
            return codes
                .iter()
                .map(|code| (code.clone(), synthetic_reading()))
                .collect();
        };

        let mut readings = Vec::with_capacity(codes.len());
        for chunk in codes.chunks(MAX_LOCATIONS_PER_CALL) {
            debug!(count = chunk.len(), "Fetching radar batch");
            readings.extend(self.fetch_chunk(token, chunk).await);
        }
        readings
    }
}

/// Random placeholder values used when no radar credential is configured
pub fn synthetic_reading() -> LatencyReading {
    let mut rng = rand::rng();
    LatencyReading::Synthetic(LatencySample::new(
        rng.random_range(0.0..60.0),
        rng.random_range(0.0..100.0),
        rng.random_range(0.0..150.0),
    ))
}

/// Map one batched response onto the requested codes.
///
/// Per-location series are keyed `serie_{code}` or positionally `serie_{n}`.
/// A single aggregate `serie_0` is shared by every code in the chunk.
fn readings_for_chunk(result: &Map<String, Value>, chunk: &[String]) -> Vec<(String, LatencyReading)> {
    let keyed_by_code = chunk
        .iter()
        .any(|code| result.contains_key(&format!("serie_{code}")));
    let positional = (0..chunk.len()).all(|i| result.contains_key(&format!("serie_{i}")));

    chunk
        .iter()
        .enumerate()
        .map(|(i, code)| {
            let key = if keyed_by_code {
                format!("serie_{code}")
            } else if positional {
                format!("serie_{i}")
            } else {
                "serie_0".to_string()
            };
            let reading = match result.get(&key) {
                Some(serie) => LatencyReading::Live(sample_from_serie(serie)),
                None => LatencyReading::unavailable(format!("response has no {key}")),
            };
            (code.clone(), reading)
        })
        .collect()
}

/// Last value of each percentile series; missing or unparsable values are 0
fn sample_from_serie(serie: &Value) -> LatencySample {
    let last = |field: &str| -> f64 {
        serie
            .get(field)
            .and_then(Value::as_array)
            .and_then(|values| values.last())
            .and_then(parse_number)
            .unwrap_or(0.0)
    };
    LatencySample::new(last("p25"), last("p50"), last("p75"))
}

fn parse_number(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite() && *v >= 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(base: &str, token: Option<&str>) -> RadarClient {
        RadarClient::new(&UpstreamConfig {
            radar_base_url: base.to_string(),
            radar_token: token.map(str::to_string),
            request_timeout: Duration::from_secs(5),
            ..UpstreamConfig::default()
        })
        .unwrap()
    }

    fn serie(p25: &str, p50: &str, p75: &str) -> Value {
        json!({
            "timestamps": ["2025-01-01T00:00:00Z", "2025-01-01T01:00:00Z"],
            "p25": ["1.0", p25],
            "p50": ["2.0", p50],
            "p75": ["3.0", p75]
        })
    }

    #[tokio::test]
    async fn test_synthetic_without_token() {
        let radar = client("http://127.0.0.1:9", None);
        assert!(!radar.has_credentials());

        for _ in 0..50 {
            match radar.fetch_latency("US").await {
                LatencyReading::Synthetic(s) => {
                    assert!((0.0..60.0).contains(&s.p25));
                    assert!((0.0..100.0).contains(&s.p50));
                    assert!((0.0..150.0).contains(&s.p75));
                }
                other => panic!("expected synthetic reading, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_live_reading_uses_last_values() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(TIMESERIES_PATH))
            .and(query_param("metric", "LATENCY"))
            .and(query_param("aggInterval", "1h"))
            .and(query_param("location", "GB"))
            .and(query_param("dateRange", "1d"))
            .and(query_param("format", "JSON"))
            .and(header("authorization", "Bearer radar"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "result": {"serie_0": serie("12.5", "20", "31.25")}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let reading = client(&server.uri(), Some("radar")).fetch_latency("GB").await;
        assert_eq!(reading, LatencyReading::Live(LatencySample::new(12.5, 20.0, 31.25)));
    }

    #[tokio::test]
    async fn test_numeric_and_missing_values() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "result": {"serie_0": {"p25": [4, 5], "p50": ["oops"], "p75": []}}
            })))
            .mount(&server)
            .await;

        let reading = client(&server.uri(), Some("radar")).fetch_latency("US").await;
        assert_eq!(reading, LatencyReading::Live(LatencySample::new(5.0, 0.0, 0.0)));
    }

    #[tokio::test]
    async fn test_unsuccessful_or_missing_serie_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("location", "US"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": false,
                "result": {"serie_0": serie("1", "2", "3")}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("location", "GB"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "result": {"meta": {}}
            })))
            .mount(&server)
            .await;

        let radar = client(&server.uri(), Some("radar"));
        for code in ["US", "GB"] {
            let reading = radar.fetch_latency(code).await;
            assert!(matches!(reading, LatencyReading::Unavailable(_)), "{code}");
            assert!(reading.sample().is_unavailable());
        }
    }

    #[tokio::test]
    async fn test_transport_failure_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let reading = client(&server.uri(), Some("radar")).fetch_latency("US").await;
        assert!(matches!(reading, LatencyReading::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_batch_splits_into_chunks_of_ten() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("aggInterval", "15m"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "result": {"serie_0": serie("1", "2", "3")}
            })))
            .expect(3)
            .mount(&server)
            .await;

        let codes: Vec<String> = (0..23).map(|i| format!("C{i}")).collect();
        let readings = client(&server.uri(), Some("radar"))
            .fetch_latency_batch(&codes)
            .await;

        assert_eq!(readings.len(), 23);
        assert_eq!(
            readings.iter().map(|(c, _)| c.as_str()).collect::<Vec<_>>(),
            codes.iter().map(String::as_str).collect::<Vec<_>>()
        );
        assert!(
            readings
                .iter()
                .all(|(_, r)| r.sample() == LatencySample::new(1.0, 2.0, 3.0))
        );
    }

    #[test]
    fn test_chunk_keyed_by_code() {
        let result = json!({
            "serie_US": serie("10", "20", "30"),
            "serie_GB": serie("11", "21", "31")
        });
        let chunk = vec!["US".to_string(), "GB".to_string(), "SG".to_string()];
        let readings = readings_for_chunk(result.as_object().unwrap(), &chunk);

        assert_eq!(readings[0].1.sample().p50, 20.0);
        assert_eq!(readings[1].1.sample().p50, 21.0);
        assert!(matches!(readings[2].1, LatencyReading::Unavailable(_)));
    }

    #[test]
    fn test_chunk_positional_series() {
        let result = json!({
            "serie_0": serie("10", "20", "30"),
            "serie_1": serie("11", "21", "31")
        });
        let chunk = vec!["US".to_string(), "GB".to_string()];
        let readings = readings_for_chunk(result.as_object().unwrap(), &chunk);

        assert_eq!(readings[0].1.sample().p75, 30.0);
        assert_eq!(readings[1].1.sample().p75, 31.0);
    }

    #[test]
    fn test_chunk_shared_aggregate() {
        let result = json!({"serie_0": serie("10", "20", "30")});
        let chunk = vec!["US".to_string(), "GB".to_string()];
        let readings = readings_for_chunk(result.as_object().unwrap(), &chunk);

        assert!(readings.iter().all(|(_, r)| r.sample().p50 == 20.0));
    }
}
