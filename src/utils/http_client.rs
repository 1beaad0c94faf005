use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

use crate::errors::{AppError, AppResult, SourceError, SourceResult};

/// Thin wrapper over reqwest used for every upstream API call
#[derive(Debug, Clone)]
pub struct StandardHttpClient {
    client: Client,
    service: &'static str,
}

impl StandardHttpClient {
    /// Create a client with a total request timeout
    pub fn with_timeout(service: &'static str, timeout: Duration) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("globe-latency/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { client, service })
    }

    /// Create a client with only a connect timeout, for long-lived streams
    pub fn with_connection_timeout(
        service: &'static str,
        connect_timeout: Duration,
    ) -> AppResult<Self> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { client, service })
    }

    /// GET `url` with optional bearer auth and decode the JSON body
    pub async fn fetch_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
        bearer: Option<&str>,
    ) -> SourceResult<T> {
        debug!(service = self.service, url = %url, "Fetching JSON");

        let mut request = self.client.get(url).query(query);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| self.map_transport(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Http {
                status: status.as_u16(),
                message: status
                    .canonical_reason()
                    .unwrap_or("Unknown")
                    .to_string(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| self.map_transport(url, e))?;

        debug!(
            service = self.service,
            bytes = bytes.len(),
            "Fetched upstream response"
        );

        serde_json::from_slice(&bytes).map_err(|e| SourceError::parse(self.service, e.to_string()))
    }

    /// Underlying reqwest client for streaming requests
    pub fn inner_client(&self) -> &Client {
        &self.client
    }

    fn map_transport(&self, url: &str, err: reqwest::Error) -> SourceError {
        if err.is_timeout() {
            SourceError::Timeout {
                url: url.to_string(),
            }
        } else {
            SourceError::Http {
                status: err
                    .status()
                    .unwrap_or(StatusCode::BAD_GATEWAY)
                    .as_u16(),
                message: err.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_fetch_json_sends_bearer_and_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/probes"))
            .and(query_param("limit", "5"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let client = StandardHttpClient::with_timeout("test", Duration::from_secs(5)).unwrap();
        let body: Value = client
            .fetch_json(
                &format!("{}/probes", server.uri()),
                &[("limit", "5")],
                Some("secret"),
            )
            .await
            .unwrap();
        assert_eq!(body["ok"], true);
    }

    #[tokio::test]
    async fn test_non_success_maps_to_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = StandardHttpClient::with_timeout("test", Duration::from_secs(5)).unwrap();
        let err = client
            .fetch_json::<Value>(&server.uri(), &[], None)
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Http { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_slow_upstream_maps_to_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let client = StandardHttpClient::with_timeout("test", Duration::from_millis(50)).unwrap();
        let err = client
            .fetch_json::<Value>(&server.uri(), &[], None)
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_invalid_body_maps_to_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let client = StandardHttpClient::with_timeout("test", Duration::from_secs(5)).unwrap();
        let err = client
            .fetch_json::<Value>(&server.uri(), &[], None)
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::ParseError { .. }));
    }
}
