//! Server-Sent Events consumer for the latency stream
//!
//! [`SseDecoder`] turns raw body chunks into frames, [`parse_event`] turns
//! frames into [`StreamEvent`]s and [`Watcher`] ties both to an [`ArcStore`],
//! reopening the stream on a fixed interval.

use futures::StreamExt;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::client::arc_store::ArcStore;
use crate::errors::{AppError, AppResult};
use crate::models::StreamEvent;
use crate::topology::build_arcs;
use crate::utils::StandardHttpClient;
use crate::web::handlers::regions::RegionsResponse;

pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_secs(5);

const STREAM_PATH: &str = "/api/latency-stream";
const REGIONS_PATH: &str = "/api/regions";

/// One dispatched SSE frame
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SseFrame {
    pub event: Option<String>,
    pub data: String,
    pub id: Option<String>,
}

/// Incremental SSE parser; frames may arrive split across any chunk boundary
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
    id: Option<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every frame it completed
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line);
            if let Some(frame) = self.process_line(&line) {
                frames.push(frame);
            }
        }
        frames
    }

    fn process_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.dispatch();
        }
        // Comment lines carry keep-alives
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            "id" => self.id = Some(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        Some(SseFrame {
            event,
            data: std::mem::take(&mut self.data).join("\n"),
            id: self.id.clone(),
        })
    }
}

/// Decode a frame's payload; malformed payloads are logged and dropped
pub fn parse_event(frame: &SseFrame) -> Option<StreamEvent> {
    match serde_json::from_str::<StreamEvent>(&frame.data) {
        Ok(event) => Some(event),
        // Older producers end the stream with a bare `data: done`
        Err(_) if frame.event.as_deref() == Some("end") => Some(StreamEvent::end()),
        Err(e) => {
            warn!(
                event = frame.event.as_deref().unwrap_or("message"),
                error = %e,
                "Dropping malformed stream event"
            );
            None
        }
    }
}

/// Lifecycle of one stream session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    Connecting,
    Connected,
    Done,
    Error(String),
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => f.write_str("connecting"),
            Self::Connected => f.write_str("connected"),
            Self::Done => f.write_str("done"),
            Self::Error(reason) => write!(f, "error: {reason}"),
        }
    }
}

impl SessionStatus {
    /// First body bytes arrived
    pub fn on_bytes(self) -> Self {
        match self {
            Self::Connecting => Self::Connected,
            other => other,
        }
    }

    pub fn on_event(self, event: &StreamEvent) -> Self {
        match self {
            Self::Connecting | Self::Connected if event.is_terminal() => Self::Done,
            Self::Connecting => Self::Connected,
            other => other,
        }
    }

    pub fn on_failure<S: Into<String>>(self, reason: S) -> Self {
        match self {
            Self::Done => Self::Done,
            _ => Self::Error(reason.into()),
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Done | Self::Error(_))
    }
}

/// Reopens the latency stream on an interval and folds events into a store
pub struct Watcher {
    http: StandardHttpClient,
    url: Url,
    store: Arc<Mutex<ArcStore>>,
}

impl Watcher {
    pub fn new(
        base_url: &str,
        locations: Option<&[String]>,
        store: Arc<Mutex<ArcStore>>,
    ) -> AppResult<Self> {
        let mut url = Url::parse(base_url)
            .and_then(|base| base.join(STREAM_PATH))
            .map_err(|e| AppError::validation(format!("Invalid server URL '{base_url}': {e}")))?;
        if let Some(locations) = locations {
            url.query_pairs_mut()
                .append_pair("locations", &locations.join(","));
        }

        Ok(Self {
            http: StandardHttpClient::with_connection_timeout("latency_stream", Duration::from_secs(10))?,
            url,
            store,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn store(&self) -> Arc<Mutex<ArcStore>> {
        self.store.clone()
    }

    /// Replace the store's provider choices with the providers the server
    /// actually serves, in listing order
    pub async fn load_catalog(&self) -> AppResult<()> {
        let url = self
            .url
            .join(REGIONS_PATH)
            .map_err(|e| AppError::validation(format!("Invalid regions URL: {e}")))?;
        let catalog: RegionsResponse = self.http.fetch_json(url.as_str(), &[], None).await?;

        let mut providers: Vec<String> = Vec::new();
        for exchange in catalog.exchanges {
            if !providers.contains(&exchange.provider) {
                providers.push(exchange.provider);
            }
        }

        debug!(
            providers = providers.len(),
            probes = catalog.probes.len(),
            "Loaded server catalog"
        );
        if !providers.is_empty() {
            self.store.lock().await.set_all_providers(providers);
        }
        Ok(())
    }

    /// Open a session every `interval` until `cancel` fires
    pub async fn run(&self, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let status = tokio::select! {
                _ = cancel.cancelled() => break,
                status = self.run_session() => status,
            };

            let store = self.store.lock().await;
            let stats = store.stats();
            info!(
                status = %status,
                arcs = store.arcs().len(),
                shown = stats.count,
                min_ms = stats.min_latency.unwrap_or_default(),
                max_ms = stats.max_latency.unwrap_or_default(),
                mean_ms = stats.mean_latency.unwrap_or_default(),
                "Latency session finished"
            );
        }
        debug!("Watcher stopped");
    }

    /// Consume one stream to completion
    pub async fn run_session(&self) -> SessionStatus {
        let mut status = SessionStatus::Connecting;
        debug!(url = %self.url, "Opening latency stream");

        let response = match self
            .http
            .inner_client()
            .get(self.url.clone())
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => return status.on_failure(format!("HTTP {}", response.status())),
            Err(e) => return status.on_failure(e.to_string()),
        };

        let mut decoder = SseDecoder::new();
        let mut body = std::pin::pin!(response.bytes_stream());
        while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => return status.on_failure(e.to_string()),
            };
            status = status.on_bytes();

            for frame in decoder.feed(&chunk) {
                let Some(event) = parse_event(&frame) else {
                    continue;
                };
                self.apply(&event).await;
                status = status.on_event(&event);
                if status.is_finished() {
                    return status;
                }
            }
        }

        status.on_failure("stream closed before end event")
    }

    async fn apply(&self, event: &StreamEvent) {
        match event {
            StreamEvent::Location(update) => {
                let arcs = build_arcs(update);
                debug!(location = %update.location, arcs = arcs.len(), "Merging location update");
                self.store.lock().await.merge_updates(arcs);
            }
            StreamEvent::Error { location, message } => {
                warn!(
                    location = location.as_deref().unwrap_or("-"),
                    message = %message,
                    "Stream reported error"
                );
            }
            StreamEvent::Info { message, .. } => info!(message = %message, "Stream info"),
            StreamEvent::End { .. } => debug!("Stream complete"),
        }
    }
}
