use futures::FutureExt;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::history::HistoryLog;
use crate::models::StreamEvent;
use crate::reference::ReferenceData;
use crate::sources::{LatencyProvider, ProbeSource};
use crate::streaming::channel::PushSender;
use crate::topology::TopologyEnricher;

pub const NO_LOCATIONS_MESSAGE: &str = "No locations provided";
pub const UNKNOWN_LOCATION_MESSAGE: &str = "Unknown location";

/// Fans one refresh out over all locations and pushes an event per location
/// as soon as it is ready.
#[derive(Clone)]
pub struct StreamPublisher {
    probes: Arc<dyn ProbeSource>,
    latency: Arc<dyn LatencyProvider>,
    reference: Arc<ReferenceData>,
    enricher: TopologyEnricher,
    location_timeout: Duration,
    history: Option<Arc<HistoryLog>>,
}

impl StreamPublisher {
    pub fn new(
        probes: Arc<dyn ProbeSource>,
        latency: Arc<dyn LatencyProvider>,
        reference: Arc<ReferenceData>,
        enricher: TopologyEnricher,
        location_timeout: Duration,
    ) -> Self {
        Self {
            probes,
            latency,
            reference,
            enricher,
            location_timeout,
            history: None,
        }
    }

    /// Append one snapshot per `location` event to `history`
    pub fn with_history(mut self, history: Arc<HistoryLog>) -> Self {
        self.history = Some(history);
        self
    }

    /// Run one refresh cycle into `sender`.
    ///
    /// An explicit location list wins over probe resolution. An empty set
    /// yields a single `info` event; otherwise the stream ends with `end`
    /// unless the consumer disconnected first.
    pub async fn publish(&self, locations: Option<Vec<String>>, sender: PushSender) {
        let started = Instant::now();

        let codes = match locations {
            Some(list) => normalize_codes(list),
            None => normalize_codes(
                self.probes
                    .resolve_probes()
                    .await
                    .into_iter()
                    .map(|p| p.code)
                    .collect(),
            ),
        };

        if codes.is_empty() {
            info!("No locations to publish");
            sender
                .push(StreamEvent::info(
                    NO_LOCATIONS_MESSAGE,
                    Some(elapsed_ms(started)),
                ))
                .await;
            sender.close();
            return;
        }

        info!(
            count = codes.len(),
            nearest_k = self.enricher.nearest_k(),
            "Publishing latency refresh"
        );

        let mut tasks = JoinSet::new();
        for code in codes {
            let publisher = self.clone();
            let sender = sender.clone();
            tasks.spawn(async move { publisher.publish_location(code, sender).await });
        }

        loop {
            tokio::select! {
                joined = tasks.join_next() => match joined {
                    Some(Ok(())) => {}
                    Some(Err(e)) if e.is_cancelled() => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "Location task failed");
                        sender
                            .push(StreamEvent::error(None, format!("Location task failed: {e}")))
                            .await;
                    }
                    None => break,
                },
                _ = sender.closed() => {
                    debug!(pending = tasks.len(), "Consumer went away, aborting location tasks");
                    tasks.abort_all();
                    while tasks.join_next().await.is_some() {}
                    return;
                }
            }
        }

        sender.push(StreamEvent::end()).await;
        sender.close();
        info!(duration_ms = elapsed_ms(started), "Latency refresh complete");
    }

    async fn publish_location(&self, code: String, sender: PushSender) {
        if sender.is_closed() {
            return;
        }

        let work = AssertUnwindSafe(self.build_event(&code)).catch_unwind();
        let event = match tokio::time::timeout(self.location_timeout, work).await {
            Ok(Ok(event)) => event,
            Ok(Err(_)) => {
                warn!(location = %code, "Location processing panicked");
                StreamEvent::error(Some(code.clone()), "Internal error")
            }
            Err(_) => {
                warn!(
                    location = %code,
                    timeout_ms = self.location_timeout.as_millis() as u64,
                    "Location timed out"
                );
                StreamEvent::error(Some(code.clone()), "Timed out")
            }
        };

        let snapshot = match (&event, &self.history) {
            (StreamEvent::Location(update), Some(_)) => Some(update.clone()),
            _ => None,
        };

        sender.push(event).await;

        if let (Some(update), Some(history)) = (snapshot, &self.history) {
            if let Err(e) = history.append(&update).await {
                warn!(
                    location = %code,
                    dir = %history.dir().display(),
                    error = %e,
                    "Failed to append history snapshot"
                );
            }
        }
    }

    async fn build_event(&self, code: &str) -> StreamEvent {
        let Some(coordinate) = self.reference.coordinate(code) else {
            debug!(location = %code, "No coordinates for location");
            return StreamEvent::error(Some(code.to_string()), UNKNOWN_LOCATION_MESSAGE);
        };

        let reading = self.latency.fetch_latency(code).await;
        let update = self
            .enricher
            .enrich(code, coordinate, &reading, self.reference.servers());

        debug!(
            location = %code,
            source = %update.source,
            servers = update.exchanges.len(),
            "Location enriched"
        );
        StreamEvent::Location(update)
    }
}

/// Trim, upper-case, drop blanks and repeats
pub fn normalize_codes(codes: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    codes
        .into_iter()
        .map(|c| c.trim().to_ascii_uppercase())
        .filter(|c| !c.is_empty())
        .filter(|c| seen.insert(c.clone()))
        .collect()
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        CountryCoordinate, LatencyReading, LatencySample, ProbeDetail, ProbeLocation,
        ReadingSource, ServerRecord,
    };
    use crate::streaming::channel::{PushChannel, PushReceiver};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct StaticProbes(Vec<&'static str>);

    #[async_trait]
    impl ProbeSource for StaticProbes {
        async fn resolve_probes(&self) -> Vec<ProbeLocation> {
            self.0.iter().map(|c| ProbeLocation::new(*c)).collect()
        }

        async fn list_probe_details(&self) -> Vec<ProbeDetail> {
            Vec::new()
        }
    }

    /// Fixed readings with per-location misbehaviour
    #[derive(Default)]
    struct ScriptedLatency {
        slow: Vec<&'static str>,
        panics: Vec<&'static str>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LatencyProvider for ScriptedLatency {
        async fn fetch_latency(&self, code: &str) -> LatencyReading {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.slow.iter().any(|c| *c == code) {
                tokio::time::sleep(Duration::from_secs(30)).await;
            }
            if self.panics.iter().any(|c| *c == code) {
                panic!("scripted failure for {code}");
            }
            LatencyReading::Live(LatencySample::new(10.0, 20.0, 30.0))
        }

        async fn fetch_latency_batch(&self, codes: &[String]) -> Vec<(String, LatencyReading)> {
            codes
                .iter()
                .map(|c| (c.clone(), LatencyReading::Live(LatencySample::default())))
                .collect()
        }
    }

    fn reference() -> Arc<ReferenceData> {
        let coord = |country: &str, lat: f64, lng: f64| CountryCoordinate {
            country: country.to_string(),
            lat,
            lng,
        };
        let countries = HashMap::from([
            ("US".to_string(), coord("United States", 37.09, -95.71)),
            ("GB".to_string(), coord("United Kingdom", 55.37, -3.43)),
            ("SG".to_string(), coord("Singapore", 1.35, 103.81)),
        ]);
        let servers = vec![
            ServerRecord {
                id: "a".into(),
                name: "A".into(),
                provider: "AWS".into(),
                region: "us-east-1".into(),
                lat: 38.9,
                lng: -77.0,
            },
            ServerRecord {
                id: "b".into(),
                name: "B".into(),
                provider: "GCP".into(),
                region: "europe-west2".into(),
                lat: 51.5,
                lng: -0.12,
            },
        ];
        Arc::new(ReferenceData::new(servers, countries))
    }

    fn publisher(probes: Vec<&'static str>, latency: Arc<ScriptedLatency>) -> StreamPublisher {
        StreamPublisher::new(
            Arc::new(StaticProbes(probes)),
            latency,
            reference(),
            TopologyEnricher::new(8),
            Duration::from_millis(200),
        )
    }

    async fn drain(mut rx: PushReceiver) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    async fn run(publisher: &StreamPublisher, locations: Option<Vec<String>>) -> Vec<StreamEvent> {
        let (tx, rx) = PushChannel::bounded(16);
        publisher.publish(locations, tx).await;
        drain(rx).await
    }

    fn locations_of(events: &[StreamEvent]) -> HashSet<String> {
        events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::Location(u) => Some(u.location.clone()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_one_event_per_location_then_single_end() {
        let publisher = publisher(vec!["US", "GB", "SG"], Arc::new(ScriptedLatency::default()));
        let events = run(&publisher, None).await;

        assert_eq!(events.len(), 4);
        assert_eq!(
            locations_of(&events),
            HashSet::from(["US".to_string(), "GB".to_string(), "SG".to_string()])
        );
        assert_eq!(events.last(), Some(&StreamEvent::end()));
        assert_eq!(
            events.iter().filter(|e| matches!(e, StreamEvent::End { .. })).count(),
            1
        );
    }

    #[tokio::test]
    async fn test_location_event_carries_enrichment() {
        let publisher = publisher(vec![], Arc::new(ScriptedLatency::default()));
        let events = run(&publisher, Some(vec!["gb".to_string()])).await;

        match &events[0] {
            StreamEvent::Location(update) => {
                assert_eq!(update.location, "GB");
                assert_eq!(update.country, "United Kingdom");
                assert_eq!(update.source, ReadingSource::Live);
                assert_eq!(update.exchanges.len(), 2);
                assert_eq!(update.exchanges[0].id, "b");
            }
            other => panic!("expected location event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_explicit_list_overrides_probes() {
        let publisher = publisher(vec!["US", "GB"], Arc::new(ScriptedLatency::default()));
        let events = run(&publisher, Some(vec!["SG".to_string()])).await;
        assert_eq!(locations_of(&events), HashSet::from(["SG".to_string()]));
    }

    #[tokio::test]
    async fn test_empty_locations_emit_single_info() {
        let latency = Arc::new(ScriptedLatency::default());
        let publisher = publisher(vec!["US"], latency.clone());
        let events = run(&publisher, Some(vec![" ".to_string()])).await;

        assert_eq!(events.len(), 1);
        match &events[0] {
            StreamEvent::Info { message, duration } => {
                assert_eq!(message, NO_LOCATIONS_MESSAGE);
                assert!(duration.is_some());
            }
            other => panic!("expected info event, got {other:?}"),
        }
        assert_eq!(latency.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unknown_location_is_error_event() {
        let publisher = publisher(vec![], Arc::new(ScriptedLatency::default()));
        let events = run(&publisher, Some(vec!["US".into(), "XX".into()])).await;

        assert_eq!(events.len(), 3);
        assert!(events.contains(&StreamEvent::error(
            Some("XX".to_string()),
            UNKNOWN_LOCATION_MESSAGE
        )));
        assert_eq!(events.last(), Some(&StreamEvent::end()));
    }

    #[tokio::test]
    async fn test_failing_location_does_not_block_others() {
        let latency = Arc::new(ScriptedLatency {
            slow: vec!["US"],
            panics: vec!["GB"],
            ..ScriptedLatency::default()
        });
        let publisher = publisher(vec!["US", "GB", "SG"], latency);
        let events = run(&publisher, None).await;

        assert_eq!(events.len(), 4);
        assert_eq!(locations_of(&events), HashSet::from(["SG".to_string()]));
        assert!(events.contains(&StreamEvent::error(Some("US".into()), "Timed out")));
        assert!(events.contains(&StreamEvent::error(Some("GB".into()), "Internal error")));
        assert_eq!(events.last(), Some(&StreamEvent::end()));
    }

    #[tokio::test]
    async fn test_consumer_disconnect_stops_publisher() {
        let latency = Arc::new(ScriptedLatency {
            slow: vec!["US", "GB"],
            ..ScriptedLatency::default()
        });
        let publisher = StreamPublisher::new(
            Arc::new(StaticProbes(vec!["US", "GB"])),
            latency,
            reference(),
            TopologyEnricher::new(8),
            Duration::from_secs(60),
        );

        let (tx, rx) = PushChannel::bounded(4);
        let handle = {
            let tx = tx.clone();
            tokio::spawn(async move { publisher.publish(None, tx).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(rx);

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("publisher should stop after disconnect")
            .unwrap();
        assert!(tx.is_closed());
    }

    #[tokio::test]
    async fn test_history_appended_per_location_event() {
        let dir = TempDir::new().unwrap();
        let history = Arc::new(HistoryLog::new(dir.path()));
        let publisher = publisher(vec!["US", "GB", "XX"], Arc::new(ScriptedLatency::default()))
            .with_history(history.clone());

        run(&publisher, None).await;

        let result = history
            .query(crate::history::HistoryRange::OneHour, chrono::Utc::now())
            .await
            .unwrap();
        assert_eq!(result.entries.len(), 2);
        assert!(result.entries.iter().all(|e| e["latency"]["p50"] == 20.0));
    }
}
