//! Server-Sent Events adapter for the latency publisher

use axum::{
    extract::{Query, State},
    http::header,
    response::{
        IntoResponse,
        sse::{Event, KeepAlive, Sse},
    },
};
use futures::StreamExt;
use tracing::{debug, warn};

use super::LocationsQuery;
use crate::streaming::PushChannel;
use crate::web::AppState;

/// Stream one refresh cycle as `location`/`error`/`info`/`end` events
///
/// Each frame names its type in `event:` and carries the JSON payload in
/// `data:`. Dropping the connection cancels the in-flight location tasks.
pub async fn latency_stream(
    Query(query): Query<LocationsQuery>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let locations = query.codes();
    debug!(locations = ?locations, "Starting latency SSE stream");

    let (sender, receiver) = PushChannel::bounded(state.config.stream.channel_capacity);
    let publisher = state.publisher.clone();
    tokio::spawn(async move {
        publisher.publish(locations, sender).await;
    });

    let stream = async_stream::stream! {
        let mut events = std::pin::pin!(receiver.into_stream());
        while let Some(event) = events.next().await {
            match Event::default().event(event.event_type()).json_data(&event) {
                Ok(frame) => yield Ok::<Event, axum::Error>(frame),
                Err(e) => warn!(event = event.event_type(), error = %e, "Failed to encode stream event"),
            }
        }
        debug!("Latency SSE stream finished");
    };

    (
        [
            (header::CACHE_CONTROL, "no-cache, no-transform"),
            (header::CONNECTION, "keep-alive"),
        ],
        Sse::new(stream).keep_alive(KeepAlive::new().interval(state.config.stream.keep_alive)),
    )
}
