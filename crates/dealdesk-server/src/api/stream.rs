//! Server-sent snapshot streams.

use std::convert::Infallible;
use std::time::Duration;

use axum::response::sse::{Event, KeepAlive, Sse};
use dealdesk_store::gateway::Entity;
use dealdesk_store::Subscription;
use futures::stream::{self, Stream, StreamExt};
use serde::Serialize;
use tokio::sync::watch;

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Emits one `snapshot` event per collection snapshot until the
/// subscription ends or `shutdown` turns true. Dropping the response (client
/// disconnect) drops the subscription with it.
pub(super) fn snapshot_events<T>(
    subscription: Subscription<T>,
    mut shutdown: watch::Receiver<bool>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>>
where
    T: Entity + Clone + Serialize,
{
    let events = stream::unfold(subscription, |mut subscription| async move {
        let snapshot = subscription.next_snapshot().await?;
        let event = Event::default()
            .event("snapshot")
            .json_data(&snapshot)
            .unwrap_or_else(|error| {
                tracing::warn!(error = %error, "failed to encode snapshot event");
                Event::default().event("error").data("snapshot encoding failed")
            });
        Some((Ok::<_, Infallible>(event), subscription))
    })
    .take_until(async move {
        // A dropped sender also ends the stream.
        let _ = shutdown.wait_for(|stopping| *stopping).await;
    });

    Sse::new(events).keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL))
}
