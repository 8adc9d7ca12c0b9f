//! Server-Sent Events bridge: one dispatcher subscription per connection.

use std::convert::Infallible;
use std::time::Duration;

use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::{Stream, StreamExt};

use lib_axis::{HubMessage, Subscription};

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Snapshots go out as unnamed `message` events; ticks and status notices
/// carry their event name.
fn to_event(message: &HubMessage) -> Event {
    let event = Event::default().data(&message.data);
    match message.kind.event_name() {
        Some(name) => event.event(name),
        None => event,
    }
}

/// Maps a subscription onto SSE events. The stream ends when the dispatcher
/// evicts the subscriber; dropping it (client gone) unregisters it.
pub fn event_stream(subscription: Subscription) -> impl Stream<Item = Result<Event, Infallible>> {
    subscription.map(|message| Ok(to_event(&message)))
}

pub fn registry_events(subscription: Subscription) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    tracing::debug!("Event stream opened for client {}", subscription.id());
    Sse::new(event_stream(subscription)).keep_alive(
        KeepAlive::new()
            .interval(KEEP_ALIVE_INTERVAL)
            .text("keepalive"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use lib_axis::Dispatcher;

    #[tokio::test]
    async fn test_stream_ends_after_eviction() {
        let hub = Dispatcher::new(1, 1);
        let stream = event_stream(hub.subscribe());

        hub.publish(HubMessage::tick(5));
        let stats = hub.publish(HubMessage::tick(4));
        assert_eq!(stats.evicted, 1);

        let events: Vec<_> = stream.collect().await;
        assert_eq!(events.len(), 1);
        assert!(events[0].is_ok());
    }

    #[tokio::test]
    async fn test_dropping_stream_unregisters() {
        let hub = Dispatcher::default();
        let stream = event_stream(hub.subscribe());
        assert_eq!(hub.client_count(), 1);
        drop(stream);
        assert_eq!(hub.client_count(), 0);
    }
}
