//! # Broadcast Dispatcher
//!
//! Fans snapshots and events out to every connected subscriber (one per
//! Server-Sent Events connection).
//!
//! ## Core Design Principles:
//!
//! 1.  **Zero-Copy Fan-out**: a published message is wrapped in an `Arc` once;
//!     each subscriber receives a pointer to the same allocation.
//!
//! 2.  **Bounded Mailboxes, Drop on Full**: every subscriber owns a small
//!     bounded channel. `publish` uses `try_send`, so a stalled subscriber
//!     loses that message and nothing else happens: the publisher never
//!     waits and other subscribers are unaffected.
//!
//! 3.  **Eviction**: a subscriber that misses `eviction_threshold` messages in
//!     a row is unregistered. Its stream ends once the buffered messages are
//!     drained and the client is expected to reconnect.
//!
//! 4.  **Ordered Teardown**: dropping a [`Subscription`] removes it from the
//!     registry before its receiver is released, and the registry lock is held
//!     for the whole fan-out, so no message published after the removal can
//!     reach it.

use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::task::{Context, Poll};

use futures_util::Stream;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::inventory::RegistryItem;

/// Default mailbox size for one subscriber.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 10;
/// Default number of consecutive drops before a subscriber is evicted.
pub const DEFAULT_EVICTION_THRESHOLD: usize = 30;

/// What a message means to the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Full registry replace. Sent without an event name.
    Snapshot,
    /// Scheduler countdown, `{"seconds_remaining": n}`.
    Tick,
    /// Informational notice, `{"status": ..., "title": ...}`.
    Status,
}

impl EventKind {
    /// The SSE `event:` field, or `None` for the default message type.
    pub fn event_name(&self) -> Option<&'static str> {
        match self {
            EventKind::Snapshot => None,
            EventKind::Tick => Some("tick"),
            EventKind::Status => Some("status"),
        }
    }
}

/// A pre-serialized message, shared by every subscriber it is delivered to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubMessage {
    pub kind: EventKind,
    pub data: String,
}

impl HubMessage {
    pub fn snapshot(items: &[RegistryItem]) -> Result<Self, serde_json::Error> {
        Ok(Self {
            kind: EventKind::Snapshot,
            data: serde_json::to_string(items)?,
        })
    }

    pub fn tick(seconds_remaining: u32) -> Self {
        Self {
            kind: EventKind::Tick,
            data: serde_json::json!({ "seconds_remaining": seconds_remaining }).to_string(),
        }
    }

    pub fn status(status: &str, title: &str) -> Self {
        Self {
            kind: EventKind::Status,
            data: serde_json::json!({ "status": status, "title": title }).to_string(),
        }
    }
}

/// Outcome of one `publish` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishStats {
    pub delivered: usize,
    pub dropped: usize,
    pub evicted: usize,
}

/// A registered subscriber as seen by the dispatcher.
struct ClientHandle {
    id: u64,
    sender: mpsc::Sender<Arc<HubMessage>>,
    /// Messages lost in a row because the mailbox was full.
    consecutive_drops: usize,
}

struct ClientRegistry {
    clients: Mutex<Vec<ClientHandle>>,
    next_id: AtomicU64,
    mailbox_capacity: usize,
    eviction_threshold: usize,
}

impl ClientRegistry {
    fn remove(&self, id: u64) -> bool {
        let mut clients = self.clients.lock().expect("Dispatcher lock poisoned");
        let before = clients.len();
        clients.retain(|c| c.id != id);
        before != clients.len()
    }
}

/// Registry of subscriber mailboxes. Cheap to clone; clones share the registry.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<ClientRegistry>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("clients", &self.client_count())
            .field("mailbox_capacity", &self.registry.mailbox_capacity)
            .field("eviction_threshold", &self.registry.eviction_threshold)
            .finish()
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(DEFAULT_MAILBOX_CAPACITY, DEFAULT_EVICTION_THRESHOLD)
    }
}

impl Dispatcher {
    /// `mailbox_capacity` is clamped to at least 1. An `eviction_threshold`
    /// of 0 disables eviction.
    pub fn new(mailbox_capacity: usize, eviction_threshold: usize) -> Self {
        Self {
            registry: Arc::new(ClientRegistry {
                clients: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
                mailbox_capacity: mailbox_capacity.max(1),
                eviction_threshold,
            }),
        }
    }

    /// Registers a new subscriber with its own bounded mailbox.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel(self.registry.mailbox_capacity);
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);

        let mut clients = self.registry.clients.lock().expect("Dispatcher lock poisoned");
        clients.push(ClientHandle {
            id,
            sender: tx,
            consecutive_drops: 0,
        });
        log::info!("Client {} subscribed ({} active)", id, clients.len());

        Subscription {
            id,
            rx,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Removes a subscriber. Unknown or already removed ids are a no-op.
    pub fn unsubscribe(&self, id: u64) -> bool {
        let removed = self.registry.remove(id);
        if removed {
            log::info!("Client {} unsubscribed", id);
        }
        removed
    }

    /// Delivers `message` to every registered subscriber without waiting.
    pub fn publish(&self, message: HubMessage) -> PublishStats {
        let message = Arc::new(message);
        let threshold = self.registry.eviction_threshold;
        let mut stats = PublishStats::default();

        let mut clients = self.registry.clients.lock().expect("Dispatcher lock poisoned");
        clients.retain_mut(|client| match client.sender.try_send(Arc::clone(&message)) {
            Ok(()) => {
                client.consecutive_drops = 0;
                stats.delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                client.consecutive_drops += 1;
                stats.dropped += 1;
                if threshold > 0 && client.consecutive_drops >= threshold {
                    log::warn!(
                        "Client {} dropped {} messages in a row. Evicting.",
                        client.id,
                        client.consecutive_drops
                    );
                    stats.evicted += 1;
                    false
                } else {
                    true
                }
            }
            Err(TrySendError::Closed(_)) => {
                log::info!("Client {} disconnected. Removing from dispatcher.", client.id);
                false
            }
        });

        if stats.dropped > 0 {
            log::debug!(
                "Publish {:?}: {} delivered, {} dropped",
                message.kind,
                stats.delivered,
                stats.dropped
            );
        }
        stats
    }

    /// Delivers `message` to one subscriber only, without waiting.
    pub fn send_to(&self, id: u64, message: HubMessage) -> bool {
        let clients = self.registry.clients.lock().expect("Dispatcher lock poisoned");
        clients
            .iter()
            .find(|c| c.id == id)
            .is_some_and(|c| c.sender.try_send(Arc::new(message)).is_ok())
    }

    pub fn client_count(&self) -> usize {
        self.registry.clients.lock().expect("Dispatcher lock poisoned").len()
    }
}

/// One subscriber's end of the dispatcher. Yields messages in publish order.
/// Dropping it unregisters the subscriber.
pub struct Subscription {
    id: u64,
    rx: mpsc::Receiver<Arc<HubMessage>>,
    registry: Weak<ClientRegistry>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Waits for the next message. `None` once the subscriber was evicted and
    /// its mailbox is drained.
    pub async fn recv(&mut self) -> Option<Arc<HubMessage>> {
        self.rx.recv().await
    }

    /// Takes a message if one is already queued.
    pub fn try_recv(&mut self) -> Option<Arc<HubMessage>> {
        self.rx.try_recv().ok()
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

impl Stream for Subscription {
    type Item = Arc<HubMessage>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        // Runs before `rx` is dropped.
        if let Some(registry) = self.registry.upgrade() {
            if registry.remove(self.id) {
                log::info!("Client {} disconnected", self.id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn drain(sub: &mut Subscription) -> Vec<Arc<HubMessage>> {
        std::iter::from_fn(|| sub.try_recv()).collect()
    }

    #[test]
    fn test_event_names_and_payloads() {
        assert_eq!(EventKind::Snapshot.event_name(), None);
        assert_eq!(EventKind::Tick.event_name(), Some("tick"));
        assert_eq!(HubMessage::tick(42).data, r#"{"seconds_remaining":42}"#);
        let status: serde_json::Value =
            serde_json::from_str(&HubMessage::status("MANUAL", "mode").data).unwrap();
        assert_eq!(status, serde_json::json!({ "status": "MANUAL", "title": "mode" }));
        assert_eq!(HubMessage::snapshot(&[]).unwrap().data, "[]");
    }

    #[tokio::test]
    async fn test_publish_reaches_every_subscriber_in_order() {
        let hub = Dispatcher::new(10, 0);
        let mut a = hub.subscribe();
        let mut b = hub.subscribe();

        for n in (0..3).rev() {
            let stats = hub.publish(HubMessage::tick(n));
            assert_eq!(stats.delivered, 2);
        }

        for sub in [&mut a, &mut b] {
            let got: Vec<_> = drain(sub).iter().map(|m| m.data.clone()).collect();
            assert_eq!(
                got,
                [
                    r#"{"seconds_remaining":2}"#,
                    r#"{"seconds_remaining":1}"#,
                    r#"{"seconds_remaining":0}"#
                ]
            );
        }
    }

    #[tokio::test]
    async fn test_messages_are_shared_not_copied() {
        let hub = Dispatcher::new(4, 0);
        let mut a = hub.subscribe();
        let mut b = hub.subscribe();
        hub.publish(HubMessage::tick(1));
        let (ma, mb) = (a.recv().await.unwrap(), b.recv().await.unwrap());
        assert!(Arc::ptr_eq(&ma, &mb));
    }

    #[tokio::test]
    async fn test_late_subscriber_misses_earlier_messages() {
        let hub = Dispatcher::new(4, 0);
        hub.publish(HubMessage::tick(9));
        let mut late = hub.subscribe();
        hub.publish(HubMessage::tick(8));
        let got = drain(&mut late);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].data, r#"{"seconds_remaining":8}"#);
    }

    #[tokio::test]
    async fn test_full_mailbox_drops_without_blocking_others() {
        let hub = Dispatcher::new(2, 0);
        let mut stalled = hub.subscribe();
        let mut healthy = hub.subscribe();

        // Fill the stalled mailbox; keep the healthy one drained.
        for n in 0..2 {
            hub.publish(HubMessage::tick(n));
            drain(&mut healthy);
        }

        let started = Instant::now();
        let stats = hub.publish(HubMessage::tick(99));
        assert!(started.elapsed() < Duration::from_millis(50));
        assert_eq!(stats, PublishStats { delivered: 1, dropped: 1, evicted: 0 });

        let got = drain(&mut healthy);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].data, r#"{"seconds_remaining":99}"#);

        // The stalled subscriber kept its first two messages and lost the third.
        let kept: Vec<_> = drain(&mut stalled).iter().map(|m| m.data.clone()).collect();
        assert_eq!(kept.len(), 2);
        assert_eq!(hub.client_count(), 2);
    }

    #[tokio::test]
    async fn test_unsubscribe_is_idempotent_and_final() {
        let hub = Dispatcher::new(4, 0);
        let mut sub = hub.subscribe();
        let id = sub.id();

        assert!(hub.unsubscribe(id));
        assert!(!hub.unsubscribe(id));
        assert_eq!(hub.client_count(), 0);

        // Still alive, but nothing reaches it any more.
        assert_eq!(hub.publish(HubMessage::tick(1)).delivered, 0);
        let next = tokio::time::timeout(Duration::from_millis(100), sub.recv()).await;
        assert!(matches!(next, Ok(None)));
        assert!(!hub.send_to(id, HubMessage::tick(0)));
    }

    #[tokio::test]
    async fn test_dropping_subscription_unregisters() {
        let hub = Dispatcher::new(4, 0);
        let keep = hub.subscribe();
        {
            let _gone = hub.subscribe();
            assert_eq!(hub.client_count(), 2);
        }
        assert_eq!(hub.client_count(), 1);
        assert!(hub.unsubscribe(keep.id()));
    }

    #[tokio::test]
    async fn test_stalled_subscriber_is_evicted_and_stream_ends() {
        let hub = Dispatcher::new(1, 3);
        let mut stalled = hub.subscribe();

        hub.publish(HubMessage::tick(0)); // fills the mailbox
        let mut evicted = 0;
        for n in 1..=3 {
            evicted += hub.publish(HubMessage::tick(n)).evicted;
        }
        assert_eq!(evicted, 1);
        assert_eq!(hub.client_count(), 0);

        // The buffered message is still delivered, then the stream closes.
        assert_eq!(stalled.recv().await.unwrap().data, r#"{"seconds_remaining":0}"#);
        assert!(stalled.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_send_to_targets_one_subscriber() {
        let hub = Dispatcher::new(4, 0);
        let mut a = hub.subscribe();
        let mut b = hub.subscribe();
        assert!(hub.send_to(a.id(), HubMessage::status("ok", "hello")));
        assert!(!hub.send_to(9999, HubMessage::status("ok", "nobody")));
        assert_eq!(drain(&mut a).len(), 1);
        assert!(drain(&mut b).is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_subscribe_and_publish() {
        let hub = Dispatcher::new(64, 0);
        let publisher = {
            let hub = hub.clone();
            tokio::spawn(async move {
                for n in 0..50 {
                    hub.publish(HubMessage::tick(n));
                    tokio::task::yield_now().await;
                }
            })
        };
        let mut subs = Vec::new();
        for _ in 0..20 {
            subs.push(hub.subscribe());
            tokio::task::yield_now().await;
        }
        publisher.await.unwrap();

        // Each subscriber sees a contiguous, ordered tail of the sequence.
        for sub in &mut subs {
            let seen: Vec<u32> = drain(sub)
                .iter()
                .map(|m| {
                    let v: serde_json::Value = serde_json::from_str(&m.data).unwrap();
                    v["seconds_remaining"].as_u64().unwrap() as u32
                })
                .collect();
            assert!(seen.windows(2).all(|w| w[1] == w[0] + 1));
            if let Some(last) = seen.last() {
                assert_eq!(*last, 49);
            }
        }
    }
}
