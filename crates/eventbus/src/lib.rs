//! The Realtime Event Bus: per-session subscriber fan-out for SSE
//! clients, plus the 30-second keep-alive ping loop.
//!
//! Grounded on the teacher's `RunStore` pattern — one
//! `broadcast::Sender` per entity, created lazily on first touch and
//! kept alive as long as either a publisher or a subscriber holds a
//! handle to it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;
use tracing::debug;

use sa_domain::event::Event;

const CHANNEL_CAPACITY: usize = 512;
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// One broadcast channel per session. Channels are created on first
/// `broadcast` or `subscribe` call and never removed automatically —
/// the owning gateway drops a session's channel explicitly when the
/// session itself is deleted.
pub struct EventBus {
    channels: RwLock<HashMap<String, broadcast::Sender<Event>>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        EventBus {
            channels: RwLock::new(HashMap::new()),
        }
    }

    fn channel(&self, session_id: &str) -> broadcast::Sender<Event> {
        if let Some(tx) = self.channels.read().get(session_id) {
            return tx.clone();
        }
        let mut channels = self.channels.write();
        channels
            .entry(session_id.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    /// Publish an event to every current subscriber of a session. A
    /// session with no subscribers silently drops the event — there is
    /// nothing to replay to a client that connects later except what it
    /// gets by rehydrating the JSONL transcript.
    pub fn broadcast(&self, session_id: &str, event: Event) {
        let tx = self.channel(session_id);
        let _ = tx.send(event);
    }

    pub fn subscriber_count(&self, session_id: &str) -> usize {
        self.channels
            .read()
            .get(session_id)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }

    /// Subscribe to a session's events. Returns the immediate
    /// `connected` event the caller should emit first, plus a stream of
    /// every event broadcast from this point on — the subscription is
    /// registered before this function returns, so nothing broadcast
    /// concurrently with the caller receiving the `connected` event is
    /// missed.
    pub fn subscribe(&self, session_id: &str, is_active: bool) -> (Event, BroadcastStream<Event>) {
        let tx = self.channel(session_id);
        let rx = tx.subscribe();
        (Event::Connected { is_active }, BroadcastStream::new(rx))
    }

    pub fn remove_channel(&self, session_id: &str) {
        self.channels.write().remove(session_id);
    }

    /// Spawn the keep-alive ping loop for a session. The caller owns the
    /// returned handle and should abort it when the subscribing
    /// connection closes — the loop itself never exits on its own.
    pub fn spawn_keepalive(self: &Arc<Self>, session_id: String, is_active: bool) -> JoinHandle<()> {
        let bus = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(PING_INTERVAL).await;
                debug!(session_id = %session_id, "sending keep-alive ping");
                bus.broadcast(&session_id, Event::Ping { is_active });
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn subscribe_receives_subsequently_broadcast_events() {
        let bus = EventBus::new();
        let (connected, mut stream) = bus.subscribe("s1", false);
        assert!(matches!(connected, Event::Connected { is_active: false }));

        bus.broadcast("s1", Event::SessionActive);
        let next = stream.next().await.unwrap().unwrap();
        assert!(matches!(next, Event::SessionActive));
    }

    #[test]
    fn subscriber_count_reflects_active_subscriptions() {
        let bus = EventBus::new();
        assert_eq!(bus.subscriber_count("s1"), 0);
        let (_connected, _stream) = bus.subscribe("s1", false);
        assert_eq!(bus.subscriber_count("s1"), 1);
    }

    #[tokio::test]
    async fn broadcast_with_no_subscribers_does_not_error() {
        let bus = EventBus::new();
        bus.broadcast("s1", Event::SessionIdle);
    }

    #[test]
    fn remove_channel_drops_subscriber_count_tracking() {
        let bus = EventBus::new();
        let (_connected, _stream) = bus.subscribe("s1", false);
        bus.remove_channel("s1");
        assert_eq!(bus.subscriber_count("s1"), 0);
    }

    #[tokio::test]
    async fn independent_sessions_do_not_cross_talk() {
        let bus = EventBus::new();
        let (_c1, mut stream1) = bus.subscribe("s1", false);
        let (_c2, mut stream2) = bus.subscribe("s2", false);

        bus.broadcast("s1", Event::SessionActive);
        let got = stream1.next().await.unwrap().unwrap();
        assert!(matches!(got, Event::SessionActive));

        bus.broadcast("s2", Event::SessionIdle);
        let got2 = stream2.next().await.unwrap().unwrap();
        assert!(matches!(got2, Event::SessionIdle));
    }
}
