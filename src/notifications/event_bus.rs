//! Event bus for broadcasting dispatch and hierarchy events
//!
//! Uses a tokio broadcast channel for the pub/sub pattern. Publishing is
//! best-effort by construction: a slow, failing or absent subscriber can
//! never propagate anything back into the dispatch operation that emitted
//! the event.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::broadcast;

use super::events::{EventMessage, RoamingEvent};

/// Default channel capacity
const DEFAULT_CAPACITY: usize = 1024;

/// Broadcasts events to all subscribers of one operator.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EventMessage>,
    subscriber_count: Arc<AtomicUsize>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            subscriber_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Publish an event with a fresh tracking id.
    pub fn publish(&self, event: RoamingEvent) {
        self.send(EventMessage::new(event));
    }

    /// Publish an event under an existing tracking id, tying a response to
    /// its request.
    pub fn publish_tracked(&self, tracking_id: &str, event: RoamingEvent) {
        self.send(EventMessage::with_tracking_id(tracking_id.to_string(), event));
    }

    fn send(&self, message: EventMessage) {
        let event_type = message.event.event_type();
        match self.sender.send(message) {
            Ok(count) => {
                debug!("Event published: type={} subscribers={}", event_type, count);
            }
            Err(_) => {
                // No subscribers - normal when nothing is attached.
                debug!("Event published (no subscribers): type={}", event_type);
            }
        }
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> EventSubscriber {
        let receiver = self.sender.subscribe();
        self.subscriber_count.fetch_add(1, Ordering::SeqCst);
        let count = self.subscriber_count.load(Ordering::SeqCst);
        info!("New event subscriber, total: {}", count);

        EventSubscriber {
            receiver,
            subscriber_count: Arc::clone(&self.subscriber_count),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscriber_count.load(Ordering::SeqCst)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Receives events from the bus.
pub struct EventSubscriber {
    receiver: broadcast::Receiver<EventMessage>,
    subscriber_count: Arc<AtomicUsize>,
}

impl EventSubscriber {
    /// Receive the next event.
    pub async fn recv(&mut self) -> Option<EventMessage> {
        loop {
            match self.receiver.recv().await {
                Ok(msg) => return Some(msg),
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    warn!("Subscriber lagged, {} events missed", count);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return None;
                }
            }
        }
    }

    /// Drain everything currently buffered without waiting.
    pub fn try_recv(&mut self) -> Option<EventMessage> {
        loop {
            match self.receiver.try_recv() {
                Ok(msg) => return Some(msg),
                Err(broadcast::error::TryRecvError::Lagged(count)) => {
                    warn!("Subscriber lagged, {} events missed", count);
                    continue;
                }
                Err(_) => return None,
            }
        }
    }
}

impl Drop for EventSubscriber {
    fn drop(&mut self) {
        self.subscriber_count.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Shared event bus type
pub type SharedEventBus = Arc<EventBus>;

// ── Tests ──────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ChargingTarget, EvseId};
    use crate::notifications::events::ReserveRequestedEvent;
    use chrono::Utc;

    fn sample_event() -> RoamingEvent {
        RoamingEvent::ReserveRequested(ReserveRequestedEvent {
            target: ChargingTarget::Evse(EvseId::new("DE*ABC*E1").unwrap()),
            provider_id: None,
            timestamp: Utc::now(),
        })
    }

    #[tokio::test]
    async fn publish_reaches_subscriber() {
        let bus = EventBus::new();
        let mut subscriber = bus.subscribe();

        bus.publish(sample_event());

        let received = tokio::time::timeout(
            std::time::Duration::from_millis(100),
            subscriber.recv(),
        )
        .await
        .expect("timeout")
        .expect("no message");
        assert_eq!(received.event.event_type(), "reserve_requested");
    }

    #[tokio::test]
    async fn tracked_events_share_the_id() {
        let bus = EventBus::new();
        let mut subscriber = bus.subscribe();

        bus.publish_tracked("track-1", sample_event());
        bus.publish_tracked("track-1", sample_event());

        let first = subscriber.recv().await.unwrap();
        let second = subscriber.recv().await.unwrap();
        assert_eq!(first.tracking_id, "track-1");
        assert_eq!(second.tracking_id, "track-1");
    }

    #[test]
    fn publish_without_subscribers_is_fine() {
        let bus = EventBus::new();
        bus.publish(sample_event());
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn subscriber_count_tracks_drops() {
        let bus = EventBus::new();
        let sub1 = bus.subscribe();
        let _sub2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
        drop(sub1);
        assert_eq!(bus.subscriber_count(), 1);
    }
}
