//! Typed event surface of the endpoint
//!
//! Every observable change of the endpoint (remote topology, local mirror
//! events, session state, outbound media events) is published as an
//! [`EndpointEvent`] on an [`EventBus`].

pub mod types;

pub use types::EndpointEvent;

use tokio::sync::broadcast;

/// Default event channel capacity (ring buffer size)
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Event bus for broadcasting endpoint events
///
/// Backed by a tokio broadcast channel; every subscriber receives every
/// event published after it subscribed.
///
/// # Example
///
/// ```no_run
/// use engine_rtc_client::events::{EndpointEvent, EventBus};
///
/// let bus = EventBus::new();
/// let mut rx = bus.subscribe();
///
/// bus.publish(EndpointEvent::Disconnected);
///
/// tokio::spawn(async move {
///     while let Ok(event) = rx.recv().await {
///         println!("{}", event.event_name());
///     }
/// });
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EndpointEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(EVENT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish an event to all subscribers
    ///
    /// Events published without subscribers are dropped.
    pub fn publish(&self, event: EndpointEvent) {
        tracing::trace!("Publishing {}", event.event_name());
        let _ = self.tx.send(event);
    }

    /// Subscribe to events
    ///
    /// A subscriber that falls more than the channel capacity behind
    /// receives `Lagged` and misses events.
    pub fn subscribe(&self) -> broadcast::Receiver<EndpointEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_subscribe() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.publish(EndpointEvent::BandwidthEstimationChanged { estimation: 1000 });

        let event = rx.recv().await.unwrap();
        assert!(matches!(
            event,
            EndpointEvent::BandwidthEstimationChanged { estimation: 1000 }
        ));
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let bus = EventBus::new();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(EndpointEvent::SignalingError {
            message: "boom".to_string(),
        });

        assert!(matches!(rx1.recv().await.unwrap(), EndpointEvent::SignalingError { .. }));
        assert!(matches!(rx2.recv().await.unwrap(), EndpointEvent::SignalingError { .. }));
    }

    #[test]
    fn test_no_subscribers() {
        let bus = EventBus::new();
        assert_eq!(bus.subscriber_count(), 0);
        bus.publish(EndpointEvent::Disconnected);
    }
}
