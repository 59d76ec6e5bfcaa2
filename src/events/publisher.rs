use super::types::LifecycleEvent;
use crate::constants::defaults;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

/// High-throughput publisher for item and session lifecycle events
///
/// ```rust
/// use bulkflow_core::events::{EventPublisher, LifecycleEvent};
/// use bulkflow_core::{SessionId, SessionStatus};
///
/// # tokio_test::block_on(async {
/// let publisher = EventPublisher::new(16);
/// let mut receiver = publisher.subscribe();
///
/// publisher.publish(LifecycleEvent::for_session(
///     "session.started",
///     SessionId::new(),
///     SessionStatus::Idle,
///     SessionStatus::Running,
///     serde_json::json!({}),
/// ));
///
/// assert_eq!(receiver.recv().await.unwrap().to_state, "running");
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<LifecycleEvent>,
    published: Arc<AtomicU64>,
}

/// Publisher counters for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventPublisherStats {
    pub published: u64,
    pub subscribers: usize,
}

impl EventPublisher {
    /// Create a new event publisher with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            published: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Publish an event to every current receiver.
    ///
    /// Publishing with no receivers is not an error; the event is dropped.
    pub fn publish(&self, event: LifecycleEvent) {
        self.published.fetch_add(1, Ordering::Relaxed);
        if self.sender.send(event).is_err() {
            tracing::trace!("No lifecycle event subscribers, event dropped");
        }
    }

    /// Subscribe to events published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn stats(&self) -> EventPublisherStats {
        EventPublisherStats {
            published: self.published.load(Ordering::Relaxed),
            subscribers: self.subscriber_count(),
        }
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(defaults::EVENT_CHANNEL_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SessionId;
    use crate::state_machine::SessionStatus;

    fn session_event(name: &str) -> LifecycleEvent {
        LifecycleEvent::for_session(
            name,
            SessionId::new(),
            SessionStatus::Idle,
            SessionStatus::Running,
            serde_json::json!({}),
        )
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let publisher = EventPublisher::new(8);
        publisher.publish(session_event("session.started"));
        assert_eq!(publisher.stats().published, 1);
        assert_eq!(publisher.stats().subscribers, 0);
    }

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let publisher = EventPublisher::new(8);
        let mut first = publisher.subscribe();
        let mut second = publisher.subscribe();

        publisher.publish(session_event("session.started"));

        assert_eq!(first.recv().await.unwrap().name, "session.started");
        assert_eq!(second.recv().await.unwrap().name, "session.started");
        assert_eq!(publisher.subscriber_count(), 2);
    }
}
