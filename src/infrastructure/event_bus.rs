use crate::domain::operations::NotifyEvent;
use crate::domain::ports::EventSink;
use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Topic every verified, deduplicated notification is published on.
pub const PAYMENT_NOTIFY_TOPIC: &str = "payment.notify";

/// In-process fan-out of notification events over a `tokio::sync::broadcast` channel.
///
/// Slow subscribers that fall more than `capacity` events behind lose the oldest ones.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<NotifyEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NotifyEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[async_trait]
impl EventSink for EventBus {
    async fn publish(&self, event: &NotifyEvent) {
        match self.sender.send(event.clone()) {
            Ok(receivers) => debug!(
                topic = PAYMENT_NOTIFY_TOPIC,
                receivers,
                key = %event.idempotency_key,
                "event published"
            ),
            Err(_) => warn!(
                topic = PAYMENT_NOTIFY_TOPIC,
                key = %event.idempotency_key,
                "no subscribers, event dropped"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(key: &str) -> NotifyEvent {
        NotifyEvent {
            event_type: "payment.succeeded".into(),
            transaction: None,
            refund: None,
            idempotency_key: key.into(),
        }
    }

    #[tokio::test]
    async fn test_every_subscriber_receives_event() {
        let bus = EventBus::new(8);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(&event("o-1")).await;

        assert_eq!(a.recv().await.unwrap().idempotency_key, "o-1");
        assert_eq!(b.recv().await.unwrap().idempotency_key, "o-1");
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_not_an_error() {
        let bus = EventBus::new(8);
        bus.publish(&event("o-1")).await;
        assert_eq!(bus.subscriber_count(), 0);
    }
}
