use crate::domain::events::DomainEvent;
use crate::domain::ports::EventPublisher;
use tokio::sync::broadcast;
use tracing::debug;

/// Publishes domain events on a `tokio` broadcast channel.
///
/// Sending never blocks; slow subscribers lag and drop the oldest events.
#[derive(Debug, Clone)]
pub struct BroadcastPublisher {
    sender: broadcast::Sender<DomainEvent>,
}

impl BroadcastPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastPublisher {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl EventPublisher for BroadcastPublisher {
    fn publish(&self, event: &DomainEvent) {
        if self.sender.send(event.clone()).is_err() {
            debug!(event = event.name(), "no event subscribers");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ids::OrderNumber;
    use chrono::Utc;

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let publisher = BroadcastPublisher::new(8);
        let mut rx = publisher.subscribe();
        let event = DomainEvent::OrderDelivered {
            order_number: OrderNumber::new("ORD-1"),
            at: Utc::now(),
        };
        publisher.publish(&event);
        assert_eq!(rx.recv().await.unwrap(), event);
    }

    #[test]
    fn test_publish_without_subscribers_does_not_fail() {
        let publisher = BroadcastPublisher::new(8);
        publisher.publish(&DomainEvent::OrderDelivered {
            order_number: OrderNumber::new("ORD-1"),
            at: Utc::now(),
        });
    }
}
