//! Broadcast event stream for discovery observers
//!
//! Observers subscribe to per-instance probe results and periodic
//! healthy-list snapshots. Publishing is fire-and-forget: slow or
//! absent subscribers never block the discovery or health loops.

use crate::types::ServiceInstance;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Events published by the discovery subsystem
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DiscoveryEvent {
    /// Post-probe state of a single instance
    HealthUpdate(ServiceInstance),
    /// Snapshot of all currently selectable instances
    HealthyInstances(Vec<ServiceInstance>),
}

/// Fan-out channel for [`DiscoveryEvent`] values
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<DiscoveryEvent>,
}

impl EventBus {
    /// Creates a bus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Registers a new subscriber
    ///
    /// Each receiver sees every event published after subscription.
    /// A receiver that falls more than the buffer capacity behind loses
    /// the oldest events and observes a lag error, never a stall.
    pub fn subscribe(&self) -> broadcast::Receiver<DiscoveryEvent> {
        self.sender.subscribe()
    }

    /// Publishes an event to all current subscribers
    pub fn publish(&self, event: DiscoveryEvent) {
        // Ignore send errors (no receivers)
        let _ = self.sender.send(event);
    }

    /// Returns the number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Advertisement;

    #[tokio::test]
    async fn test_subscriber_receives_events() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();

        let ad = Advertisement::new("svc", "10.0.0.1", 8080);
        let instance = ServiceInstance::from_advertisement(&ad, "static");
        bus.publish(DiscoveryEvent::HealthUpdate(instance.clone()));
        bus.publish(DiscoveryEvent::HealthyInstances(vec![instance.clone()]));

        match rx.recv().await.unwrap() {
            DiscoveryEvent::HealthUpdate(got) => assert_eq!(got.id, instance.id),
            other => panic!("unexpected event: {:?}", other),
        }
        match rx.recv().await.unwrap() {
            DiscoveryEvent::HealthyInstances(list) => assert_eq!(list.len(), 1),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_does_not_block() {
        let bus = EventBus::new(2);
        assert_eq!(bus.subscriber_count(), 0);

        let ad = Advertisement::new("svc", "10.0.0.1", 8080);
        let instance = ServiceInstance::from_advertisement(&ad, "static");
        for _ in 0..10 {
            bus.publish(DiscoveryEvent::HealthUpdate(instance.clone()));
        }
    }
}
