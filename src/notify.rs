use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::model::{Event, ResourceIdentity};

const CHANNEL_CAPACITY: usize = 256;

/// Broadcast hub for committed scheduling events, one channel per resource.
/// Lets an embedding layer push slot-board refreshes to connected clients.
pub struct NotifyHub {
    channels: DashMap<ResourceIdentity, broadcast::Sender<Event>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to events for a resource. Creates the channel if needed.
    pub fn subscribe(&self, key: ResourceIdentity) -> broadcast::Receiver<Event> {
        self.channels
            .entry(key)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Publish a committed event. No-op if nobody is listening.
    pub fn send(&self, key: ResourceIdentity, event: &Event) {
        if let Some(sender) = self.channels.get(&key) {
            let _ = sender.send(event.clone());
        }
    }

    /// Drop a resource's channel.
    #[allow(dead_code)]
    pub fn remove(&self, key: &ResourceIdentity) {
        self.channels.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    #[tokio::test]
    async fn subscribe_and_receive() {
        let hub = NotifyHub::new();
        let doc = Ulid::new();
        let key = ResourceIdentity::Doctor(doc);
        let mut rx = hub.subscribe(key);

        let event = Event::AppointmentDeleted {
            id: Ulid::new(),
            doctor_id: doc,
        };
        hub.send(key, &event);

        assert_eq!(rx.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn send_without_subscribers_is_noop() {
        let hub = NotifyHub::new();
        let key = ResourceIdentity::Staff(Ulid::new());
        hub.send(
            key,
            &Event::ShiftDeleted {
                id: Ulid::new(),
                identity: key,
            },
        );
    }
}
