//! Sync event channel
//!
//! Ordered notification of every change to the element list, for consumers
//! that need each step rather than the latest snapshot (list animations,
//! per-element error toasts, logs).

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum SyncEvent {
    /// A full refresh installed a new first page
    Replaced { count: usize },
    /// A further page was appended
    Appended { added: usize, total: usize },
    /// A single element was refreshed in place
    ElementUpdated { itemid: String },
    /// Refreshing one element failed; the cache is unchanged
    ElementRefreshFailed { itemid: String, message: String },
    /// A bulk fetch failed; previously cached data stays visible
    FetchFailed { message: String },
    /// The active filters changed
    FiltersApplied { visible: usize },
    /// The cache was emptied because the engine changed
    Cleared { engine: String },
}

pub struct SyncEventBus {
    tx: broadcast::Sender<SyncEvent>,
}

impl SyncEventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: SyncEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }
}

impl Default for SyncEventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_arrive_in_order() {
        let bus = SyncEventBus::default();
        let mut rx = bus.subscribe();

        bus.publish(SyncEvent::Replaced { count: 2 });
        bus.publish(SyncEvent::Appended { added: 1, total: 3 });

        assert_eq!(rx.recv().await.unwrap(), SyncEvent::Replaced { count: 2 });
        assert_eq!(rx.recv().await.unwrap(), SyncEvent::Appended { added: 1, total: 3 });
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = SyncEventBus::new(4);
        bus.publish(SyncEvent::FetchFailed { message: "down".into() });
    }
}
