use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::models::DefaultSource;

const EVENT_CAPACITY: usize = 256;

/// Change notifications published by the catalog service
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogEvent {
    LoadingStarted {
        generation: u64,
    },
    CatalogUpdated {
        generation: u64,
        channels: usize,
        groups: usize,
        from_cache: bool,
    },
    LoadFailed {
        generation: u64,
        message: String,
    },
    NoSources {
        generation: u64,
    },
    UserSourcesChanged {
        urls: Vec<String>,
    },
    DefaultSourcesChanged {
        defaults: Vec<DefaultSource>,
    },
    CacheCleared,
}

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<CatalogEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    /// Publishing with no subscribers is not an error
    pub fn publish(&self, event: CatalogEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
        }
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

/// A live listener; dropping it unsubscribes
pub struct Subscription {
    rx: broadcast::Receiver<CatalogEvent>,
}

impl Subscription {
    /// Next event, or `None` once the bus is gone. Events missed by a slow
    /// listener are skipped.
    pub async fn recv(&mut self) -> Option<CatalogEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Event subscriber lagged, skipped {} events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of [`Subscription::recv`]
    pub fn try_recv(&mut self) -> Option<CatalogEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }

    /// Explicit form of dropping the subscription
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        debug!("Catalog event subscription dropped");
    }
}
