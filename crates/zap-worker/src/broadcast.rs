use tokio::sync::broadcast;
use tracing::trace;

use crate::events::WorkerEvent;

const DEFAULT_CAPACITY: usize = 1024;

/// Fan-out of worker events. Delivery is at most once: slow subscribers
/// lag and drop, and events published with no subscribers are discarded.
#[derive(Clone)]
pub struct Broadcaster {
    tx: broadcast::Sender<WorkerEvent>,
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl Broadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorkerEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: WorkerEvent) {
        if self.tx.send(event).is_err() {
            trace!("No subscribers for worker event");
        }
    }
}
