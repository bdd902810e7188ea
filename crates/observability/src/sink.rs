//! The concrete `ObservabilitySink`: folds every event into the local
//! `Store` projection and rebroadcasts it to any connected `/ws` client
//! over a typed `broadcast::Sender<ObservabilityEvent>`.

use std::sync::Arc;

use bridge_core::{ObservabilityEvent, ObservabilitySink};
use tokio::sync::broadcast;

use crate::state::Store;

const BROADCAST_CAPACITY: usize = 1024;

pub struct MonitorSink {
    store: Arc<Store>,
    events_tx: broadcast::Sender<ObservabilityEvent>,
}

impl MonitorSink {
    pub fn new() -> Self {
        let (events_tx, _rx) = broadcast::channel(BROADCAST_CAPACITY);
        Self { store: Arc::new(Store::new()), events_tx }
    }

    pub fn store(&self) -> Arc<Store> {
        self.store.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ObservabilityEvent> {
        self.events_tx.subscribe()
    }
}

impl Default for MonitorSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ObservabilitySink for MonitorSink {
    /// Best-effort by contract: a send to a channel with no subscribers
    /// (or a lagging one) is not an error here, only a dropped update.
    fn emit(&self, event: ObservabilityEvent) {
        self.store.apply(&event);
        let _ = self.events_tx.send(event);
    }
}
