//! Delivery routing for in-flight merge handlers.
//!
//! A merge node starts on its first delivery; every later delivery for the
//! same node has to reach the handler that is already waiting. The traversal
//! opens a slot here before invoking the handler, pushes subsequent
//! deliveries into it, and closes it when the node completes. The hub lives
//! on the execution context, so slots are keyed `(executionId, nodeId)`
//! structurally.

use std::collections::HashMap;

use conflux_core::JsonMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;

struct Slot {
    tx: mpsc::UnboundedSender<JsonMap>,
    rx: Option<mpsc::UnboundedReceiver<JsonMap>>,
}

/// Per-execution merge delivery channels.
#[derive(Default)]
pub struct MergeHub {
    slots: Mutex<HashMap<String, Slot>>,
}

impl MergeHub {
    /// Create an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a slot for a merge node. Idempotent.
    pub fn open(&self, node_id: &str) {
        let mut slots = self.slots.lock();
        slots.entry(node_id.to_string()).or_insert_with(|| {
            let (tx, rx) = mpsc::unbounded_channel();
            Slot { tx, rx: Some(rx) }
        });
    }

    /// Route a delivery to the merge handler. Returns `false` when the slot
    /// is closed or the handler already finished — the delivery is discarded.
    pub fn deliver(&self, node_id: &str, payload: JsonMap) -> bool {
        let slots = self.slots.lock();
        match slots.get(node_id) {
            Some(slot) => slot.tx.send(payload).is_ok(),
            None => false,
        }
    }

    /// Take the receive side; the merge handler calls this exactly once.
    pub fn take_receiver(&self, node_id: &str) -> Option<mpsc::UnboundedReceiver<JsonMap>> {
        self.slots.lock().get_mut(node_id).and_then(|s| s.rx.take())
    }

    /// Close a slot, discarding any undelivered payloads.
    pub fn close(&self, node_id: &str) {
        self.slots.lock().remove(node_id);
    }

    /// Number of open slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    /// Returns `true` if no slots are open.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }
}

impl std::fmt::Debug for MergeHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MergeHub")
            .field("open_slots", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(key: &str) -> JsonMap {
        let mut map = JsonMap::new();
        map.insert(key.to_string(), json!(true));
        map
    }

    #[tokio::test]
    async fn deliver_reaches_the_receiver() {
        let hub = MergeHub::new();
        hub.open("m1");
        let mut rx = hub.take_receiver("m1").expect("receiver");

        assert!(hub.deliver("m1", payload("a")));
        assert!(hub.deliver("m1", payload("b")));

        let first = rx.recv().await.unwrap();
        assert!(first.contains_key("a"));
        let second = rx.recv().await.unwrap();
        assert!(second.contains_key("b"));
    }

    #[test]
    fn deliver_without_slot_is_discarded() {
        let hub = MergeHub::new();
        assert!(!hub.deliver("ghost", payload("a")));
    }

    #[test]
    fn receiver_taken_once() {
        let hub = MergeHub::new();
        hub.open("m1");
        assert!(hub.take_receiver("m1").is_some());
        assert!(hub.take_receiver("m1").is_none());
    }

    #[test]
    fn open_is_idempotent() {
        let hub = MergeHub::new();
        hub.open("m1");
        let rx = hub.take_receiver("m1");
        hub.open("m1");
        // Reopening must not mint a fresh channel for the same node.
        assert!(rx.is_some());
        assert!(hub.take_receiver("m1").is_none());
        assert_eq!(hub.len(), 1);
    }

    #[test]
    fn close_discards() {
        let hub = MergeHub::new();
        hub.open("m1");
        hub.close("m1");
        assert!(hub.is_empty());
        assert!(!hub.deliver("m1", payload("late")));
    }
}
