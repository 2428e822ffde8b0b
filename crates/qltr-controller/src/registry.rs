//! Live switch registry

use crate::adapter::SwitchHandle;
use parking_lot::RwLock;
use qltr_common::NodeId;
use std::collections::HashMap;
use tokio::sync::broadcast;
use tracing::info;

const EVENT_CAPACITY: usize = 64;

/// Registry change, published to subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    /// Switch entered main-processing state
    Registered(NodeId),
    /// Switch left processing state
    Unregistered(NodeId),
}

/// Tracks connected switches and their handles
pub struct SwitchRegistry {
    switches: RwLock<HashMap<NodeId, SwitchHandle>>,
    events: broadcast::Sender<RegistryEvent>,
}

impl SwitchRegistry {
    /// Create empty registry
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            switches: RwLock::new(HashMap::new()),
            events,
        }
    }

    /// Store a switch handle. Returns `true` when the switch was not known yet.
    ///
    /// Re-registering replaces the stored handle without logging or
    /// publishing a second event.
    pub fn register(&self, handle: SwitchHandle) -> bool {
        let id = handle.id;
        let is_new = self.switches.write().insert(id, handle).is_none();

        if is_new {
            info!(node = %id, "Register datapath");
            // no subscribers is fine
            let _ = self.events.send(RegistryEvent::Registered(id));
        }
        is_new
    }

    /// Remove a switch, no-op when unknown
    pub fn unregister(&self, id: NodeId) -> Option<SwitchHandle> {
        let removed = self.switches.write().remove(&id);

        if removed.is_some() {
            info!(node = %id, "Unregister datapath");
            let _ = self.events.send(RegistryEvent::Unregistered(id));
        }
        removed
    }

    /// Handle of a registered switch
    pub fn get(&self, id: NodeId) -> Option<SwitchHandle> {
        self.switches.read().get(&id).cloned()
    }

    /// Whether a switch is registered
    pub fn contains(&self, id: NodeId) -> bool {
        self.switches.read().contains_key(&id)
    }

    /// Number of registered switches
    pub fn len(&self) -> usize {
        self.switches.read().len()
    }

    /// No switch registered
    pub fn is_empty(&self) -> bool {
        self.switches.read().is_empty()
    }

    /// Snapshot of all handles, unaffected by later registry changes
    pub fn all_handles(&self) -> Vec<SwitchHandle> {
        let mut handles: Vec<_> = self.switches.read().values().cloned().collect();
        handles.sort_by_key(|h| h.id);
        handles
    }

    /// Snapshot of registered ids, sorted
    pub fn live_ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<_> = self.switches.read().keys().copied().collect();
        ids.sort();
        ids
    }

    /// Receive registry events
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }
}

impl Default for SwitchRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_is_idempotent() {
        let registry = SwitchRegistry::new();
        let mut events = registry.subscribe();

        assert!(registry.register(SwitchHandle::new(NodeId(1))));
        let replacement = SwitchHandle::new(NodeId(1));
        assert!(!registry.register(replacement.clone()));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(NodeId(1)), Some(replacement));
        assert_eq!(events.try_recv().unwrap(), RegistryEvent::Registered(NodeId(1)));
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_unregister_unknown_is_noop() {
        let registry = SwitchRegistry::new();
        let mut events = registry.subscribe();

        assert!(registry.unregister(NodeId(7)).is_none());
        assert!(events.try_recv().is_err());

        registry.register(SwitchHandle::new(NodeId(7)));
        assert!(registry.unregister(NodeId(7)).is_some());
        assert!(!registry.contains(NodeId(7)));
        assert_eq!(events.try_recv().unwrap(), RegistryEvent::Registered(NodeId(7)));
        assert_eq!(events.try_recv().unwrap(), RegistryEvent::Unregistered(NodeId(7)));
    }

    #[test]
    fn test_snapshot_is_stable() {
        let registry = SwitchRegistry::new();
        registry.register(SwitchHandle::new(NodeId(2)));
        registry.register(SwitchHandle::new(NodeId(1)));

        let snapshot = registry.all_handles();
        registry.unregister(NodeId(1));
        registry.register(SwitchHandle::new(NodeId(3)));

        let ids: Vec<_> = snapshot.iter().map(|h| h.id).collect();
        assert_eq!(ids, vec![NodeId(1), NodeId(2)]);
        assert_eq!(registry.live_ids(), vec![NodeId(2), NodeId(3)]);
    }

    #[test]
    fn test_concurrent_registration() {
        let registry = std::sync::Arc::new(SwitchRegistry::new());
        let threads: Vec<_> = (0..8u64)
            .map(|t| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for i in 0..100u64 {
                        registry.register(SwitchHandle::new(NodeId(t * 100 + i)));
                        let _ = registry.all_handles();
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(registry.len(), 800);
    }
}
