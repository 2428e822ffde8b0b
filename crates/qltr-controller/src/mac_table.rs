//! Per-switch MAC learning

use dashmap::DashMap;
use qltr_common::{MacAddress, NodeId, Port};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy)]
struct Learned {
    port: Port,
    /// Global learn sequence, larger is more recent
    seq: u64,
}

/// Source MAC → ingress port, per switch
///
/// Entries never expire unless a per-switch capacity is set. With a
/// capacity, learning a new MAC on a full switch evicts that switch's least
/// recently learned entry.
pub struct MacLearningTable {
    tables: DashMap<NodeId, HashMap<MacAddress, Learned>>,
    capacity: Option<usize>,
    seq: AtomicU64,
}

impl MacLearningTable {
    /// Unbounded table
    pub fn new() -> Self {
        Self {
            tables: DashMap::new(),
            capacity: None,
            seq: AtomicU64::new(0),
        }
    }

    /// Table holding at most `max_entries` MACs per switch
    pub fn with_capacity(max_entries: usize) -> Self {
        Self {
            capacity: Some(max_entries.max(1)),
            ..Self::new()
        }
    }

    /// Record that `mac` was seen on `port` of `switch`, replacing any prior port
    pub fn learn(&self, switch: NodeId, mac: MacAddress, port: Port) {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let mut table = self.tables.entry(switch).or_default();

        if let Some(cap) = self.capacity {
            if table.len() >= cap && !table.contains_key(&mac) {
                let oldest = table
                    .iter()
                    .min_by_key(|(_, l)| l.seq)
                    .map(|(m, _)| *m);
                if let Some(oldest) = oldest {
                    table.remove(&oldest);
                }
            }
        }

        table.insert(mac, Learned { port, seq });
    }

    /// Port `mac` was learned on at `switch`
    pub fn lookup(&self, switch: NodeId, mac: MacAddress) -> Option<Port> {
        self.tables
            .get(&switch)
            .and_then(|t| t.get(&mac).map(|l| l.port))
    }

    /// Switch (and port) that most recently learned `mac`
    pub fn locate(&self, mac: MacAddress) -> Option<(NodeId, Port)> {
        self.tables
            .iter()
            .filter_map(|t| t.value().get(&mac).map(|l| (*t.key(), *l)))
            .max_by_key(|(_, l)| l.seq)
            .map(|(id, l)| (id, l.port))
    }

    /// Drop everything learned on `switch`
    pub fn forget_switch(&self, switch: NodeId) {
        self.tables.remove(&switch);
    }

    /// Total number of entries
    pub fn len(&self) -> usize {
        self.tables.iter().map(|t| t.len()).sum()
    }

    /// No entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MacLearningTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mac(last: u8) -> MacAddress {
        MacAddress::new([0x02, 0, 0, 0, 0, last])
    }

    #[test]
    fn test_learn_overwrites() {
        let table = MacLearningTable::new();
        table.learn(NodeId(1), mac(1), Port(3));
        table.learn(NodeId(1), mac(1), Port(5));

        assert_eq!(table.lookup(NodeId(1), mac(1)), Some(Port(5)));
        assert_eq!(table.lookup(NodeId(2), mac(1)), None);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_locate_prefers_most_recent() {
        let table = MacLearningTable::new();
        table.learn(NodeId(1), mac(1), Port(3));
        table.learn(NodeId(2), mac(1), Port(7));
        assert_eq!(table.locate(mac(1)), Some((NodeId(2), Port(7))));

        table.learn(NodeId(1), mac(1), Port(4));
        assert_eq!(table.locate(mac(1)), Some((NodeId(1), Port(4))));
        assert_eq!(table.locate(mac(9)), None);
    }

    #[test]
    fn test_unbounded_by_default() {
        let table = MacLearningTable::new();
        for i in 0..=255u8 {
            table.learn(NodeId(1), mac(i), Port(1));
        }
        assert_eq!(table.len(), 256);
    }

    #[test]
    fn test_capacity_evicts_least_recently_learned() {
        let table = MacLearningTable::with_capacity(2);
        table.learn(NodeId(1), mac(1), Port(1));
        table.learn(NodeId(1), mac(2), Port(2));
        // refresh mac 1 so mac 2 becomes the oldest
        table.learn(NodeId(1), mac(1), Port(1));
        table.learn(NodeId(1), mac(3), Port(3));

        assert_eq!(table.lookup(NodeId(1), mac(1)), Some(Port(1)));
        assert_eq!(table.lookup(NodeId(1), mac(2)), None);
        assert_eq!(table.lookup(NodeId(1), mac(3)), Some(Port(3)));

        // capacity is per switch
        table.learn(NodeId(2), mac(2), Port(2));
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn test_forget_switch() {
        let table = MacLearningTable::new();
        table.learn(NodeId(1), mac(1), Port(1));
        table.learn(NodeId(2), mac(2), Port(1));
        table.forget_switch(NodeId(1));

        assert_eq!(table.lookup(NodeId(1), mac(1)), None);
        assert_eq!(table.len(), 1);
    }
}
