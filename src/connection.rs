//! Per-remote outbound connection state.
//!
//! The engine never writes to the network directly. It appends encoded
//! packets to the queue of the destination's [`ConnectionEntry`]; the
//! runtime's flush step drains every queue through the transport.

use crate::address::Address;
use std::collections::{HashMap, VecDeque};
use std::fmt;

/// Purpose of a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionKind {
    /// Registration/advertise traffic with the root only. Never flooded.
    Control,
    /// A tree edge (parent or joined neighbour). Carries broadcasts.
    Tree,
}

impl fmt::Display for ConnectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionKind::Control => write!(f, "control"),
            ConnectionKind::Tree => write!(f, "tree"),
        }
    }
}

/// Outbound state for one remote address.
#[derive(Debug)]
pub struct ConnectionEntry {
    address: Address,
    outbound: VecDeque<Vec<u8>>,
    kind: ConnectionKind,
}

impl ConnectionEntry {
    fn new(address: Address, kind: ConnectionKind) -> Self {
        Self {
            address,
            outbound: VecDeque::new(),
            kind,
        }
    }

    /// Remote address.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Connection purpose.
    pub fn kind(&self) -> ConnectionKind {
        self.kind
    }

    /// Whether the connection only carries control traffic.
    pub fn is_control_only(&self) -> bool {
        self.kind == ConnectionKind::Control
    }

    /// Queued outbound buffers, oldest first.
    pub fn outbound(&self) -> impl Iterator<Item = &[u8]> {
        self.outbound.iter().map(Vec::as_slice)
    }

    /// Number of queued buffers.
    pub fn pending(&self) -> usize {
        self.outbound.len()
    }

    /// Append a buffer.
    pub fn enqueue(&mut self, buf: Vec<u8>) {
        self.outbound.push_back(buf);
    }
}

/// All connections of one peer, keyed by remote address.
///
/// There is at most one entry per address. A control connection is
/// upgraded in place when the same remote becomes a tree edge, and a tree
/// edge to the root is demoted back to control when the edge goes away.
#[derive(Debug, Default)]
pub struct ConnectionTable {
    entries: HashMap<Address, ConnectionEntry>,
}

impl ConnectionTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open (or reuse) a connection.
    ///
    /// Opening an existing control connection as [`ConnectionKind::Tree`]
    /// upgrades it. Opening an existing tree edge as control leaves it a
    /// tree edge. Returns true if a new entry was created.
    pub fn open(&mut self, address: Address, kind: ConnectionKind) -> bool {
        match self.entries.get_mut(&address) {
            Some(entry) => {
                if kind == ConnectionKind::Tree {
                    entry.kind = ConnectionKind::Tree;
                }
                false
            }
            None => {
                self.entries
                    .insert(address, ConnectionEntry::new(address, kind));
                true
            }
        }
    }

    /// Demote a tree edge to control-only. Returns true if it existed.
    pub fn demote(&mut self, address: &Address) -> bool {
        match self.entries.get_mut(address) {
            Some(entry) => {
                entry.kind = ConnectionKind::Control;
                true
            }
            None => false,
        }
    }

    /// Remove a connection and discard anything still queued.
    pub fn close(&mut self, address: &Address) -> Option<ConnectionEntry> {
        self.entries.remove(address)
    }

    /// Look up a connection.
    pub fn get(&self, address: &Address) -> Option<&ConnectionEntry> {
        self.entries.get(address)
    }

    /// Whether a connection exists.
    pub fn contains(&self, address: &Address) -> bool {
        self.entries.contains_key(address)
    }

    /// Number of connections.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over all connections.
    pub fn iter(&self) -> impl Iterator<Item = &ConnectionEntry> {
        self.entries.values()
    }

    /// Queue a buffer for `address`. Returns false when no connection
    /// exists.
    pub fn enqueue(&mut self, address: &Address, buf: Vec<u8>) -> bool {
        match self.entries.get_mut(address) {
            Some(entry) => {
                entry.enqueue(buf);
                true
            }
            None => false,
        }
    }

    /// Tree-edge destinations for a broadcast, excluding `except`.
    pub fn flood_targets(&self, except: Option<&Address>) -> Vec<Address> {
        let mut targets: Vec<Address> = self
            .entries
            .values()
            .filter(|entry| !entry.is_control_only())
            .map(|entry| entry.address)
            .filter(|address| Some(address) != except)
            .collect();
        targets.sort();
        targets
    }

    /// Take every queued buffer, grouped per destination in queue order.
    pub fn drain_outbound(&mut self) -> Vec<(Address, Vec<Vec<u8>>)> {
        let mut drained: Vec<(Address, Vec<Vec<u8>>)> = self
            .entries
            .values_mut()
            .filter(|entry| !entry.outbound.is_empty())
            .map(|entry| (entry.address, entry.outbound.drain(..).collect()))
            .collect();
        drained.sort_by_key(|(address, _)| *address);
        drained
    }

    /// Total queued buffers across all connections.
    pub fn pending(&self) -> usize {
        self.entries.values().map(ConnectionEntry::pending).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_addr(val: u8) -> Address {
        Address::new([10, 0, 0, val], 5000)
    }

    #[test]
    fn test_open_is_idempotent() {
        let mut table = ConnectionTable::new();
        assert!(table.open(make_addr(1), ConnectionKind::Control));
        assert!(!table.open(make_addr(1), ConnectionKind::Control));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_upgrade_and_demote() {
        let mut table = ConnectionTable::new();
        table.open(make_addr(1), ConnectionKind::Control);
        assert!(table.get(&make_addr(1)).unwrap().is_control_only());

        table.open(make_addr(1), ConnectionKind::Tree);
        assert_eq!(table.get(&make_addr(1)).unwrap().kind(), ConnectionKind::Tree);

        // Re-opening as control does not downgrade.
        table.open(make_addr(1), ConnectionKind::Control);
        assert_eq!(table.get(&make_addr(1)).unwrap().kind(), ConnectionKind::Tree);

        assert!(table.demote(&make_addr(1)));
        assert!(table.get(&make_addr(1)).unwrap().is_control_only());
        assert!(!table.demote(&make_addr(9)));
    }

    #[test]
    fn test_enqueue_requires_connection() {
        let mut table = ConnectionTable::new();
        assert!(!table.enqueue(&make_addr(1), b"x".to_vec()));
        table.open(make_addr(1), ConnectionKind::Tree);
        assert!(table.enqueue(&make_addr(1), b"x".to_vec()));
        assert_eq!(table.pending(), 1);
    }

    #[test]
    fn test_flood_targets_skip_control_and_source() {
        let mut table = ConnectionTable::new();
        table.open(make_addr(1), ConnectionKind::Control);
        table.open(make_addr(2), ConnectionKind::Tree);
        table.open(make_addr(3), ConnectionKind::Tree);

        assert_eq!(table.flood_targets(None), vec![make_addr(2), make_addr(3)]);
        assert_eq!(table.flood_targets(Some(&make_addr(2))), vec![make_addr(3)]);
    }

    #[test]
    fn test_drain_preserves_order() {
        let mut table = ConnectionTable::new();
        table.open(make_addr(2), ConnectionKind::Tree);
        table.open(make_addr(1), ConnectionKind::Control);
        table.enqueue(&make_addr(2), b"a".to_vec());
        table.enqueue(&make_addr(2), b"b".to_vec());
        table.enqueue(&make_addr(1), b"c".to_vec());

        let drained = table.drain_outbound();
        assert_eq!(
            drained,
            vec![
                (make_addr(1), vec![b"c".to_vec()]),
                (make_addr(2), vec![b"a".to_vec(), b"b".to_vec()]),
            ]
        );
        assert_eq!(table.pending(), 0);
        assert!(table.drain_outbound().is_empty());
    }

    #[test]
    fn test_close_discards_queue() {
        let mut table = ConnectionTable::new();
        table.open(make_addr(1), ConnectionKind::Tree);
        table.enqueue(&make_addr(1), b"lost".to_vec());
        let entry = table.close(&make_addr(1)).unwrap();
        assert_eq!(entry.pending(), 1);
        assert!(!table.contains(&make_addr(1)));
        assert_eq!(table.pending(), 0);
    }
}
