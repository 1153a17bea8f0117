//! Root-side overlay tree.
//!
//! The root keeps the authoritative picture of the overlay: every attached
//! peer, its parent and children, and when it last proved itself alive.
//! Nodes live in an arena keyed by [`Address`]; parent and child links are
//! address references, so the tree has no owning cycles.

use crate::address::Address;
use std::collections::{HashMap, VecDeque};
use thiserror::Error;
use tracing::debug;


/// Maximum live children a node may have.
pub const MAX_CHILDREN: usize = 2;

/// Errors related to overlay graph operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("unknown node {0}")]
    UnknownNode(Address),

    #[error("unknown parent {0}")]
    UnknownParent(Address),

    #[error("parent {0} already has {MAX_CHILDREN} live children")]
    ParentFull(Address),

    #[error("attaching {node} under {parent} would create a cycle")]
    WouldCycle { node: Address, parent: Address },

    #[error("the root cannot be re-attached or evicted")]
    RootImmutable,
}

/// A peer as seen by the root.
#[derive(Clone, Debug)]
pub struct GraphNode {
    address: Address,
    parent: Option<Address>,
    children: Vec<Address>,
    alive: bool,
    last_heartbeat_ms: u64,
}

impl GraphNode {
    fn new(address: Address, parent: Option<Address>, now_ms: u64) -> Self {
        Self {
            address,
            parent,
            children: Vec::new(),
            alive: true,
            last_heartbeat_ms: now_ms,
        }
    }

    /// This node's address.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Parent address, `None` for the root and for orphans.
    pub fn parent(&self) -> Option<Address> {
        self.parent
    }

    /// Children in attachment order.
    pub fn children(&self) -> &[Address] {
        &self.children
    }

    /// Liveness flag.
    pub fn is_alive(&self) -> bool {
        self.alive
    }

    /// Time of the last heartbeat (Unix milliseconds).
    pub fn last_heartbeat_ms(&self) -> u64 {
        self.last_heartbeat_ms
    }

    /// Whether the heartbeat is older than `timeout_ms`.
    pub fn is_stale(&self, now_ms: u64, timeout_ms: u64) -> bool {
        now_ms.saturating_sub(self.last_heartbeat_ms) > timeout_ms
    }
}

/// The overlay tree held by the root.
#[derive(Clone, Debug)]
pub struct OverlayGraph {
    root: Address,
    nodes: HashMap<Address, GraphNode>,
}

impl OverlayGraph {
    /// Create a graph containing only the root, alive.
    pub fn new(root: Address, now_ms: u64) -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(root, GraphNode::new(root, None, now_ms));
        Self { root, nodes }
    }

    /// The root address.
    pub fn root(&self) -> Address {
        self.root
    }

    /// Look up a node.
    pub fn get(&self, address: &Address) -> Option<&GraphNode> {
        self.nodes.get(address)
    }

    /// Whether a node exists.
    pub fn contains(&self, address: &Address) -> bool {
        self.nodes.contains_key(address)
    }

    /// Number of nodes, root included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// A graph always holds at least the root.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of live children of a node.
    pub fn live_children(&self, address: &Address) -> usize {
        self.nodes.get(address).map_or(0, |node| {
            node.children
                .iter()
                .filter(|child| self.nodes.get(*child).is_some_and(|c| c.alive))
                .count()
        })
    }

    /// Whether `address` lies in the subtree rooted at `subtree_root`
    /// (inclusive).
    pub fn is_in_subtree(&self, address: &Address, subtree_root: &Address) -> bool {
        let mut current = Some(*address);
        let mut hops = 0;
        while let Some(addr) = current {
            if addr == *subtree_root {
                return true;
            }
            // A corrupted parent chain cannot be longer than the arena.
            hops += 1;
            if hops > self.nodes.len() {
                return false;
            }
            current = self.nodes.get(&addr).and_then(|node| node.parent);
        }
        false
    }

    /// Choose where `requester` should attach.
    ///
    /// Breadth-first from the root over live nodes. The first node with
    /// fewer than [`MAX_CHILDREN`] live children that is outside the
    /// requester's own subtree wins. Falls back to the root.
    pub fn find_attachment_point(&self, requester: &Address) -> Address {
        let mut queue = VecDeque::from([self.root]);

        while let Some(address) = queue.pop_front() {
            if self.is_in_subtree(&address, requester) {
                continue;
            }
            let Some(node) = self.nodes.get(&address) else {
                continue;
            };
            if self.live_children(&address) < MAX_CHILDREN {
                return address;
            }
            queue.extend(
                node.children
                    .iter()
                    .filter(|child| self.nodes.get(*child).is_some_and(|c| c.alive))
                    .copied(),
            );
        }

        self.root
    }

    /// Attach `address` under `parent`.
    ///
    /// Idempotent: an existing node is re-parented (if needed) and marked
    /// alive. A parent that already has [`MAX_CHILDREN`] other live children
    /// is refused, as is any parent inside `address`'s own subtree.
    pub fn attach(&mut self, address: Address, parent: Address, now_ms: u64) -> Result<(), GraphError> {
        if address == self.root {
            return Err(GraphError::RootImmutable);
        }
        if !self.nodes.contains_key(&parent) {
            return Err(GraphError::UnknownParent(parent));
        }
        if self.is_in_subtree(&parent, &address) {
            return Err(GraphError::WouldCycle {
                node: address,
                parent,
            });
        }

        let already_child = self.nodes[&parent].children.contains(&address);
        if !already_child && self.live_children(&parent) >= MAX_CHILDREN {
            return Err(GraphError::ParentFull(parent));
        }

        match self.nodes.get_mut(&address) {
            Some(node) => {
                let old_parent = node.parent.replace(parent);
                node.alive = true;
                node.last_heartbeat_ms = now_ms;
                if old_parent != Some(parent) {
                    if let Some(old) = old_parent
                        && let Some(old_node) = self.nodes.get_mut(&old)
                    {
                        old_node.children.retain(|c| *c != address);
                    }
                    debug!(node = %address, parent = %parent, "Re-parented graph node");
                }
            }
            None => {
                self.nodes
                    .insert(address, GraphNode::new(address, Some(parent), now_ms));
            }
        }

        if let Some(parent_node) = self.nodes.get_mut(&parent)
            && !parent_node.children.contains(&address)
        {
            parent_node.children.push(address);
        }
        Ok(())
    }

    /// Mark a node alive without touching its heartbeat.
    pub fn mark_alive(&mut self, address: &Address) -> bool {
        self.set_alive(address, true)
    }

    /// Mark a node dead. It stays in the tree until evicted.
    pub fn mark_dead(&mut self, address: &Address) -> bool {
        self.set_alive(address, false)
    }

    fn set_alive(&mut self, address: &Address, alive: bool) -> bool {
        match self.nodes.get_mut(address) {
            Some(node) => {
                node.alive = alive;
                true
            }
            None => false,
        }
    }

    /// Record a heartbeat: mark alive and stamp the time.
    pub fn record_heartbeat(&mut self, address: &Address, now_ms: u64) -> bool {
        match self.nodes.get_mut(address) {
            Some(node) => {
                node.alive = true;
                node.last_heartbeat_ms = now_ms;
                true
            }
            None => false,
        }
    }

    /// Remove a single node and detach it from its parent.
    ///
    /// Does not recurse: remaining children become orphans with no parent
    /// and are no longer reachable from the root.
    pub fn evict(&mut self, address: &Address) -> Result<GraphNode, GraphError> {
        if *address == self.root {
            return Err(GraphError::RootImmutable);
        }
        let node = self
            .nodes
            .remove(address)
            .ok_or(GraphError::UnknownNode(*address))?;

        if let Some(parent) = node.parent
            && let Some(parent_node) = self.nodes.get_mut(&parent)
        {
            parent_node.children.retain(|c| c != address);
        }
        for child in &node.children {
            if let Some(child_node) = self.nodes.get_mut(child) {
                child_node.parent = None;
            }
        }
        Ok(node)
    }

    /// All addresses in the subtree rooted at `address`, deepest first,
    /// `address` itself last.
    pub fn subtree(&self, address: &Address) -> Vec<Address> {
        let mut order = Vec::new();
        let mut stack = vec![*address];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.get(&current) {
                order.push(current);
                stack.extend(node.children.iter().copied());
            }
        }
        order.reverse();
        order
    }

    /// Addresses reachable from the root through `children` links.
    pub fn reachable(&self) -> Vec<Address> {
        let mut order = Vec::new();
        let mut queue = VecDeque::from([self.root]);
        while let Some(address) = queue.pop_front() {
            if let Some(node) = self.nodes.get(&address) {
                order.push(address);
                queue.extend(node.children.iter().copied());
            }
        }
        order
    }

    /// Evict every stale node together with its whole subtree.
    ///
    /// A non-root node is stale when its last heartbeat is more than
    /// `timeout_ms` old. Descendants are marked dead and evicted before the
    /// stale node itself. Returns `(stale_node, evicted_addresses)` pairs.
    pub fn sweep(&mut self, now_ms: u64, timeout_ms: u64) -> Vec<(Address, Vec<Address>)> {
        let mut stale: Vec<Address> = self
            .nodes
            .values()
            .filter(|node| node.address != self.root && node.is_stale(now_ms, timeout_ms))
            .map(|node| node.address)
            .collect();
        stale.sort();

        let mut evicted = Vec::new();
        for address in stale {
            // Already removed as part of an earlier stale ancestor's subtree.
            if !self.nodes.contains_key(&address) {
                continue;
            }
            let doomed = self.evict_subtree(&address);
            evicted.push((address, doomed));
        }
        evicted
    }

    /// Mark `address` and every descendant dead, then evict them deepest
    /// first. Returns the evicted addresses in eviction order; empty for
    /// the root or an unknown address.
    pub fn evict_subtree(&mut self, address: &Address) -> Vec<Address> {
        if *address == self.root || !self.nodes.contains_key(address) {
            return Vec::new();
        }
        let doomed = self.subtree(address);
        for member in &doomed {
            self.mark_dead(member);
        }
        for member in &doomed {
            let _ = self.evict(member);
        }
        doomed
    }
}
