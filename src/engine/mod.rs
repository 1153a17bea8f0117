//! Peer protocol engine.
//!
//! `PeerEngine` is the overlay state machine of one peer. It is sans-IO:
//! inbound packets, user commands and timer ticks are fed in with the
//! current time, and everything the engine wants to send is queued on its
//! [`ConnectionTable`] for the runtime to flush. Observable outcomes are
//! reported as [`EngineEvent`]s.
//!
//! The engine runs in one of two roles. The root owns the
//! [`OverlayGraph`], registers peers and assigns attachment points. A
//! member registers with the root, attaches under the neighbour it is
//! given, relays broadcasts along tree edges and proves its path to the
//! root alive with periodic reunion round trips.

mod handlers;

#[cfg(test)]
mod tests;

use crate::address::Address;
use crate::config::ReunionConfig;
use crate::connection::{ConnectionKind, ConnectionTable};
use crate::graph::{GraphError, OverlayGraph};
use crate::protocol::{Packet, ProtocolError};
use std::collections::{HashMap, HashSet};
use std::fmt;
use thiserror::Error;

/// Errors raised while handling a packet or command.
///
/// None of these are fatal. Dispatch logs them and drops the exchange.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("protocol violation from {from}: {reason}")]
    Violation { from: Address, reason: String },

    #[error("peer {0} is not registered")]
    Unregistered(Address),

    #[error("sender {0} is neither a neighbour nor the parent")]
    UnknownSender(Address),

    #[error("no connection to {0}")]
    NotConnected(Address),

    #[error("no parent to relay to")]
    NoParent,

    #[error("{operation} is not available on the {role}")]
    WrongRole {
        operation: &'static str,
        role: &'static str,
    },

    #[error("graph error: {0}")]
    Graph(#[from] GraphError),
}

impl EngineError {
    fn violation(from: Address, reason: impl Into<String>) -> Self {
        EngineError::Violation {
            from,
            reason: reason.into(),
        }
    }
}

/// Something the runtime may want to surface to the user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EngineEvent {
    /// The root acknowledged our registration.
    Registered,
    /// We adopted a new parent.
    Attached { parent: Address },
    /// A broadcast arrived from a tree neighbour.
    MessageDelivered { from: Address, text: String },
    /// A reunion round trip completed.
    ReunionConfirmed,
    /// A reunion round trip timed out; the member is now degraded.
    ReunionFailed,
    /// The root evicted a stale node and its subtree.
    SubtreeEvicted { root: Address, evicted: Vec<Address> },
}

impl fmt::Display for EngineEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineEvent::Registered => write!(f, "registered with root"),
            EngineEvent::Attached { parent } => write!(f, "attached under {}", parent),
            EngineEvent::MessageDelivered { from, text } => write!(f, "[{}] {}", from, text),
            EngineEvent::ReunionConfirmed => write!(f, "reunion confirmed"),
            EngineEvent::ReunionFailed => write!(f, "reunion failed"),
            EngineEvent::SubtreeEvicted { root, evicted } => {
                write!(f, "evicted {} ({} nodes)", root, evicted.len())
            }
        }
    }
}

/// Root-only state.
#[derive(Debug)]
pub(crate) struct RootState {
    graph: OverlayGraph,
    registered: HashSet<Address>,
    last_sweep_ms: u64,
}

/// Member-only state.
#[derive(Debug)]
pub(crate) struct MemberState {
    root: Address,
    registered: bool,
    /// Set by the first Advertise response.
    reunion_started: bool,
    reunion_pending: bool,
    last_reunion_sent_ms: u64,
    next_hello_ms: u64,
    /// Only an Advertise response is accepted while degraded.
    degraded: bool,
    last_advertise_ms: u64,
    /// Last Join or Hello seen from each neighbour.
    neighbour_seen: HashMap<Address, u64>,
}

#[derive(Debug)]
pub(crate) enum Role {
    Root(RootState),
    Member(MemberState),
}

impl Role {
    fn name(&self) -> &'static str {
        match self {
            Role::Root(_) => "root",
            Role::Member(_) => "member",
        }
    }
}

/// The overlay protocol state machine of one peer.
#[derive(Debug)]
pub struct PeerEngine {
    address: Address,
    role: Role,
    parent: Option<Address>,
    /// Direct tree edges: peers that joined us.
    neighbours: HashSet<Address>,
    connections: ConnectionTable,
    events: Vec<EngineEvent>,
    timing: ReunionConfig,
}

impl PeerEngine {
    /// Create the root engine. The graph starts with the root alone.
    pub fn new_root(address: Address, timing: ReunionConfig, now_ms: u64) -> Self {
        Self::with_role(
            address,
            Role::Root(RootState {
                graph: OverlayGraph::new(address, now_ms),
                registered: HashSet::new(),
                last_sweep_ms: now_ms,
            }),
            timing,
        )
    }

    /// Create a member engine that will register with `root`.
    pub fn new_member(address: Address, root: Address, timing: ReunionConfig) -> Self {
        Self::with_role(
            address,
            Role::Member(MemberState {
                root,
                registered: false,
                reunion_started: false,
                reunion_pending: false,
                last_reunion_sent_ms: 0,
                next_hello_ms: 0,
                degraded: false,
                last_advertise_ms: 0,
                neighbour_seen: HashMap::new(),
            }),
            timing,
        )
    }

    fn with_role(address: Address, role: Role, timing: ReunionConfig) -> Self {
        Self {
            address,
            role,
            parent: None,
            neighbours: HashSet::new(),
            connections: ConnectionTable::new(),
            events: Vec::new(),
            timing,
        }
    }

    // === Accessors ===

    /// This peer's overlay address.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Whether this engine runs as the root.
    pub fn is_root(&self) -> bool {
        matches!(self.role, Role::Root(_))
    }

    /// Current parent, `None` on the root or while unattached.
    pub fn parent(&self) -> Option<Address> {
        self.parent
    }

    /// Peers that joined us.
    pub fn neighbours(&self) -> &HashSet<Address> {
        &self.neighbours
    }

    /// Connection table.
    pub fn connections(&self) -> &ConnectionTable {
        &self.connections
    }

    /// Reunion timings.
    pub fn timing(&self) -> &ReunionConfig {
        &self.timing
    }

    /// The overlay graph (root only).
    pub fn graph(&self) -> Option<&OverlayGraph> {
        match &self.role {
            Role::Root(state) => Some(&state.graph),
            Role::Member(_) => None,
        }
    }

    /// Registered peers (root only).
    pub fn registered_peers(&self) -> Option<&HashSet<Address>> {
        match &self.role {
            Role::Root(state) => Some(&state.registered),
            Role::Member(_) => None,
        }
    }

    /// The root's address.
    pub fn root_address(&self) -> Address {
        match &self.role {
            Role::Root(_) => self.address,
            Role::Member(state) => state.root,
        }
    }

    /// Whether the root acknowledged our registration (members).
    pub fn is_registered(&self) -> bool {
        match &self.role {
            Role::Root(_) => true,
            Role::Member(state) => state.registered,
        }
    }

    /// Whether a reunion round trip is outstanding (members).
    pub fn is_reunion_pending(&self) -> bool {
        matches!(&self.role, Role::Member(state) if state.reunion_pending)
    }

    /// Whether the member is waiting for a fresh attachment point.
    pub fn is_degraded(&self) -> bool {
        matches!(&self.role, Role::Member(state) if state.degraded)
    }

    // === Outputs ===

    /// Take all queued outbound buffers for the flush step.
    pub fn drain_outbound(&mut self) -> Vec<(Address, Vec<Vec<u8>>)> {
        self.connections.drain_outbound()
    }

    /// Take all pending events.
    pub fn drain_events(&mut self) -> Vec<EngineEvent> {
        std::mem::take(&mut self.events)
    }

    // === Internal helpers ===

    /// Queue a packet on an existing connection.
    fn send(&mut self, to: Address, packet: &Packet) -> Result<(), EngineError> {
        if self.connections.enqueue(&to, packet.encode()) {
            Ok(())
        } else {
            Err(EngineError::NotConnected(to))
        }
    }

    /// Queue a packet for the root, opening the control connection first
    /// if needed.
    fn send_to_root(&mut self, packet: &Packet) -> Result<(), EngineError> {
        let root = self.root_address();
        self.connections.open(root, ConnectionKind::Control);
        self.send(root, packet)
    }

    fn wrong_role(&self, operation: &'static str) -> EngineError {
        EngineError::WrongRole {
            operation,
            role: self.role.name(),
        }
    }
}
