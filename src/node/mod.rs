//! Treemesh Node Entity
//!
//! Top-level structure representing a running overlay peer. The Node owns
//! the protocol engine, the TCP transport and the inbound packet channel,
//! and drives all of them from a single event loop so engine state never
//! needs locking.

mod handlers;
mod lifecycle;

use crate::address::Address;
use crate::config::{Config, ConfigError};
use crate::engine::{EngineEvent, PeerEngine};
use crate::transport::tcp::TcpTransport;
use crate::transport::{now_ms, PacketRx, TransportError};
use std::fmt;
use std::net::SocketAddr;
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors related to node operations.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("node not started")]
    NotStarted,

    #[error("node already started")]
    AlreadyStarted,

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Node operational state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeState {
    /// Created but not started.
    Created,
    /// Starting up (binding the transport).
    Starting,
    /// Fully operational.
    Running,
    /// Shutting down.
    Stopping,
    /// Stopped.
    Stopped,
}

impl NodeState {
    /// Check if node is operational.
    pub fn is_operational(&self) -> bool {
        matches!(self, NodeState::Running)
    }

    /// Check if node can be started.
    pub fn can_start(&self) -> bool {
        matches!(self, NodeState::Created | NodeState::Stopped)
    }

    /// Check if node can be stopped.
    pub fn can_stop(&self) -> bool {
        matches!(self, NodeState::Running)
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeState::Created => "created",
            NodeState::Starting => "starting",
            NodeState::Running => "running",
            NodeState::Stopping => "stopping",
            NodeState::Stopped => "stopped",
        };
        write!(f, "{}", s)
    }
}

/// Receiver for engine events published by a running node.
pub type EventRx = mpsc::Receiver<EngineEvent>;

/// A running overlay peer.
pub struct Node {
    /// Loaded configuration.
    config: Config,

    /// This peer's overlay address.
    address: Address,

    /// Node operational state.
    state: NodeState,

    /// Protocol state machine.
    engine: PeerEngine,

    /// TCP transport (present once started).
    transport: Option<TcpTransport>,

    /// Inbound packets from the transport, taken by the event loop.
    packet_rx: Option<PacketRx>,

    /// Optional subscriber for engine events.
    event_tx: Option<mpsc::Sender<EngineEvent>>,
}

impl Node {
    /// Create a node from configuration.
    ///
    /// Validates the configuration and builds a root or member engine
    /// depending on `node.root`.
    pub fn new(config: Config) -> Result<Self, NodeError> {
        config.validate()?;

        let address = config.listen_address()?;
        let timing = config.node.reunion.clone();
        let engine = match config.root_address()? {
            None => PeerEngine::new_root(address, timing, now_ms()),
            Some(root) => PeerEngine::new_member(address, root, timing),
        };

        Ok(Self {
            config,
            address,
            state: NodeState::Created,
            engine,
            transport: None,
            packet_rx: None,
            event_tx: None,
        })
    }

    // === Accessors ===

    /// This peer's overlay address.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Current operational state.
    pub fn state(&self) -> NodeState {
        self.state
    }

    /// Loaded configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Protocol engine.
    pub fn engine(&self) -> &PeerEngine {
        &self.engine
    }

    /// Check if this node is the overlay root.
    pub fn is_root(&self) -> bool {
        self.engine.is_root()
    }

    /// Socket the transport is bound to, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.transport.as_ref().and_then(|t| t.local_addr())
    }

    /// Subscribe to engine events.
    ///
    /// Only one subscriber is kept; a second call replaces the first.
    /// Events are dropped when the subscriber falls behind.
    pub fn subscribe(&mut self) -> EventRx {
        let (tx, rx) = mpsc::channel(self.config.transport.channel_capacity());
        self.event_tx = Some(tx);
        rx
    }
}
