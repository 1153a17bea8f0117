//! Treemesh: a self-organizing tree overlay network
//!
//! Peers register with a single root, are assigned a place in a shallow
//! binary-branching tree, broadcast messages along the tree's edges and
//! prove their path to the root alive with a relayed heartbeat.

pub mod address;
pub mod command;
pub mod config;
pub mod connection;
pub mod engine;
pub mod graph;
pub mod node;
pub mod protocol;
pub mod transport;

// Re-export address types
pub use address::{Address, AddressError};

// Re-export command types
pub use command::{Command, CommandError};

// Re-export config types
pub use config::{Config, ConfigError, NodeConfig, ReunionConfig, TransportConfig};

// Re-export connection types
pub use connection::{ConnectionEntry, ConnectionKind, ConnectionTable};

// Re-export engine types
pub use engine::{EngineError, EngineEvent, PeerEngine};

// Re-export graph types
pub use graph::{GraphError, GraphNode, OverlayGraph};

// Re-export protocol types
pub use protocol::{Packet, PacketType, Payload, ProtocolError, ReunionKind};

// Re-export transport types
pub use transport::tcp::TcpTransport;
pub use transport::{packet_channel, PacketRx, PacketTx, ReceivedPacket, TransportError, TransportState};

// Re-export node types
pub use node::{EventRx, Node, NodeError, NodeState};
