//! Node lifecycle management: start and stop.

use super::{Node, NodeError, NodeState};
use crate::transport::packet_channel;
use crate::transport::tcp::TcpTransport;
use tracing::{info, warn};

impl Node {
    /// Start the node.
    ///
    /// Binds the TCP transport on the overlay address and transitions to
    /// the Running state. The event loop is started separately with
    /// [`Node::run`].
    pub async fn start(&mut self) -> Result<(), NodeError> {
        if !self.state.can_start() {
            return Err(NodeError::AlreadyStarted);
        }
        self.state = NodeState::Starting;

        let (packet_tx, packet_rx) = packet_channel(self.config.transport.channel_capacity());
        let mut transport = TcpTransport::new(self.address, self.config.transport.clone(), packet_tx);

        if let Err(e) = transport.start_async().await {
            self.state = NodeState::Stopped;
            return Err(e.into());
        }

        self.transport = Some(transport);
        self.packet_rx = Some(packet_rx);
        self.state = NodeState::Running;

        info!("Node started:");
        info!("    address: {}", self.address);
        info!("       role: {}", if self.is_root() { "root" } else { "member" });
        if !self.is_root() {
            info!("       root: {}", self.engine.root_address());
        }
        Ok(())
    }

    /// Stop the node.
    ///
    /// Stops the transport and drops the packet channel.
    pub async fn stop(&mut self) -> Result<(), NodeError> {
        if !self.state.can_stop() {
            return Err(NodeError::NotStarted);
        }
        self.state = NodeState::Stopping;
        info!(state = %self.state, "Node stopping");

        if let Some(mut transport) = self.transport.take()
            && let Err(e) = transport.stop_async().await
        {
            warn!(error = %e, "Transport stop failed");
        }
        self.packet_rx.take();

        self.state = NodeState::Stopped;
        info!(state = %self.state, "Node stopped");
        Ok(())
    }
}
