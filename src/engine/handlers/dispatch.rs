//! Inbound packet dispatch and transport failure handling.

use crate::address::Address;
use crate::engine::{EngineError, EngineEvent, PeerEngine, Role};
use crate::protocol::{Packet, Payload};
use tracing::{debug, info, trace, warn};

impl PeerEngine {
    /// Handle one decoded packet, logging and dropping anything invalid.
    pub fn handle_packet(&mut self, packet: &Packet, now_ms: u64) {
        if let Err(e) = self.process_packet(packet, now_ms) {
            match e {
                EngineError::Unregistered(_) => {
                    trace!(peer = %packet.source(), packet_type = %packet.packet_type(), error = %e, "Ignored packet");
                }
                _ => {
                    debug!(peer = %packet.source(), packet_type = %packet.packet_type(), error = %e, "Dropped packet");
                }
            }
        }
    }

    /// Handle one decoded packet and report why it was dropped, if it was.
    pub fn process_packet(&mut self, packet: &Packet, now_ms: u64) -> Result<(), EngineError> {
        if !packet.is_consistent() {
            return Err(EngineError::violation(
                packet.source(),
                format!(
                    "declared body length {} but carries {} bytes",
                    packet.body_length(),
                    packet.body().len()
                ),
            ));
        }

        let from = packet.source();
        let payload = packet.payload()?;

        if self.is_degraded() && !matches!(payload, Payload::AdvertiseResponse { .. }) {
            trace!(peer = %from, packet_type = %packet.packet_type(), "Degraded, ignoring packet");
            return Ok(());
        }

        match payload {
            Payload::RegisterRequest { address } => self.handle_register_request(from, address),
            Payload::RegisterResponse => self.handle_register_response(from, now_ms),
            Payload::AdvertiseRequest => self.handle_advertise_request(from, now_ms),
            Payload::AdvertiseResponse { neighbour } => {
                self.handle_advertise_response(from, neighbour, now_ms)
            }
            Payload::Join => self.handle_join(from, now_ms),
            Payload::Broadcast(body) => self.handle_message(from, body),
            Payload::ReunionHello { path } => self.handle_reunion_hello(from, path, now_ms),
            Payload::ReunionHelloBack { path } => self.handle_reunion_hello_back(from, path, now_ms),
        }
    }

    /// React to a failed send towards `address`.
    ///
    /// The connection and any tree edge to it are dropped. Losing the
    /// parent leaves the member parentless until its reunion timer
    /// declares failure and re-advertises. On the root the peer's whole
    /// subtree leaves the graph at once, so its slot can be reassigned
    /// without the peer ever coming back over capacity.
    pub fn handle_transport_failure(&mut self, address: &Address) {
        let had_connection = self.connections.close(address).is_some();
        let was_neighbour = self.neighbours.remove(address);

        if self.parent == Some(*address) {
            self.parent = None;
            warn!(parent = %address, "Lost connection to parent");
        } else if had_connection || was_neighbour {
            info!(peer = %address, "Dropped unreachable peer");
        }

        match &mut self.role {
            Role::Root(state) => {
                let evicted = state.graph.evict_subtree(address);
                if evicted.is_empty() {
                    return;
                }
                for descendant in evicted.iter().filter(|a| *a != address) {
                    self.neighbours.remove(descendant);
                    self.connections.demote(descendant);
                }
                info!(
                    peer = %address,
                    evicted = evicted.len(),
                    remaining = state.graph.len(),
                    "Evicted unreachable subtree"
                );
                self.events.push(EngineEvent::SubtreeEvicted {
                    root: *address,
                    evicted,
                });
            }
            Role::Member(state) => {
                state.neighbour_seen.remove(address);
            }
        }
    }
}
