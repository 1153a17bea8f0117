//! Broadcast flooding.

use crate::address::Address;
use crate::engine::{EngineError, EngineEvent, PeerEngine};
use crate::protocol::{Packet, PacketType};
use tracing::{debug, info};

impl PeerEngine {
    /// Deliver a broadcast and forward it along every other tree edge.
    ///
    /// Loops are suppressed by topology: only traffic from a neighbour or
    /// the parent is accepted, and it never goes back where it came from.
    pub(in crate::engine) fn handle_message(
        &mut self,
        from: Address,
        body: Vec<u8>,
    ) -> Result<(), EngineError> {
        if !self.is_tree_edge(&from) {
            return Err(EngineError::UnknownSender(from));
        }

        let text = String::from_utf8_lossy(&body).into_owned();
        info!(from = %from, len = body.len(), "Received broadcast");
        self.events.push(EngineEvent::MessageDelivered { from, text });

        let forwarded = Packet::new(PacketType::Message, self.address, body)?;
        let count = self.flood(&forwarded, Some(&from));
        debug!(from = %from, targets = count, "Forwarded broadcast");
        Ok(())
    }

    /// Start a broadcast of our own.
    pub(in crate::engine) fn send_message(&mut self, text: &str) -> Result<(), EngineError> {
        let packet = Packet::message(self.address, text)?;
        let count = self.flood(&packet, None);
        if count == 0 {
            debug!("No tree edges, broadcast not sent");
        } else {
            info!(targets = count, "Sent broadcast");
        }
        Ok(())
    }

    /// Queue `packet` on every tree edge except `except`. Returns the
    /// number of targets.
    fn flood(&mut self, packet: &Packet, except: Option<&Address>) -> usize {
        let targets = self.connections.flood_targets(except);
        let encoded = packet.encode();
        for target in &targets {
            self.connections.enqueue(target, encoded.clone());
        }
        targets.len()
    }

    fn is_tree_edge(&self, address: &Address) -> bool {
        self.neighbours.contains(address) || self.parent.as_ref() == Some(address)
    }
}
