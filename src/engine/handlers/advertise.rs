//! Advertise handling: attachment point assignment and adoption.

use crate::address::Address;
use crate::connection::ConnectionKind;
use crate::engine::{EngineError, EngineEvent, PeerEngine, Role};
use crate::protocol::Packet;
use tracing::{debug, info};

impl PeerEngine {
    /// Root: choose where a registered peer attaches and tell it.
    ///
    /// The requester is attached in the graph before the response is
    /// queued, so a concurrent advertiser sees the updated child count.
    pub(in crate::engine) fn handle_advertise_request(
        &mut self,
        from: Address,
        now_ms: u64,
    ) -> Result<(), EngineError> {
        let root = self.address;
        let Role::Root(state) = &mut self.role else {
            return Err(EngineError::violation(from, "advertise request sent to a member"));
        };
        if !state.registered.contains(&from) {
            return Err(EngineError::Unregistered(from));
        }

        let previous = state.graph.get(&from).and_then(|node| node.parent());
        let neighbour = state.graph.find_attachment_point(&from);
        state.graph.attach(from, neighbour, now_ms)?;

        // A peer moving away from the root is no longer our tree edge.
        if previous == Some(root) && neighbour != root && self.neighbours.remove(&from) {
            self.connections.demote(&from);
        }

        self.connections.open(from, ConnectionKind::Control);
        self.send(from, &Packet::advertise_response(root, neighbour))?;
        info!(peer = %from, neighbour = %neighbour, "Assigned attachment point");
        Ok(())
    }

    /// Member: adopt the assigned neighbour as parent and join it.
    pub(in crate::engine) fn handle_advertise_response(
        &mut self,
        from: Address,
        neighbour: Address,
        now_ms: u64,
    ) -> Result<(), EngineError> {
        let hello_interval_ms = self.timing.hello_interval_ms;
        let Role::Member(state) = &mut self.role else {
            return Err(EngineError::violation(from, "advertise response sent to the root"));
        };
        if from != state.root {
            return Err(EngineError::violation(from, "advertise response from a non-root peer"));
        }
        if neighbour == self.address {
            return Err(EngineError::violation(from, "offered ourselves as neighbour"));
        }
        let root = state.root;

        if !state.reunion_started {
            state.reunion_started = true;
            debug!("Reunion timer started");
        }
        state.reunion_pending = false;
        state.degraded = false;
        state.next_hello_ms = now_ms + hello_interval_ms;

        if let Some(old) = self.parent.take()
            && old != neighbour
        {
            self.neighbours.remove(&old);
            if old == root {
                self.connections.demote(&old);
            } else {
                self.connections.close(&old);
            }
            debug!(old_parent = %old, "Dropped previous parent");
        }

        self.parent = Some(neighbour);
        self.connections.open(neighbour, ConnectionKind::Tree);
        self.send(neighbour, &Packet::join(self.address))?;

        info!(parent = %neighbour, "Attached to overlay");
        self.events.push(EngineEvent::Attached { parent: neighbour });
        Ok(())
    }

    /// Member: ask the root for an attachment point.
    pub(in crate::engine) fn send_advertise(&mut self, now_ms: u64) -> Result<(), EngineError> {
        if self.is_root() {
            return Err(self.wrong_role("Advertise"));
        }
        if let Role::Member(state) = &mut self.role {
            state.last_advertise_ms = now_ms;
        }
        self.send_to_root(&Packet::advertise_request(self.address))?;
        debug!(root = %self.root_address(), "Sent advertise request");
        Ok(())
    }
}
