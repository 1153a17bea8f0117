//! Join handling.

use crate::address::Address;
use crate::connection::ConnectionKind;
use crate::engine::{EngineError, PeerEngine, Role};
use tracing::info;

impl PeerEngine {
    /// Record the sender as a direct tree edge.
    ///
    /// Joins are not authenticated. The root only accepts them from
    /// registered peers since it is the one place registration is known.
    pub(in crate::engine) fn handle_join(
        &mut self,
        from: Address,
        now_ms: u64,
    ) -> Result<(), EngineError> {
        if from == self.address {
            return Err(EngineError::violation(from, "join from our own address"));
        }
        match &mut self.role {
            Role::Root(state) => {
                if !state.registered.contains(&from) {
                    return Err(EngineError::Unregistered(from));
                }
            }
            Role::Member(state) => {
                state.neighbour_seen.insert(from, now_ms);
            }
        }

        self.connections.open(from, ConnectionKind::Tree);
        if self.neighbours.insert(from) {
            info!(peer = %from, neighbours = self.neighbours.len(), "Peer joined");
        }
        Ok(())
    }
}
