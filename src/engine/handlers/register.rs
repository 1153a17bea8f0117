//! Register handling.

use crate::address::Address;
use crate::connection::ConnectionKind;
use crate::engine::{EngineError, EngineEvent, PeerEngine, Role};
use crate::protocol::Packet;
use tracing::{debug, info};

impl PeerEngine {
    /// Root: record a new peer and acknowledge it over a control connection.
    ///
    /// Repeated registrations from the same address are ignored.
    pub(in crate::engine) fn handle_register_request(
        &mut self,
        from: Address,
        claimed: Address,
    ) -> Result<(), EngineError> {
        let Role::Root(state) = &mut self.role else {
            return Err(EngineError::violation(from, "register request sent to a member"));
        };
        if claimed != from {
            return Err(EngineError::violation(
                from,
                format!("register request claims address {}", claimed),
            ));
        }
        if !state.registered.insert(from) {
            debug!(peer = %from, "Duplicate registration ignored");
            return Ok(());
        }

        self.connections.open(from, ConnectionKind::Control);
        self.send(from, &Packet::register_response(self.address))?;
        info!(peer = %from, registered = self.registered_peers().map_or(0, |r| r.len()), "Registered peer");
        Ok(())
    }

    /// Member: the root acknowledged us, so ask for an attachment point.
    pub(in crate::engine) fn handle_register_response(
        &mut self,
        from: Address,
        now_ms: u64,
    ) -> Result<(), EngineError> {
        let Role::Member(state) = &mut self.role else {
            return Err(EngineError::violation(from, "register response sent to the root"));
        };
        if from != state.root {
            return Err(EngineError::violation(from, "register response from a non-root peer"));
        }
        if state.registered {
            debug!(root = %from, "Duplicate register response ignored");
            return Ok(());
        }
        state.registered = true;
        info!(root = %from, "Registered with root");
        self.events.push(EngineEvent::Registered);

        self.send_advertise(now_ms)
    }

    /// Member: send a Register request to the root.
    pub(in crate::engine) fn send_register(&mut self) -> Result<(), EngineError> {
        if self.is_root() {
            return Err(self.wrong_role("Register"));
        }
        self.send_to_root(&Packet::register_request(self.address))?;
        debug!(root = %self.root_address(), "Sent register request");
        Ok(())
    }
}
