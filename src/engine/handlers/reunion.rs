//! Reunion round trips.
//!
//! A Hello climbs from a member to the root, each relay appending itself
//! to the path. The root answers with a Hello-Back carrying the reversed
//! path, and every hop strips itself off the front on the way down until
//! the originating member receives a single-entry path.

use crate::address::Address;
use crate::engine::{EngineError, EngineEvent, PeerEngine, Role};
use crate::protocol::{Packet, ReunionKind};
use tracing::{debug, trace};

impl PeerEngine {
    pub(in crate::engine) fn handle_reunion_hello(
        &mut self,
        from: Address,
        path: Vec<Address>,
        now_ms: u64,
    ) -> Result<(), EngineError> {
        if path.last() != Some(&from) {
            return Err(EngineError::violation(from, "hello path does not end at the sender"));
        }
        if path.contains(&self.address) {
            return Err(EngineError::violation(from, "hello path already contains us"));
        }

        if self.is_root() {
            self.answer_hello(from, path, now_ms)
        } else {
            self.relay_hello(from, path, now_ms)
        }
    }

    /// Root: stamp every hop on the path and send the reversed path back.
    fn answer_hello(
        &mut self,
        from: Address,
        mut path: Vec<Address>,
        now_ms: u64,
    ) -> Result<(), EngineError> {
        let Role::Root(state) = &mut self.role else {
            return Err(EngineError::violation(from, "hello answered by a member"));
        };
        for hop in &path {
            state.graph.record_heartbeat(hop, now_ms);
        }
        let leaf = path[0];
        if !state.graph.contains(&leaf) {
            // Evicted: let its reunion fail so it re-advertises.
            debug!(leaf = %leaf, "Hello from a peer not in the graph");
            return Ok(());
        }

        path.reverse();
        let hops = path.len();
        let back = Packet::reunion(ReunionKind::HelloBack, self.address, &path)?;
        self.send(from, &back)?;
        trace!(leaf = %leaf, hops, "Answered reunion hello");
        Ok(())
    }

    /// Member: append ourselves and pass the hello to our parent.
    fn relay_hello(
        &mut self,
        from: Address,
        mut path: Vec<Address>,
        now_ms: u64,
    ) -> Result<(), EngineError> {
        if !self.neighbours.contains(&from) {
            return Err(EngineError::UnknownSender(from));
        }
        if let Role::Member(state) = &mut self.role {
            state.neighbour_seen.insert(from, now_ms);
        }
        let parent = self.parent.ok_or(EngineError::NoParent)?;

        path.push(self.address);
        let hello = Packet::reunion(ReunionKind::Hello, self.address, &path)?;
        self.send(parent, &hello)?;
        trace!(leaf = %path[0], parent = %parent, "Relayed reunion hello");
        Ok(())
    }

    pub(in crate::engine) fn handle_reunion_hello_back(
        &mut self,
        from: Address,
        path: Vec<Address>,
        now_ms: u64,
    ) -> Result<(), EngineError> {
        let hello_interval_ms = self.timing.hello_interval_ms;
        let Role::Member(state) = &mut self.role else {
            return Err(EngineError::violation(from, "hello-back sent to the root"));
        };
        if self.parent != Some(from) {
            return Err(EngineError::UnknownSender(from));
        }
        if path.first() != Some(&self.address) {
            return Err(EngineError::violation(from, "hello-back path does not start with us"));
        }

        if path.len() == 1 {
            if state.reunion_pending {
                state.reunion_pending = false;
                state.next_hello_ms = now_ms + hello_interval_ms;
                debug!(
                    rtt_ms = now_ms.saturating_sub(state.last_reunion_sent_ms),
                    "Reunion confirmed"
                );
                self.events.push(EngineEvent::ReunionConfirmed);
            } else {
                debug!("Stale hello-back ignored");
            }
            return Ok(());
        }

        let rest = &path[1..];
        let next = rest[0];
        if !self.neighbours.contains(&next) {
            return Err(EngineError::violation(
                from,
                format!("hello-back next hop {} is not a neighbour", next),
            ));
        }
        let back = Packet::reunion(ReunionKind::HelloBack, self.address, rest)?;
        self.send(next, &back)?;
        trace!(next = %next, remaining = rest.len(), "Relayed reunion hello-back");
        Ok(())
    }

    /// Member: send a fresh hello up the tree and mark the round trip
    /// pending. A parentless member still marks it pending so the failure
    /// timeout triggers re-advertisement.
    pub(in crate::engine) fn send_hello(&mut self, now_ms: u64) {
        if let Role::Member(state) = &mut self.role {
            state.reunion_pending = true;
            state.last_reunion_sent_ms = now_ms;
        }

        let Some(parent) = self.parent else {
            debug!("No parent, reunion hello not sent");
            return;
        };
        let result = Packet::reunion(ReunionKind::Hello, self.address, &[self.address])
            .map_err(EngineError::from)
            .and_then(|hello| self.send(parent, &hello));
        match result {
            Ok(()) => trace!(parent = %parent, "Sent reunion hello"),
            Err(e) => debug!(parent = %parent, error = %e, "Reunion hello not sent"),
        }
    }
}
