//! Periodic work: the root's failure sweep and the member reunion timer.

use crate::address::Address;
use crate::engine::{EngineEvent, PeerEngine, Role};
use tracing::{debug, info, warn};

/// What the member timer decided on this tick.
enum MemberAction {
    Idle,
    SendHello,
    Fail,
    Readvertise,
}

impl PeerEngine {
    /// Advance timers to `now_ms`.
    ///
    /// Called by the runtime on every tick. Work is only done when the
    /// relevant interval has elapsed, so the tick may be much finer than
    /// any reunion interval.
    pub fn tick(&mut self, now_ms: u64) {
        if self.is_root() {
            self.sweep(now_ms);
        } else {
            self.member_tick(now_ms);
        }
    }

    /// Root: evict stale subtrees.
    fn sweep(&mut self, now_ms: u64) {
        let Role::Root(state) = &mut self.role else {
            return;
        };
        if now_ms.saturating_sub(state.last_sweep_ms) < self.timing.sweep_interval_ms {
            return;
        }
        state.last_sweep_ms = now_ms;

        for (stale, evicted) in state.graph.sweep(now_ms, self.timing.root_timeout_ms) {
            for address in &evicted {
                self.neighbours.remove(address);
                self.connections.demote(address);
            }
            info!(
                stale = %stale,
                evicted = evicted.len(),
                remaining = state.graph.len(),
                "Evicted stale subtree"
            );
            self.events.push(EngineEvent::SubtreeEvicted {
                root: stale,
                evicted,
            });
        }
    }

    /// Member: drive hellos, detect reunion failure, retry advertise
    /// while degraded.
    fn member_tick(&mut self, now_ms: u64) {
        self.prune_silent_neighbours(now_ms);

        let action = match &self.role {
            Role::Member(state) if state.reunion_started => {
                if state.degraded {
                    if now_ms.saturating_sub(state.last_advertise_ms) >= self.timing.failure_timeout_ms {
                        MemberAction::Readvertise
                    } else {
                        MemberAction::Idle
                    }
                } else if state.reunion_pending {
                    if now_ms.saturating_sub(state.last_reunion_sent_ms) > self.timing.failure_timeout_ms {
                        MemberAction::Fail
                    } else {
                        MemberAction::Idle
                    }
                } else if now_ms >= state.next_hello_ms {
                    MemberAction::SendHello
                } else {
                    MemberAction::Idle
                }
            }
            _ => MemberAction::Idle,
        };

        match action {
            MemberAction::Idle => {}
            MemberAction::SendHello => self.send_hello(now_ms),
            MemberAction::Fail => {
                if let Role::Member(state) = &mut self.role {
                    state.reunion_pending = false;
                    state.degraded = true;
                }
                info!(
                    parent = ?self.parent,
                    timeout_ms = self.timing.failure_timeout_ms,
                    "Reunion failed, re-advertising"
                );
                self.events.push(EngineEvent::ReunionFailed);
                self.readvertise(now_ms);
            }
            MemberAction::Readvertise => {
                debug!("Still degraded, retrying advertise");
                self.readvertise(now_ms);
            }
        }
    }

    /// Member: drop children whose Hellos stopped arriving. A child that
    /// re-attached elsewhere never tells us, so silence is the only signal.
    fn prune_silent_neighbours(&mut self, now_ms: u64) {
        let Role::Member(state) = &mut self.role else {
            return;
        };
        let timeout_ms = self.timing.root_timeout_ms;
        let silent: Vec<Address> = state
            .neighbour_seen
            .iter()
            .filter(|(_, seen)| now_ms.saturating_sub(**seen) > timeout_ms)
            .map(|(address, _)| *address)
            .collect();

        for address in silent {
            state.neighbour_seen.remove(&address);
            if !self.neighbours.remove(&address) {
                continue;
            }
            if address == state.root {
                self.connections.demote(&address);
            } else if self.parent != Some(address) {
                self.connections.close(&address);
            }
            info!(peer = %address, timeout_ms, "Dropped silent neighbour");
        }
    }

    fn readvertise(&mut self, now_ms: u64) {
        if let Err(e) = self.send_advertise(now_ms) {
            warn!(error = %e, "Failed to queue advertise request");
        }
    }
}
