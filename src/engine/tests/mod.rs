//! Engine tests.
//!
//! Single-engine tests feed packets in by hand. Multi-peer scenarios use
//! [`Mesh`], which shuttles queued packets between engines in memory.

use super::*;
use crate::command::Command;
use crate::protocol::{Packet, PacketType, Payload, ReunionKind};
use std::collections::BTreeMap;

mod register;

pub(super) const ROOT: u8 = 1;

pub(super) fn make_addr(val: u8) -> Address {
    Address::new([10, 0, 0, val], 5000)
}

pub(super) fn timing() -> ReunionConfig {
    ReunionConfig::default()
}

pub(super) fn make_root() -> PeerEngine {
    PeerEngine::new_root(make_addr(ROOT), timing(), 0)
}

pub(super) fn make_member(val: u8) -> PeerEngine {
    PeerEngine::new_member(make_addr(val), make_addr(ROOT), timing())
}

/// Decode everything the engine queued, in destination order.
pub(super) fn sent(engine: &mut PeerEngine) -> Vec<(Address, Packet)> {
    engine
        .drain_outbound()
        .into_iter()
        .flat_map(|(to, bufs)| {
            bufs.into_iter()
                .map(move |buf| (to, Packet::decode(&buf).unwrap()))
        })
        .collect()
}

/// A member that registered and was told to attach under `parent` at
/// time 0. Its outbound queue and events are cleared.
pub(super) fn attached_member(val: u8, parent: u8) -> PeerEngine {
    let root = make_addr(ROOT);
    let mut member = make_member(val);
    member.handle_command(Command::Register, 0).unwrap();
    member
        .process_packet(&Packet::register_response(root), 0)
        .unwrap();
    member
        .process_packet(&Packet::advertise_response(root, make_addr(parent)), 0)
        .unwrap();
    sent(&mut member);
    member.drain_events();
    member
}

/// Register and attach `val` on a root engine by hand, returning the
/// neighbour it was given.
pub(super) fn admit(root: &mut PeerEngine, val: u8, now_ms: u64) -> Address {
    let peer = make_addr(val);
    root.process_packet(&Packet::register_request(peer), now_ms)
        .unwrap();
    root.process_packet(&Packet::advertise_request(peer), now_ms)
        .unwrap();
    let neighbour = sent(root)
        .into_iter()
        .find_map(|(to, packet)| match packet.payload() {
            Ok(Payload::AdvertiseResponse { neighbour }) if to == peer => Some(neighbour),
            _ => None,
        })
        .unwrap();
    if neighbour == root.address() {
        root.process_packet(&Packet::join(peer), now_ms).unwrap();
    }
    neighbour
}

/// In-memory overlay: every engine keyed by address, packets delivered
/// until no engine has anything left to send.
pub(super) struct Mesh {
    engines: BTreeMap<Address, PeerEngine>,
}

impl Mesh {
    pub(super) fn new() -> Self {
        let mut engines = BTreeMap::new();
        engines.insert(make_addr(ROOT), make_root());
        Self { engines }
    }

    pub(super) fn add_member(&mut self, val: u8) {
        self.engines.insert(make_addr(val), make_member(val));
    }

    /// Add a member, register it and let the overlay settle.
    pub(super) fn join(&mut self, val: u8, now_ms: u64) {
        self.add_member(val);
        self.command(val, Command::Register, now_ms);
        self.run(now_ms);
    }

    pub(super) fn engine(&self, val: u8) -> &PeerEngine {
        &self.engines[&make_addr(val)]
    }

    pub(super) fn engine_mut(&mut self, val: u8) -> &mut PeerEngine {
        self.engines.get_mut(&make_addr(val)).unwrap()
    }

    pub(super) fn command(&mut self, val: u8, command: Command, now_ms: u64) {
        self.engine_mut(val).handle_command(command, now_ms).unwrap();
    }

    pub(super) fn tick(&mut self, val: u8, now_ms: u64) {
        self.engine_mut(val).tick(now_ms);
    }

    /// Deliver queued packets until quiet. Returns the number delivered.
    pub(super) fn run(&mut self, now_ms: u64) -> usize {
        let mut delivered = 0;
        for _ in 0..100 {
            let mut in_flight = Vec::new();
            for engine in self.engines.values_mut() {
                for (to, bufs) in engine.drain_outbound() {
                    in_flight.extend(bufs.into_iter().map(|buf| (to, buf)));
                }
            }
            if in_flight.is_empty() {
                return delivered;
            }
            for (to, buf) in in_flight {
                if let Some(engine) = self.engines.get_mut(&to) {
                    let packet = Packet::decode(&buf).unwrap();
                    engine.handle_packet(&packet, now_ms);
                    delivered += 1;
                }
            }
        }
        panic!("mesh did not settle");
    }

    pub(super) fn events(&mut self, val: u8) -> Vec<EngineEvent> {
        self.engine_mut(val).drain_events()
    }
}

// ===== Construction =====

#[test]
fn test_new_root() {
    let root = make_root();
    assert!(root.is_root());
    assert_eq!(root.root_address(), make_addr(ROOT));
    assert_eq!(root.graph().unwrap().len(), 1);
    assert!(root.registered_peers().unwrap().is_empty());
    assert!(root.parent().is_none());
    assert!(!root.is_degraded());
}

#[test]
fn test_new_member() {
    let member = make_member(2);
    assert!(!member.is_root());
    assert!(member.graph().is_none());
    assert!(member.registered_peers().is_none());
    assert!(!member.is_registered());
    assert!(!member.is_reunion_pending());
    assert_eq!(member.root_address(), make_addr(ROOT));
    assert!(member.connections().is_empty());
}

#[test]
fn test_malformed_body_rejected() {
    let mut root = make_root();
    let bad = Packet::new(PacketType::Join, make_addr(2), b"JOINX".to_vec()).unwrap();
    assert!(matches!(
        root.process_packet(&bad, 0),
        Err(EngineError::Protocol(_))
    ));
    assert!(root.neighbours().is_empty());
}

#[test]
fn test_commands_refused_on_root() {
    let mut root = make_root();
    assert!(matches!(
        root.handle_command(Command::Register, 0),
        Err(EngineError::WrongRole { role: "root", .. })
    ));
    assert!(matches!(
        root.handle_command(Command::Advertise, 0),
        Err(EngineError::WrongRole { .. })
    ));
    assert!(root.connections().is_empty());
}

// ===== Scenario =====

#[test]
fn test_three_advertisers_fill_root_then_descend() {
    let mut mesh = Mesh::new();
    for val in [2, 3, 4] {
        mesh.join(val, 0);
    }

    let root = make_addr(ROOT);
    assert_eq!(mesh.engine(2).parent(), Some(root));
    assert_eq!(mesh.engine(3).parent(), Some(root));
    assert_eq!(mesh.engine(4).parent(), Some(make_addr(2)));

    let expected: HashSet<Address> = [make_addr(2), make_addr(3)].into();
    assert_eq!(mesh.engine(ROOT).neighbours(), &expected);
    assert!(mesh.engine(2).neighbours().contains(&make_addr(4)));

    assert_eq!(
        mesh.events(4),
        vec![
            EngineEvent::Registered,
            EngineEvent::Attached {
                parent: make_addr(2)
            }
        ]
    );
}

#[test]
fn test_members_keep_control_connection_to_root() {
    let mut mesh = Mesh::new();
    for val in [2, 3, 4] {
        mesh.join(val, 0);
    }
    let leaf = mesh.engine(4);
    let to_root = leaf.connections().get(&make_addr(ROOT)).unwrap();
    assert!(to_root.is_control_only());
    assert!(!leaf.connections().get(&make_addr(2)).unwrap().is_control_only());

    // Attached directly under the root, the same connection is a tree edge.
    let child = mesh.engine(2);
    assert!(!child.connections().get(&make_addr(ROOT)).unwrap().is_control_only());
}
