//! Registration tests.

use super::*;

#[test]
fn test_register_command_queues_request_on_control_connection() {
    let mut member = make_member(2);
    member.handle_command(Command::Register, 0).unwrap();

    let conn = member.connections().get(&make_addr(ROOT)).unwrap();
    assert!(conn.is_control_only());

    let out = sent(&mut member);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].0, make_addr(ROOT));
    assert_eq!(
        out[0].1.payload().unwrap(),
        Payload::RegisterRequest {
            address: make_addr(2)
        }
    );
}

#[test]
fn test_root_registers_and_acknowledges() {
    let mut root = make_root();
    let peer = make_addr(2);
    root.process_packet(&Packet::register_request(peer), 0)
        .unwrap();

    assert!(root.registered_peers().unwrap().contains(&peer));
    assert!(root.connections().get(&peer).unwrap().is_control_only());

    let out = sent(&mut root);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].0, peer);
    assert_eq!(out[0].1.payload().unwrap(), Payload::RegisterResponse);
    assert_eq!(out[0].1.source(), make_addr(ROOT));
}

#[test]
fn test_duplicate_register_is_idempotent() {
    let mut root = make_root();
    let peer = make_addr(2);
    root.process_packet(&Packet::register_request(peer), 0)
        .unwrap();
    root.process_packet(&Packet::register_request(peer), 10)
        .unwrap();

    assert_eq!(root.registered_peers().unwrap().len(), 1);
    assert_eq!(root.connections().len(), 1);
    assert_eq!(sent(&mut root).len(), 1);
}

#[test]
fn test_register_claiming_other_address_is_violation() {
    let mut root = make_root();
    let packet = Packet::from_payload(
        make_addr(2),
        &Payload::RegisterRequest {
            address: make_addr(3),
        },
    )
    .unwrap();

    assert!(matches!(
        root.process_packet(&packet, 0),
        Err(EngineError::Violation { .. })
    ));
    assert!(root.registered_peers().unwrap().is_empty());
    assert!(root.connections().is_empty());
}

#[test]
fn test_register_request_to_member_is_violation() {
    let mut member = make_member(2);
    assert!(matches!(
        member.process_packet(&Packet::register_request(make_addr(3)), 0),
        Err(EngineError::Violation { .. })
    ));
}

#[test]
fn test_register_response_triggers_advertise() {
    let mut member = make_member(2);
    member.handle_command(Command::Register, 0).unwrap();
    sent(&mut member);

    member
        .process_packet(&Packet::register_response(make_addr(ROOT)), 0)
        .unwrap();

    assert!(member.is_registered());
    assert_eq!(member.drain_events(), vec![EngineEvent::Registered]);
    let out = sent(&mut member);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].0, make_addr(ROOT));
    assert_eq!(out[0].1.payload().unwrap(), Payload::AdvertiseRequest);
}

#[test]
fn test_register_response_from_non_root_rejected() {
    let mut member = make_member(2);
    assert!(matches!(
        member.process_packet(&Packet::register_response(make_addr(7)), 0),
        Err(EngineError::Violation { .. })
    ));
    assert!(!member.is_registered());
}

#[test]
fn test_register_response_must_be_ack() {
    let mut member = make_member(2);
    let nak = Packet::new(PacketType::Register, make_addr(ROOT), b"RESNAK".to_vec()).unwrap();
    assert!(matches!(
        member.process_packet(&nak, 0),
        Err(EngineError::Protocol(_))
    ));
    assert!(!member.is_registered());
    assert!(sent(&mut member).is_empty());
}
