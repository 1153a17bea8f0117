//! Typed packet bodies.
//!
//! The `REQ`/`RES` prefixes and fixed-width fields are decoded exactly once
//! into a [`Payload`] variant before any handler runs.

use super::error::ProtocolError;
use super::packet::PacketType;
use crate::address::Address;
use std::fmt;

/// Two-digit entry count limits a reunion path.
pub const MAX_PATH_ENTRIES: usize = 99;

const REQ: &[u8] = b"REQ";
const RES: &[u8] = b"RES";
const ACK: &[u8] = b"ACK";
const JOIN: &[u8] = b"JOIN";

/// Direction of a reunion packet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReunionKind {
    /// Upward heartbeat, path ordered leaf to current hop.
    Hello,
    /// Downward acknowledgement, path ordered current hop to leaf.
    HelloBack,
}

impl fmt::Display for ReunionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReunionKind::Hello => write!(f, "Hello"),
            ReunionKind::HelloBack => write!(f, "HelloBack"),
        }
    }
}

/// Decoded body of a packet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Payload {
    /// `REQ` + requester address.
    RegisterRequest { address: Address },
    /// `RES` + `ACK`.
    RegisterResponse,
    /// `REQ`.
    AdvertiseRequest,
    /// `RES` + assigned neighbour.
    AdvertiseResponse { neighbour: Address },
    /// `JOIN`.
    Join,
    /// Raw broadcast text.
    Broadcast(Vec<u8>),
    /// `REQ` + count + path.
    ReunionHello { path: Vec<Address> },
    /// `RES` + count + path.
    ReunionHelloBack { path: Vec<Address> },
}

impl Payload {
    /// Packet type that carries this payload.
    pub fn packet_type(&self) -> PacketType {
        match self {
            Payload::RegisterRequest { .. } | Payload::RegisterResponse => PacketType::Register,
            Payload::AdvertiseRequest | Payload::AdvertiseResponse { .. } => PacketType::Advertise,
            Payload::Join => PacketType::Join,
            Payload::Broadcast(_) => PacketType::Message,
            Payload::ReunionHello { .. } | Payload::ReunionHelloBack { .. } => PacketType::Reunion,
        }
    }

    /// Serialize to body bytes.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let mut body = Vec::new();
        match self {
            Payload::RegisterRequest { address } => {
                body.extend_from_slice(REQ);
                address.write_wire(&mut body);
            }
            Payload::RegisterResponse => {
                body.extend_from_slice(RES);
                body.extend_from_slice(ACK);
            }
            Payload::AdvertiseRequest => body.extend_from_slice(REQ),
            Payload::AdvertiseResponse { neighbour } => {
                body.extend_from_slice(RES);
                neighbour.write_wire(&mut body);
            }
            Payload::Join => body.extend_from_slice(JOIN),
            Payload::Broadcast(text) => body.extend_from_slice(text),
            Payload::ReunionHello { path } => encode_path(&mut body, REQ, path)?,
            Payload::ReunionHelloBack { path } => encode_path(&mut body, RES, path)?,
        }
        Ok(body)
    }

    /// Interpret a body for the given packet type.
    pub fn parse(packet_type: PacketType, body: &[u8]) -> Result<Self, ProtocolError> {
        match packet_type {
            PacketType::Register => {
                if let Some(rest) = body.strip_prefix(REQ) {
                    Ok(Payload::RegisterRequest {
                        address: Address::from_wire(rest)?,
                    })
                } else if let Some(rest) = body.strip_prefix(RES) {
                    if rest == ACK {
                        Ok(Payload::RegisterResponse)
                    } else {
                        Err(malformed("register response is not ACK", body))
                    }
                } else {
                    Err(malformed("register body", body))
                }
            }
            PacketType::Advertise => {
                if body == REQ {
                    Ok(Payload::AdvertiseRequest)
                } else if let Some(rest) = body.strip_prefix(RES) {
                    Ok(Payload::AdvertiseResponse {
                        neighbour: Address::from_wire(rest)?,
                    })
                } else {
                    Err(malformed("advertise body", body))
                }
            }
            PacketType::Join => {
                if body == JOIN {
                    Ok(Payload::Join)
                } else {
                    Err(malformed("join body", body))
                }
            }
            PacketType::Message => Ok(Payload::Broadcast(body.to_vec())),
            PacketType::Reunion => {
                if let Some(rest) = body.strip_prefix(REQ) {
                    Ok(Payload::ReunionHello {
                        path: decode_path(rest)?,
                    })
                } else if let Some(rest) = body.strip_prefix(RES) {
                    Ok(Payload::ReunionHelloBack {
                        path: decode_path(rest)?,
                    })
                } else {
                    Err(malformed("reunion body", body))
                }
            }
        }
    }
}

fn malformed(what: &str, body: &[u8]) -> ProtocolError {
    ProtocolError::Malformed(format!("{}: {:?}", what, String::from_utf8_lossy(body)))
}

fn encode_path(body: &mut Vec<u8>, prefix: &[u8], path: &[Address]) -> Result<(), ProtocolError> {
    if path.len() > MAX_PATH_ENTRIES {
        return Err(ProtocolError::TooManyEntries {
            max: MAX_PATH_ENTRIES,
            got: path.len(),
        });
    }
    body.reserve(prefix.len() + 2 + path.len() * Address::WIRE_SIZE);
    body.extend_from_slice(prefix);
    body.extend_from_slice(format!("{:02}", path.len()).as_bytes());
    for address in path {
        address.write_wire(body);
    }
    Ok(())
}

fn decode_path(rest: &[u8]) -> Result<Vec<Address>, ProtocolError> {
    if rest.len() < 2 {
        return Err(ProtocolError::MessageTooShort {
            expected: 2,
            got: rest.len(),
        });
    }
    let (count_field, entries) = rest.split_at(2);
    if !count_field.iter().all(u8::is_ascii_digit) {
        return Err(malformed("reunion entry count", count_field));
    }
    let count = ((count_field[0] - b'0') * 10 + (count_field[1] - b'0')) as usize;

    let expected = count * Address::WIRE_SIZE;
    if entries.len() != expected {
        return Err(ProtocolError::LengthMismatch {
            declared: expected,
            actual: entries.len(),
        });
    }

    entries
        .chunks_exact(Address::WIRE_SIZE)
        .map(|chunk| Address::from_wire(chunk).map_err(ProtocolError::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> Address {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_register() {
        let a = addr("10.0.0.1:5000");
        assert_eq!(
            Payload::parse(PacketType::Register, b"REQ010.000.000.00105000"),
            Ok(Payload::RegisterRequest { address: a })
        );
        assert_eq!(
            Payload::parse(PacketType::Register, b"RESACK"),
            Ok(Payload::RegisterResponse)
        );
    }

    #[test]
    fn test_register_response_must_be_ack() {
        assert!(matches!(
            Payload::parse(PacketType::Register, b"RESNAK"),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn test_parse_advertise() {
        assert_eq!(
            Payload::parse(PacketType::Advertise, b"REQ"),
            Ok(Payload::AdvertiseRequest)
        );
        assert_eq!(
            Payload::parse(PacketType::Advertise, b"RES010.000.000.00205001"),
            Ok(Payload::AdvertiseResponse {
                neighbour: addr("10.0.0.2:5001")
            })
        );
        assert!(Payload::parse(PacketType::Advertise, b"RES010").is_err());
        assert!(Payload::parse(PacketType::Advertise, b"REQX").is_err());
    }

    #[test]
    fn test_parse_join() {
        assert_eq!(Payload::parse(PacketType::Join, b"JOIN"), Ok(Payload::Join));
        assert!(Payload::parse(PacketType::Join, b"JOINED").is_err());
    }

    #[test]
    fn test_message_body_is_opaque() {
        assert_eq!(
            Payload::parse(PacketType::Message, b"REQ anything"),
            Ok(Payload::Broadcast(b"REQ anything".to_vec()))
        );
    }

    #[test]
    fn test_reunion_path_order_preserved() {
        let leaf = addr("10.0.0.5:5005");
        let mid = addr("10.0.0.3:5003");
        let hello = Payload::ReunionHello {
            path: vec![leaf, mid],
        };
        let body = hello.encode().unwrap();
        assert_eq!(&body[..5], b"REQ02");
        assert_eq!(Payload::parse(PacketType::Reunion, &body), Ok(hello));

        let back = Payload::ReunionHelloBack {
            path: vec![mid, leaf],
        };
        let body = back.encode().unwrap();
        assert_eq!(&body[..5], b"RES02");
        assert_eq!(Payload::parse(PacketType::Reunion, &body), Ok(back));
    }

    #[test]
    fn test_reunion_count_mismatch() {
        // Declares 2 entries but carries 1.
        let result = Payload::parse(PacketType::Reunion, b"REQ02010.000.000.00105000");
        assert!(matches!(
            result,
            Err(ProtocolError::LengthMismatch {
                declared: 40,
                actual: 20
            })
        ));
    }

    #[test]
    fn test_reunion_bad_count_field() {
        assert!(matches!(
            Payload::parse(PacketType::Reunion, b"REQ0"),
            Err(ProtocolError::MessageTooShort { .. })
        ));
        assert!(matches!(
            Payload::parse(PacketType::Reunion, b"REQa1"),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn test_reunion_too_many_entries() {
        let path = vec![addr("10.0.0.1:1"); MAX_PATH_ENTRIES + 1];
        assert!(matches!(
            Payload::ReunionHello { path }.encode(),
            Err(ProtocolError::TooManyEntries { max: 99, got: 100 })
        ));
    }
}
