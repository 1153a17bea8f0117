//! Packet framing: the fixed 28-byte header and packet builders.

use super::error::ProtocolError;
use super::payload::{Payload, ReunionKind};
use super::PROTOCOL_VERSION;
use crate::address::Address;
use std::fmt;

/// Header size: version(1) + type(2) + body_length(5) + ip(15) + port(5).
pub const HEADER_SIZE: usize = 28;

/// Largest body expressible in the 5-digit length field.
pub const MAX_BODY_LEN: usize = 99_999;

const VERSION_RANGE: std::ops::Range<usize> = 0..1;
const TYPE_RANGE: std::ops::Range<usize> = 1..3;
const LENGTH_RANGE: std::ops::Range<usize> = 3..8;
const SOURCE_RANGE: std::ops::Range<usize> = 8..HEADER_SIZE;

/// Packet type identifiers, carried as two ASCII digits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    /// Registration with the root.
    Register = 1,
    /// Request/response for an attachment point in the tree.
    Advertise = 2,
    /// Tree edge establishment with the assigned neighbour.
    Join = 3,
    /// Broadcast text flooded along tree edges.
    Message = 4,
    /// Liveness round trip between a member and the root.
    Reunion = 5,
}

impl PacketType {
    /// Try to convert from the numeric code.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(PacketType::Register),
            2 => Some(PacketType::Advertise),
            3 => Some(PacketType::Join),
            4 => Some(PacketType::Message),
            5 => Some(PacketType::Reunion),
            _ => None,
        }
    }

    /// Numeric code.
    pub fn code(self) -> u8 {
        self as u8
    }

    fn from_field(field: &[u8]) -> Result<Self, ProtocolError> {
        let invalid = || ProtocolError::InvalidMessageType(String::from_utf8_lossy(field).into());
        let code = parse_digits(field).ok_or_else(invalid)?;
        u8::try_from(code)
            .ok()
            .and_then(Self::from_code)
            .ok_or_else(invalid)
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PacketType::Register => "Register",
            PacketType::Advertise => "Advertise",
            PacketType::Join => "Join",
            PacketType::Message => "Message",
            PacketType::Reunion => "Reunion",
        };
        write!(f, "{}", name)
    }
}

/// Parse an all-ASCII-digit field. Returns `None` on any other byte.
fn parse_digits(field: &[u8]) -> Option<usize> {
    if field.is_empty() || !field.iter().all(u8::is_ascii_digit) {
        return None;
    }
    field
        .iter()
        .try_fold(0usize, |acc, b| acc.checked_mul(10)?.checked_add((b - b'0') as usize))
}

/// A framed overlay packet.
///
/// Built once, either by [`Packet::decode`] or by one of the builder
/// constructors, and never mutated afterwards. `body_length` always equals
/// `body.len()` for packets produced by this module.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Packet {
    version: u8,
    packet_type: PacketType,
    body_length: usize,
    source: Address,
    body: Vec<u8>,
}

impl Packet {
    /// Create a packet from a raw body.
    pub fn new(packet_type: PacketType, source: Address, body: Vec<u8>) -> Result<Self, ProtocolError> {
        if body.len() > MAX_BODY_LEN {
            return Err(ProtocolError::BodyTooLong {
                max: MAX_BODY_LEN,
                got: body.len(),
            });
        }
        Ok(Self::build(packet_type, source, body))
    }

    /// Create a packet carrying a typed payload.
    pub fn from_payload(source: Address, payload: &Payload) -> Result<Self, ProtocolError> {
        Self::new(payload.packet_type(), source, payload.encode()?)
    }

    fn build(packet_type: PacketType, source: Address, body: Vec<u8>) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            packet_type,
            body_length: body.len(),
            source,
            body,
        }
    }

    // === Builders ===

    /// Register request carrying the requester's own address.
    pub fn register_request(source: Address) -> Self {
        let mut body = Vec::with_capacity(3 + Address::WIRE_SIZE);
        body.extend_from_slice(b"REQ");
        source.write_wire(&mut body);
        Self::build(PacketType::Register, source, body)
    }

    /// Register response acknowledging a registration.
    pub fn register_response(source: Address) -> Self {
        Self::build(PacketType::Register, source, b"RESACK".to_vec())
    }

    /// Advertise request asking the root for an attachment point.
    pub fn advertise_request(source: Address) -> Self {
        Self::build(PacketType::Advertise, source, b"REQ".to_vec())
    }

    /// Advertise response naming the neighbour to attach under.
    pub fn advertise_response(source: Address, neighbour: Address) -> Self {
        let mut body = Vec::with_capacity(3 + Address::WIRE_SIZE);
        body.extend_from_slice(b"RES");
        neighbour.write_wire(&mut body);
        Self::build(PacketType::Advertise, source, body)
    }

    /// Join sent to the assigned neighbour.
    pub fn join(source: Address) -> Self {
        Self::build(PacketType::Join, source, b"JOIN".to_vec())
    }

    /// Broadcast text.
    pub fn message(source: Address, text: &str) -> Result<Self, ProtocolError> {
        Self::new(PacketType::Message, source, text.as_bytes().to_vec())
    }

    /// Reunion Hello (`path` ordered leaf to current hop) or Hello-Back
    /// (`path` ordered current hop to leaf).
    pub fn reunion(kind: ReunionKind, source: Address, path: &[Address]) -> Result<Self, ProtocolError> {
        let payload = match kind {
            ReunionKind::Hello => Payload::ReunionHello { path: path.to_vec() },
            ReunionKind::HelloBack => Payload::ReunionHelloBack { path: path.to_vec() },
        };
        Self::from_payload(source, &payload)
    }

    // === Accessors ===

    /// Protocol version.
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Packet type.
    pub fn packet_type(&self) -> PacketType {
        self.packet_type
    }

    /// Body length as declared in the header.
    pub fn body_length(&self) -> usize {
        self.body_length
    }

    /// Listening address of the sender.
    pub fn source(&self) -> Address {
        self.source
    }

    /// Raw body bytes.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// True when the declared length matches the body.
    pub fn is_consistent(&self) -> bool {
        self.body_length == self.body.len()
    }

    /// Interpret the body according to the packet type.
    pub fn payload(&self) -> Result<Payload, ProtocolError> {
        Payload::parse(self.packet_type, &self.body)
    }

    // === Codec ===

    /// Serialize to wire format.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_SIZE + self.body.len());
        buf.extend_from_slice(format!("{:01}", self.version).as_bytes());
        buf.extend_from_slice(format!("{:02}", self.packet_type.code()).as_bytes());
        buf.extend_from_slice(format!("{:05}", self.body_length).as_bytes());
        self.source.write_wire(&mut buf);
        buf.extend_from_slice(&self.body);
        buf
    }

    /// Read the declared body length out of a header.
    ///
    /// Used by stream transports to find the packet boundary before the
    /// body has arrived.
    pub fn peek_body_length(header: &[u8]) -> Result<usize, ProtocolError> {
        if header.len() < HEADER_SIZE {
            return Err(ProtocolError::MessageTooShort {
                expected: HEADER_SIZE,
                got: header.len(),
            });
        }
        let field = &header[LENGTH_RANGE];
        parse_digits(field).ok_or_else(|| {
            ProtocolError::Malformed(format!(
                "bad body length field {:?}",
                String::from_utf8_lossy(field)
            ))
        })
    }

    /// Parse a complete packet from wire format.
    ///
    /// Only framing is validated here. The body is carried verbatim.
    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        let declared = Self::peek_body_length(buf)?;

        let version_field = &buf[VERSION_RANGE];
        let version = parse_digits(version_field)
            .and_then(|v| u8::try_from(v).ok())
            .filter(|v| *v == PROTOCOL_VERSION)
            .ok_or_else(|| {
                ProtocolError::UnsupportedVersion(String::from_utf8_lossy(version_field).into())
            })?;

        let packet_type = PacketType::from_field(&buf[TYPE_RANGE])?;

        let body = &buf[HEADER_SIZE..];
        if body.len() != declared {
            return Err(ProtocolError::LengthMismatch {
                declared,
                actual: body.len(),
            });
        }

        let source = Address::from_wire(&buf[SOURCE_RANGE])?;

        Ok(Self {
            version,
            packet_type,
            body_length: declared,
            source,
            body: body.to_vec(),
        })
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} from {} ({} bytes)",
            self.packet_type, self.source, self.body_length
        )
    }
}
