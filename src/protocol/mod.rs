//! Treemesh Protocol Messages
//!
//! Wire format for everything exchanged between overlay peers. Every packet
//! is plain ASCII with fixed-width fields and no delimiters:
//!
//! ```text
//! [version:1][type:2][body_length:5][source_ip:15][source_port:5][body:body_length]
//! ```
//!
//! The 28-byte header is decoded by [`Packet::decode`], which only checks
//! framing. Interpreting the body is a second, separate step
//! ([`Payload::parse`]) so a well-framed packet with an unexpected body
//! reaches the engine as a protocol violation rather than a framing error.

mod error;
mod packet;
mod payload;

pub use error::ProtocolError;
pub use packet::{Packet, PacketType, HEADER_SIZE, MAX_BODY_LEN};
pub use payload::{Payload, ReunionKind, MAX_PATH_ENTRIES};

/// Protocol version for message compatibility.
pub const PROTOCOL_VERSION: u8 = 1;
