//! Protocol error types.

use crate::address::AddressError;
use thiserror::Error;

/// Errors related to packet framing and body parsing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("invalid packet type: {0:?}")]
    InvalidMessageType(String),

    #[error("packet too short: expected at least {expected}, got {got}")]
    MessageTooShort { expected: usize, got: usize },

    #[error("body length mismatch: header declares {declared}, got {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("body too long: max {max}, got {got}")]
    BodyTooLong { max: usize, got: usize },

    #[error("too many path entries: max {max}, got {got}")]
    TooManyEntries { max: usize, got: usize },

    #[error("unsupported protocol version: {0:?}")]
    UnsupportedVersion(String),

    #[error("malformed packet: {0}")]
    Malformed(String),

    #[error("bad address field: {0}")]
    Address(#[from] AddressError),
}
