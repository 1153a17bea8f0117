//! Overlay peer addresses.
//!
//! Every peer is identified by the IPv4 address and TCP port it listens on.
//! On the wire and in logs the address uses a fixed-width canonical form:
//! each octet zero-padded to three digits, the port zero-padded to five.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::str::FromStr;
use thiserror::Error;

/// Width of the canonical IP text (`"192.168.001.001"`).
pub const IP_TEXT_LEN: usize = 15;

/// Width of the canonical port text (`"05000"`).
pub const PORT_TEXT_LEN: usize = 5;

/// Errors related to address parsing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("invalid ip '{0}'")]
    InvalidIp(String),

    #[error("invalid port '{0}'")]
    InvalidPort(String),

    #[error("invalid address '{0}': expected ip:port")]
    InvalidFormat(String),

    #[error("ipv6 address not supported: {0}")]
    Ipv6(SocketAddr),

    #[error("address field must be {expected} bytes, got {got}")]
    WireLength { expected: usize, got: usize },
}

/// An overlay peer address: IPv4 octets plus listening port.
///
/// Immutable once constructed. Equality, hashing and ordering all follow
/// the canonical form, so `192.168.1.1` and `192.168.001.001` are the
/// same address.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address {
    ip: [u8; 4],
    port: u16,
}

impl Address {
    /// Size of an address on the wire: 15 IP chars + 5 port chars.
    pub const WIRE_SIZE: usize = IP_TEXT_LEN + PORT_TEXT_LEN;

    /// Create an address from raw octets and port.
    pub const fn new(ip: [u8; 4], port: u16) -> Self {
        Self { ip, port }
    }

    /// Parse separate IP and port text, padded or not.
    ///
    /// Accepts `"192.168.1.1"` as well as `"192.168.001.001"`, and
    /// `"5000"` as well as `"05000"`.
    pub fn parse(ip: &str, port: &str) -> Result<Self, AddressError> {
        Ok(Self {
            ip: parse_ip(ip)?,
            port: parse_port(port)?,
        })
    }

    /// Decode the fixed-width 20-byte wire field.
    pub fn from_wire(field: &[u8]) -> Result<Self, AddressError> {
        if field.len() != Self::WIRE_SIZE {
            return Err(AddressError::WireLength {
                expected: Self::WIRE_SIZE,
                got: field.len(),
            });
        }
        let text = std::str::from_utf8(field)
            .map_err(|_| AddressError::InvalidFormat(String::from_utf8_lossy(field).into()))?;
        let (ip, port) = text.split_at(IP_TEXT_LEN);
        Self::parse(ip, port)
    }

    /// Append the fixed-width wire form (15-char IP then 5-char port).
    pub fn write_wire(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(self.canonical_ip().as_bytes());
        buf.extend_from_slice(self.canonical_port().as_bytes());
    }

    /// The IPv4 octets.
    pub fn ip(&self) -> [u8; 4] {
        self.ip
    }

    /// The TCP port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Zero-padded IP text, always 15 characters.
    pub fn canonical_ip(&self) -> String {
        let [a, b, c, d] = self.ip;
        format!("{:03}.{:03}.{:03}.{:03}", a, b, c, d)
    }

    /// Zero-padded port text, always 5 characters.
    pub fn canonical_port(&self) -> String {
        format!("{:05}", self.port)
    }

    /// Socket address used by the transport.
    pub fn socket_addr(&self) -> SocketAddrV4 {
        SocketAddrV4::new(Ipv4Addr::from(self.ip), self.port)
    }
}

fn parse_ip(ip: &str) -> Result<[u8; 4], AddressError> {
    let invalid = || AddressError::InvalidIp(ip.to_string());
    let mut octets = [0u8; 4];
    let mut parts = ip.trim().split('.');
    for octet in octets.iter_mut() {
        let part = parts.next().ok_or_else(invalid)?;
        if part.is_empty() || part.len() > 3 || !part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        *octet = part.parse().map_err(|_| invalid())?;
    }
    if parts.next().is_some() {
        return Err(invalid());
    }
    Ok(octets)
}

fn parse_port(port: &str) -> Result<u16, AddressError> {
    let port = port.trim();
    if port.is_empty() || port.len() > PORT_TEXT_LEN || !port.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AddressError::InvalidPort(port.to_string()));
    }
    port.parse()
        .map_err(|_| AddressError::InvalidPort(port.to_string()))
}

impl FromStr for Address {
    type Err = AddressError;

    /// Parse `"ip:port"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (ip, port) = s
            .rsplit_once(':')
            .ok_or_else(|| AddressError::InvalidFormat(s.to_string()))?;
        Self::parse(ip, port)
    }
}

impl From<SocketAddrV4> for Address {
    fn from(addr: SocketAddrV4) -> Self {
        Self::new(addr.ip().octets(), addr.port())
    }
}

impl TryFrom<SocketAddr> for Address {
    type Error = AddressError;

    fn try_from(addr: SocketAddr) -> Result<Self, Self::Error> {
        match addr {
            SocketAddr::V4(v4) => Ok(v4.into()),
            SocketAddr::V6(_) => Err(AddressError::Ipv6(addr)),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.canonical_ip(), self.canonical_port())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self)
    }
}
