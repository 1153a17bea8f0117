//! Transport configuration (`transport.*`).

use serde::{Deserialize, Serialize};

/// Default TCP connect timeout.
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 2_000;

/// Default wait for the receiver's `ACK`.
const DEFAULT_ACK_TIMEOUT_MS: u64 = 2_000;

/// Default inbound packet channel capacity.
const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// TCP transport configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransportConfig {
    /// Connect timeout in milliseconds (`connect_timeout_ms`). Defaults to 2000.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_timeout_ms: Option<u64>,

    /// Ack timeout in milliseconds (`ack_timeout_ms`). Defaults to 2000.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack_timeout_ms: Option<u64>,

    /// Inbound channel capacity (`channel_capacity`). Defaults to 1024.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_capacity: Option<usize>,
}

impl TransportConfig {
    /// Get the connect timeout, using default if not configured.
    pub fn connect_timeout_ms(&self) -> u64 {
        self.connect_timeout_ms.unwrap_or(DEFAULT_CONNECT_TIMEOUT_MS)
    }

    /// Get the ack timeout, using default if not configured.
    pub fn ack_timeout_ms(&self) -> u64 {
        self.ack_timeout_ms.unwrap_or(DEFAULT_ACK_TIMEOUT_MS)
    }

    /// Get the inbound channel capacity, using default if not configured.
    pub fn channel_capacity(&self) -> usize {
        self.channel_capacity.unwrap_or(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Merge another transport config into this one.
    pub fn merge(&mut self, other: TransportConfig) {
        if other.connect_timeout_ms.is_some() {
            self.connect_timeout_ms = other.connect_timeout_ms;
        }
        if other.ack_timeout_ms.is_some() {
            self.ack_timeout_ms = other.ack_timeout_ms;
        }
        if other.channel_capacity.is_some() {
            self.channel_capacity = other.channel_capacity;
        }
    }
}
