//! Node configuration subsections.
//!
//! All the `node.*` configuration parameters: this peer's address and role,
//! the engine tick, and the reunion (heartbeat) timings.

use serde::{Deserialize, Serialize};

/// Default overlay listen address.
pub(super) const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:5000";

// ============================================================================
// Node Configuration Subsections
// ============================================================================

/// Reunion heartbeat timings (`node.reunion.*`).
///
/// The ratios between these values matter: a member must send several
/// hellos before it gives up, and the root must tolerate at least one
/// missed member cycle before evicting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReunionConfig {
    /// Member Hello send interval (`node.reunion.hello_interval_ms`).
    #[serde(default = "ReunionConfig::default_hello_interval_ms")]
    pub hello_interval_ms: u64,
    /// Member round-trip failure threshold (`node.reunion.failure_timeout_ms`).
    #[serde(default = "ReunionConfig::default_failure_timeout_ms")]
    pub failure_timeout_ms: u64,
    /// Root staleness tolerance before eviction (`node.reunion.root_timeout_ms`).
    #[serde(default = "ReunionConfig::default_root_timeout_ms")]
    pub root_timeout_ms: u64,
    /// Root failure-sweep period (`node.reunion.sweep_interval_ms`).
    #[serde(default = "ReunionConfig::default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
}

impl Default for ReunionConfig {
    fn default() -> Self {
        Self {
            hello_interval_ms: 5_000,
            failure_timeout_ms: 12_000,
            root_timeout_ms: 20_000,
            sweep_interval_ms: 1_000,
        }
    }
}

impl ReunionConfig {
    fn default_hello_interval_ms() -> u64 { 5_000 }
    fn default_failure_timeout_ms() -> u64 { 12_000 }
    fn default_root_timeout_ms() -> u64 { 20_000 }
    fn default_sweep_interval_ms() -> u64 { 1_000 }

    /// Check the interval ordering. Returns a description of the first
    /// violated constraint.
    pub fn check_ratios(&self) -> Result<(), String> {
        if self.hello_interval_ms == 0 || self.sweep_interval_ms == 0 {
            return Err("reunion intervals must be non-zero".into());
        }
        if self.hello_interval_ms >= self.failure_timeout_ms {
            return Err(format!(
                "hello_interval_ms ({}) must be less than failure_timeout_ms ({})",
                self.hello_interval_ms, self.failure_timeout_ms
            ));
        }
        if self.failure_timeout_ms >= self.root_timeout_ms {
            return Err(format!(
                "failure_timeout_ms ({}) must be less than root_timeout_ms ({})",
                self.failure_timeout_ms, self.root_timeout_ms
            ));
        }
        if self.sweep_interval_ms >= self.root_timeout_ms {
            return Err(format!(
                "sweep_interval_ms ({}) must be less than root_timeout_ms ({})",
                self.sweep_interval_ms, self.root_timeout_ms
            ));
        }
        Ok(())
    }

    /// Field-wise merge: a value that differs from the default overrides.
    pub(super) fn merge(&mut self, other: ReunionConfig) {
        let defaults = ReunionConfig::default();
        if other.hello_interval_ms != defaults.hello_interval_ms {
            self.hello_interval_ms = other.hello_interval_ms;
        }
        if other.failure_timeout_ms != defaults.failure_timeout_ms {
            self.failure_timeout_ms = other.failure_timeout_ms;
        }
        if other.root_timeout_ms != defaults.root_timeout_ms {
            self.root_timeout_ms = other.root_timeout_ms;
        }
        if other.sweep_interval_ms != defaults.sweep_interval_ms {
            self.sweep_interval_ms = other.sweep_interval_ms;
        }
    }
}

// ============================================================================
// Node Configuration (Root)
// ============================================================================

/// Node configuration (`node.*`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// This peer's overlay address, `ip:port` (`node.listen_addr`).
    /// Defaults to "127.0.0.1:5000".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listen_addr: Option<String>,

    /// Run as the overlay root (`node.root`).
    #[serde(default)]
    pub root: bool,

    /// Address of the root, required for members (`node.root_addr`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_addr: Option<String>,

    /// Engine timer granularity in milliseconds (`node.tick_interval_ms`).
    #[serde(default = "NodeConfig::default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Reunion timings (`node.reunion.*`).
    #[serde(default)]
    pub reunion: ReunionConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen_addr: None,
            root: false,
            root_addr: None,
            tick_interval_ms: 100,
            reunion: ReunionConfig::default(),
        }
    }
}

impl NodeConfig {
    fn default_tick_interval_ms() -> u64 { 100 }

    /// Listen address text, using the default if not configured.
    pub fn listen_addr(&self) -> &str {
        self.listen_addr.as_deref().unwrap_or(DEFAULT_LISTEN_ADDR)
    }

    pub(super) fn merge(&mut self, other: NodeConfig) {
        if other.listen_addr.is_some() {
            self.listen_addr = other.listen_addr;
        }
        if other.root {
            self.root = true;
        }
        if other.root_addr.is_some() {
            self.root_addr = other.root_addr;
        }
        if other.tick_interval_ms != Self::default_tick_interval_ms() {
            self.tick_interval_ms = other.tick_interval_ms;
        }
        self.reunion.merge(other.reunion);
    }
}
