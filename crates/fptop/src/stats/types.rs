//! Stable data model shared by every protocol revision.
//!
//! Whatever generation of the binary API the engine speaks, the aggregator
//! normalizes its answers into the types below before anything else sees them.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default filesystem path of the engine's statistics segment socket.
pub const DEFAULT_STATS_SOCKET: &str = "/run/fastpath/stats.sock";
/// Default filesystem path of the engine's binary API socket.
pub const DEFAULT_BINAPI_SOCKET: &str = "/run/fastpath/api.sock";

/// Well-known local transport paths for a direct engine connection.
#[derive(Debug, Clone)]
pub struct EnginePaths {
    /// Statistics segment socket.
    pub stats_socket: PathBuf,
    /// Binary API socket.
    pub binapi_socket: PathBuf,
}

impl Default for EnginePaths {
    fn default() -> Self {
        Self {
            stats_socket: PathBuf::from(DEFAULT_STATS_SOCKET),
            binapi_socket: PathBuf::from(DEFAULT_BINAPI_SOCKET),
        }
    }
}

/// A packets/bytes counter pair.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombinedCounter {
    pub packets: u64,
    pub bytes: u64,
}

/// Live per-interface counters as reported by the statistics segment.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceCounters {
    /// Interface name, the key used for cross-sample correlation.
    pub name: String,
    /// Interface index, the key used for protocol correlation.
    pub index: u32,
    pub rx: CombinedCounter,
    pub tx: CombinedCounter,
    pub rx_errors: u64,
    pub tx_errors: u64,
    pub rx_unicast: CombinedCounter,
    pub rx_multicast: CombinedCounter,
    pub rx_broadcast: CombinedCounter,
    /// Unicast-miss on the transmit side.
    pub tx_unicast: CombinedCounter,
    pub tx_multicast: CombinedCounter,
    pub tx_broadcast: CombinedCounter,
    pub rx_no_buf: u64,
    pub rx_miss: u64,
    pub drops: u64,
    pub punts: u64,
    pub ip4: u64,
    pub ip6: u64,
}

/// Administrative link state derived from the configuration view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Up,
    Down,
}

impl LinkState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkState::Up => "up",
            LinkState::Down => "down",
        }
    }
}

/// One fully-joined interface sample: live counters plus the administrative
/// view (state, MTU set, assigned addresses).
#[derive(Debug, Clone)]
pub struct InterfaceSample {
    pub counters: InterfaceCounters,
    pub state: LinkState,
    /// L3 / IP4 / IP6 / MPLS MTU.
    pub mtu: [u32; 4],
    /// Assigned addresses in CIDR notation.
    pub ip_addrs: Vec<String>,
}

impl InterfaceSample {
    pub fn name(&self) -> &str {
        &self.counters.name
    }

    pub fn index(&self) -> u32 {
        self.counters.index
    }
}

/// Administrative/configuration view of one interface, as produced by the
/// per-revision interface dump.
#[derive(Debug, Clone)]
pub struct InterfaceDetail {
    pub index: u32,
    pub name: String,
    pub enabled: bool,
    pub mtu: [u32; 4],
    pub ip_addrs: Vec<String>,
}

/// Raw scheduler-node counters as reported per worker thread.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct RuntimeCounters {
    pub name: String,
    pub index: u32,
    pub clocks: f64,
    pub vectors: u64,
    pub calls: u64,
    pub suspends: u64,
}

/// Nested runtime counter structure: one entry per worker thread.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct WorkerRuntime {
    pub thread_name: String,
    pub items: Vec<RuntimeCounters>,
}

/// One flattened scheduler-node sample with the derived vectors/call ratio.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSample {
    pub name: String,
    pub index: u32,
    pub clocks: f64,
    pub vectors: u64,
    pub calls: u64,
    pub suspends: u64,
    pub vectors_per_call: f64,
}

impl From<RuntimeCounters> for NodeSample {
    fn from(raw: RuntimeCounters) -> Self {
        let vectors_per_call = if raw.calls > 0 {
            raw.vectors as f64 / raw.calls as f64
        } else {
            0.0
        };
        Self {
            name: raw.name,
            index: raw.index,
            clocks: raw.clocks,
            vectors: raw.vectors,
            calls: raw.calls,
            suspends: raw.suspends,
            vectors_per_call,
        }
    }
}

/// A cumulative (node, counter-name) error counter as read from the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawErrorCounter {
    pub node: String,
    pub name: String,
    pub value: u64,
}

/// An error counter after baseline subtraction; only nonzero deltas surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorSample {
    pub node: String,
    pub name: String,
    pub value: u64,
}

/// Per-worker-thread identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadInfo {
    pub id: u32,
    pub name: String,
    pub kind: String,
    pub pid: u32,
    pub cpu_id: u32,
    pub core: u32,
    pub cpu_socket: u32,
}

/// Engine version identity, cached for the lifetime of a connection.
#[derive(Debug, Clone)]
pub struct VersionInfo {
    pub version: String,
    pub build_date: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_sample_derives_vectors_per_call() {
        let node = NodeSample::from(RuntimeCounters {
            name: "ip4-input".to_string(),
            index: 12,
            clocks: 4.2,
            vectors: 300,
            calls: 100,
            suspends: 0,
        });
        assert!((node.vectors_per_call - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_node_sample_zero_calls() {
        let node = NodeSample::from(RuntimeCounters {
            name: "idle".to_string(),
            ..Default::default()
        });
        assert_eq!(node.vectors_per_call, 0.0);
    }

    #[test]
    fn test_link_state_strings() {
        assert_eq!(LinkState::Up.as_str(), "up");
        assert_eq!(LinkState::Down.as_str(), "down");
    }

    #[test]
    fn test_default_paths() {
        let paths = EnginePaths::default();
        assert_eq!(paths.stats_socket, PathBuf::from(DEFAULT_STATS_SOCKET));
        assert_eq!(paths.binapi_socket, PathBuf::from(DEFAULT_BINAPI_SOCKET));
    }
}
