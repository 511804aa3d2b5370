//! fptop — live terminal dashboard for fastpath dataplane statistics.
//!
//! Polls a running fastpath engine for interface, scheduler-node, error,
//! memory and worker-thread statistics, normalizes them across the engine's
//! mutually-incompatible binary protocol revisions, derives per-second rates
//! and since-clear deltas, and renders a sortable multi-tab terminal view.
//!
//! # Architecture
//!
//! ```text
//!            ┌──────────────────────────── fptop ────────────────────────────┐
//!            │                                                               │
//!  engine    │  binapi (dialects per      stats (aggregator,    dashboard    │
//!  sockets ◄─┼─ protocol revision)  ◄──── baseline, joins) ◄── (1s poller, ──┼─► tui
//!            │        ▲                                         sort/format) │
//!            │        │                                                      │
//!            │  proxy (delegation endpoint: hosts or relays a connection)    │
//!            └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! A dashboard either connects to a delegation endpoint that already holds
//! the engine connection, or — when none is reachable — hosts that endpoint
//! itself and connects to it, so every consumer runs the same delegated code
//! path.

pub mod binapi;
pub mod dashboard;
pub mod format;
pub mod proxy;
pub mod stats;
pub mod tui;

#[cfg(test)]
mod testing;

// Re-export key types for convenience
pub use dashboard::{Action, Dashboard, SortSpec, Tab, TabRows};
pub use proxy::{DEFAULT_ENDPOINT_PORT, MessageRegistry, ProxyClient, ProxyServer};
pub use stats::compat::ProtocolVersion;
pub use stats::types::EnginePaths;
pub use stats::{Engine, EngineError, connect_or_host};
pub use tui::{App, run_tui};
