//! Protocol version resolution.
//!
//! The engine exposes one of a small closed set of mutually-incompatible
//! binary protocol revisions. The resolver probes the administrative channel
//! against each revision's message table in a fixed priority order and binds
//! the first one that passes — first match, never best match. When no
//! revision matches the connection is unusable; the caller must reconnect
//! against a different engine instance.

use crate::binapi::{BinapiChannel, EngineDialect, v2101, v2106, v2202, v2202_rc0};
use crate::proxy::MessageRegistry;
use std::fmt;
use thiserror::Error;
use tracing::debug;

/// One supported protocol revision. Immutable once bound to a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolVersion {
    V2101,
    V2106,
    V2202Rc0,
    V2202,
}

impl ProtocolVersion {
    /// Probe order. This is a documented constant, not a semantic ranking:
    /// newest release first, release candidates after their final build.
    pub const PRIORITY: [ProtocolVersion; 4] = [
        ProtocolVersion::V2202,
        ProtocolVersion::V2202Rc0,
        ProtocolVersion::V2106,
        ProtocolVersion::V2101,
    ];

    /// Release tag as printed by the engine.
    pub fn release(&self) -> &'static str {
        match self {
            ProtocolVersion::V2101 => "21.01",
            ProtocolVersion::V2106 => "21.06",
            ProtocolVersion::V2202Rc0 => "22.02_rc0",
            ProtocolVersion::V2202 => "22.02",
        }
    }

    /// The handler bundle for this revision.
    pub fn dialect(&self) -> Box<dyn EngineDialect> {
        match self {
            ProtocolVersion::V2101 => Box::new(v2101::Dialect2101),
            ProtocolVersion::V2106 => Box::new(v2106::Dialect2106),
            ProtocolVersion::V2202Rc0 => Box::new(v2202_rc0::Dialect2202Rc0),
            ProtocolVersion::V2202 => Box::new(v2202::Dialect2202),
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.release())
    }
}

#[derive(Debug, Error)]
pub enum CompatError {
    #[error("no supported protocol version is compatible with this engine")]
    Unsupported,
}

/// Probe the channel against every known revision in priority order and
/// return the first dialect whose message table the engine accepts.
pub async fn resolve_compatible(
    chan: &dyn BinapiChannel,
) -> Result<Box<dyn EngineDialect>, CompatError> {
    for version in ProtocolVersion::PRIORITY {
        let dialect = version.dialect();
        match chan.check_compatibility(dialect.messages()).await {
            Ok(()) => {
                debug!(%version, "bound protocol version");
                return Ok(dialect);
            }
            Err(err) => debug!(%version, %err, "protocol version incompatible"),
        }
    }
    Err(CompatError::Unsupported)
}

/// Register the bound revision's full message set — core table plus the
/// tunneling/overlay extensions — for remote delegation. Must run before any
/// delegated call for that revision crosses the endpoint boundary; the
/// bootstrap sequencing enforces this.
pub fn register_messages(registry: &MessageRegistry, dialect: &dyn EngineDialect) {
    registry.register(dialect.messages());
    registry.register(dialect.overlay_messages());
}
