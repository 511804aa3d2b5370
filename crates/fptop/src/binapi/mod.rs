//! Binary API boundary.
//!
//! The engine's transport and its per-revision message definitions are a
//! black box behind two traits: [`BinapiChannel`] carries request/reply
//! messages identified by a [`MessageSig`], and [`StatsChannel`] serves the
//! typed statistics-segment dumps. Everything version-specific lives in one
//! [`EngineDialect`] implementation per supported protocol revision
//! (`v2101` .. `v2202`); adding a revision means adding a module and a
//! `ProtocolVersion` variant, never touching call sites.

pub mod transport;
pub mod v2101;
pub mod v2106;
pub mod v2202;
pub mod v2202_rc0;

use crate::stats::compat::ProtocolVersion;
use crate::stats::types::{
    InterfaceCounters, InterfaceDetail, RawErrorCounter, ThreadInfo, VersionInfo, WorkerRuntime,
};
use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use thiserror::Error;

/// Identity of one wire message: symbolic name plus the CRC of its layout.
///
/// Two revisions may share a message name while disagreeing on the layout;
/// the CRC is what actually distinguishes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageSig {
    pub name: &'static str,
    pub crc: &'static str,
}

/// Errors raised at the transport boundary.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode {name}: {source}")]
    Encode {
        name: String,
        source: serde_json::Error,
    },
    #[error("failed to decode {name} reply: {source}")]
    Decode {
        name: String,
        source: serde_json::Error,
    },
    #[error("{name} rejected by engine: {reason}")]
    Rejected { name: String, reason: String },
    #[error("message {0} is not registered for delegation")]
    Unregistered(String),
    #[error("incompatible message set: {0}")]
    Incompatible(String),
    #[error("unexpected reply: {0}")]
    Protocol(String),
}

/// One request/reply channel into the engine's binary API.
#[async_trait]
pub trait BinapiChannel: Send + Sync {
    /// Round-trip a single message; the body is the dialect-encoded payload.
    async fn request(&self, msg: &MessageSig, body: Bytes) -> Result<Bytes, ChannelError>;

    /// Verify that every signature in `msgs` is known to the engine side.
    async fn check_compatibility(&self, msgs: &[MessageSig]) -> Result<(), ChannelError>;
}

/// Typed access to the statistics segment.
#[async_trait]
pub trait StatsChannel: Send + Sync {
    async fn interface_counters(&self) -> Result<Vec<InterfaceCounters>, ChannelError>;
    async fn worker_runtime(&self) -> Result<Vec<WorkerRuntime>, ChannelError>;
    async fn error_counters(&self) -> Result<Vec<RawErrorCounter>, ChannelError>;
}

/// One protocol revision's full capability set, bound to concrete wire
/// messages for that revision.
#[async_trait]
pub trait EngineDialect: Send + Sync + std::fmt::Debug {
    fn version(&self) -> ProtocolVersion;

    /// Core message table; also what the compatibility probe checks.
    fn messages(&self) -> &'static [MessageSig];

    /// Tunneling/overlay extension tables (GRE, VXLAN-GPE). Never called by
    /// the dashboard itself, but they must be registered so delegated peers
    /// agree on the full message set.
    fn overlay_messages(&self) -> &'static [MessageSig];

    async fn show_threads(&self, chan: &dyn BinapiChannel)
    -> Result<Vec<ThreadInfo>, ChannelError>;

    async fn dump_interfaces(
        &self,
        chan: &dyn BinapiChannel,
    ) -> Result<HashMap<u32, InterfaceDetail>, ChannelError>;

    async fn version_info(&self, chan: &dyn BinapiChannel) -> Result<VersionInfo, ChannelError>;

    async fn run_cli(
        &self,
        chan: &dyn BinapiChannel,
        command: &str,
    ) -> Result<String, ChannelError>;
}

/// Encode a request, round-trip it, decode the reply.
pub(crate) async fn typed_request<Req, Reply>(
    chan: &dyn BinapiChannel,
    msg: &MessageSig,
    req: &Req,
) -> Result<Reply, ChannelError>
where
    Req: Serialize + Sync,
    Reply: DeserializeOwned,
{
    let body = serde_json::to_vec(req).map_err(|source| ChannelError::Encode {
        name: msg.name.to_string(),
        source,
    })?;
    let reply = chan.request(msg, Bytes::from(body)).await?;
    serde_json::from_slice(&reply).map_err(|source| ChannelError::Decode {
        name: msg.name.to_string(),
        source,
    })
}

/// Map a nonzero engine return value to a rejection error.
pub(crate) fn check_retval(name: &str, retval: i32) -> Result<(), ChannelError> {
    if retval != 0 {
        return Err(ChannelError::Rejected {
            name: name.to_string(),
            reason: format!("retval {retval}"),
        });
    }
    Ok(())
}
