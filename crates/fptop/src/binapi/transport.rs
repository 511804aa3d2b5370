//! Unix-socket transports for the engine's statistics segment and binary API.
//!
//! Both sockets speak the same framing: a little-endian `u32` length prefix
//! followed by one JSON document. The binary API socket carries
//! [`ApiRequest`]/[`ApiReply`] frames, the statistics socket carries
//! [`StatsRequest`]/[`StatsReply`] frames. The delegation endpoint reuses the
//! exact same frame types over TCP, so relaying is a pure forward.

use crate::binapi::{BinapiChannel, ChannelError, MessageSig, StatsChannel};
use crate::stats::types::{InterfaceCounters, RawErrorCounter, WorkerRuntime};
use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::sync::Mutex;

/// Upper bound on a single frame; anything larger is a protocol violation.
const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Owned form of a [`MessageSig`], used where signatures cross the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct MessageId {
    pub name: String,
    pub crc: String,
}

impl From<&MessageSig> for MessageId {
    fn from(sig: &MessageSig) -> Self {
        Self {
            name: sig.name.to_string(),
            crc: sig.crc.to_string(),
        }
    }
}

/// Frames sent to the binary API socket.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub(crate) enum ApiRequest {
    Call {
        name: String,
        crc: String,
        body: serde_json::Value,
    },
    Compat {
        msgs: Vec<MessageId>,
    },
}

/// Frames received from the binary API socket.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub(crate) enum ApiReply {
    Reply { body: serde_json::Value },
    Error { message: String },
}

/// Frames sent to the statistics socket.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum StatsRequest {
    InterfaceCounters,
    WorkerRuntime,
    ErrorCounters,
}

/// Frames received from the statistics socket.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub(crate) enum StatsReply {
    Interfaces { interfaces: Vec<InterfaceCounters> },
    Runtime { workers: Vec<WorkerRuntime> },
    Errors { counters: Vec<RawErrorCounter> },
    Error { message: String },
}

/// Write one length-prefixed JSON frame.
pub(crate) async fn write_frame<W, T>(writer: &mut W, frame: &T) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let body = serde_json::to_vec(frame).map_err(|err| io::Error::other(err))?;
    if body.len() > MAX_FRAME_LEN {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "frame too large"));
    }
    writer.write_u32_le(body.len() as u32).await?;
    writer.write_all(&body).await?;
    writer.flush().await
}

/// Read one length-prefixed JSON frame.
pub(crate) async fn read_frame<R, T>(reader: &mut R) -> io::Result<T>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let len = reader.read_u32_le().await? as usize;
    if len > MAX_FRAME_LEN {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "frame too large"));
    }
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    serde_json::from_slice(&body).map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
}

/// Client for the engine's binary API socket. One socket connection backs one
/// channel; requests on a channel are strictly serialized.
pub struct BinapiSocket {
    stream: Mutex<UnixStream>,
}

impl BinapiSocket {
    pub async fn connect(path: &Path) -> Result<Self, ChannelError> {
        let stream = UnixStream::connect(path).await?;
        Ok(Self {
            stream: Mutex::new(stream),
        })
    }

    pub(crate) async fn roundtrip(&self, req: &ApiRequest) -> Result<ApiReply, ChannelError> {
        let mut stream = self.stream.lock().await;
        write_frame(&mut *stream, req).await?;
        Ok(read_frame(&mut *stream).await?)
    }
}

#[async_trait]
impl BinapiChannel for BinapiSocket {
    async fn request(&self, msg: &MessageSig, body: Bytes) -> Result<Bytes, ChannelError> {
        let body = serde_json::from_slice(&body).map_err(|source| ChannelError::Encode {
            name: msg.name.to_string(),
            source,
        })?;
        let req = ApiRequest::Call {
            name: msg.name.to_string(),
            crc: msg.crc.to_string(),
            body,
        };
        match self.roundtrip(&req).await? {
            ApiReply::Reply { body } => {
                let bytes = serde_json::to_vec(&body).map_err(|source| ChannelError::Decode {
                    name: msg.name.to_string(),
                    source,
                })?;
                Ok(Bytes::from(bytes))
            }
            ApiReply::Error { message } => Err(ChannelError::Rejected {
                name: msg.name.to_string(),
                reason: message,
            }),
        }
    }

    async fn check_compatibility(&self, msgs: &[MessageSig]) -> Result<(), ChannelError> {
        let req = ApiRequest::Compat {
            msgs: msgs.iter().map(MessageId::from).collect(),
        };
        match self.roundtrip(&req).await? {
            ApiReply::Reply { .. } => Ok(()),
            ApiReply::Error { message } => Err(ChannelError::Incompatible(message)),
        }
    }
}

/// Client for the engine's statistics segment socket.
pub struct StatsSocket {
    stream: Mutex<UnixStream>,
}

impl StatsSocket {
    pub async fn connect(path: &Path) -> Result<Self, ChannelError> {
        let stream = UnixStream::connect(path).await?;
        Ok(Self {
            stream: Mutex::new(stream),
        })
    }

    pub(crate) async fn roundtrip(&self, req: &StatsRequest) -> Result<StatsReply, ChannelError> {
        let mut stream = self.stream.lock().await;
        write_frame(&mut *stream, req).await?;
        Ok(read_frame(&mut *stream).await?)
    }
}

#[async_trait]
impl StatsChannel for StatsSocket {
    async fn interface_counters(&self) -> Result<Vec<InterfaceCounters>, ChannelError> {
        expect_interfaces(self.roundtrip(&StatsRequest::InterfaceCounters).await?)
    }

    async fn worker_runtime(&self) -> Result<Vec<WorkerRuntime>, ChannelError> {
        expect_runtime(self.roundtrip(&StatsRequest::WorkerRuntime).await?)
    }

    async fn error_counters(&self) -> Result<Vec<RawErrorCounter>, ChannelError> {
        expect_errors(self.roundtrip(&StatsRequest::ErrorCounters).await?)
    }
}

pub(crate) fn expect_interfaces(reply: StatsReply) -> Result<Vec<InterfaceCounters>, ChannelError> {
    match reply {
        StatsReply::Interfaces { interfaces } => Ok(interfaces),
        StatsReply::Error { message } => Err(ChannelError::Rejected {
            name: "interface_counters".to_string(),
            reason: message,
        }),
        other => Err(ChannelError::Protocol(format!("{other:?}"))),
    }
}

pub(crate) fn expect_runtime(reply: StatsReply) -> Result<Vec<WorkerRuntime>, ChannelError> {
    match reply {
        StatsReply::Runtime { workers } => Ok(workers),
        StatsReply::Error { message } => Err(ChannelError::Rejected {
            name: "worker_runtime".to_string(),
            reason: message,
        }),
        other => Err(ChannelError::Protocol(format!("{other:?}"))),
    }
}

pub(crate) fn expect_errors(reply: StatsReply) -> Result<Vec<RawErrorCounter>, ChannelError> {
    match reply {
        StatsReply::Errors { counters } => Ok(counters),
        StatsReply::Error { message } => Err(ChannelError::Rejected {
            name: "error_counters".to_string(),
            reason: message,
        }),
        other => Err(ChannelError::Protocol(format!("{other:?}"))),
    }
}
