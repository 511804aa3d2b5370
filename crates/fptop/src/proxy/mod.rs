//! Delegation endpoint.
//!
//! A delegation endpoint holds the real connection to the engine and relays
//! calls from delegated clients, so that any number of dashboards can share
//! one engine without touching its sockets directly.
//!
//! # Architecture
//!
//! ```text
//!   ┌────────────┐ stats/binapi ┌──────────────────┐  framed TCP  ┌───────────┐
//!   │   engine   │◄────────────►│ delegation       │◄────────────►│ dashboard │
//!   │ (fastpath) │ unix sockets │ endpoint (:9191) │              │ (client)  │
//!   └────────────┘              └──────────────────┘◄────────────►│ dashboard │
//!                                                                 └───────────┘
//! ```
//!
//! The TCP protocol reuses the exact frame types of the engine transports, so
//! the server is a pure forwarder: stats frames go to the statistics socket,
//! API frames go to the binary API socket. Each client channel maps to one
//! TCP connection and one upstream socket connection.
//!
//! Both peers must agree on the message set of the bound protocol revision;
//! the client side enforces this with a [`MessageRegistry`] that rejects any
//! message not registered for delegation. Registration happens during
//! compatibility resolution, before the first delegated call.

use crate::binapi::transport::{
    ApiReply, ApiRequest, BinapiSocket, MessageId, StatsReply, StatsRequest, StatsSocket,
    expect_errors, expect_interfaces, expect_runtime, read_frame, write_frame,
};
use crate::binapi::{BinapiChannel, ChannelError, MessageSig, StatsChannel};
use crate::stats::types::{EnginePaths, InterfaceCounters, RawErrorCounter, WorkerRuntime};
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Default port a delegation endpoint listens on.
pub const DEFAULT_ENDPOINT_PORT: u16 = 9191;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("failed to reach delegation endpoint at {addr}: {source}")]
    Connect {
        addr: String,
        source: io::Error,
    },
    #[error("unexpected delegation endpoint handshake reply")]
    Handshake,
    #[error("engine transport unavailable: {0}")]
    Engine(#[from] ChannelError),
}

/// Frames sent from a delegated client to the endpoint.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum ProxyRequest {
    Hello,
    Stats { req: StatsRequest },
    Api { req: ApiRequest },
}

/// Frames sent from the endpoint back to a delegated client.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum ProxyReply {
    Hello,
    Stats { reply: StatsReply },
    Api { reply: ApiReply },
    Error { message: String },
}

/// Message signatures allowed to cross the delegation boundary, keyed by the
/// bound protocol revision's registration.
#[derive(Debug, Default)]
pub struct MessageRegistry {
    known: std::sync::Mutex<HashMap<String, String>>,
}

impl MessageRegistry {
    pub fn register(&self, msgs: &[MessageSig]) {
        let mut known = self.known.lock().unwrap_or_else(PoisonError::into_inner);
        for msg in msgs {
            known.insert(msg.name.to_string(), msg.crc.to_string());
        }
    }

    pub fn contains(&self, msg: &MessageSig) -> bool {
        self.known
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(msg.name)
            .is_some_and(|crc| crc == msg.crc)
    }

    pub fn len(&self) -> usize {
        self.known
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The endpoint side: accepts delegated clients and relays their frames to
/// the engine transports.
pub struct ProxyServer {
    listener: TcpListener,
    paths: EnginePaths,
}

impl ProxyServer {
    /// Bind the endpoint and verify the engine transports are reachable.
    /// Probing up front keeps a broken engine from surfacing one relay error
    /// at a time to every client.
    pub async fn bind(addr: &str, paths: EnginePaths) -> Result<Self, ProxyError> {
        StatsSocket::connect(&paths.stats_socket).await?;
        BinapiSocket::connect(&paths.binapi_socket).await?;
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, paths })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept and serve delegated clients until the listener fails.
    pub async fn serve(self) -> Result<(), ProxyError> {
        loop {
            let (stream, peer) = self.listener.accept().await?;
            debug!(%peer, "delegated client connected");
            let paths = self.paths.clone();
            tokio::spawn(async move {
                if let Err(err) = handle_client(stream, paths).await {
                    warn!(%peer, %err, "delegated client failed");
                }
            });
        }
    }
}

async fn handle_client(mut stream: TcpStream, paths: EnginePaths) -> Result<(), ProxyError> {
    // Upstream connections are opened on first use; a stats-only client never
    // touches the binary API socket.
    let mut stats: Option<StatsSocket> = None;
    let mut binapi: Option<BinapiSocket> = None;

    loop {
        let req: ProxyRequest = match read_frame(&mut stream).await {
            Ok(req) => req,
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(err) => return Err(err.into()),
        };

        let reply = match req {
            ProxyRequest::Hello => ProxyReply::Hello,
            ProxyRequest::Stats { req } => match upstream_stats(&mut stats, &paths).await {
                Ok(sock) => match sock.roundtrip(&req).await {
                    Ok(reply) => ProxyReply::Stats { reply },
                    Err(err) => ProxyReply::Error {
                        message: err.to_string(),
                    },
                },
                Err(err) => ProxyReply::Error {
                    message: err.to_string(),
                },
            },
            ProxyRequest::Api { req } => match upstream_binapi(&mut binapi, &paths).await {
                Ok(sock) => match sock.roundtrip(&req).await {
                    Ok(reply) => ProxyReply::Api { reply },
                    Err(err) => ProxyReply::Error {
                        message: err.to_string(),
                    },
                },
                Err(err) => ProxyReply::Error {
                    message: err.to_string(),
                },
            },
        };

        write_frame(&mut stream, &reply).await?;
    }
}

async fn upstream_stats<'a>(
    slot: &'a mut Option<StatsSocket>,
    paths: &EnginePaths,
) -> Result<&'a StatsSocket, ChannelError> {
    match slot {
        Some(sock) => Ok(sock),
        None => {
            let sock = StatsSocket::connect(&paths.stats_socket).await?;
            Ok(slot.insert(sock))
        }
    }
}

async fn upstream_binapi<'a>(
    slot: &'a mut Option<BinapiSocket>,
    paths: &EnginePaths,
) -> Result<&'a BinapiSocket, ChannelError> {
    match slot {
        Some(sock) => Ok(sock),
        None => {
            let sock = BinapiSocket::connect(&paths.binapi_socket).await?;
            Ok(slot.insert(sock))
        }
    }
}

/// Client side of the delegation protocol. Channel factories open one TCP
/// connection per channel; all channels share one [`MessageRegistry`].
pub struct ProxyClient {
    addr: String,
    registry: Arc<MessageRegistry>,
}

impl ProxyClient {
    /// Single connection attempt with a handshake round-trip.
    pub async fn connect(addr: &str) -> Result<Self, ProxyError> {
        // Probe connection; channels open their own streams.
        open_stream(addr).await?;
        Ok(Self {
            addr: addr.to_string(),
            registry: Arc::new(MessageRegistry::default()),
        })
    }

    /// Bounded retry with a fixed backoff. Also what absorbs the asynchronous
    /// startup of a freshly-hosted local endpoint.
    pub async fn connect_with_retry(
        addr: &str,
        attempts: u32,
        backoff: Duration,
    ) -> Result<Self, ProxyError> {
        let mut last_err = None;
        for attempt in 1..=attempts {
            match Self::connect(addr).await {
                Ok(client) => return Ok(client),
                Err(err) => {
                    debug!(attempt, %err, "delegation endpoint not reachable");
                    last_err = Some(err);
                }
            }
            if attempt < attempts {
                tokio::time::sleep(backoff).await;
            }
        }
        Err(last_err.unwrap_or(ProxyError::Handshake))
    }

    pub async fn stats_channel(&self) -> Result<ProxyStatsChannel, ProxyError> {
        let stream = open_stream(&self.addr).await?;
        Ok(ProxyStatsChannel {
            stream: Mutex::new(stream),
        })
    }

    pub async fn binapi_channel(&self) -> Result<ProxyBinapiChannel, ProxyError> {
        let stream = open_stream(&self.addr).await?;
        Ok(ProxyBinapiChannel {
            stream: Mutex::new(stream),
            registry: Arc::clone(&self.registry),
        })
    }

    pub fn registry(&self) -> &MessageRegistry {
        &self.registry
    }
}

async fn open_stream(addr: &str) -> Result<TcpStream, ProxyError> {
    let mut stream = TcpStream::connect(addr)
        .await
        .map_err(|source| ProxyError::Connect {
            addr: addr.to_string(),
            source,
        })?;
    write_frame(&mut stream, &ProxyRequest::Hello).await?;
    match read_frame(&mut stream).await? {
        ProxyReply::Hello => Ok(stream),
        _ => Err(ProxyError::Handshake),
    }
}

/// A statistics channel relayed through the endpoint.
pub struct ProxyStatsChannel {
    stream: Mutex<TcpStream>,
}

impl ProxyStatsChannel {
    async fn roundtrip(&self, req: StatsRequest) -> Result<StatsReply, ChannelError> {
        let mut stream = self.stream.lock().await;
        write_frame(&mut *stream, &ProxyRequest::Stats { req }).await?;
        match read_frame(&mut *stream).await? {
            ProxyReply::Stats { reply } => Ok(reply),
            ProxyReply::Error { message } => Err(ChannelError::Rejected {
                name: "stats".to_string(),
                reason: message,
            }),
            other => Err(ChannelError::Protocol(format!("{other:?}"))),
        }
    }
}

#[async_trait]
impl StatsChannel for ProxyStatsChannel {
    async fn interface_counters(&self) -> Result<Vec<InterfaceCounters>, ChannelError> {
        expect_interfaces(self.roundtrip(StatsRequest::InterfaceCounters).await?)
    }

    async fn worker_runtime(&self) -> Result<Vec<WorkerRuntime>, ChannelError> {
        expect_runtime(self.roundtrip(StatsRequest::WorkerRuntime).await?)
    }

    async fn error_counters(&self) -> Result<Vec<RawErrorCounter>, ChannelError> {
        expect_errors(self.roundtrip(StatsRequest::ErrorCounters).await?)
    }
}

/// A binary API channel relayed through the endpoint. Refuses to carry any
/// message whose signature has not been registered for the bound revision.
pub struct ProxyBinapiChannel {
    stream: Mutex<TcpStream>,
    registry: Arc<MessageRegistry>,
}

impl ProxyBinapiChannel {
    async fn roundtrip(&self, req: ApiRequest) -> Result<ApiReply, ChannelError> {
        let mut stream = self.stream.lock().await;
        write_frame(&mut *stream, &ProxyRequest::Api { req }).await?;
        match read_frame(&mut *stream).await? {
            ProxyReply::Api { reply } => Ok(reply),
            ProxyReply::Error { message } => Err(ChannelError::Rejected {
                name: "binapi".to_string(),
                reason: message,
            }),
            other => Err(ChannelError::Protocol(format!("{other:?}"))),
        }
    }
}

#[async_trait]
impl BinapiChannel for ProxyBinapiChannel {
    async fn request(&self, msg: &MessageSig, body: Bytes) -> Result<Bytes, ChannelError> {
        if !self.registry.contains(msg) {
            return Err(ChannelError::Unregistered(msg.name.to_string()));
        }
        let body = serde_json::from_slice(&body).map_err(|source| ChannelError::Encode {
            name: msg.name.to_string(),
            source,
        })?;
        let req = ApiRequest::Call {
            name: msg.name.to_string(),
            crc: msg.crc.to_string(),
            body,
        };
        match self.roundtrip(req).await? {
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
        // The probe is part of the relay protocol itself: it runs during
        // version resolution, before any message set has been registered.
        let req = ApiRequest::Compat {
            msgs: msgs.iter().map(MessageId::from).collect(),
        };
        match self.roundtrip(req).await? {
            ApiReply::Reply { .. } => Ok(()),
            ApiReply::Error { message } => Err(ChannelError::Incompatible(message)),
        }
    }
}
