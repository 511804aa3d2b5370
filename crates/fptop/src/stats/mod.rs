//! Version-agnostic statistics aggregation.
//!
//! [`Engine`] is the one connection a dashboard holds: it owns the transports
//! (one statistics channel, one administrative binary-API channel, exactly
//! three worker channels), the protocol dialect bound at connect time, and
//! the error-counter baseline. Every fetch operation returns the stable data
//! model from [`types`], whatever protocol revision the engine speaks.
//!
//! Exactly one `Engine` is expected per process; it is constructed only
//! fully-connected — version info fetched — or not at all.

pub mod compat;
pub mod types;

use crate::binapi::transport::{BinapiSocket, StatsSocket};
use crate::binapi::{BinapiChannel, ChannelError, EngineDialect, StatsChannel};
use crate::proxy::{ProxyClient, ProxyError, ProxyServer};
use self::compat::{CompatError, ProtocolVersion, register_messages, resolve_compatible};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use self::types::{
    EnginePaths, ErrorSample, InterfaceSample, LinkState, NodeSample, ThreadInfo, VersionInfo,
};
use tracing::{debug, error, info, warn};

/// Worker channels opened per connection, in addition to the admin channel.
pub const WORKER_CHANNELS: usize = 3;

/// Connection attempts against a delegation endpoint.
pub const CONNECT_ATTEMPTS: u32 = 3;
/// Fixed backoff between delegation endpoint connection attempts.
pub const CONNECT_BACKOFF: Duration = Duration::from_secs(1);

// Worker channel roles.
const CHAN_INTERFACES: usize = 0;
const CHAN_TELEMETRY: usize = 1;
const CHAN_CLI: usize = 2;

const CLEAR_INTERFACES_CMD: &str = "clear interfaces";
const CLEAR_RUNTIME_CMD: &str = "clear runtime";
const CLEAR_ERRORS_CMD: &str = "clear errors";
const MEMORY_REPORT_CMD: &str = "show memory main-heap verbose";

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine request failed: {0}")]
    Channel(#[from] ChannelError),
    #[error("delegation endpoint: {0}")]
    Proxy(#[from] ProxyError),
    #[error(transparent)]
    Compat(#[from] CompatError),
    #[error("failed to query engine version: {0}")]
    Version(#[source] ChannelError),
    #[error("no runtime counters")]
    NoRuntimeCounters,
}

/// Live, fully-bound engine connection and its aggregation state.
pub struct Engine {
    stats: Arc<dyn StatsChannel>,
    /// Administrative channel: compatibility probe and thread dumps.
    admin: Arc<dyn BinapiChannel>,
    workers: Vec<Arc<dyn BinapiChannel>>,
    dialect: Box<dyn EngineDialect>,
    version: VersionInfo,
    /// Last-seen raw error counter values, keyed by node/name. Replaced
    /// wholesale by [`Engine::clear_error_counters`], read by
    /// [`Engine::errors`]; guarded here so the mutual exclusion holds even
    /// outside the scheduler's poll lock.
    baseline: Mutex<HashMap<String, u64>>,
}

impl Engine {
    /// Direct local connection over the engine's well-known sockets. Single
    /// attempt; transport errors surface immediately.
    pub async fn connect(paths: &EnginePaths) -> Result<Self, EngineError> {
        let stats: Arc<dyn StatsChannel> =
            Arc::new(StatsSocket::connect(&paths.stats_socket).await?);
        let admin: Arc<dyn BinapiChannel> =
            Arc::new(BinapiSocket::connect(&paths.binapi_socket).await?);
        let mut workers: Vec<Arc<dyn BinapiChannel>> = Vec::with_capacity(WORKER_CHANNELS);
        for _ in 0..WORKER_CHANNELS {
            workers.push(Arc::new(BinapiSocket::connect(&paths.binapi_socket).await?));
        }
        let dialect = resolve_compatible(admin.as_ref()).await?;
        Self::bind(stats, admin, workers, dialect).await
    }

    /// Delegated connection through an endpoint, with bounded retry. The
    /// selected revision's message set is registered with the client before
    /// any further delegated call.
    pub async fn connect_remote(addr: &str) -> Result<Self, EngineError> {
        let client =
            ProxyClient::connect_with_retry(addr, CONNECT_ATTEMPTS, CONNECT_BACKOFF).await?;

        let stats: Arc<dyn StatsChannel> = Arc::new(client.stats_channel().await?);
        let admin: Arc<dyn BinapiChannel> = Arc::new(client.binapi_channel().await?);
        let mut workers: Vec<Arc<dyn BinapiChannel>> = Vec::with_capacity(WORKER_CHANNELS);
        for _ in 0..WORKER_CHANNELS {
            workers.push(Arc::new(client.binapi_channel().await?));
        }

        let dialect = resolve_compatible(admin.as_ref()).await?;
        register_messages(client.registry(), dialect.as_ref());
        Self::bind(stats, admin, workers, dialect).await
    }

    /// Final connect step shared by both paths: fetch version info through
    /// the bound dialect. Failing here fails the whole connect; no partial
    /// connection escapes.
    async fn bind(
        stats: Arc<dyn StatsChannel>,
        admin: Arc<dyn BinapiChannel>,
        workers: Vec<Arc<dyn BinapiChannel>>,
        dialect: Box<dyn EngineDialect>,
    ) -> Result<Self, EngineError> {
        let version = dialect
            .version_info(workers[CHAN_CLI].as_ref())
            .await
            .map_err(EngineError::Version)?;
        info!(version = %version.version, protocol = %dialect.version(), "connected to engine");
        Ok(Self {
            stats,
            admin,
            workers,
            dialect,
            version,
            baseline: Mutex::new(HashMap::new()),
        })
    }

    /// Two-line human version string: version id plus build date.
    pub fn version(&self) -> String {
        format!(
            "fastpath version: {}\n{}",
            self.version.version, self.version.build_date
        )
    }

    pub fn protocol_version(&self) -> ProtocolVersion {
        self.dialect.version()
    }

    /// Per-interface statistics: the administrative view and the live
    /// counters are fetched concurrently and joined on interface index.
    /// Counter entries without a matching detail entry are silently dropped.
    /// Either fetch failing fails the call; both complete before the failure
    /// is reported, and no partial list is returned.
    pub async fn interfaces(&self) -> Result<Vec<InterfaceSample>, EngineError> {
        let (details, counters) = futures::join!(
            self.dialect
                .dump_interfaces(self.workers[CHAN_INTERFACES].as_ref()),
            self.stats.interface_counters(),
        );
        let details = details?;
        let counters = counters?;

        let mut result = Vec::with_capacity(details.len());
        for counter in counters {
            let Some(detail) = details.get(&counter.index) else {
                continue;
            };
            let state = if detail.enabled {
                LinkState::Up
            } else {
                LinkState::Down
            };
            result.push(InterfaceSample {
                counters: counter,
                state,
                mtu: detail.mtu,
                ip_addrs: detail.ip_addrs.clone(),
            });
        }
        Ok(result)
    }

    /// Per scheduler-node statistics, flattened across worker threads.
    pub async fn nodes(&self) -> Result<Vec<NodeSample>, EngineError> {
        let threads = self.stats.worker_runtime().await?;
        if threads.is_empty() {
            return Err(EngineError::NoRuntimeCounters);
        }
        let mut result = Vec::with_capacity(threads.first().map_or(0, |t| t.items.len()));
        for thread in threads {
            result.extend(thread.items.into_iter().map(NodeSample::from));
        }
        Ok(result)
    }

    /// Per-error statistics since the last clear: raw value minus the
    /// recorded baseline (zero when absent), zero deltas filtered out. An
    /// upstream counter reset would make raw < baseline; the delta clamps to
    /// zero and the baseline is left untouched, keeping this call read-only.
    pub async fn errors(&self) -> Result<Vec<ErrorSample>, EngineError> {
        let counters = self.stats.error_counters().await?;
        let baseline = self.baseline.lock().await;
        let mut result = Vec::new();
        for counter in counters {
            let base = baseline
                .get(&baseline_key(&counter.node, &counter.name))
                .copied()
                .unwrap_or(0);
            let value = counter.value.saturating_sub(base);
            if value == 0 {
                continue;
            }
            result.push(ErrorSample {
                node: counter.node,
                name: counter.name,
                value,
            });
        }
        Ok(result)
    }

    /// Reset the engine's interface counters.
    pub async fn clear_interface_counters(&self) -> Result<(), EngineError> {
        self.run_cli(CLEAR_INTERFACES_CMD).await?;
        Ok(())
    }

    /// Reset the engine's per-node runtime counters.
    pub async fn clear_runtime_counters(&self) -> Result<(), EngineError> {
        self.run_cli(CLEAR_RUNTIME_CMD).await?;
        Ok(())
    }

    /// Reset the engine's error counters. A fresh baseline is captured
    /// before the reset is issued, so counters the engine does not actually
    /// zero still read as zero from here on.
    pub async fn clear_error_counters(&self) -> Result<(), EngineError> {
        self.snapshot_error_baseline().await;
        self.run_cli(CLEAR_ERRORS_CMD).await?;
        Ok(())
    }

    /// The verbose main-heap memory report as trimmed, non-empty lines. No
    /// semantic parsing happens here.
    pub async fn memory(&self) -> Result<Vec<String>, EngineError> {
        let report = self
            .dialect
            .run_cli(self.workers[CHAN_TELEMETRY].as_ref(), MEMORY_REPORT_CMD)
            .await?;
        Ok(report
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect())
    }

    /// Per-worker-thread identity, through the revision-specific dump.
    pub async fn threads(&self) -> Result<Vec<ThreadInfo>, EngineError> {
        Ok(self.dialect.show_threads(self.admin.as_ref()).await?)
    }

    /// Release the connection. Channels and transports close with it.
    pub fn disconnect(self) {
        debug!("disconnecting from engine");
        drop(self);
    }

    async fn run_cli(&self, command: &str) -> Result<String, EngineError> {
        Ok(self
            .dialect
            .run_cli(self.workers[CHAN_CLI].as_ref(), command)
            .await?)
    }

    /// Capture the current nonzero raw error counters as the new baseline,
    /// replacing the previous one wholesale. Best effort: a failed read
    /// leaves the old baseline in place.
    async fn snapshot_error_baseline(&self) {
        let counters = match self.stats.error_counters().await {
            Ok(counters) => counters,
            Err(err) => {
                warn!(%err, "error baseline snapshot failed");
                return;
            }
        };
        let mut fresh = HashMap::with_capacity(counters.len());
        for counter in counters {
            if counter.value == 0 {
                continue;
            }
            fresh.insert(baseline_key(&counter.node, &counter.name), counter.value);
        }
        *self.baseline.lock().await = fresh;
    }
}

fn baseline_key(node: &str, name: &str) -> String {
    format!("{node}/{name}")
}

/// Obtain a usable connection across cooperating instances: become a client
/// of an existing delegation endpoint at `addr`, or — when none is reachable
/// within the retry budget — host one in the background over the local engine
/// sockets and connect to it. The client-side retry absorbs the endpoint's
/// asynchronous startup.
pub async fn connect_or_host(addr: &str, paths: &EnginePaths) -> Result<Engine, EngineError> {
    match Engine::connect_remote(addr).await {
        Ok(engine) => Ok(engine),
        Err(EngineError::Proxy(err)) => {
            info!(%err, addr, "no delegation endpoint reachable, hosting one");
            let server = ProxyServer::bind(addr, paths.clone()).await?;
            tokio::spawn(async move {
                if let Err(err) = server.serve().await {
                    error!(%err, "delegation endpoint terminated");
                }
            });
            Engine::connect_remote(addr).await
        }
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binapi::MessageSig;
    use crate::testing::spawn_mock_engine;
    use async_trait::async_trait;
    use bytes::Bytes;
    use serde_json::json;
    use super::types::{
        CombinedCounter, InterfaceCounters, RawErrorCounter, RuntimeCounters, WorkerRuntime,
    };

    #[derive(Default)]
    struct MockStats {
        interfaces: std::sync::Mutex<Vec<InterfaceCounters>>,
        runtime: std::sync::Mutex<Vec<WorkerRuntime>>,
        errors: std::sync::Mutex<Vec<RawErrorCounter>>,
        fail_interfaces: std::sync::atomic::AtomicBool,
    }

    impl MockStats {
        fn set_interfaces(&self, interfaces: Vec<InterfaceCounters>) {
            *self.interfaces.lock().unwrap() = interfaces;
        }

        fn set_runtime(&self, runtime: Vec<WorkerRuntime>) {
            *self.runtime.lock().unwrap() = runtime;
        }

        fn set_errors(&self, errors: Vec<RawErrorCounter>) {
            *self.errors.lock().unwrap() = errors;
        }

        fn fail_interfaces(&self) {
            self.fail_interfaces
                .store(true, std::sync::atomic::Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl StatsChannel for MockStats {
        async fn interface_counters(&self) -> Result<Vec<InterfaceCounters>, ChannelError> {
            if self.fail_interfaces.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(ChannelError::Rejected {
                    name: "interface_counters".to_string(),
                    reason: "mock failure".to_string(),
                });
            }
            Ok(self.interfaces.lock().unwrap().clone())
        }

        async fn worker_runtime(&self) -> Result<Vec<WorkerRuntime>, ChannelError> {
            Ok(self.runtime.lock().unwrap().clone())
        }

        async fn error_counters(&self) -> Result<Vec<RawErrorCounter>, ChannelError> {
            Ok(self.errors.lock().unwrap().clone())
        }
    }

    /// Serves canned JSON replies keyed by message name.
    #[derive(Default)]
    struct MockBinapi {
        replies: std::sync::Mutex<std::collections::HashMap<&'static str, serde_json::Value>>,
    }

    impl MockBinapi {
        fn insert(&self, name: &'static str, reply: serde_json::Value) {
            self.replies.lock().unwrap().insert(name, reply);
        }
    }

    #[async_trait]
    impl BinapiChannel for MockBinapi {
        async fn request(&self, msg: &MessageSig, _body: Bytes) -> Result<Bytes, ChannelError> {
            let replies = self.replies.lock().unwrap();
            match replies.get(msg.name) {
                Some(value) => Ok(Bytes::from(serde_json::to_vec(value).unwrap())),
                None => Err(ChannelError::Rejected {
                    name: msg.name.to_string(),
                    reason: "no canned reply".to_string(),
                }),
            }
        }

        async fn check_compatibility(&self, _msgs: &[MessageSig]) -> Result<(), ChannelError> {
            Ok(())
        }
    }

    fn engine_with(stats: Arc<MockStats>, binapi: Arc<MockBinapi>) -> Engine {
        let chan: Arc<dyn BinapiChannel> = binapi;
        Engine {
            stats,
            admin: Arc::clone(&chan),
            workers: vec![Arc::clone(&chan), Arc::clone(&chan), chan],
            dialect: ProtocolVersion::V2202.dialect(),
            version: VersionInfo {
                version: "22.02-release".to_string(),
                build_date: "2026-01-15T10:01:44".to_string(),
            },
            baseline: Mutex::new(HashMap::new()),
        }
    }

    fn raw_error(node: &str, name: &str, value: u64) -> RawErrorCounter {
        RawErrorCounter {
            node: node.to_string(),
            name: name.to_string(),
            value,
        }
    }

    fn counters(name: &str, index: u32) -> InterfaceCounters {
        InterfaceCounters {
            name: name.to_string(),
            index,
            rx: CombinedCounter {
                packets: 10,
                bytes: 1000,
            },
            ..Default::default()
        }
    }

    fn iface_detail_reply() -> serde_json::Value {
        json!([{
            "sw_if_index": 1,
            "interface_name": "eth0",
            "admin_up": true,
            "mtu": [9000, 9000, 9000, 9000],
            "ip_addresses": ["10.0.0.1/24"],
        }])
    }

    #[tokio::test]
    async fn test_interfaces_joins_on_index_and_drops_unmatched() {
        let stats = Arc::new(MockStats::default());
        let binapi = Arc::new(MockBinapi::default());
        binapi.insert("sw_interface_dump", iface_detail_reply());
        // idx 9 has no detail entry and must be silently excluded.
        stats.set_interfaces(vec![counters("eth0", 1), counters("ghost0", 9)]);

        let engine = engine_with(stats, binapi);
        let interfaces = engine.interfaces().await.expect("interfaces");
        assert_eq!(interfaces.len(), 1);
        assert_eq!(interfaces[0].name(), "eth0");
        assert_eq!(interfaces[0].state, LinkState::Up);
        assert_eq!(interfaces[0].mtu, [9000, 9000, 9000, 9000]);
        assert_eq!(interfaces[0].ip_addrs, vec!["10.0.0.1/24".to_string()]);
    }

    #[tokio::test]
    async fn test_interfaces_fails_without_partial_result_on_counter_error() {
        let stats = Arc::new(MockStats::default());
        let binapi = Arc::new(MockBinapi::default());
        binapi.insert("sw_interface_dump", iface_detail_reply());
        stats.fail_interfaces();

        let engine = engine_with(stats, binapi);
        assert!(engine.interfaces().await.is_err());
    }

    #[tokio::test]
    async fn test_interfaces_fails_without_partial_result_on_detail_error() {
        let stats = Arc::new(MockStats::default());
        // No canned sw_interface_dump reply: the detail fetch fails.
        let binapi = Arc::new(MockBinapi::default());
        stats.set_interfaces(vec![counters("eth0", 1)]);

        let engine = engine_with(stats, binapi);
        assert!(engine.interfaces().await.is_err());
    }

    #[tokio::test]
    async fn test_nodes_flattens_worker_threads() {
        let stats = Arc::new(MockStats::default());
        let binapi = Arc::new(MockBinapi::default());
        stats.set_runtime(vec![
            WorkerRuntime {
                thread_name: "main".to_string(),
                items: vec![
                    RuntimeCounters {
                        name: "ip4-input".to_string(),
                        index: 12,
                        vectors: 200,
                        calls: 100,
                        ..Default::default()
                    },
                    RuntimeCounters {
                        name: "ip4-lookup".to_string(),
                        index: 13,
                        ..Default::default()
                    },
                ],
            },
            WorkerRuntime {
                thread_name: "wk_0".to_string(),
                items: vec![RuntimeCounters {
                    name: "ip4-input".to_string(),
                    index: 12,
                    ..Default::default()
                }],
            },
        ]);

        let engine = engine_with(stats, binapi);
        let nodes = engine.nodes().await.expect("nodes");
        assert_eq!(nodes.len(), 3);
        assert!((nodes[0].vectors_per_call - 2.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_nodes_fails_with_zero_threads() {
        let engine = engine_with(
            Arc::new(MockStats::default()),
            Arc::new(MockBinapi::default()),
        );
        let err = engine.nodes().await.expect_err("must fail");
        assert!(matches!(err, EngineError::NoRuntimeCounters));
        assert_eq!(err.to_string(), "no runtime counters");
    }

    #[tokio::test]
    async fn test_errors_subtracts_baseline_and_filters_zero_deltas() {
        let stats = Arc::new(MockStats::default());
        let binapi = Arc::new(MockBinapi::default());
        binapi.insert("cli_inband", json!({"retval": 0, "reply": ""}));

        let engine = engine_with(Arc::clone(&stats), binapi);

        // Seed baseline {("node1","err-a"): 5} through the clear path.
        stats.set_errors(vec![raw_error("node1", "err-a", 5)]);
        engine.clear_error_counters().await.expect("clear");

        stats.set_errors(vec![
            raw_error("node1", "err-a", 5),
            raw_error("node1", "err-b", 2),
        ]);
        let errors = engine.errors().await.expect("errors");
        assert_eq!(
            errors,
            vec![ErrorSample {
                node: "node1".to_string(),
                name: "err-b".to_string(),
                value: 2,
            }]
        );
    }

    #[tokio::test]
    async fn test_errors_empty_right_after_clear() {
        let stats = Arc::new(MockStats::default());
        let binapi = Arc::new(MockBinapi::default());
        binapi.insert("cli_inband", json!({"retval": 0, "reply": ""}));

        let engine = engine_with(Arc::clone(&stats), binapi);
        stats.set_errors(vec![
            raw_error("ip4-input", "bad checksum", 41),
            raw_error("ip4-input", "ttl expired", 7),
        ]);
        engine.clear_error_counters().await.expect("clear");

        // No new engine-side increments: the very next read is empty.
        assert!(engine.errors().await.expect("errors").is_empty());
    }

    #[tokio::test]
    async fn test_errors_clamp_on_upstream_counter_reset() {
        let stats = Arc::new(MockStats::default());
        let binapi = Arc::new(MockBinapi::default());
        binapi.insert("cli_inband", json!({"retval": 0, "reply": ""}));

        let engine = engine_with(Arc::clone(&stats), binapi);
        stats.set_errors(vec![raw_error("node1", "err-a", 5)]);
        engine.clear_error_counters().await.expect("clear");

        // Engine restarted: raw dropped below the baseline.
        stats.set_errors(vec![raw_error("node1", "err-a", 3)]);
        assert!(engine.errors().await.expect("errors").is_empty());
    }

    #[tokio::test]
    async fn test_memory_returns_trimmed_nonempty_lines() {
        let stats = Arc::new(MockStats::default());
        let binapi = Arc::new(MockBinapi::default());
        binapi.insert(
            "cli_inband",
            json!({"retval": 0, "reply": "  Thread 0 fp_main \n\n  used 12.5M\n "}),
        );

        let engine = engine_with(stats, binapi);
        let lines = engine.memory().await.expect("memory");
        assert_eq!(lines, vec!["Thread 0 fp_main", "used 12.5M"]);
    }

    #[tokio::test]
    async fn test_threads_decodes_revision_wire_format() {
        let stats = Arc::new(MockStats::default());
        let binapi = Arc::new(MockBinapi::default());
        binapi.insert(
            "show_threads",
            json!({"threads": [{
                "id": 1, "name": "fp_wk_0", "kind": "workers",
                "pid": 4243, "cpu_id": 2, "core": 1, "numa_id": 0,
            }]}),
        );

        let engine = engine_with(stats, binapi);
        let threads = engine.threads().await.expect("threads");
        assert_eq!(threads.len(), 1);
        assert_eq!(threads[0].name, "fp_wk_0");
        // 22.02 carries the socket as numa_id on the wire.
        assert_eq!(threads[0].cpu_socket, 0);
    }

    #[tokio::test]
    async fn test_version_is_two_lines() {
        let engine = engine_with(
            Arc::new(MockStats::default()),
            Arc::new(MockBinapi::default()),
        );
        let version = engine.version();
        let mut lines = version.lines();
        assert_eq!(lines.next(), Some("fastpath version: 22.02-release"));
        assert_eq!(lines.next(), Some("2026-01-15T10:01:44"));
        assert_eq!(lines.next(), None);
    }

    #[tokio::test]
    async fn test_connect_binds_against_mock_engine() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = spawn_mock_engine(dir.path());

        let engine = Engine::connect(&paths).await.expect("connect");
        assert_eq!(engine.protocol_version(), ProtocolVersion::V2202);

        let interfaces = engine.interfaces().await.expect("interfaces");
        assert_eq!(interfaces.len(), 1);
        assert_eq!(interfaces[0].name(), "eth0");
        engine.disconnect();
    }

    #[tokio::test]
    async fn test_bootstrap_hosts_endpoint_when_none_reachable() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = spawn_mock_engine(dir.path());

        // Reserve a free port; nothing listens on it when bootstrap starts.
        let addr = {
            let probe = std::net::TcpListener::bind("127.0.0.1:0").expect("probe bind");
            probe.local_addr().expect("probe addr").to_string()
        };

        let engine = connect_or_host(&addr, &paths).await.expect("bootstrap");
        assert_eq!(engine.protocol_version(), ProtocolVersion::V2202);

        // The endpoint hosted by the first instance now serves later clients.
        let second = Engine::connect_remote(&addr).await.expect("second client");
        assert_eq!(second.protocol_version(), ProtocolVersion::V2202);
    }
}
