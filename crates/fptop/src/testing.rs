//! In-process mock engine serving the socket transports, for tests that
//! exercise the connection paths end to end. Speaks protocol revision 22.02.

use crate::binapi::transport::{
    ApiReply, ApiRequest, StatsReply, StatsRequest, read_frame, write_frame,
};
use crate::binapi::v2202;
use crate::stats::types::{
    CombinedCounter, EnginePaths, InterfaceCounters, RawErrorCounter, RuntimeCounters,
    WorkerRuntime,
};
use serde_json::json;
use std::collections::HashSet;
use std::path::Path;
use tokio::net::{UnixListener, UnixStream};

/// Bind mock stats and binapi sockets under `dir` and serve them until the
/// listeners are dropped with the runtime. Must be called inside a tokio
/// runtime.
pub(crate) fn spawn_mock_engine(dir: &Path) -> EnginePaths {
    let paths = EnginePaths {
        stats_socket: dir.join("stats.sock"),
        binapi_socket: dir.join("api.sock"),
    };

    let stats_listener = UnixListener::bind(&paths.stats_socket).expect("bind stats socket");
    let api_listener = UnixListener::bind(&paths.binapi_socket).expect("bind api socket");

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = stats_listener.accept().await else {
                return;
            };
            tokio::spawn(serve_stats(stream));
        }
    });
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = api_listener.accept().await else {
                return;
            };
            tokio::spawn(serve_api(stream));
        }
    });

    paths
}

pub(crate) fn sample_interface_counters() -> Vec<InterfaceCounters> {
    vec![InterfaceCounters {
        name: "eth0".to_string(),
        index: 1,
        rx: CombinedCounter {
            packets: 1200,
            bytes: 96_000,
        },
        tx: CombinedCounter {
            packets: 800,
            bytes: 64_000,
        },
        drops: 3,
        punts: 1,
        ip4: 1100,
        ip6: 90,
        ..Default::default()
    }]
}

async fn serve_stats(mut stream: UnixStream) {
    loop {
        let Ok(req) = read_frame::<_, StatsRequest>(&mut stream).await else {
            return;
        };
        let reply = match req {
            StatsRequest::InterfaceCounters => StatsReply::Interfaces {
                interfaces: sample_interface_counters(),
            },
            StatsRequest::WorkerRuntime => StatsReply::Runtime {
                workers: vec![WorkerRuntime {
                    thread_name: "main".to_string(),
                    items: vec![RuntimeCounters {
                        name: "ip4-input".to_string(),
                        index: 12,
                        clocks: 5.4,
                        vectors: 400,
                        calls: 100,
                        suspends: 0,
                    }],
                }],
            },
            StatsRequest::ErrorCounters => StatsReply::Errors {
                counters: vec![RawErrorCounter {
                    node: "ip4-input".to_string(),
                    name: "bad checksum".to_string(),
                    value: 5,
                }],
            },
        };
        if write_frame(&mut stream, &reply).await.is_err() {
            return;
        }
    }
}

async fn serve_api(mut stream: UnixStream) {
    let known: HashSet<&str> = v2202::MESSAGES.iter().map(|m| m.crc).collect();

    loop {
        let Ok(req) = read_frame::<_, ApiRequest>(&mut stream).await else {
            return;
        };
        let reply = match req {
            ApiRequest::Compat { msgs } => {
                if msgs.iter().all(|m| known.contains(m.crc.as_str())) {
                    ApiReply::Reply { body: json!({}) }
                } else {
                    ApiReply::Error {
                        message: "unknown message set".to_string(),
                    }
                }
            }
            ApiRequest::Call { name, .. } => match name.as_str() {
                "show_version" => ApiReply::Reply {
                    body: json!({
                        "retval": 0,
                        "version": "22.02-release",
                        "build_date": "2026-01-15T10:01:44",
                    }),
                },
                "sw_interface_dump" => ApiReply::Reply {
                    body: json!([{
                        "sw_if_index": 1,
                        "interface_name": "eth0",
                        "admin_up": true,
                        "mtu": [9000, 9000, 9000, 9000],
                        "ip_addresses": ["10.0.0.1/24"],
                    }]),
                },
                "show_threads" => ApiReply::Reply {
                    body: json!({
                        "threads": [{
                            "id": 0,
                            "name": "fp_main",
                            "kind": "main",
                            "pid": 4242,
                            "cpu_id": 0,
                            "core": 0,
                            "numa_id": 0,
                        }],
                    }),
                },
                "cli_inband" => ApiReply::Reply {
                    body: json!({
                        "retval": 0,
                        "reply": "Thread 0 fp_main\n  base 0x7f0000000000\n  used 12.5M\n  free 3.2M\n  trimmable 1.1M\n  overhead 0.4M\n  pages 4096\n",
                    }),
                },
                other => ApiReply::Error {
                    message: format!("unknown message {other}"),
                },
            },
        };
        if write_frame(&mut stream, &reply).await.is_err() {
            return;
        }
    }
}
