//! fptop binary: argument parsing, connect-or-host bootstrap, task wiring.

use fptop::{
    App, DEFAULT_ENDPOINT_PORT, Dashboard, Engine, EnginePaths, ProxyServer, connect_or_host,
    run_tui,
    stats::types::{DEFAULT_BINAPI_SOCKET, DEFAULT_STATS_SOCKET},
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Command-line arguments.
#[derive(Debug)]
struct Args {
    /// Path to the engine's statistics segment socket
    stats_socket: PathBuf,
    /// Path to the engine's binary API socket
    binapi_socket: PathBuf,
    /// Delegation endpoint address to connect to (or host)
    addr: String,
    /// Connect to the engine sockets directly, bypassing delegation
    direct: bool,
    /// Run a headless delegation endpoint instead of the dashboard
    serve: bool,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            stats_socket: PathBuf::from(DEFAULT_STATS_SOCKET),
            binapi_socket: PathBuf::from(DEFAULT_BINAPI_SOCKET),
            addr: format!("127.0.0.1:{DEFAULT_ENDPOINT_PORT}"),
            direct: false,
            serve: false,
        }
    }
}

fn parse_args() -> Args {
    let mut args = Args::default();
    let mut argv = std::env::args().skip(1);

    while let Some(arg) = argv.next() {
        match arg.as_str() {
            "--stats-socket" => {
                if let Some(path) = argv.next() {
                    args.stats_socket = PathBuf::from(path);
                }
            }
            "--binapi-socket" => {
                if let Some(path) = argv.next() {
                    args.binapi_socket = PathBuf::from(path);
                }
            }
            "--addr" => {
                if let Some(addr) = argv.next() {
                    args.addr = addr;
                }
            }
            "--direct" => args.direct = true,
            "--serve" => args.serve = true,
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            _ => {
                eprintln!("Unknown argument: {}", arg);
                print_help();
                std::process::exit(1);
            }
        }
    }

    args
}

fn print_help() {
    println!(
        r#"
fptop - live terminal dashboard for fastpath dataplane statistics

USAGE:
    fptop [OPTIONS]

OPTIONS:
    --stats-socket <PATH>   Engine statistics socket [default: {DEFAULT_STATS_SOCKET}]
    --binapi-socket <PATH>  Engine binary API socket [default: {DEFAULT_BINAPI_SOCKET}]
    --addr <HOST:PORT>      Delegation endpoint address [default: 127.0.0.1:{DEFAULT_ENDPOINT_PORT}]
    --direct                Connect to the engine sockets directly (no delegation)
    --serve                 Run a headless delegation endpoint, no dashboard
    -h, --help              Print this help message

By default fptop connects to the delegation endpoint at --addr; when none is
reachable it hosts one itself over the local engine sockets and connects to
it, so several dashboards can share one engine.

KEYS:
    Tab / 1-5   switch tab          Up/Down     scroll
    Left/Right  select sort field   s           sort by field (toggles order)
    c           clear tab counters  q / Esc     quit
"#
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = parse_args();
    let paths = EnginePaths {
        stats_socket: args.stats_socket.clone(),
        binapi_socket: args.binapi_socket.clone(),
    };

    if args.serve {
        // Headless endpoint: logging goes to the terminal we keep.
        tracing_subscriber::fmt::init();
        let server = ProxyServer::bind(&args.addr, paths).await?;
        let addr = server.local_addr()?;
        tracing::info!(%addr, "delegation endpoint listening");
        server.serve().await?;
        return Ok(());
    }

    if !std::io::IsTerminal::is_terminal(&std::io::stdout()) {
        tracing_subscriber::fmt::init();
        anyhow::bail!(
            "fptop needs an interactive terminal; use --serve for a headless delegation endpoint"
        );
    }
    // TUI mode owns the terminal: no fmt subscriber, tracing events are
    // dropped instead of corrupting the display.

    let engine = if args.direct {
        Engine::connect(&paths).await?
    } else {
        connect_or_host(&args.addr, &paths).await?
    };
    let version = engine.version();

    let (updates_tx, updates_rx) = mpsc::channel(16);
    let (actions_tx, actions_rx) = mpsc::channel(16);

    let dashboard = Dashboard::new(Arc::new(engine), updates_tx);
    let driver = tokio::spawn(dashboard.run(actions_rx));

    run_tui(App::new(version), updates_rx, actions_tx).await?;

    // The exit action already reached the scheduler; wait for its join
    // barrier so clears in flight finish before the connection drops.
    driver.await?;

    Ok(())
}
