//! Polling scheduler and concurrency core.
//!
//! One periodic driver task polls the engine for the currently visible tab,
//! sorts and formats the result, and pushes row matrices to the display.
//! User actions arrive asynchronously and touch exactly the state they need:
//!
//! - clear actions serialize against in-flight polls on the poll lock, which
//!   also owns the previous-sample cache;
//! - sort changes touch only the per-tab sort specs;
//! - tab switches touch only the tab selector;
//! - exit cancels the driver, then waits for every spawned task on a join
//!   barrier before the connection is released.
//!
//! Poll and action failures are logged and swallowed; the previous rows stay
//! on screen until a later tick succeeds.

use crate::format::{
    RowMatrix, SampleCache, format_errors, format_interfaces, format_memory, format_nodes,
    format_threads,
};
use crate::stats::Engine;
use crate::stats::types::{ErrorSample, InterfaceSample, NodeSample};
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

/// Fixed polling period of the driver task.
pub const POLL_PERIOD: Duration = Duration::from_secs(1);

/// Number of statistics tabs.
pub const TAB_COUNT: usize = 5;

/// One statistics category, shown one at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tab {
    #[default]
    Interfaces,
    Nodes,
    Errors,
    Memory,
    Threads,
}

impl Tab {
    pub const ALL: [Tab; TAB_COUNT] = [
        Tab::Interfaces,
        Tab::Nodes,
        Tab::Errors,
        Tab::Memory,
        Tab::Threads,
    ];

    pub fn index(self) -> usize {
        match self {
            Tab::Interfaces => 0,
            Tab::Nodes => 1,
            Tab::Errors => 2,
            Tab::Memory => 3,
            Tab::Threads => 4,
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Tab::Interfaces => "Interfaces",
            Tab::Nodes => "Nodes",
            Tab::Errors => "Errors",
            Tab::Memory => "Memory",
            Tab::Threads => "Threads",
        }
    }

    pub fn next(self) -> Tab {
        Tab::ALL[(self.index() + 1) % TAB_COUNT]
    }

    pub fn prev(self) -> Tab {
        Tab::ALL[(self.index() + TAB_COUNT - 1) % TAB_COUNT]
    }

    /// Tabs with user-sortable columns.
    pub fn sortable(self) -> bool {
        matches!(self, Tab::Interfaces | Tab::Nodes | Tab::Errors)
    }

    /// Tabs with an engine-side clear command.
    pub fn clearable(self) -> bool {
        matches!(self, Tab::Interfaces | Tab::Nodes | Tab::Errors)
    }
}

/// Per-tab sort state. A sort action toggles the direction; it is never set
/// to a specific direction directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortSpec {
    pub field: Option<usize>,
    pub asc: bool,
}

impl Default for SortSpec {
    fn default() -> Self {
        Self {
            field: None,
            asc: true,
        }
    }
}

impl SortSpec {
    /// Select `field` and flip the direction.
    pub fn toggle(&mut self, field: usize) {
        self.field = Some(field);
        self.asc = !self.asc;
    }
}

/// Sortable stat fields per tab, in field-index order.
pub const INTERFACE_SORT_FIELDS: &[&str] = &[
    "Name",
    "Index",
    "State",
    "MTU-L3",
    "MTU-IP4",
    "MTU-IP6",
    "MTU-MPLS",
    "RxPackets",
    "RxBytes",
    "RxErrors",
    "RxUnicast-packets",
    "RxUnicast-bytes",
    "RxMulticast-packets",
    "RxMulticast-bytes",
    "RxBroadcast-packets",
    "RxBroadcast-bytes",
    "TxPackets",
    "TxBytes",
    "TxErrors",
    "TxUnicastMiss-packets",
    "TxUnicastMiss-bytes",
    "TxMulticast-packets",
    "TxMulticast-bytes",
    "TxBroadcast-packets",
    "TxBroadcast-bytes",
    "Drops",
    "Punts",
    "IP4",
    "IP6",
];

pub const NODE_SORT_FIELDS: &[&str] = &[
    "NodeName",
    "NodeIndex",
    "Clocks",
    "Vectors",
    "Calls",
    "Suspends",
    "Vectors/Calls",
];

pub const ERROR_SORT_FIELDS: &[&str] = &["Counter", "Node", "Reason"];

pub fn sort_fields(tab: Tab) -> &'static [&'static str] {
    match tab {
        Tab::Interfaces => INTERFACE_SORT_FIELDS,
        Tab::Nodes => NODE_SORT_FIELDS,
        Tab::Errors => ERROR_SORT_FIELDS,
        Tab::Memory | Tab::Threads => &[],
    }
}

pub fn sort_interfaces(ifaces: &mut [InterfaceSample], spec: SortSpec) {
    let Some(field) = spec.field else {
        return;
    };
    ifaces.sort_by(|a, b| directed(compare_interfaces(a, b, field), spec.asc));
}

fn compare_interfaces(a: &InterfaceSample, b: &InterfaceSample, field: usize) -> Ordering {
    let (x, y) = (&a.counters, &b.counters);
    match field {
        0 => x.name.cmp(&y.name),
        1 => x.index.cmp(&y.index),
        2 => a.state.as_str().cmp(b.state.as_str()),
        3..=6 => a.mtu[field - 3].cmp(&b.mtu[field - 3]),
        7 => x.rx.packets.cmp(&y.rx.packets),
        8 => x.rx.bytes.cmp(&y.rx.bytes),
        9 => x.rx_errors.cmp(&y.rx_errors),
        10 => x.rx_unicast.packets.cmp(&y.rx_unicast.packets),
        11 => x.rx_unicast.bytes.cmp(&y.rx_unicast.bytes),
        12 => x.rx_multicast.packets.cmp(&y.rx_multicast.packets),
        13 => x.rx_multicast.bytes.cmp(&y.rx_multicast.bytes),
        14 => x.rx_broadcast.packets.cmp(&y.rx_broadcast.packets),
        15 => x.rx_broadcast.bytes.cmp(&y.rx_broadcast.bytes),
        16 => x.tx.packets.cmp(&y.tx.packets),
        17 => x.tx.bytes.cmp(&y.tx.bytes),
        18 => x.tx_errors.cmp(&y.tx_errors),
        19 => x.tx_unicast.packets.cmp(&y.tx_unicast.packets),
        20 => x.tx_unicast.bytes.cmp(&y.tx_unicast.bytes),
        21 => x.tx_multicast.packets.cmp(&y.tx_multicast.packets),
        22 => x.tx_multicast.bytes.cmp(&y.tx_multicast.bytes),
        23 => x.tx_broadcast.packets.cmp(&y.tx_broadcast.packets),
        24 => x.tx_broadcast.bytes.cmp(&y.tx_broadcast.bytes),
        25 => x.drops.cmp(&y.drops),
        26 => x.punts.cmp(&y.punts),
        27 => x.ip4.cmp(&y.ip4),
        28 => x.ip6.cmp(&y.ip6),
        _ => Ordering::Equal,
    }
}

pub fn sort_nodes(nodes: &mut [NodeSample], spec: SortSpec) {
    let Some(field) = spec.field else {
        return;
    };
    nodes.sort_by(|a, b| {
        let ord = match field {
            0 => a.name.cmp(&b.name),
            1 => a.index.cmp(&b.index),
            2 => a.clocks.total_cmp(&b.clocks),
            3 => a.vectors.cmp(&b.vectors),
            4 => a.calls.cmp(&b.calls),
            5 => a.suspends.cmp(&b.suspends),
            6 => a.vectors_per_call.total_cmp(&b.vectors_per_call),
            _ => Ordering::Equal,
        };
        directed(ord, spec.asc)
    });
}

pub fn sort_errors(errors: &mut [ErrorSample], spec: SortSpec) {
    let Some(field) = spec.field else {
        return;
    };
    errors.sort_by(|a, b| {
        let ord = match field {
            0 => a.value.cmp(&b.value),
            1 => a.node.cmp(&b.node),
            2 => a.name.cmp(&b.name),
            _ => Ordering::Equal,
        };
        directed(ord, spec.asc)
    });
}

fn directed(ord: Ordering, asc: bool) -> Ordering {
    if asc { ord } else { ord.reverse() }
}

/// User actions emitted by the display layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    SwitchTab(Tab),
    Sort { tab: Tab, field: usize },
    Clear(Tab),
    Exit,
}

/// One refresh for one tab.
#[derive(Debug, Clone)]
pub struct TabRows {
    pub tab: Tab,
    pub rows: RowMatrix,
}

/// State owned by the poll lock: serializes ticks against clear actions and
/// carries the previous-sample cache between ticks.
#[derive(Default)]
struct PollState {
    if_cache: SampleCache,
}

/// The polling scheduler. Owns the engine for the lifetime of the run.
pub struct Dashboard {
    engine: Arc<Engine>,
    poll: Arc<Mutex<PollState>>,
    sort_by: Arc<Mutex<[SortSpec; TAB_COUNT]>>,
    current_tab: Arc<Mutex<Tab>>,
    updates: mpsc::Sender<TabRows>,
}

impl Dashboard {
    pub fn new(engine: Arc<Engine>, updates: mpsc::Sender<TabRows>) -> Self {
        Self {
            engine,
            poll: Arc::new(Mutex::new(PollState::default())),
            sort_by: Arc::new(Mutex::new([SortSpec::default(); TAB_COUNT])),
            current_tab: Arc::new(Mutex::new(Tab::default())),
            updates,
        }
    }

    /// Drive the dashboard until an [`Action::Exit`] arrives (or the display
    /// side hangs up). On exit the driver is cancelled and every background
    /// task is awaited before the engine is released.
    pub async fn run(self, mut actions: mpsc::Receiver<Action>) {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let mut tasks = JoinSet::new();

        tasks.spawn(poll_loop(
            Arc::clone(&self.engine),
            Arc::clone(&self.poll),
            Arc::clone(&self.sort_by),
            Arc::clone(&self.current_tab),
            self.updates.clone(),
            cancel_rx,
        ));

        while let Some(action) = actions.recv().await {
            match action {
                Action::SwitchTab(tab) => {
                    *self.current_tab.lock().await = tab;
                }
                Action::Sort { tab, field } => {
                    self.sort_by.lock().await[tab.index()].toggle(field);
                }
                Action::Clear(tab) => {
                    if !tab.clearable() {
                        continue;
                    }
                    let engine = Arc::clone(&self.engine);
                    let poll = Arc::clone(&self.poll);
                    tasks.spawn(async move {
                        let mut state = poll.lock().await;
                        let result = match tab {
                            Tab::Interfaces => {
                                let result = engine.clear_interface_counters().await;
                                if result.is_ok() {
                                    state.if_cache.clear();
                                }
                                result
                            }
                            Tab::Nodes => engine.clear_runtime_counters().await,
                            Tab::Errors => engine.clear_error_counters().await,
                            Tab::Memory | Tab::Threads => Ok(()),
                        };
                        if let Err(err) = result {
                            warn!(%err, tab = tab.title(), "clear failed");
                        }
                    });
                }
                Action::Exit => break,
            }
        }

        let _ = cancel_tx.send(true);
        while tasks.join_next().await.is_some() {}
    }
}

async fn poll_loop(
    engine: Arc<Engine>,
    poll: Arc<Mutex<PollState>>,
    sort_by: Arc<Mutex<[SortSpec; TAB_COUNT]>>,
    current_tab: Arc<Mutex<Tab>>,
    updates: mpsc::Sender<TabRows>,
    mut cancel: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(POLL_PERIOD);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                poll_once(&engine, &poll, &sort_by, &current_tab, &updates).await;
            }
            changed = cancel.changed() => {
                if changed.is_err() || *cancel.borrow() {
                    return;
                }
            }
        }
    }
}

/// One tick: fetch the visible tab's data, sort, format, push. Strictly
/// sequential within the tick; the poll lock keeps clear actions out of the
/// critical section.
async fn poll_once(
    engine: &Engine,
    poll: &Mutex<PollState>,
    sort_by: &Mutex<[SortSpec; TAB_COUNT]>,
    current_tab: &Mutex<Tab>,
    updates: &mpsc::Sender<TabRows>,
) {
    let mut state = poll.lock().await;
    let tab = *current_tab.lock().await;

    let rows = match tab {
        Tab::Interfaces => match engine.interfaces().await {
            Ok(mut ifaces) => {
                let spec = sort_by.lock().await[tab.index()];
                sort_interfaces(&mut ifaces, spec);
                let rows = format_interfaces(&ifaces, &state.if_cache);
                // Replace the cache only after a complete successful fetch.
                state.if_cache = ifaces
                    .into_iter()
                    .map(|iface| {
                        let counters = iface.counters;
                        (counters.name.clone(), counters)
                    })
                    .collect();
                rows
            }
            Err(err) => {
                warn!(%err, "interface poll failed");
                return;
            }
        },
        Tab::Nodes => match engine.nodes().await {
            Ok(mut nodes) => {
                let spec = sort_by.lock().await[tab.index()];
                sort_nodes(&mut nodes, spec);
                format_nodes(&nodes)
            }
            Err(err) => {
                warn!(%err, "node poll failed");
                return;
            }
        },
        Tab::Errors => match engine.errors().await {
            Ok(mut errors) => {
                let spec = sort_by.lock().await[tab.index()];
                sort_errors(&mut errors, spec);
                format_errors(&errors)
            }
            Err(err) => {
                warn!(%err, "error poll failed");
                return;
            }
        },
        Tab::Memory => match engine.memory().await {
            Ok(lines) => format_memory(&lines),
            Err(err) => {
                warn!(%err, "memory poll failed");
                return;
            }
        },
        Tab::Threads => match engine.threads().await {
            Ok(threads) => format_threads(&threads),
            Err(err) => {
                warn!(%err, "thread poll failed");
                return;
            }
        },
    };

    if updates.send(TabRows { tab, rows }).await.is_err() {
        debug!("display closed, dropping rows");
    }
}
