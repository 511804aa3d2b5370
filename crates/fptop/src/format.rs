//! Row formatting.
//!
//! Pure functions turning aggregator output (plus the previous-sample cache)
//! into the rectangular cell matrices the display consumes. No I/O, no
//! shared state.

use crate::stats::types::{
    ErrorSample, InterfaceCounters, InterfaceSample, NodeSample, ThreadInfo,
};
use std::collections::HashMap;

/// Rows per interface entry in the interfaces matrix.
pub const ROWS_PER_IFACE: usize = 11;
/// Columns in the interfaces matrix.
pub const IFACE_COLS: usize = 12;
/// Rows per entry in the memory matrix.
pub const ROWS_PER_MEMORY: usize = 8;
/// Source lines forming one logical memory record. Inherited from the
/// engine's report layout, not a parsed structure.
pub const MEMORY_SOURCE_LINES: usize = 7;

pub const EMPTY_CELL: &str = "";

/// A rectangular matrix of display cells.
pub type RowMatrix = Vec<Vec<String>>;

/// Previous interface counters keyed by interface name, one generation deep.
pub type SampleCache = HashMap<String, InterfaceCounters>;

/// Per-second deltas against the previous sample.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct InterfaceRates {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    pub rx_packets: u64,
    pub tx_packets: u64,
}

/// Counter deltas over one polling tick; all zero when there is no previous
/// sample for the interface.
pub fn interface_rates(
    current: &InterfaceCounters,
    previous: Option<&InterfaceCounters>,
) -> InterfaceRates {
    match previous {
        Some(prev) => InterfaceRates {
            rx_bytes: current.rx.bytes.saturating_sub(prev.rx.bytes),
            tx_bytes: current.tx.bytes.saturating_sub(prev.tx.bytes),
            rx_packets: current.rx.packets.saturating_sub(prev.rx.packets),
            tx_packets: current.tx.packets.saturating_sub(prev.tx.packets),
        },
        None => InterfaceRates::default(),
    }
}

fn counter_row(rx_label: &str, rx: String, tx_label: &str, tx: String) -> Vec<String> {
    let mut row = vec![EMPTY_CELL.to_string(); IFACE_COLS];
    row[4] = rx_label.to_string();
    row[5] = rx;
    row[6] = tx_label.to_string();
    row[7] = tx;
    row
}

fn rx_only_row(label: &str, value: String) -> Vec<String> {
    let mut row = vec![EMPTY_CELL.to_string(); IFACE_COLS];
    row[4] = label.to_string();
    row[5] = value;
    row
}

/// Build the interfaces matrix: one [`ROWS_PER_IFACE`] block per interface,
/// with per-second rates derived from `cache` and assigned IP addresses
/// flowed into column 0 of the continuation rows.
pub fn format_interfaces(ifaces: &[InterfaceSample], cache: &SampleCache) -> RowMatrix {
    let mut rows = Vec::with_capacity(ROWS_PER_IFACE * ifaces.len());

    for iface in ifaces {
        let c = &iface.counters;
        let rates = interface_rates(c, cache.get(c.name.as_str()));

        rows.push(vec![
            c.name.clone(),
            c.index.to_string(),
            iface.state.as_str().to_string(),
            format!(
                "{}/{}/{}/{}",
                iface.mtu[0], iface.mtu[1], iface.mtu[2], iface.mtu[3]
            ),
            "Packets".to_string(),
            c.rx.packets.to_string(),
            "Packets".to_string(),
            c.tx.packets.to_string(),
            c.drops.to_string(),
            c.punts.to_string(),
            c.ip4.to_string(),
            c.ip6.to_string(),
        ]);
        rows.push(counter_row(
            "Packets/s",
            rates.rx_packets.to_string(),
            "Packets/s",
            rates.tx_packets.to_string(),
        ));
        rows.push(counter_row(
            "Bytes",
            c.rx.bytes.to_string(),
            "Bytes",
            c.tx.bytes.to_string(),
        ));
        rows.push(counter_row(
            "Bytes/s",
            rates.rx_bytes.to_string(),
            "Bytes/s",
            rates.tx_bytes.to_string(),
        ));
        rows.push(counter_row(
            "Errors",
            c.rx_errors.to_string(),
            "Errors",
            c.tx_errors.to_string(),
        ));
        rows.push(counter_row(
            "Unicast",
            format!("{}/{}", c.rx_unicast.packets, c.rx_unicast.bytes),
            "UnicastMiss",
            format!("{}/{}", c.tx_unicast.packets, c.tx_unicast.bytes),
        ));
        rows.push(counter_row(
            "Multicast",
            format!("{}/{}", c.rx_multicast.packets, c.rx_multicast.bytes),
            "Multicast",
            format!("{}/{}", c.tx_multicast.packets, c.tx_multicast.bytes),
        ));
        rows.push(counter_row(
            "Broadcast",
            format!("{}/{}", c.rx_broadcast.packets, c.rx_broadcast.bytes),
            "Broadcast",
            format!("{}/{}", c.tx_broadcast.packets, c.tx_broadcast.bytes),
        ));
        rows.push(rx_only_row("NoBuf", c.rx_no_buf.to_string()));
        rows.push(rx_only_row("Miss", c.rx_miss.to_string()));
        rows.push(vec![EMPTY_CELL.to_string(); IFACE_COLS]);

        // Assigned addresses start on the second row of the block; the first
        // is taken up by the interface name.
        let base = rows.len() - ROWS_PER_IFACE;
        let mut row = base + 1;
        for addr in iface.ip_addrs.iter().rev() {
            if row >= base + ROWS_PER_IFACE {
                break;
            }
            rows[row][0] = addr.split('/').next().unwrap_or(addr).to_string();
            row += 1;
        }
    }

    rows
}

/// One row per scheduler node.
pub fn format_nodes(nodes: &[NodeSample]) -> RowMatrix {
    nodes
        .iter()
        .map(|node| {
            vec![
                node.name.clone(),
                node.index.to_string(),
                (node.clocks as u64).to_string(),
                node.vectors.to_string(),
                node.calls.to_string(),
                node.suspends.to_string(),
                format!("{:.2}", node.vectors_per_call),
            ]
        })
        .collect()
}

/// One row per error counter; a single blank row when there are none, so the
/// table never collapses.
pub fn format_errors(errors: &[ErrorSample]) -> RowMatrix {
    if errors.is_empty() {
        return vec![vec![
            EMPTY_CELL.to_string(),
            EMPTY_CELL.to_string(),
            EMPTY_CELL.to_string(),
        ]];
    }
    errors
        .iter()
        .map(|error| {
            vec![
                error.value.to_string(),
                error.node.clone(),
                error.name.clone(),
            ]
        })
        .collect()
}

/// Group the memory report into [`ROWS_PER_MEMORY`]-row view blocks, one per
/// [`MEMORY_SOURCE_LINES`] source lines. Trailing lines short of a full
/// record are dropped.
pub fn format_memory(lines: &[String]) -> RowMatrix {
    let count = lines.len() / MEMORY_SOURCE_LINES;
    let mut rows = Vec::with_capacity(ROWS_PER_MEMORY * count);

    for entry in 0..count {
        let src = &lines[MEMORY_SOURCE_LINES * entry..];
        rows.push(vec![src[0].clone(), src[1].clone()]);
        for line in &src[2..MEMORY_SOURCE_LINES] {
            rows.push(vec![EMPTY_CELL.to_string(), line.clone()]);
        }
        rows.push(vec![EMPTY_CELL.to_string(), EMPTY_CELL.to_string()]);
        rows.push(vec![EMPTY_CELL.to_string(), EMPTY_CELL.to_string()]);
    }

    rows
}

/// One row per worker thread.
pub fn format_threads(threads: &[ThreadInfo]) -> RowMatrix {
    threads
        .iter()
        .map(|thread| {
            vec![
                thread.id.to_string(),
                thread.name.clone(),
                thread.kind.clone(),
                thread.pid.to_string(),
                thread.cpu_id.to_string(),
                thread.core.to_string(),
                thread.cpu_socket.to_string(),
            ]
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::types::{CombinedCounter, LinkState};

    fn sample(name: &str, rx_bytes: u64) -> InterfaceSample {
        InterfaceSample {
            counters: InterfaceCounters {
                name: name.to_string(),
                index: 1,
                rx: CombinedCounter {
                    packets: 10,
                    bytes: rx_bytes,
                },
                tx: CombinedCounter {
                    packets: 4,
                    bytes: 400,
                },
                ..Default::default()
            },
            state: LinkState::Up,
            mtu: [9000, 9000, 9000, 9000],
            ip_addrs: vec!["10.0.0.1/24".to_string()],
        }
    }

    #[test]
    fn test_rate_is_delta_against_previous_sample() {
        let prev = sample("eth0", 1000).counters;
        let curr = sample("eth0", 1500).counters;
        let rates = interface_rates(&curr, Some(&prev));
        assert_eq!(rates.rx_bytes, 500);
        assert_eq!(rates.rx_packets, 0);
    }

    #[test]
    fn test_rate_is_zero_without_previous_sample() {
        let curr = sample("eth0", 1500).counters;
        assert_eq!(interface_rates(&curr, None), InterfaceRates::default());
    }

    #[test]
    fn test_rate_clamps_on_counter_reset() {
        let prev = sample("eth0", 1500).counters;
        let curr = sample("eth0", 100).counters;
        assert_eq!(interface_rates(&curr, Some(&prev)).rx_bytes, 0);
    }

    #[test]
    fn test_interface_block_shape() {
        let ifaces = vec![sample("eth0", 1500)];
        let mut cache = SampleCache::new();
        cache.insert("eth0".to_string(), sample("eth0", 1000).counters);

        let rows = format_interfaces(&ifaces, &cache);
        assert_eq!(rows.len(), ROWS_PER_IFACE);
        assert!(rows.iter().all(|row| row.len() == IFACE_COLS));

        assert_eq!(rows[0][0], "eth0");
        assert_eq!(rows[0][2], "up");
        assert_eq!(rows[0][3], "9000/9000/9000/9000");
        // Bytes/s row carries the derived rate.
        assert_eq!(rows[3][4], "Bytes/s");
        assert_eq!(rows[3][5], "500");
        // Address flows into column 0 of the second row, prefix stripped.
        assert_eq!(rows[1][0], "10.0.0.1");
    }

    #[test]
    fn test_interface_rate_zero_for_new_interface() {
        let ifaces = vec![sample("eth1", 1500)];
        let rows = format_interfaces(&ifaces, &SampleCache::new());
        assert_eq!(rows[3][5], "0");
        assert_eq!(rows[1][5], "0");
    }

    #[test]
    fn test_node_rows() {
        let nodes = vec![NodeSample {
            name: "ip4-input".to_string(),
            index: 12,
            clocks: 5.9,
            vectors: 300,
            calls: 100,
            suspends: 2,
            vectors_per_call: 3.0,
        }];
        let rows = format_nodes(&nodes);
        assert_eq!(
            rows[0],
            vec!["ip4-input", "12", "5", "300", "100", "2", "3.00"]
        );
    }

    #[test]
    fn test_error_rows_and_empty_placeholder() {
        let errors = vec![ErrorSample {
            node: "ip4-input".to_string(),
            name: "bad checksum".to_string(),
            value: 7,
        }];
        let rows = format_errors(&errors);
        assert_eq!(rows[0], vec!["7", "ip4-input", "bad checksum"]);

        let empty = format_errors(&[]);
        assert_eq!(empty, vec![vec!["", "", ""]]);
    }

    #[test]
    fn test_memory_groups_seven_lines_into_eight_rows() {
        let lines: Vec<String> = (0..14).map(|i| format!("line{i}")).collect();
        let rows = format_memory(&lines);
        assert_eq!(rows.len(), 2 * ROWS_PER_MEMORY);

        assert_eq!(rows[0], vec!["line0", "line1"]);
        assert_eq!(rows[1], vec!["", "line2"]);
        assert_eq!(rows[5], vec!["", "line6"]);
        assert_eq!(rows[6], vec!["", ""]);
        // Second record starts on its own block boundary.
        assert_eq!(rows[ROWS_PER_MEMORY], vec!["line7", "line8"]);
    }

    #[test]
    fn test_memory_drops_partial_trailing_record() {
        let lines: Vec<String> = (0..9).map(|i| format!("line{i}")).collect();
        assert_eq!(format_memory(&lines).len(), ROWS_PER_MEMORY);
    }

    #[test]
    fn test_thread_rows() {
        let threads = vec![ThreadInfo {
            id: 1,
            name: "fp_wk_0".to_string(),
            kind: "workers".to_string(),
            pid: 4243,
            cpu_id: 2,
            core: 1,
            cpu_socket: 0,
        }];
        let rows = format_threads(&threads);
        assert_eq!(rows[0], vec!["1", "fp_wk_0", "workers", "4243", "2", "1", "0"]);
    }
}
