//! Protocol revision 21.01 message bindings.
//!
//! Oldest supported revision. Interfaces report a single link MTU; the
//! per-protocol MTU array only appears in 21.06 and later.

use crate::binapi::{
    BinapiChannel, ChannelError, EngineDialect, MessageSig, check_retval, typed_request,
};
use crate::stats::compat::ProtocolVersion;
use crate::stats::types::{InterfaceDetail, ThreadInfo, VersionInfo};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub(crate) const SHOW_THREADS: MessageSig = MessageSig {
    name: "show_threads",
    crc: "0x51077d14",
};
pub(crate) const SW_INTERFACE_DUMP: MessageSig = MessageSig {
    name: "sw_interface_dump",
    crc: "0x052753c5",
};
pub(crate) const SHOW_VERSION: MessageSig = MessageSig {
    name: "show_version",
    crc: "0xc919bde1",
};
pub(crate) const CLI_INBAND: MessageSig = MessageSig {
    name: "cli_inband",
    crc: "0xf8377302",
};

pub(crate) const MESSAGES: &[MessageSig] =
    &[SHOW_THREADS, SW_INTERFACE_DUMP, SHOW_VERSION, CLI_INBAND];

/// GRE and VXLAN-GPE tunnel overlays shipped with 21.01.
pub(crate) const OVERLAY_MESSAGES: &[MessageSig] = &[
    MessageSig {
        name: "gre_tunnel_add_del",
        crc: "0x04199f47",
    },
    MessageSig {
        name: "gre_tunnel_dump",
        crc: "0xf9e6675e",
    },
    MessageSig {
        name: "vxlan_gpe_add_del_tunnel",
        crc: "0xa645b2b0",
    },
    MessageSig {
        name: "vxlan_gpe_tunnel_dump",
        crc: "0xf9e6675e",
    },
];

#[derive(Debug, Serialize)]
pub(crate) struct ShowThreads {}

#[derive(Debug, Deserialize)]
pub(crate) struct ShowThreadsReply {
    pub threads: Vec<ThreadRow>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ThreadRow {
    pub id: u32,
    pub name: String,
    pub kind: String,
    pub pid: u32,
    pub cpu_id: u32,
    pub core: u32,
    pub cpu_socket: u32,
}

#[derive(Debug, Serialize)]
pub(crate) struct SwInterfaceDump {}

#[derive(Debug, Deserialize)]
struct SwInterfaceDetails {
    sw_if_index: u32,
    interface_name: String,
    admin_up: bool,
    link_mtu: u32,
    ip_addresses: Vec<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ShowVersion {}

#[derive(Debug, Deserialize)]
pub(crate) struct ShowVersionReply {
    pub retval: i32,
    pub version: String,
    pub build_date: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct CliInband<'a> {
    pub cmd: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CliInbandReply {
    pub retval: i32,
    pub reply: String,
}

#[derive(Debug)]
pub struct Dialect2101;

#[async_trait]
impl EngineDialect for Dialect2101 {
    fn version(&self) -> ProtocolVersion {
        ProtocolVersion::V2101
    }

    fn messages(&self) -> &'static [MessageSig] {
        MESSAGES
    }

    fn overlay_messages(&self) -> &'static [MessageSig] {
        OVERLAY_MESSAGES
    }

    async fn show_threads(
        &self,
        chan: &dyn BinapiChannel,
    ) -> Result<Vec<ThreadInfo>, ChannelError> {
        let reply: ShowThreadsReply = typed_request(chan, &SHOW_THREADS, &ShowThreads {}).await?;
        Ok(reply.threads.into_iter().map(thread_info).collect())
    }

    async fn dump_interfaces(
        &self,
        chan: &dyn BinapiChannel,
    ) -> Result<HashMap<u32, InterfaceDetail>, ChannelError> {
        let details: Vec<SwInterfaceDetails> =
            typed_request(chan, &SW_INTERFACE_DUMP, &SwInterfaceDump {}).await?;
        Ok(details
            .into_iter()
            .map(|d| {
                (
                    d.sw_if_index,
                    InterfaceDetail {
                        index: d.sw_if_index,
                        name: d.interface_name,
                        enabled: d.admin_up,
                        // 21.01 has no per-protocol MTUs; mirror the link MTU.
                        mtu: [d.link_mtu; 4],
                        ip_addrs: d.ip_addresses,
                    },
                )
            })
            .collect())
    }

    async fn version_info(&self, chan: &dyn BinapiChannel) -> Result<VersionInfo, ChannelError> {
        let reply: ShowVersionReply = typed_request(chan, &SHOW_VERSION, &ShowVersion {}).await?;
        check_retval(SHOW_VERSION.name, reply.retval)?;
        Ok(VersionInfo {
            version: reply.version,
            build_date: reply.build_date,
        })
    }

    async fn run_cli(
        &self,
        chan: &dyn BinapiChannel,
        command: &str,
    ) -> Result<String, ChannelError> {
        let reply: CliInbandReply =
            typed_request(chan, &CLI_INBAND, &CliInband { cmd: command }).await?;
        check_retval(CLI_INBAND.name, reply.retval)?;
        Ok(reply.reply)
    }
}

pub(crate) fn thread_info(row: ThreadRow) -> ThreadInfo {
    ThreadInfo {
        id: row.id,
        name: row.name,
        kind: row.kind,
        pid: row.pid,
        cpu_id: row.cpu_id,
        core: row.core,
        cpu_socket: row.cpu_socket,
    }
}
