//! Protocol revision 22.02_rc0 message bindings.
//!
//! The 22.02 line renamed `cpu_socket` to `numa_id` on the thread dump wire
//! format; everything else keeps the 21.06 shapes under new CRCs.

use crate::binapi::v2101::{CliInband, CliInbandReply, ShowThreads, ShowVersion, ShowVersionReply};
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
    crc: "0xefd78e83",
};
pub(crate) const SW_INTERFACE_DUMP: MessageSig = MessageSig {
    name: "sw_interface_dump",
    crc: "0x3c8b9e41",
};
pub(crate) const SHOW_VERSION: MessageSig = MessageSig {
    name: "show_version",
    crc: "0x57a1f01e",
};
pub(crate) const CLI_INBAND: MessageSig = MessageSig {
    name: "cli_inband",
    crc: "0x0d32b1c7",
};

pub(crate) const MESSAGES: &[MessageSig] =
    &[SHOW_THREADS, SW_INTERFACE_DUMP, SHOW_VERSION, CLI_INBAND];

pub(crate) const OVERLAY_MESSAGES: &[MessageSig] = &[
    MessageSig {
        name: "gre_tunnel_add_del",
        crc: "0xa27e02ae",
    },
    MessageSig {
        name: "gre_tunnel_dump",
        crc: "0x8c2b9a61",
    },
    MessageSig {
        name: "vxlan_gpe_add_del_tunnel",
        crc: "0x68f78a2d",
    },
    MessageSig {
        name: "vxlan_gpe_tunnel_dump",
        crc: "0x8c2b9a61",
    },
];

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
    pub numa_id: u32,
}

#[derive(Debug, Serialize)]
pub(crate) struct SwInterfaceDump {}

#[derive(Debug, Deserialize)]
pub(crate) struct SwInterfaceDetails {
    pub sw_if_index: u32,
    pub interface_name: String,
    pub admin_up: bool,
    pub mtu: [u32; 4],
    pub ip_addresses: Vec<String>,
}

#[derive(Debug)]
pub struct Dialect2202Rc0;

#[async_trait]
impl EngineDialect for Dialect2202Rc0 {
    fn version(&self) -> ProtocolVersion {
        ProtocolVersion::V2202Rc0
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
        Ok(details.into_iter().map(|d| (d.sw_if_index, interface_detail(d))).collect())
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
        cpu_socket: row.numa_id,
    }
}

pub(crate) fn interface_detail(d: SwInterfaceDetails) -> InterfaceDetail {
    InterfaceDetail {
        index: d.sw_if_index,
        name: d.interface_name,
        enabled: d.admin_up,
        mtu: d.mtu,
        ip_addrs: d.ip_addresses,
    }
}
