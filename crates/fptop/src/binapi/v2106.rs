//! Protocol revision 21.06 message bindings.
//!
//! First revision with the per-protocol MTU array on the interface dump.
//! Thread, version and CLI messages keep the 21.01 layout under new CRCs.

use crate::binapi::v2101::{
    CliInband, CliInbandReply, ShowThreads, ShowThreadsReply, ShowVersion, ShowVersionReply,
    SwInterfaceDump, thread_info,
};
use crate::binapi::{
    BinapiChannel, ChannelError, EngineDialect, MessageSig, check_retval, typed_request,
};
use crate::stats::compat::ProtocolVersion;
use crate::stats::types::{InterfaceDetail, ThreadInfo, VersionInfo};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;

pub(crate) const SHOW_THREADS: MessageSig = MessageSig {
    name: "show_threads",
    crc: "0x2cc35e53",
};
pub(crate) const SW_INTERFACE_DUMP: MessageSig = MessageSig {
    name: "sw_interface_dump",
    crc: "0xaa610c27",
};
pub(crate) const SHOW_VERSION: MessageSig = MessageSig {
    name: "show_version",
    crc: "0x51077d14",
};
pub(crate) const CLI_INBAND: MessageSig = MessageSig {
    name: "cli_inband",
    crc: "0xb1ad59b3",
};

pub(crate) const MESSAGES: &[MessageSig] =
    &[SHOW_THREADS, SW_INTERFACE_DUMP, SHOW_VERSION, CLI_INBAND];

pub(crate) const OVERLAY_MESSAGES: &[MessageSig] = &[
    MessageSig {
        name: "gre_tunnel_add_del",
        crc: "0x6efc9c22",
    },
    MessageSig {
        name: "gre_tunnel_dump",
        crc: "0xd3bf5f40",
    },
    MessageSig {
        name: "vxlan_gpe_add_del_tunnel",
        crc: "0x7c6da6ae",
    },
    MessageSig {
        name: "vxlan_gpe_tunnel_dump",
        crc: "0xd3bf5f40",
    },
];

#[derive(Debug, Deserialize)]
struct SwInterfaceDetails {
    sw_if_index: u32,
    interface_name: String,
    admin_up: bool,
    /// L3 / IP4 / IP6 / MPLS.
    mtu: [u32; 4],
    ip_addresses: Vec<String>,
}

#[derive(Debug)]
pub struct Dialect2106;

#[async_trait]
impl EngineDialect for Dialect2106 {
    fn version(&self) -> ProtocolVersion {
        ProtocolVersion::V2106
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
                        mtu: d.mtu,
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
