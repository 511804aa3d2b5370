//! Protocol revision 22.02 (final) message bindings.
//!
//! Identical wire shapes to 22.02_rc0; only the CRCs moved between the
//! release candidate and the final build.

use crate::binapi::v2101::{CliInband, CliInbandReply, ShowThreads, ShowVersion, ShowVersionReply};
use crate::binapi::v2202_rc0::{
    ShowThreadsReply, SwInterfaceDetails, SwInterfaceDump, interface_detail, thread_info,
};
use crate::binapi::{
    BinapiChannel, ChannelError, EngineDialect, MessageSig, check_retval, typed_request,
};
use crate::stats::compat::ProtocolVersion;
use crate::stats::types::{InterfaceDetail, ThreadInfo, VersionInfo};
use async_trait::async_trait;
use std::collections::HashMap;

pub(crate) const SHOW_THREADS: MessageSig = MessageSig {
    name: "show_threads",
    crc: "0x3a2f90dc",
};
pub(crate) const SW_INTERFACE_DUMP: MessageSig = MessageSig {
    name: "sw_interface_dump",
    crc: "0x9a271bcd",
};
pub(crate) const SHOW_VERSION: MessageSig = MessageSig {
    name: "show_version",
    crc: "0x76e4f1a0",
};
pub(crate) const CLI_INBAND: MessageSig = MessageSig {
    name: "cli_inband",
    crc: "0x4c7e0352",
};

pub(crate) const MESSAGES: &[MessageSig] =
    &[SHOW_THREADS, SW_INTERFACE_DUMP, SHOW_VERSION, CLI_INBAND];

pub(crate) const OVERLAY_MESSAGES: &[MessageSig] = &[
    MessageSig {
        name: "gre_tunnel_add_del",
        crc: "0xe6f8b2c9",
    },
    MessageSig {
        name: "gre_tunnel_dump",
        crc: "0x2e1b5c74",
    },
    MessageSig {
        name: "vxlan_gpe_add_del_tunnel",
        crc: "0x1f4d08a3",
    },
    MessageSig {
        name: "vxlan_gpe_tunnel_dump",
        crc: "0x2e1b5c74",
    },
];

#[derive(Debug)]
pub struct Dialect2202;

#[async_trait]
impl EngineDialect for Dialect2202 {
    fn version(&self) -> ProtocolVersion {
        ProtocolVersion::V2202
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
