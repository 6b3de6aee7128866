//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

pub mod attr;
pub mod error;
pub mod ipset;

use bytes::Buf;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use serde::{Deserialize, Serialize};

use crate::packet::attr::AttrCursor;
pub use crate::packet::error::{DecodeError, DecodeResult, NestingError};

// Netlink message header size.
pub const NLMSG_HDR_SIZE: usize = 16;

// Netlink message alignment.
pub const NLMSG_ALIGNTO: usize = 4;

// nfnetlink generic header size.
pub const NFGENMSG_SIZE: usize = 4;

// Offset of the attribute stream within an nfnetlink message.
pub const NFNL_ATTR_OFFSET: usize = NLMSG_HDR_SIZE + NFGENMSG_SIZE;

// nfnetlink subsystem of ipset messages.
pub const NFNL_SUBSYS_IPSET: u8 = 6;

// Generic netlink control message types.
#[derive(Clone, Copy, Debug, Eq, FromPrimitive, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum ControlType {
    Noop = 1,
    Error = 2,
    Done = 3,
    Overrun = 4,
}

// ipset commands.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum Command {
    Add,
    Delete,
    Unknown(u16),
}

// Message classification.
//
// Control messages are expected traffic: they are skipped without looking at
// their payload and aren't counted as failures.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum MessageKind {
    Control(ControlType),
    Data(Command),
}

//
// Netlink message header.
//
// Encoding format (host byte order):
//
//  0                   1                   2                   3
//  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                            Length                             |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |             Type              |             Flags             |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                        Sequence Number                        |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                           Port ID                             |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct NetlinkHdr {
    pub length: u32,
    pub msg_type: u16,
    pub flags: u16,
    pub seqno: u32,
    pub pid: u32,
}

//
// nfnetlink generic header.
//
// Encoding format:
//
//  0                   1                   2                   3
//  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |    Family     |    Version    |     Resource ID (big-endian)  |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct NfGenHdr {
    pub family: u8,
    pub version: u8,
    pub res_id: u16,
}

// Decoded view of a single netlink message.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Message<'a> {
    pub hdr: NetlinkHdr,
    pub kind: MessageKind,
    pub nfgen: Option<NfGenHdr>,
    attrs: &'a [u8],
}

// ===== impl Command =====

impl Command {
    pub const IPSET_CMD_ADD: u8 = 9;
    pub const IPSET_CMD_DEL: u8 = 10;
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Add => write!(f, "add"),
            Command::Delete => write!(f, "delete"),
            Command::Unknown(msg_type) => {
                write!(f, "unknown ({:#06x})", msg_type)
            }
        }
    }
}

// ===== impl NetlinkHdr =====

impl NetlinkHdr {
    pub fn decode(buf: &[u8]) -> DecodeResult<NetlinkHdr> {
        if buf.len() < NLMSG_HDR_SIZE {
            return Err(DecodeError::TruncatedMessage(buf.len()));
        }

        let mut buf = buf;
        Ok(NetlinkHdr {
            length: buf.get_u32_ne(),
            msg_type: buf.get_u16_ne(),
            flags: buf.get_u16_ne(),
            seqno: buf.get_u32_ne(),
            pid: buf.get_u32_ne(),
        })
    }

    // nfnetlink subsystem encoded in the message type.
    pub fn subsystem(&self) -> u8 {
        (self.msg_type >> 8) as u8
    }

    // nfnetlink command encoded in the message type.
    pub fn command(&self) -> u8 {
        (self.msg_type & 0xff) as u8
    }
}

// ===== impl NfGenHdr =====

impl NfGenHdr {
    pub fn decode(buf: &[u8]) -> DecodeResult<NfGenHdr> {
        if buf.len() < NFGENMSG_SIZE {
            return Err(DecodeError::TruncatedMessage(buf.len()));
        }

        let mut buf = buf;
        Ok(NfGenHdr {
            family: buf.get_u8(),
            version: buf.get_u8(),
            res_id: buf.get_u16(),
        })
    }
}

// ===== impl Message =====

impl<'a> Message<'a> {
    // Decodes the netlink message at the start of the buffer.
    //
    // Bytes past the length declared in the netlink header are ignored.
    pub fn decode(buf: &'a [u8]) -> DecodeResult<Message<'a>> {
        let hdr = NetlinkHdr::decode(buf)?;
        let length = hdr.length as usize;
        if length < NLMSG_HDR_SIZE {
            return Err(DecodeError::InvalidMessageLength(hdr.length));
        }
        if length > buf.len() {
            return Err(DecodeError::TruncatedMessage(buf.len()));
        }

        // Only ipset ADD and DEL messages are inspected any further.
        let kind = classify(&hdr);
        if !matches!(kind, MessageKind::Data(Command::Add | Command::Delete)) {
            return Ok(Message {
                hdr,
                kind,
                nfgen: None,
                attrs: &[],
            });
        }

        let nfgen = NfGenHdr::decode(&buf[NLMSG_HDR_SIZE..length])?;
        Ok(Message {
            hdr,
            kind,
            nfgen: Some(nfgen),
            attrs: &buf[NFNL_ATTR_OFFSET..length],
        })
    }

    // Returns a fresh cursor over the top-level attributes.
    pub fn attrs(&self) -> AttrCursor<'a> {
        AttrCursor::new(self.attrs)
    }

    pub fn command(&self) -> Option<Command> {
        match self.kind {
            MessageKind::Control(_) => None,
            MessageKind::Data(command) => Some(command),
        }
    }
}

// ===== global functions =====

pub const fn nlmsg_align(len: usize) -> usize {
    (len + NLMSG_ALIGNTO - 1) & !(NLMSG_ALIGNTO - 1)
}

// Classifies a message by its netlink header.
pub fn classify(hdr: &NetlinkHdr) -> MessageKind {
    if let Some(control) = ControlType::from_u16(hdr.msg_type) {
        return MessageKind::Control(control);
    }

    let command = match (hdr.subsystem(), hdr.command()) {
        (NFNL_SUBSYS_IPSET, Command::IPSET_CMD_ADD) => Command::Add,
        (NFNL_SUBSYS_IPSET, Command::IPSET_CMD_DEL) => Command::Delete,
        _ => Command::Unknown(hdr.msg_type),
    };
    MessageKind::Data(command)
}
