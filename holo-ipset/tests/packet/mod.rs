//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;
use std::str::FromStr;
use std::sync::LazyLock as Lazy;

use holo_ipset::packet::attr::{AttrCursor, AttrFlags, nla_align};
use holo_ipset::packet::ipset::{
    DecodedPrefix, IPSET_ATTR_CIDR, IPSET_ATTR_DATA, IPSET_ATTR_IP_FROM,
    IPSET_ATTR_IPADDR_IPV4, IPSET_ATTR_IPADDR_IPV6, IPSET_ATTR_SETNAME,
    IpsetData, decode_ip_prefix,
};
use holo_ipset::packet::{
    Command, ControlType, DecodeError, DecodeResult, Message, MessageKind,
    NestingError, NetlinkHdr, NfGenHdr,
};
use ipnetwork::Ipv4Network;

//
// Helper functions.
//

fn attr(attr_type: u16, payload: &[u8]) -> Vec<u8> {
    let mut buf = vec![];
    buf.extend_from_slice(&((4 + payload.len()) as u16).to_ne_bytes());
    buf.extend_from_slice(&attr_type.to_ne_bytes());
    buf.extend_from_slice(payload);
    buf.resize(nla_align(buf.len()), 0);
    buf
}

fn nested(attr_type: u16, attrs: &[Vec<u8>]) -> Vec<u8> {
    attr(attr_type | AttrFlags::NESTED.bits(), &attrs.concat())
}

fn ip_attr(addr: [u8; 4]) -> Vec<u8> {
    nested(
        IPSET_ATTR_IP_FROM,
        &[attr(
            IPSET_ATTR_IPADDR_IPV4 | AttrFlags::NET_BYTEORDER.bits(),
            &addr,
        )],
    )
}

fn cidr_attr(prefix_len: u8) -> Vec<u8> {
    attr(IPSET_ATTR_CIDR, &[prefix_len])
}

fn msg(msg_type: u16, payload: &[u8]) -> Vec<u8> {
    let mut buf = vec![];
    buf.extend_from_slice(&((16 + payload.len()) as u32).to_ne_bytes());
    buf.extend_from_slice(&msg_type.to_ne_bytes());
    buf.extend_from_slice(&0x0005u16.to_ne_bytes());
    buf.extend_from_slice(&1u32.to_ne_bytes());
    buf.extend_from_slice(&0u32.to_ne_bytes());
    buf.extend_from_slice(payload);
    buf
}

fn ipset_msg(command: u8, attrs: &[Vec<u8>]) -> Vec<u8> {
    let mut payload = vec![0x02, 0x00, 0x00, 0x00];
    payload.extend(attrs.concat());
    msg(0x0600 | command as u16, &payload)
}

fn test_decode_ipset(bytes: &[u8], data_expected: &DecodeResult<IpsetData>) {
    let msg = Message::decode(bytes).unwrap();
    let data_actual = IpsetData::decode(msg.attrs());
    assert_eq!(*data_expected, data_actual);
}

fn prefix(addr: [u8; 4], prefix_len: u8) -> DecodedPrefix {
    DecodedPrefix {
        addr: Some(Ipv4Addr::from(addr)),
        prefix_len: Some(prefix_len),
    }
}

//
// Test messages.
//

// "ipset add blocklist 10.0.0.1/24" as captured on a little-endian host.
#[cfg(target_endian = "little")]
static IPSET_ADD1: Lazy<(Vec<u8>, DecodeResult<IpsetData>)> = Lazy::new(|| {
    (
        vec![
            0x4c, 0x00, 0x00, 0x00, 0x09, 0x06, 0x05, 0x00, 0x01, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00, 0x05, 0x00,
            0x01, 0x00, 0x06, 0x00, 0x00, 0x00, 0x0e, 0x00, 0x02, 0x00, 0x62,
            0x6c, 0x6f, 0x63, 0x6b, 0x6c, 0x69, 0x73, 0x74, 0x00, 0x00, 0x00,
            0x20, 0x00, 0x07, 0x80, 0x0c, 0x00, 0x01, 0x80, 0x08, 0x00, 0x01,
            0x40, 0x0a, 0x00, 0x00, 0x01, 0x05, 0x00, 0x03, 0x00, 0x18, 0x00,
            0x00, 0x00, 0x08, 0x00, 0x09, 0x40, 0x00, 0x00, 0x00, 0x00,
        ],
        Ok(IpsetData {
            protocol: Some(6),
            setname: Some("blocklist".to_owned()),
            prefix: prefix([10, 0, 0, 1], 24),
        }),
    )
});

static IPSET_DEL1: Lazy<(Vec<u8>, DecodeResult<IpsetData>)> = Lazy::new(|| {
    (
        ipset_msg(
            Command::IPSET_CMD_DEL,
            &[
                attr(1, &[6]),
                attr(IPSET_ATTR_SETNAME, b"blocklist\0"),
                nested(
                    IPSET_ATTR_DATA,
                    &[ip_attr([172, 16, 0, 0]), cidr_attr(12)],
                ),
            ],
        ),
        Ok(IpsetData {
            protocol: Some(6),
            setname: Some("blocklist".to_owned()),
            prefix: prefix([172, 16, 0, 0], 12),
        }),
    )
});

//
// Tests.
//

#[cfg(target_endian = "little")]
#[test]
fn test_decode_ipset_add1() {
    let (ref bytes, ref data) = *IPSET_ADD1;

    let msg = Message::decode(bytes).unwrap();
    assert_eq!(msg.kind, MessageKind::Data(Command::Add));
    assert_eq!(
        msg.hdr,
        NetlinkHdr {
            length: 76,
            msg_type: 0x0609,
            flags: 0x0005,
            seqno: 1,
            pid: 0,
        }
    );
    assert_eq!(
        msg.nfgen,
        Some(NfGenHdr {
            family: 2,
            version: 0,
            res_id: 0,
        })
    );
    test_decode_ipset(bytes, data);
}

#[test]
fn test_decode_ipset_del1() {
    let (ref bytes, ref data) = *IPSET_DEL1;

    let msg = Message::decode(bytes).unwrap();
    assert_eq!(msg.command(), Some(Command::Delete));
    test_decode_ipset(bytes, data);
}

#[test]
fn test_decode_control() {
    for (msg_type, control) in [
        (1, ControlType::Noop),
        (2, ControlType::Error),
        (3, ControlType::Done),
        (4, ControlType::Overrun),
    ] {
        let bytes = msg(msg_type, &[0; 4]);
        let msg = Message::decode(&bytes).unwrap();
        assert_eq!(msg.kind, MessageKind::Control(control));
        assert_eq!(msg.command(), None);
        assert_eq!(msg.attrs().count(), 0);
    }
}

#[test]
fn test_decode_unknown_command() {
    // ipset LIST.
    let bytes = ipset_msg(7, &[]);
    let list = Message::decode(&bytes).unwrap();
    assert_eq!(list.kind, MessageKind::Data(Command::Unknown(0x0607)));

    // ctnetlink message with the same command code as an ipset ADD.
    let bytes = msg(0x0109, &[0x02, 0x00, 0x00, 0x00]);
    let ct = Message::decode(&bytes).unwrap();
    assert_eq!(ct.kind, MessageKind::Data(Command::Unknown(0x0109)));
    assert_eq!(ct.nfgen, None);
    assert_eq!(ct.attrs().count(), 0);
}

#[test]
fn test_decode_unknown_command_without_nfgenmsg() {
    // rtnetlink RTM_NEWLINK with no payload.
    let bytes = msg(0x0010, &[]);
    let link = Message::decode(&bytes).unwrap();
    assert_eq!(link.kind, MessageKind::Data(Command::Unknown(0x0010)));
    assert_eq!(link.nfgen, None);

    // ipset ADD with no payload is still rejected.
    let bytes = msg(0x0609, &[]);
    assert_eq!(
        Message::decode(&bytes),
        Err(DecodeError::TruncatedMessage(0))
    );
}

#[test]
fn test_decode_truncated_message() {
    assert_eq!(
        Message::decode(&[0; 8]),
        Err(DecodeError::TruncatedMessage(8))
    );

    let mut bytes = ipset_msg(Command::IPSET_CMD_ADD, &[cidr_attr(24)]);
    bytes.truncate(bytes.len() - 4);
    assert_eq!(
        Message::decode(&bytes),
        Err(DecodeError::TruncatedMessage(bytes.len()))
    );

    // Data message without room for the nfnetlink header.
    let bytes = msg(0x0609, &[0x02]);
    assert_eq!(
        Message::decode(&bytes),
        Err(DecodeError::TruncatedMessage(1))
    );
}

#[test]
fn test_decode_invalid_message_length() {
    let mut bytes = ipset_msg(Command::IPSET_CMD_ADD, &[]);
    bytes[..4].copy_from_slice(&8u32.to_ne_bytes());
    assert_eq!(
        Message::decode(&bytes),
        Err(DecodeError::InvalidMessageLength(8))
    );
}

#[test]
fn test_decode_trailing_bytes_ignored() {
    let mut bytes = ipset_msg(
        Command::IPSET_CMD_ADD,
        &[nested(IPSET_ATTR_DATA, &[ip_attr([10, 0, 0, 0]), cidr_attr(8)])],
    );
    bytes.extend_from_slice(&[0xff; 12]);

    let msg = Message::decode(&bytes).unwrap();
    assert_eq!(
        decode_ip_prefix(msg.attrs()),
        Ok(prefix([10, 0, 0, 0], 8))
    );
}

#[test]
fn test_decode_interleaved_siblings() {
    let bytes = ipset_msg(
        Command::IPSET_CMD_ADD,
        &[
            attr(IPSET_ATTR_SETNAME, b"blocklist\0"),
            nested(
                IPSET_ATTR_DATA,
                &[
                    attr(9 | AttrFlags::NET_BYTEORDER.bits(), &[0; 4]),
                    ip_attr([192, 0, 2, 0]),
                    nested(17, &[attr(1, &[0xde, 0xad])]),
                    cidr_attr(25),
                    attr(6, &[0; 8]),
                ],
            ),
            attr(42, &[1, 2, 3]),
        ],
    );

    let msg = Message::decode(&bytes).unwrap();
    assert_eq!(
        decode_ip_prefix(msg.attrs()),
        Ok(prefix([192, 0, 2, 0], 25))
    );
}

#[test]
fn test_decode_last_attribute_wins() {
    let bytes = ipset_msg(
        Command::IPSET_CMD_ADD,
        &[nested(
            IPSET_ATTR_DATA,
            &[
                ip_attr([10, 0, 0, 0]),
                cidr_attr(8),
                ip_attr([10, 1, 0, 0]),
                cidr_attr(16),
            ],
        )],
    );

    let msg = Message::decode(&bytes).unwrap();
    assert_eq!(
        decode_ip_prefix(msg.attrs()),
        Ok(prefix([10, 1, 0, 0], 16))
    );
}

#[test]
fn test_decode_cidr_u32() {
    let bytes = ipset_msg(
        Command::IPSET_CMD_ADD,
        &[nested(
            IPSET_ATTR_DATA,
            &[
                ip_attr([10, 0, 0, 0]),
                attr(IPSET_ATTR_CIDR, &24u32.to_ne_bytes()),
            ],
        )],
    );

    let msg = Message::decode(&bytes).unwrap();
    assert_eq!(
        decode_ip_prefix(msg.attrs()),
        Ok(prefix([10, 0, 0, 0], 24))
    );
}

#[test]
fn test_decode_invalid_cidr() {
    let bytes = ipset_msg(
        Command::IPSET_CMD_ADD,
        &[nested(IPSET_ATTR_DATA, &[ip_attr([10, 0, 0, 0]), cidr_attr(33)])],
    );

    let msg = Message::decode(&bytes).unwrap();
    assert_eq!(
        decode_ip_prefix(msg.attrs()),
        Err(DecodeError::InvalidPrefixLength(33))
    );
}

#[test]
fn test_decode_ipv6_skipped() {
    let bytes = ipset_msg(
        Command::IPSET_CMD_ADD,
        &[nested(
            IPSET_ATTR_DATA,
            &[
                nested(
                    IPSET_ATTR_IP_FROM,
                    &[attr(IPSET_ATTR_IPADDR_IPV6, &[0x20; 16])],
                ),
            ],
        )],
    );

    let msg = Message::decode(&bytes).unwrap();
    let prefix = decode_ip_prefix(msg.attrs()).unwrap();
    assert_eq!(prefix.addr, None);
    assert_eq!(prefix.prefix_len, None);
}

#[test]
fn test_decode_ip_not_nested() {
    // A flat IP_FROM attribute isn't an address container.
    let bytes = ipset_msg(
        Command::IPSET_CMD_ADD,
        &[nested(
            IPSET_ATTR_DATA,
            &[attr(IPSET_ATTR_IP_FROM, &[10, 0, 0, 1]), cidr_attr(32)],
        )],
    );

    let msg = Message::decode(&bytes).unwrap();
    let prefix = decode_ip_prefix(msg.attrs()).unwrap();
    assert_eq!(prefix.addr, None);
    assert_eq!(prefix.prefix_len, Some(32));
    assert_eq!(
        prefix.network(),
        Err(DecodeError::MalformedNesting(NestingError::MissingAddr))
    );
}

#[test]
fn test_decode_missing_prefix_length() {
    let bytes = ipset_msg(
        Command::IPSET_CMD_ADD,
        &[nested(IPSET_ATTR_DATA, &[ip_attr([10, 0, 0, 1])])],
    );

    let msg = Message::decode(&bytes).unwrap();
    let prefix = decode_ip_prefix(msg.attrs()).unwrap();
    assert_eq!(
        prefix.network(),
        Err(DecodeError::MalformedNesting(
            NestingError::MissingPrefixLength
        ))
    );
}

#[test]
fn test_decode_truncated_nested_attribute() {
    let mut data = nested(IPSET_ATTR_DATA, &[ip_attr([10, 0, 0, 1])]);
    // Make the IP container claim more bytes than its parent holds.
    data[4..6].copy_from_slice(&40u16.to_ne_bytes());
    let bytes = ipset_msg(
        Command::IPSET_CMD_ADD,
        &[attr(IPSET_ATTR_SETNAME, b"blocklist\0"), data],
    );

    let msg = Message::decode(&bytes).unwrap();
    let mut data = IpsetData::default();
    assert_eq!(
        data.decode_into(msg.attrs()),
        Err(DecodeError::TruncatedAttribute {
            attr_type: IPSET_ATTR_IP_FROM,
            attr_len: 40,
            remaining: 12,
        })
    );
    // Attributes preceding the truncated one were still decoded.
    assert_eq!(data.setname.as_deref(), Some("blocklist"));
}

#[test]
fn test_decode_nested_payload_too_short() {
    let bytes = ipset_msg(
        Command::IPSET_CMD_ADD,
        &[attr(IPSET_ATTR_DATA | AttrFlags::NESTED.bits(), &[0; 2])],
    );

    let msg = Message::decode(&bytes).unwrap();
    assert_eq!(
        decode_ip_prefix(msg.attrs()),
        Err(DecodeError::MalformedNesting(NestingError::PayloadTooShort(
            IPSET_ATTR_DATA
        )))
    );
}

#[test]
fn test_decode_invalid_addr_length() {
    let bytes = ipset_msg(
        Command::IPSET_CMD_ADD,
        &[nested(
            IPSET_ATTR_DATA,
            &[nested(
                IPSET_ATTR_IP_FROM,
                &[attr(IPSET_ATTR_IPADDR_IPV4, &[10, 0, 0])],
            )],
        )],
    );

    let msg = Message::decode(&bytes).unwrap();
    assert_eq!(
        decode_ip_prefix(msg.attrs()),
        Err(DecodeError::MalformedNesting(
            NestingError::InvalidAddrLength(3)
        ))
    );
}

#[test]
fn test_cursor_over_message() {
    let (ref bytes, _) = *IPSET_DEL1;

    let msg = Message::decode(bytes).unwrap();
    let types = msg
        .attrs()
        .map(|attr| attr.map(|attr| attr.attr_type))
        .collect::<DecodeResult<Vec<_>>>()
        .unwrap();
    assert_eq!(types, vec![1, IPSET_ATTR_SETNAME, IPSET_ATTR_DATA]);

    // The payload of the last attribute is a cursor of its own.
    let data = msg.attrs().last().unwrap().unwrap();
    let count = AttrCursor::new(data.payload).count();
    assert_eq!(count, 2);
}

#[test]
fn test_prefix_network() {
    assert_eq!(
        prefix([10, 0, 0, 1], 24).network(),
        Ok(Ipv4Network::from_str("10.0.0.1/24").unwrap())
    );
    assert!(DecodedPrefix::default().is_empty());
    assert_eq!(prefix([10, 0, 0, 1], 24).to_string(), "10.0.0.1/24");
    assert_eq!(DecodedPrefix::default().to_string(), "-/-");
}

#[test]
fn test_decode_untyped_addr() {
    // DATA nest holding an IP_FROM nest whose address attribute has type 0
    // (no family), followed by a 32-bit CIDR. The prefix is only looked up
    // inside DATA: IP_FROM and CIDR at the top level yield MissingAddr.
    let bytes = ipset_msg(
        Command::IPSET_CMD_ADD,
        &[nested(
            IPSET_ATTR_DATA,
            &[
                nested(IPSET_ATTR_IP_FROM, &[attr(0, &[10, 0, 0, 1])]),
                attr(IPSET_ATTR_CIDR, &24u32.to_ne_bytes()),
            ],
        )],
    );

    let msg = Message::decode(&bytes).unwrap();
    assert_eq!(
        decode_ip_prefix(msg.attrs()),
        Ok(prefix([10, 0, 0, 1], 24))
    );
}
