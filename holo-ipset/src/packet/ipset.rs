//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use ipnetwork::Ipv4Network;
use serde::{Deserialize, Serialize};

use crate::packet::attr::{AttrCursor, AttrView};
use crate::packet::error::{DecodeError, DecodeResult, NestingError};

// ipset top-level attribute types.
pub const IPSET_ATTR_PROTOCOL: u16 = 1;
pub const IPSET_ATTR_SETNAME: u16 = 2;
pub const IPSET_ATTR_DATA: u16 = 7;

// ipset data attribute types (carried inside IPSET_ATTR_DATA).
pub const IPSET_ATTR_IP_FROM: u16 = 1;
pub const IPSET_ATTR_CIDR: u16 = 3;

// ipset IP address attribute types (carried inside IPSET_ATTR_IP_FROM).
pub const IPSET_ATTR_IPADDR_IPV4: u16 = 1;
pub const IPSET_ATTR_IPADDR_IPV6: u16 = 2;

// Maximum IPv4 prefix length.
pub const IPV4_MAX_PREFIXLEN: u32 = 32;

// IPv4 prefix accumulated while walking the attributes of a single message.
//
// Both fields start unset. When an attribute appears more than once, the last
// occurrence wins.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct DecodedPrefix {
    pub addr: Option<Ipv4Addr>,
    pub prefix_len: Option<u8>,
}

// Attributes of an ipset ADD/DEL message relevant to route synchronization.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct IpsetData {
    pub protocol: Option<u8>,
    pub setname: Option<String>,
    pub prefix: DecodedPrefix,
}

// ===== impl DecodedPrefix =====

impl DecodedPrefix {
    pub fn is_empty(&self) -> bool {
        self.addr.is_none() && self.prefix_len.is_none()
    }

    // Returns the decoded prefix, failing if any part of it is missing.
    pub fn network(&self) -> DecodeResult<Ipv4Network> {
        let addr = self.addr.ok_or(NestingError::MissingAddr)?;
        let prefix_len =
            self.prefix_len.ok_or(NestingError::MissingPrefixLength)?;
        Ipv4Network::new(addr, prefix_len)
            .map_err(|_| DecodeError::InvalidPrefixLength(prefix_len.into()))
    }

    // Walks the nested attributes of an ipset data attribute.
    fn decode_data(&mut self, data: &AttrView<'_>) -> DecodeResult<()> {
        for attr in data.nested()? {
            let attr = attr?;
            match attr.attr_type {
                IPSET_ATTR_IP_FROM if attr.is_nested() => {
                    self.decode_ip(&attr)?;
                }
                IPSET_ATTR_CIDR => {
                    self.decode_cidr(&attr)?;
                }
                _ => {
                    // Ignore unknown attributes.
                }
            }
        }

        Ok(())
    }

    fn decode_ip(&mut self, ip: &AttrView<'_>) -> DecodeResult<()> {
        for attr in ip.nested()? {
            let attr = attr?;
            if attr.attr_type == IPSET_ATTR_IPADDR_IPV6 {
                continue;
            }

            let octets: [u8; 4] = attr.payload.try_into().map_err(|_| {
                NestingError::InvalidAddrLength(attr.payload.len() as u16)
            })?;
            self.addr = Some(Ipv4Addr::from(octets));
        }

        Ok(())
    }

    fn decode_cidr(&mut self, cidr: &AttrView<'_>) -> DecodeResult<()> {
        // The kernel encodes the CIDR as an u8, but a 32-bit value is
        // accepted as well.
        let prefix_len = match cidr.payload.len() {
            1..4 => cidr.get_u8().map(u32::from),
            _ => cidr.get_u32(),
        }
        .ok_or(NestingError::InvalidCidrLength(cidr.payload.len() as u16))?;
        if prefix_len > IPV4_MAX_PREFIXLEN {
            return Err(DecodeError::InvalidPrefixLength(prefix_len));
        }

        self.prefix_len = Some(prefix_len as u8);
        Ok(())
    }
}

impl std::fmt::Display for DecodedPrefix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.addr {
            Some(addr) => write!(f, "{}", addr)?,
            None => write!(f, "-")?,
        }
        match self.prefix_len {
            Some(prefix_len) => write!(f, "/{}", prefix_len),
            None => write!(f, "/-"),
        }
    }
}

// ===== impl IpsetData =====

impl IpsetData {
    // Walks the top-level attribute stream of an ipset message.
    //
    // The accumulated fields are kept up to the point where an error is
    // found.
    pub fn decode_into(&mut self, attrs: AttrCursor<'_>) -> DecodeResult<()> {
        for attr in attrs {
            let attr = attr?;
            match attr.attr_type {
                IPSET_ATTR_PROTOCOL if !attr.is_nested() => {
                    self.protocol = attr.get_u8();
                }
                IPSET_ATTR_SETNAME if !attr.is_nested() => {
                    self.setname = attr.get_str().map(str::to_owned);
                }
                _ if attr.is_nested() => {
                    self.prefix.decode_data(&attr)?;
                }
                _ => {
                    // Ignore unknown attributes.
                }
            }
        }

        Ok(())
    }

    pub fn decode(attrs: AttrCursor<'_>) -> DecodeResult<IpsetData> {
        let mut data = IpsetData::default();
        data.decode_into(attrs)?;
        Ok(data)
    }
}

// ===== global functions =====

// Extracts the IPv4 prefix carried by an ipset attribute stream.
pub fn decode_ip_prefix(attrs: AttrCursor<'_>) -> DecodeResult<DecodedPrefix> {
    IpsetData::decode(attrs).map(|data| data.prefix)
}
