//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::iter::FusedIterator;

use bitflags::bitflags;
use bytes::Buf;
use serde::{Deserialize, Serialize};

use crate::packet::error::{DecodeError, DecodeResult, NestingError};

// Attribute header size.
pub const NLA_HDR_SIZE: usize = 4;

// Attribute payload alignment.
pub const NLA_ALIGNTO: usize = 4;

// Mask stripping the flag bits from the attribute type.
pub const NLA_TYPE_MASK: u16 = !AttrFlags::all().bits();

// Maximum depth of nested attribute streams.
//
// Depth zero is the top-level stream of a message.
pub const MAX_NESTING_DEPTH: usize = 4;

// Attribute type flags.
bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    #[derive(Deserialize, Serialize)]
    #[serde(transparent)]
    pub struct AttrFlags: u16 {
        const NESTED = 1 << 15;
        const NET_BYTEORDER = 1 << 14;
    }
}

//
// Netlink attribute.
//
// Encoding format:
//
//  0                   1                   2                   3
//  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |            Length             |N|O|          Type             |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                    Payload (padded to 4 bytes)                |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//
// Length and type are in host byte order. The length covers the header and
// the unpadded payload.
//
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AttrView<'a> {
    // Attribute type, flags stripped.
    pub attr_type: u16,
    pub flags: AttrFlags,
    // Offset of the attribute header within the walked buffer.
    pub offset: usize,
    pub payload: &'a [u8],
    depth: usize,
}

// Lazy iterator over a stream of netlink attributes.
//
// A fresh cursor can be created over any byte slice, including the payload of
// a nested attribute. An error item always ends the sequence.
#[derive(Clone, Debug)]
pub struct AttrCursor<'a> {
    buf: &'a [u8],
    offset: usize,
    depth: usize,
    done: bool,
}

// ===== impl AttrView =====

impl<'a> AttrView<'a> {
    pub fn is_nested(&self) -> bool {
        self.flags.contains(AttrFlags::NESTED)
    }

    // Currently unused for decoding: IPv4 addresses are always copied
    // octet by octet.
    pub fn is_net_byteorder(&self) -> bool {
        self.flags.contains(AttrFlags::NET_BYTEORDER)
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    // Returns a cursor over the payload of this nested attribute.
    pub fn nested(&self) -> DecodeResult<AttrCursor<'a>> {
        if !self.is_nested() {
            return Err(NestingError::NotNested(self.attr_type).into());
        }
        if self.payload.len() < NLA_HDR_SIZE {
            return Err(NestingError::PayloadTooShort(self.attr_type).into());
        }
        let depth = self.depth + 1;
        if depth > MAX_NESTING_DEPTH {
            return Err(NestingError::DepthExceeded(depth).into());
        }

        Ok(AttrCursor::with_depth(self.payload, depth))
    }

    pub fn get_u8(&self) -> Option<u8> {
        self.payload.first().copied()
    }

    // Reads a native-endian 32-bit integer.
    pub fn get_u32(&self) -> Option<u32> {
        let mut payload = self.payload;
        (payload.len() >= 4).then(|| payload.get_u32_ne())
    }

    // Reads a NUL-terminated string.
    pub fn get_str(&self) -> Option<&'a str> {
        let end = self
            .payload
            .iter()
            .position(|byte| *byte == 0)
            .unwrap_or(self.payload.len());
        std::str::from_utf8(&self.payload[..end]).ok()
    }
}

// ===== impl AttrCursor =====

impl<'a> AttrCursor<'a> {
    pub fn new(buf: &'a [u8]) -> AttrCursor<'a> {
        AttrCursor::with_depth(buf, 0)
    }

    fn with_depth(buf: &'a [u8], depth: usize) -> AttrCursor<'a> {
        AttrCursor {
            buf,
            offset: 0,
            depth,
            done: false,
        }
    }

    // Number of bytes consumed so far, padding included.
    pub fn consumed(&self) -> usize {
        self.offset
    }

    fn fail(
        &mut self,
        error: DecodeError,
    ) -> Option<DecodeResult<AttrView<'a>>> {
        self.done = true;
        Some(Err(error))
    }
}

impl<'a> Iterator for AttrCursor<'a> {
    type Item = DecodeResult<AttrView<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        // A short trailing fragment silently ends the stream.
        let remaining = &self.buf[self.offset..];
        if remaining.len() < NLA_HDR_SIZE {
            self.done = true;
            return None;
        }

        // Parse attribute header.
        let mut hdr = remaining;
        let attr_len = hdr.get_u16_ne();
        let attr_type = hdr.get_u16_ne();
        if (attr_len as usize) < NLA_HDR_SIZE {
            return self.fail(DecodeError::InvalidAttrLength(attr_len));
        }
        if attr_len as usize > remaining.len() {
            return self.fail(DecodeError::TruncatedAttribute {
                attr_type: attr_type & NLA_TYPE_MASK,
                attr_len,
                remaining: remaining.len(),
            });
        }

        let view = AttrView {
            attr_type: attr_type & NLA_TYPE_MASK,
            flags: AttrFlags::from_bits_truncate(attr_type),
            offset: self.offset,
            payload: &remaining[NLA_HDR_SIZE..attr_len as usize],
            depth: self.depth,
        };

        // The last attribute isn't necessarily padded.
        self.offset =
            (self.offset + nla_align(attr_len as usize)).min(self.buf.len());

        Some(Ok(view))
    }
}

impl FusedIterator for AttrCursor<'_> {}

// ===== global functions =====

pub const fn nla_align(len: usize) -> usize {
    (len + NLA_ALIGNTO - 1) & !(NLA_ALIGNTO - 1)
}

// ===== unit tests =====
