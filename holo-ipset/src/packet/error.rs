//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use serde::{Deserialize, Serialize};

// Type aliases.
pub type DecodeResult<T> = Result<T, DecodeError>;

// Netlink/ipset decode errors.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum DecodeError {
    TruncatedMessage(usize),
    InvalidMessageLength(u32),
    TruncatedAttribute {
        attr_type: u16,
        attr_len: u16,
        remaining: usize,
    },
    InvalidAttrLength(u16),
    MalformedNesting(NestingError),
    InvalidPrefixLength(u32),
}

// Reasons for a nested attribute walk to fail.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum NestingError {
    NotNested(u16),
    PayloadTooShort(u16),
    DepthExceeded(usize),
    InvalidAddrLength(u16),
    InvalidCidrLength(u16),
    MissingAddr,
    MissingPrefixLength,
}

// ===== impl DecodeError =====

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::TruncatedMessage(len) => {
                write!(f, "truncated netlink message: {} bytes", len)
            }
            DecodeError::InvalidMessageLength(len) => {
                write!(f, "invalid netlink message length: {}", len)
            }
            DecodeError::TruncatedAttribute {
                attr_type,
                attr_len,
                remaining,
            } => {
                write!(
                    f,
                    "truncated attribute (type {}): length {} exceeds {} bytes",
                    attr_type, attr_len, remaining
                )
            }
            DecodeError::InvalidAttrLength(len) => {
                write!(f, "invalid attribute length: {}", len)
            }
            DecodeError::MalformedNesting(error) => {
                write!(f, "malformed nested attribute: {}", error)
            }
            DecodeError::InvalidPrefixLength(len) => {
                write!(f, "invalid prefix length: {}", len)
            }
        }
    }
}

impl std::error::Error for DecodeError {}

impl From<NestingError> for DecodeError {
    fn from(error: NestingError) -> DecodeError {
        DecodeError::MalformedNesting(error)
    }
}

// ===== impl NestingError =====

impl std::fmt::Display for NestingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NestingError::NotNested(attr_type) => {
                write!(f, "attribute {} is not nested", attr_type)
            }
            NestingError::PayloadTooShort(attr_type) => {
                write!(f, "attribute {} payload too short", attr_type)
            }
            NestingError::DepthExceeded(depth) => {
                write!(f, "nesting depth exceeded: {}", depth)
            }
            NestingError::InvalidAddrLength(len) => {
                write!(f, "invalid IPv4 address length: {}", len)
            }
            NestingError::InvalidCidrLength(len) => {
                write!(f, "invalid CIDR attribute length: {}", len)
            }
            NestingError::MissingAddr => {
                write!(f, "missing IP address")
            }
            NestingError::MissingPrefixLength => {
                write!(f, "missing prefix length")
            }
        }
    }
}
