//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use tracing::{debug, debug_span, trace};

use crate::packet::{MessageKind, NetlinkHdr};
use crate::pipeline::{Counter, TraceRecord};
use crate::route::RouteKey;

// ipset debug messages.
#[derive(Debug)]
pub enum Debug<'a> {
    CaptureLinkCreate(&'a str, u32),
    CaptureLinkReuse(&'a str, u32),
    CaptureLinkDelete(&'a str),
    MsgRx(&'a NetlinkHdr, &'a MessageKind),
    MsgTrace(&'a TraceRecord),
    RouteInstall(&'a RouteKey, &'a Ipv4Addr),
    RouteUninstall(&'a RouteKey),
    RouteAbsent(&'a RouteKey),
    RoutesReplay(usize),
    RoutesFlush(usize),
    CounterReport(Counter, u64),
}

// ===== impl Debug =====

impl Debug<'_> {
    // Log debug message using the tracing API.
    pub fn log(&self) {
        match self {
            Debug::CaptureLinkCreate(name, ifindex)
            | Debug::CaptureLinkReuse(name, ifindex) => {
                debug!(%name, %ifindex, "{}", self);
            }
            Debug::CaptureLinkDelete(name) => {
                debug!(%name, "{}", self);
            }
            Debug::MsgRx(hdr, kind) => {
                debug_span!("input").in_scope(|| {
                    trace!(
                        length = %hdr.length,
                        msg_type = %hdr.msg_type,
                        seqno = %hdr.seqno,
                        ?kind,
                        "{}",
                        self
                    );
                });
            }
            Debug::MsgTrace(record) => {
                debug_span!("input").in_scope(|| {
                    let data = serde_json::to_string(&record).unwrap();
                    debug!(%data, "{}", self);
                });
            }
            Debug::RouteInstall(key, nexthop) => {
                debug!(
                    prefix = %key.prefix,
                    ifindex = %key.ifindex,
                    %nexthop,
                    "{}",
                    self
                );
            }
            Debug::RouteUninstall(key) | Debug::RouteAbsent(key) => {
                debug!(
                    prefix = %key.prefix,
                    ifindex = %key.ifindex,
                    "{}",
                    self
                );
            }
            Debug::RoutesReplay(count) | Debug::RoutesFlush(count) => {
                debug!(%count, "{}", self);
            }
            Debug::CounterReport(counter, delta) => {
                trace!(counter = %counter.name(), %delta, "{}", self);
            }
        }
    }
}

impl std::fmt::Display for Debug<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Debug::CaptureLinkCreate(..) => {
                write!(f, "capture link created")
            }
            Debug::CaptureLinkReuse(..) => {
                write!(f, "reusing existing capture link")
            }
            Debug::CaptureLinkDelete(..) => {
                write!(f, "capture link deleted")
            }
            Debug::MsgRx(..) => {
                write!(f, "message")
            }
            Debug::MsgTrace(..) => {
                write!(f, "message trace")
            }
            Debug::RouteInstall(..) => {
                write!(f, "route installed")
            }
            Debug::RouteUninstall(..) => {
                write!(f, "route uninstalled")
            }
            Debug::RouteAbsent(..) => {
                write!(f, "route already absent")
            }
            Debug::RoutesReplay(..) => {
                write!(f, "replaying routes")
            }
            Debug::RoutesFlush(..) => {
                write!(f, "flushing routes")
            }
            Debug::CounterReport(..) => {
                write!(f, "counter")
            }
        }
    }
}
