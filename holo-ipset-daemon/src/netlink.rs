//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use futures::TryStreamExt;
use futures::executor::block_on;
use holo_ipset::route::RouteKey;
use holo_ipset::southbound::{
    Fib, FibError, LinkError, LinkManager, NLMON_LINK_KIND,
};
use netlink_packet_core::ErrorMessage;
use netlink_packet_route::link::InfoKind;
use netlink_packet_route::route::{RouteMessage, RouteProtocol};
use rtnetlink::{
    Handle, LinkMessageBuilder, LinkUnspec, RouteMessageBuilder,
    new_connection,
};

use crate::capabilities;
use crate::error::IoError;

// Forwarding table backed by the kernel's main routing table.
//
// Requests are blocking: they're meant to be issued from the capture thread.
#[derive(Clone, Debug)]
pub struct KernelFib {
    handle: Handle,
}

// Kernel link management.
#[derive(Clone, Debug)]
pub struct KernelLinks {
    handle: Handle,
}

// ===== impl KernelFib =====

impl KernelFib {
    pub(crate) fn new(handle: Handle) -> KernelFib {
        KernelFib { handle }
    }
}

impl Fib for KernelFib {
    fn route_install(
        &mut self,
        key: &RouteKey,
        nexthop: Ipv4Addr,
    ) -> Result<(), FibError> {
        let msg = route_msg(key, Some(nexthop));
        let request = self.handle.route().add(msg).replace();
        block_on(request.execute()).map_err(|error| fib_error(key, error))
    }

    fn route_uninstall(&mut self, key: &RouteKey) -> Result<(), FibError> {
        let msg = route_msg(key, None);
        let request = self.handle.route().del(msg);
        block_on(request.execute()).map_err(|error| fib_error(key, error))
    }
}

// ===== impl KernelLinks =====

impl KernelLinks {
    pub(crate) fn new(handle: Handle) -> KernelLinks {
        KernelLinks { handle }
    }
}

impl LinkManager for KernelLinks {
    fn link_create(
        &mut self,
        name: &str,
        kind: &str,
    ) -> Result<u32, LinkError> {
        let kind = match kind {
            NLMON_LINK_KIND => InfoKind::Nlmon,
            _ => InfoKind::Other(kind.to_owned()),
        };
        let msg = LinkMessageBuilder::<LinkUnspec>::new_with_info_kind(kind)
            .name(name.to_owned())
            .up()
            .build();
        block_on(self.handle.link().add(msg).execute()).map_err(link_error)?;

        // Fetch the ifindex assigned by the kernel.
        self.link_lookup(name)?
            .ok_or_else(|| LinkError::NotFound(name.to_owned()))
    }

    fn link_delete(&mut self, name: &str) -> Result<(), LinkError> {
        let Some(ifindex) = self.link_lookup(name)? else {
            return Err(LinkError::NotFound(name.to_owned()));
        };
        block_on(self.handle.link().del(ifindex).execute()).map_err(link_error)
    }

    fn link_lookup(&mut self, name: &str) -> Result<Option<u32>, LinkError> {
        let mut links = std::pin::pin!(
            self.handle
                .link()
                .get()
                .match_name(name.to_owned())
                .execute()
        );
        match block_on(links.try_next()) {
            Ok(msg) => Ok(msg.map(|msg| msg.header.index)),
            Err(rtnetlink::Error::NetlinkError(msg))
                if errno(&msg) == libc::ENODEV =>
            {
                Ok(None)
            }
            Err(error) => Err(link_error(error)),
        }
    }
}

// ===== helper functions =====

fn route_msg(key: &RouteKey, nexthop: Option<Ipv4Addr>) -> RouteMessage {
    let mut builder = RouteMessageBuilder::<Ipv4Addr>::new()
        .destination_prefix(key.prefix.ip(), key.prefix.prefix())
        .output_interface(key.ifindex)
        .protocol(RouteProtocol::Static);
    if let Some(nexthop) = nexthop {
        builder = builder.gateway(nexthop);
    }
    builder.build()
}

fn errno(msg: &ErrorMessage) -> i32 {
    -msg.raw_code()
}

fn fib_error(key: &RouteKey, error: rtnetlink::Error) -> FibError {
    if let rtnetlink::Error::NetlinkError(msg) = &error {
        match errno(msg) {
            libc::ENODEV => return FibError::InterfaceNotFound(key.ifindex),
            libc::ESRCH | libc::ENOENT => return FibError::RouteNotFound,
            _ => (),
        }
    }
    FibError::Netlink(std::io::Error::other(error))
}

fn link_error(error: rtnetlink::Error) -> LinkError {
    LinkError::Netlink(std::io::Error::other(error))
}

// ===== global functions =====

pub(crate) fn init() -> Result<Handle, IoError> {
    // Create netlink connection.
    let (conn, handle, _) =
        new_connection().map_err(IoError::NetlinkSocketError)?;

    // Spawn the netlink connection on a separate thread with permanent
    // elevated capabilities.
    std::thread::spawn(|| {
        capabilities::raise_permanently();

        // Serve requests initiated by the netlink handle.
        block_on(conn)
    });

    // Return handle used to send netlink requests to the kernel.
    Ok(handle)
}
