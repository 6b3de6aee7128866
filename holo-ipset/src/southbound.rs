//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv4Addr;

use crate::debug::Debug;
use crate::route::RouteKey;

// Link kind used to capture netlink traffic.
pub const NLMON_LINK_KIND: &str = "nlmon";

// Forwarding table written by the route synchronization engine.
//
// Both operations must be idempotent from the caller's point of view:
// installing an existing route replaces it.
pub trait Fib {
    // Installs or replaces a route.
    fn route_install(
        &mut self,
        key: &RouteKey,
        nexthop: Ipv4Addr,
    ) -> Result<(), FibError>;

    // Removes a route. Fails with `FibError::RouteNotFound` if the route
    // doesn't exist.
    fn route_uninstall(&mut self, key: &RouteKey) -> Result<(), FibError>;
}

// Device-management collaborator.
pub trait LinkManager {
    // Creates a link of the given kind, returning its ifindex.
    fn link_create(
        &mut self,
        name: &str,
        kind: &str,
    ) -> Result<u32, LinkError>;

    fn link_delete(&mut self, name: &str) -> Result<(), LinkError>;

    fn link_lookup(&mut self, name: &str) -> Result<Option<u32>, LinkError>;
}

// FIB errors.
#[derive(Debug)]
pub enum FibError {
    InterfaceNotFound(u32),
    TableFull(usize),
    RouteNotFound,
    Netlink(std::io::Error),
}

// Link management errors.
#[derive(Debug)]
pub enum LinkError {
    NotFound(String),
    Netlink(std::io::Error),
}

// In-memory forwarding table.
#[derive(Debug, Default)]
pub struct FibTable {
    interfaces: BTreeSet<u32>,
    capacity: Option<usize>,
    routes: BTreeMap<RouteKey, Ipv4Addr>,
}

// ===== impl FibError =====

impl std::fmt::Display for FibError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FibError::InterfaceNotFound(ifindex) => {
                write!(f, "interface not found: {}", ifindex)
            }
            FibError::TableFull(capacity) => {
                write!(f, "forwarding table full ({} routes)", capacity)
            }
            FibError::RouteNotFound => {
                write!(f, "route not found")
            }
            FibError::Netlink(..) => {
                write!(f, "netlink request failed")
            }
        }
    }
}

impl std::error::Error for FibError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FibError::Netlink(error) => Some(error),
            _ => None,
        }
    }
}

// ===== impl LinkError =====

impl std::fmt::Display for LinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkError::NotFound(name) => {
                write!(f, "link not found: {}", name)
            }
            LinkError::Netlink(..) => {
                write!(f, "netlink request failed")
            }
        }
    }
}

impl std::error::Error for LinkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LinkError::Netlink(error) => Some(error),
            _ => None,
        }
    }
}

// ===== impl FibTable =====

impl FibTable {
    pub fn new(interfaces: impl IntoIterator<Item = u32>) -> FibTable {
        FibTable {
            interfaces: interfaces.into_iter().collect(),
            capacity: None,
            routes: Default::default(),
        }
    }

    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> FibTable {
        self.capacity = Some(capacity);
        self
    }

    pub fn get(&self, key: &RouteKey) -> Option<&Ipv4Addr> {
        self.routes.get(key)
    }

    pub fn contains(&self, key: &RouteKey) -> bool {
        self.routes.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&RouteKey, &Ipv4Addr)> {
        self.routes.iter()
    }
}

impl Fib for FibTable {
    fn route_install(
        &mut self,
        key: &RouteKey,
        nexthop: Ipv4Addr,
    ) -> Result<(), FibError> {
        if !self.interfaces.contains(&key.ifindex) {
            return Err(FibError::InterfaceNotFound(key.ifindex));
        }
        if let Some(capacity) = self.capacity
            && !self.routes.contains_key(key)
            && self.routes.len() >= capacity
        {
            return Err(FibError::TableFull(capacity));
        }

        self.routes.insert(*key, nexthop);
        Ok(())
    }

    fn route_uninstall(&mut self, key: &RouteKey) -> Result<(), FibError> {
        self.routes
            .remove(key)
            .map(|_| ())
            .ok_or(FibError::RouteNotFound)
    }
}

impl<F: Fib + ?Sized> Fib for &mut F {
    fn route_install(
        &mut self,
        key: &RouteKey,
        nexthop: Ipv4Addr,
    ) -> Result<(), FibError> {
        (**self).route_install(key, nexthop)
    }

    fn route_uninstall(&mut self, key: &RouteKey) -> Result<(), FibError> {
        (**self).route_uninstall(key)
    }
}

// ===== global functions =====

// Ensures the netlink capture link exists, returning its ifindex.
pub fn capture_link_enable(
    links: &mut impl LinkManager,
    name: &str,
) -> Result<u32, LinkError> {
    if let Some(ifindex) = links.link_lookup(name)? {
        Debug::CaptureLinkReuse(name, ifindex).log();
        return Ok(ifindex);
    }

    let ifindex = links.link_create(name, NLMON_LINK_KIND)?;
    Debug::CaptureLinkCreate(name, ifindex).log();
    Ok(ifindex)
}

// Removes the netlink capture link.
pub fn capture_link_disable(
    links: &mut impl LinkManager,
    name: &str,
) -> Result<(), LinkError> {
    links.link_delete(name)?;
    Debug::CaptureLinkDelete(name).log();
    Ok(())
}

// ===== unit tests =====
