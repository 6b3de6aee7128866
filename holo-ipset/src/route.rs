//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use ipnetwork::Ipv4Network;
use serde::{Deserialize, Serialize};

use crate::debug::Debug;
use crate::error::Error;
use crate::packet::Command;
use crate::packet::ipset::DecodedPrefix;
use crate::southbound::{Fib, FibError};

// Identity of a forwarding entry managed by the engine.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct RouteKey {
    pub ifindex: u32,
    pub prefix: Ipv4Network,
}

// Outcome of applying a single command.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum SyncAction {
    Installed,
    Updated,
    Removed,
    Absent,
    Ignored,
}

// Keeps the forwarding table in sync with ipset ADD/DEL notifications.
//
// The engine remembers every route it installed so they can be pushed again
// after the forwarding table is reset, or removed when the engine is torn
// down.
#[derive(Debug)]
pub struct RouteSyncEngine<F: Fib> {
    fib: F,
    nexthop: Ipv4Addr,
    routes: BTreeMap<RouteKey, Ipv4Addr>,
}

// ===== impl RouteKey =====

impl RouteKey {
    // Host bits are cleared, so 10.0.0.1/24 and 10.0.0.0/24 are the same key.
    pub fn new(ifindex: u32, prefix: Ipv4Network) -> RouteKey {
        RouteKey {
            ifindex,
            prefix: apply_mask(&prefix),
        }
    }
}

impl std::fmt::Display for RouteKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} dev {}", self.prefix, self.ifindex)
    }
}

// ===== impl RouteSyncEngine =====

impl<F> RouteSyncEngine<F>
where
    F: Fib,
{
    pub fn new(fib: F, nexthop: Ipv4Addr) -> RouteSyncEngine<F> {
        RouteSyncEngine {
            fib,
            nexthop,
            routes: Default::default(),
        }
    }

    pub fn fib(&self) -> &F {
        &self.fib
    }

    pub fn fib_mut(&mut self) -> &mut F {
        &mut self.fib
    }

    pub fn nexthop(&self) -> Ipv4Addr {
        self.nexthop
    }

    pub fn routes(&self) -> impl Iterator<Item = (&RouteKey, &Ipv4Addr)> {
        self.routes.iter()
    }

    // Applies a classified command for the given prefix and egress
    // interface.
    //
    // On error the local route view is left untouched.
    pub fn apply(
        &mut self,
        command: Command,
        prefix: &DecodedPrefix,
        ifindex: u32,
    ) -> Result<SyncAction, Error> {
        match command {
            Command::Add => {
                let key = RouteKey::new(ifindex, prefix.network()?);
                self.route_add(key)
            }
            Command::Delete => {
                let key = RouteKey::new(ifindex, prefix.network()?);
                self.route_del(key)
            }
            Command::Unknown(_) => Ok(SyncAction::Ignored),
        }
    }

    fn route_add(&mut self, key: RouteKey) -> Result<SyncAction, Error> {
        self.fib
            .route_install(&key, self.nexthop)
            .map_err(|error| Error::RouteInstallError(key, error))?;
        Debug::RouteInstall(&key, &self.nexthop).log();

        match self.routes.insert(key, self.nexthop) {
            None => Ok(SyncAction::Installed),
            Some(_) => Ok(SyncAction::Updated),
        }
    }

    fn route_del(&mut self, key: RouteKey) -> Result<SyncAction, Error> {
        match self.fib.route_uninstall(&key) {
            Ok(()) => {
                Debug::RouteUninstall(&key).log();
                self.routes.remove(&key);
                Ok(SyncAction::Removed)
            }
            // Late or duplicate delete notification.
            Err(FibError::RouteNotFound) => {
                Debug::RouteAbsent(&key).log();
                self.routes.remove(&key);
                Ok(SyncAction::Absent)
            }
            Err(error) => Err(Error::RouteUninstallError(key, error)),
        }
    }

    // Installs again every route known to the engine, returning the number of
    // routes that failed to be installed.
    pub fn replay(&mut self) -> usize {
        Debug::RoutesReplay(self.routes.len()).log();

        let mut failures = 0;
        for (key, nexthop) in &self.routes {
            if let Err(error) = self.fib.route_install(key, *nexthop) {
                Error::RouteInstallError(*key, error).log();
                failures += 1;
            }
        }

        failures
    }

    // Uninstalls every route known to the engine, returning the number of
    // routes that failed to be uninstalled. Those are kept so the flush can
    // be retried.
    pub fn flush(&mut self) -> usize {
        Debug::RoutesFlush(self.routes.len()).log();

        let fib = &mut self.fib;
        self.routes.retain(|key, _| match fib.route_uninstall(key) {
            Ok(()) | Err(FibError::RouteNotFound) => false,
            Err(error) => {
                Error::RouteUninstallError(*key, error).log();
                true
            }
        });

        self.routes.len()
    }
}

// ===== helper functions =====

fn apply_mask(prefix: &Ipv4Network) -> Ipv4Network {
    Ipv4Network::new(prefix.network(), prefix.prefix()).unwrap()
}

// ===== unit tests =====
