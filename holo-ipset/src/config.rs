//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

#![allow(clippy::derivable_impls)]

use std::net::Ipv4Addr;

use serde::Deserialize;

// Route synchronization configuration.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct Config {
    // Nexthop of every installed route.
    pub nexthop: Ipv4Addr,
    // Label of the downstream sink every processed buffer is handed to.
    pub next_node: String,
    // Emit a trace record for every processed message.
    pub trace: bool,
    // Count data messages that are neither ADD nor DEL.
    pub count_unknown: bool,
    // Restrict synchronization to these sets (empty means all sets).
    pub sets: Vec<String>,
}

// ===== impl Config =====

impl Config {
    pub const DFLT_NEXTHOP: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 2);
    pub const DFLT_NEXT_NODE: &'static str = "drop";

    // Returns whether messages for the given set should be synchronized.
    pub fn set_enabled(&self, setname: Option<&str>) -> bool {
        if self.sets.is_empty() {
            return true;
        }

        setname
            .is_some_and(|setname| self.sets.iter().any(|set| set == setname))
    }
}

impl Default for Config {
    fn default() -> Config {
        Config {
            nexthop: Config::DFLT_NEXTHOP,
            next_node: Config::DFLT_NEXT_NODE.to_owned(),
            trace: false,
            count_unknown: false,
            sets: vec![],
        }
    }
}
