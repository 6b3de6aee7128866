//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use capctl::caps::{Cap, CapState};
use tracing::error;

// Capabilities kept after dropping root privileges.
pub(crate) const PERMITTED: [Cap; 2] = [Cap::NET_ADMIN, Cap::NET_RAW];

// Runs the provided closure with elevated capabilities.
pub(crate) fn raise<F, R>(cb: F) -> R
where
    F: FnOnce() -> R,
{
    let caps = raise_effective();
    let ret = cb();

    // Drop capabilities.
    if let Some(mut caps) = caps {
        caps.effective.clear();
        if let Err(error) = caps.set_current() {
            error!(%error, "failed to update current capabilities");
        }
    }

    ret
}

// Raises the capabilities of the calling thread for the rest of its
// lifetime.
pub(crate) fn raise_permanently() {
    let _ = raise_effective();
}

fn raise_effective() -> Option<CapState> {
    let mut caps = match CapState::get_current() {
        Ok(caps) => caps,
        Err(error) => {
            error!(%error, "failed to get current capabilities");
            return None;
        }
    };
    caps.effective = caps.permitted;
    if let Err(error) = caps.set_current() {
        error!(%error, "failed to update current capabilities");
    }
    Some(caps)
}
