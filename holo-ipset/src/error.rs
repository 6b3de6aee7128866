//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use tracing::{error, warn};

use crate::packet::DecodeError;
use crate::route::RouteKey;
use crate::southbound::{FibError, LinkError};

// ipset route synchronization errors.
#[derive(Debug)]
pub enum Error {
    MsgDecodeError(DecodeError),
    RouteInstallError(RouteKey, FibError),
    RouteUninstallError(RouteKey, FibError),
    CaptureLinkError(String, LinkError),
}

// ===== impl Error =====

impl Error {
    pub fn log(&self) {
        match self {
            Error::MsgDecodeError(error) => {
                warn!(%error, "{}", self);
            }
            Error::RouteInstallError(key, error)
            | Error::RouteUninstallError(key, error) => {
                error!(
                    prefix = %key.prefix,
                    ifindex = %key.ifindex,
                    error = %with_source(error),
                    "{}",
                    self
                );
            }
            Error::CaptureLinkError(name, error) => {
                error!(%name, error = %with_source(error), "{}", self);
            }
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::MsgDecodeError(..) => {
                write!(f, "failed to decode ipset message")
            }
            Error::RouteInstallError(..) => {
                write!(f, "failed to install route")
            }
            Error::RouteUninstallError(..) => {
                write!(f, "failed to uninstall route")
            }
            Error::CaptureLinkError(..) => {
                write!(f, "failed to manage capture link")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::MsgDecodeError(error) => Some(error),
            Error::RouteInstallError(_, error)
            | Error::RouteUninstallError(_, error) => Some(error),
            Error::CaptureLinkError(_, error) => Some(error),
        }
    }
}

impl From<DecodeError> for Error {
    fn from(error: DecodeError) -> Error {
        Error::MsgDecodeError(error)
    }
}

// ===== global functions =====

pub fn with_source<E: std::error::Error>(error: E) -> String {
    if let Some(source) = error.source() {
        format!("{} ({})", error, with_source(source))
    } else {
        error.to_string()
    }
}
