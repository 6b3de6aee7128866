//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use holo_ipset::error::with_source;
use holo_ipset::southbound::LinkError;
use tracing::{error, warn};

// Daemon errors.
#[derive(Debug)]
pub enum Error {
    IoError(IoError),
    SyncError(holo_ipset::error::Error),
    InterfaceLookupError(String, LinkError),
}

// Daemon I/O errors.
#[derive(Debug)]
pub enum IoError {
    NetlinkSocketError(std::io::Error),
    CaptureSocketError(std::io::Error),
    CaptureRecvError(std::io::Error),
}

// ===== impl Error =====

impl Error {
    pub(crate) fn log(&self) {
        match self {
            Error::IoError(error) => {
                error.log();
            }
            Error::SyncError(error) => {
                error.log();
            }
            Error::InterfaceLookupError(name, error) => {
                error!(%name, error = %with_source(error), "{}", self);
            }
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::IoError(error) => error.fmt(f),
            Error::SyncError(error) => error.fmt(f),
            Error::InterfaceLookupError(..) => {
                write!(f, "failed to look up interface")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(error) => Some(error),
            Error::SyncError(error) => Some(error),
            Error::InterfaceLookupError(_, error) => Some(error),
        }
    }
}

impl From<IoError> for Error {
    fn from(error: IoError) -> Error {
        Error::IoError(error)
    }
}

impl From<holo_ipset::error::Error> for Error {
    fn from(error: holo_ipset::error::Error) -> Error {
        Error::SyncError(error)
    }
}

// ===== impl IoError =====

impl IoError {
    pub(crate) fn log(&self) {
        match self {
            IoError::NetlinkSocketError(error)
            | IoError::CaptureSocketError(error) => {
                error!(error = %with_source(error), "{}", self);
            }
            IoError::CaptureRecvError(error) => {
                warn!(error = %with_source(error), "{}", self);
            }
        }
    }
}

impl std::fmt::Display for IoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IoError::NetlinkSocketError(..) => {
                write!(f, "failed to create netlink socket")
            }
            IoError::CaptureSocketError(..) => {
                write!(f, "failed to create capture socket")
            }
            IoError::CaptureRecvError(..) => {
                write!(f, "failed to receive captured frame")
            }
        }
    }
}

impl std::error::Error for IoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            IoError::NetlinkSocketError(error)
            | IoError::CaptureSocketError(error)
            | IoError::CaptureRecvError(error) => Some(error),
        }
    }
}
