//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

pub mod config;
pub mod debug;
pub mod error;
pub mod packet;
pub mod pipeline;
pub mod route;
pub mod southbound;
