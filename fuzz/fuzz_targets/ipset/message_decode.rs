//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//
#![no_main]

use holo_ipset::packet::Message;
use holo_ipset::packet::ipset::IpsetData;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(msg) = Message::decode(data)
        && let Ok(data) = IpsetData::decode(msg.attrs())
    {
        let _ = data.prefix.network();
    }
});
