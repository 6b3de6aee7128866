//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//
#![no_main]

use holo_ipset::packet::attr::AttrCursor;
use holo_ipset::packet::ipset::decode_ip_prefix;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let cursor = AttrCursor::new(data);
    assert!(cursor.clone().count() <= data.len() / 4 + 1);
    let _ = decode_ip_prefix(cursor);
});
