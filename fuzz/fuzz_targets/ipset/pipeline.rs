//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//
#![no_main]

use bytes::Bytes;
use holo_ipset::config::Config;
use holo_ipset::pipeline::{LogTelemetry, Pipeline};
use holo_ipset::southbound::FibTable;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let fib = FibTable::new([1]);
    let mut pipeline = Pipeline::new(Config::default(), 1, fib, LogTelemetry);
    let batch = data
        .chunks(64)
        .map(Bytes::copy_from_slice)
        .collect::<Vec<_>>();
    let len = batch.len();
    let outcome = pipeline.process_batch(batch);
    assert_eq!(outcome.forwarded.len(), len);
    assert_eq!(outcome.results.len(), len);
});
