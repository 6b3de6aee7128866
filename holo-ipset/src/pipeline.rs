//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::debug::Debug;
use crate::error::Error;
use crate::packet::ipset::{DecodedPrefix, IpsetData};
use crate::packet::{Command, ControlType, Message, MessageKind, NetlinkHdr};
use crate::route::{RouteSyncEngine, SyncAction};
use crate::southbound::Fib;

// Telemetry collaborator.
pub trait Telemetry {
    // Reports the increment of a counter over one batch.
    fn report_counter(&mut self, counter: Counter, delta: u64);

    // Receives the trace record of a processed message. Only called when
    // tracing is enabled.
    fn emit_trace(&mut self, record: &TraceRecord);
}

// Telemetry sink writing to the tracing subscriber.
#[derive(Debug, Default)]
pub struct LogTelemetry;

#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub enum Counter {
    Add,
    Del,
    Unknown,
    Errors,
}

// Pipeline counters.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct Counters {
    pub add: u64,
    pub del: u64,
    pub unknown: u64,
    pub errors: u64,
}

// Copy of a message header along with the prefix decoded from it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct TraceRecord {
    pub hdr: NetlinkHdr,
    pub prefix: DecodedPrefix,
}

// What happened to a single message.
#[derive(Debug)]
pub enum MessageResult {
    // Netlink control message, never inspected.
    Control(ControlType),
    // The forwarding table was synchronized.
    Synced(Command, SyncAction),
    // Data message other than ADD or DEL.
    Skipped(Command),
    // Message for a set not selected by the configuration.
    Filtered(Command),
    // Decode or forwarding table failure. The route action was skipped.
    Failed(Error),
}

// Result of processing one batch of messages.
#[derive(Debug)]
pub struct BatchOutcome {
    // Every input buffer, unchanged and in input order.
    pub forwarded: Vec<Bytes>,
    pub next_node: String,
    // Counter increments caused by this batch.
    pub counters: Counters,
    // One result per input buffer.
    pub results: Vec<MessageResult>,
}

// Route synchronization pipeline.
//
// Messages are processed one at a time, in order, and each message is fully
// applied to the forwarding table before the next one is looked at.
#[derive(Debug)]
pub struct Pipeline<F: Fib, T: Telemetry> {
    config: Config,
    ifindex: u32,
    engine: RouteSyncEngine<F>,
    telemetry: T,
    counters: Counters,
}

// ===== impl LogTelemetry =====

impl Telemetry for LogTelemetry {
    fn report_counter(&mut self, counter: Counter, delta: u64) {
        Debug::CounterReport(counter, delta).log();
    }

    fn emit_trace(&mut self, record: &TraceRecord) {
        Debug::MsgTrace(record).log();
    }
}

// ===== impl Counter =====

impl Counter {
    pub const ALL: [Counter; 4] =
        [Counter::Add, Counter::Del, Counter::Unknown, Counter::Errors];

    pub fn name(&self) -> &'static str {
        match self {
            Counter::Add => "ADD_INFO",
            Counter::Del => "DEL_INFO",
            Counter::Unknown => "UNKNOWN",
            Counter::Errors => "ERRORS",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Counter::Add => "Receive IPSET CMD ADD",
            Counter::Del => "Receive IPSET CMD DEL",
            Counter::Unknown => "Receive unknown IPSET CMD",
            Counter::Errors => "IPSET message errors",
        }
    }
}

// ===== impl Counters =====

impl Counters {
    pub fn get(&self, counter: Counter) -> u64 {
        match counter {
            Counter::Add => self.add,
            Counter::Del => self.del,
            Counter::Unknown => self.unknown,
            Counter::Errors => self.errors,
        }
    }

    fn incr(&mut self, counter: Counter) {
        let value = match counter {
            Counter::Add => &mut self.add,
            Counter::Del => &mut self.del,
            Counter::Unknown => &mut self.unknown,
            Counter::Errors => &mut self.errors,
        };
        *value += 1;
    }

    fn merge(&mut self, other: &Counters) {
        self.add += other.add;
        self.del += other.del;
        self.unknown += other.unknown;
        self.errors += other.errors;
    }
}

// ===== impl Pipeline =====

impl<F, T> Pipeline<F, T>
where
    F: Fib,
    T: Telemetry,
{
    pub fn new(
        config: Config,
        ifindex: u32,
        fib: F,
        telemetry: T,
    ) -> Pipeline<F, T> {
        let engine = RouteSyncEngine::new(fib, config.nexthop);
        Pipeline {
            config,
            ifindex,
            engine,
            telemetry,
            counters: Default::default(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // Egress interface of the installed routes.
    pub fn ifindex(&self) -> u32 {
        self.ifindex
    }

    // Counters accumulated since the pipeline was created.
    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    pub fn engine(&self) -> &RouteSyncEngine<F> {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut RouteSyncEngine<F> {
        &mut self.engine
    }

    pub fn telemetry(&self) -> &T {
        &self.telemetry
    }

    // Processes a batch of raw netlink messages.
    //
    // A failure affects only the message that caused it: every buffer is
    // forwarded regardless.
    pub fn process_batch(&mut self, batch: Vec<Bytes>) -> BatchOutcome {
        let mut counters = Counters::default();
        let mut results = Vec::with_capacity(batch.len());

        for buf in &batch {
            let result = self.process_msg(buf);
            match &result {
                MessageResult::Synced(Command::Add, _) => {
                    counters.incr(Counter::Add);
                }
                MessageResult::Synced(Command::Delete, _) => {
                    counters.incr(Counter::Del);
                }
                MessageResult::Skipped(_) if self.config.count_unknown => {
                    counters.incr(Counter::Unknown);
                }
                MessageResult::Failed(_) => {
                    counters.incr(Counter::Errors);
                }
                _ => (),
            }
            results.push(result);
        }

        // Report counters.
        self.counters.merge(&counters);
        for counter in Counter::ALL {
            let delta = counters.get(counter);
            if delta > 0 {
                self.telemetry.report_counter(counter, delta);
            }
        }

        BatchOutcome {
            forwarded: batch,
            next_node: self.config.next_node.clone(),
            counters,
            results,
        }
    }

    fn process_msg(&mut self, buf: &[u8]) -> MessageResult {
        let msg = match Message::decode(buf) {
            Ok(msg) => msg,
            Err(error) => {
                let error = Error::from(error);
                error.log();
                return MessageResult::Failed(error);
            }
        };
        Debug::MsgRx(&msg.hdr, &msg.kind).log();

        let mut data = IpsetData::default();
        let result = match msg.kind {
            MessageKind::Control(control) => MessageResult::Control(control),
            MessageKind::Data(command) => {
                self.process_data_msg(&msg, command, &mut data)
            }
        };

        if self.config.trace {
            let record = TraceRecord {
                hdr: msg.hdr,
                prefix: data.prefix,
            };
            self.telemetry.emit_trace(&record);
        }

        result
    }

    fn process_data_msg(
        &mut self,
        msg: &Message<'_>,
        command: Command,
        data: &mut IpsetData,
    ) -> MessageResult {
        if let Command::Unknown(_) = command {
            return MessageResult::Skipped(command);
        }

        // Decode ipset attributes.
        if let Err(error) = data.decode_into(msg.attrs()) {
            let error = Error::from(error);
            error.log();
            return MessageResult::Failed(error);
        }
        if !self.config.set_enabled(data.setname.as_deref()) {
            return MessageResult::Filtered(command);
        }

        // Synchronize the forwarding table.
        match self.engine.apply(command, &data.prefix, self.ifindex) {
            Ok(action) => MessageResult::Synced(command, action),
            Err(error) => {
                error.log();
                MessageResult::Failed(error)
            }
        }
    }
}
