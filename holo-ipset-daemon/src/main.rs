//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

mod capabilities;
mod capture;
mod config;
mod error;
mod netlink;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use capctl::caps;
use clap::{App, Arg};
use config::{Config, LoggingFileRotation, LoggingFmtStyle};
use holo_ipset::pipeline::{LogTelemetry, Pipeline};
use holo_ipset::southbound::{
    Fib, FibTable, LinkError, LinkManager, capture_link_disable,
    capture_link_enable,
};
use nix::unistd::{Uid, User};
use rtnetlink::Handle;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::mpsc;
use tracing::level_filters::LevelFilter;
use tracing::{debug, error, info};
use tracing_appender::rolling;
use tracing_subscriber::Layer;
use tracing_subscriber::prelude::*;

use crate::capture::CaptureSocket;
use crate::error::Error;
use crate::netlink::{KernelFib, KernelLinks};

fn init_tracing(config: &config::Logging) {
    // Enable logging to journald.
    let journald = config.journald.enabled.then(|| {
        tracing_journald::layer().expect("couldn't connect to journald")
    });

    // Enable logging to a file.
    let file = config.file.enabled.then(|| {
        let file_appender = match config.file.rotation {
            LoggingFileRotation::Never => {
                rolling::never(&config.file.dir, &config.file.name)
            }
            LoggingFileRotation::Hourly => {
                rolling::hourly(&config.file.dir, &config.file.name)
            }
            LoggingFileRotation::Daily => {
                rolling::daily(&config.file.dir, &config.file.name)
            }
        };

        let log_level_filter = LevelFilter::from_level(tracing::Level::TRACE);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(file_appender)
            .with_target(false)
            .with_thread_ids(config.file.fmt.show_thread_id)
            .with_file(config.file.fmt.show_source)
            .with_line_number(config.file.fmt.show_source)
            .with_ansi(config.file.fmt.colors);
        let layer = match config.file.fmt.style {
            LoggingFmtStyle::Compact => layer.compact().boxed(),
            LoggingFmtStyle::Full => layer.boxed(),
            LoggingFmtStyle::Json => layer.json().boxed(),
            LoggingFmtStyle::Pretty => layer.pretty().boxed(),
        };
        layer.with_filter(log_level_filter)
    });

    // Enable logging to stdout.
    let stdout = config.stdout.enabled.then(|| {
        let log_level_filter = LevelFilter::from_level(tracing::Level::TRACE);
        let layer = tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_thread_ids(config.stdout.fmt.show_thread_id)
            .with_file(config.stdout.fmt.show_source)
            .with_line_number(config.stdout.fmt.show_source)
            .with_ansi(config.stdout.fmt.colors);
        let layer = match config.stdout.fmt.style {
            LoggingFmtStyle::Compact => layer.compact().boxed(),
            LoggingFmtStyle::Full => layer.boxed(),
            LoggingFmtStyle::Json => layer.json().boxed(),
            LoggingFmtStyle::Pretty => layer.pretty().boxed(),
        };
        layer.with_filter(log_level_filter)
    });

    let env_filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive("holo=debug".parse().unwrap())
        .from_env_lossy();
    tracing_subscriber::registry()
        .with(env_filter)
        .with(journald)
        .with(file)
        .with(stdout)
        .init();
}

fn privdrop(user: &str) -> nix::Result<()> {
    // Preserve set of permitted capabilities upon privdrop.
    if let Err(error) =
        capctl::prctl::set_securebits(capctl::prctl::Secbits::KEEP_CAPS)
    {
        error!(%error, "failed to preserve capabilities");
    }

    // Drop to unprivileged user and group.
    if let Some(user) = User::from_name(user)? {
        nix::unistd::setgroups(&[user.gid])?;
        nix::unistd::setresgid(user.gid, user.gid, user.gid)?;
        nix::unistd::setresuid(user.uid, user.uid, user.uid)?;
    } else {
        error!(name = %user, "failed to find user");
        std::process::exit(1);
    }

    // Set permitted capabilities.
    let mut caps = caps::CapState::empty();
    for cap in capabilities::PERMITTED {
        caps.permitted.add(cap);
    }
    if let Err(error) = caps.set_current() {
        error!(%error, "failed to set permitted capabilities");
    }

    Ok(())
}

fn signal_listener() -> mpsc::Receiver<()> {
    let (signal_tx, signal_rx) = mpsc::channel(1);

    tokio::task::spawn(async move {
        let mut sigint = signal(SignalKind::interrupt()).unwrap();
        let mut sigterm = signal(SignalKind::terminate()).unwrap();

        tokio::select! {
            _ = sigint.recv() => {
                info!("received SIGINT");
                let _ = signal_tx.send(()).await;
            },
            _ = sigterm.recv() => {
                info!("received SIGTERM");
                let _ = signal_tx.send(()).await;
            }
        }
    });

    signal_rx
}

// Sets up the capture link, runs the synchronization loop until shutdown is
// requested and tears the capture link down.
fn run(config: Config, shutdown: &AtomicBool) -> Result<(), Error> {
    let handle = netlink::init()?;
    let mut links = KernelLinks::new(handle.clone());

    // Create capture link.
    let capture_name = &config.ipset.capture_interface;
    let capture_ifindex = capture_link_enable(&mut links, capture_name)
        .map_err(|error| {
            holo_ipset::error::Error::CaptureLinkError(
                capture_name.clone(),
                error,
            )
        })?;

    let result = sync(&config, &mut links, handle, capture_ifindex, shutdown);

    // Remove capture link.
    if config.ipset.remove_capture_interface
        && let Err(error) = capture_link_disable(&mut links, capture_name)
    {
        holo_ipset::error::Error::CaptureLinkError(capture_name.clone(), error)
            .log();
    }

    result
}

fn sync(
    config: &Config,
    links: &mut KernelLinks,
    handle: Handle,
    capture_ifindex: u32,
    shutdown: &AtomicBool,
) -> Result<(), Error> {
    // Resolve egress interface.
    let egress_name = &config.ipset.egress_interface;
    let ifindex = links
        .link_lookup(egress_name)
        .and_then(|ifindex| {
            ifindex.ok_or_else(|| LinkError::NotFound(egress_name.clone()))
        })
        .map_err(|error| {
            Error::InterfaceLookupError(egress_name.clone(), error)
        })?;

    // Open capture socket.
    let read_timeout = config.ipset.read_timeout();
    let mut socket = CaptureSocket::open(capture_ifindex, read_timeout)?;

    if config.ipset.dry_run {
        let fib = FibTable::new([ifindex]);
        let pipeline =
            Pipeline::new(config.sync.clone(), ifindex, fib, LogTelemetry);
        sync_loop(&config.ipset, pipeline, &mut socket, shutdown);
    } else {
        let fib = KernelFib::new(handle);
        let pipeline =
            Pipeline::new(config.sync.clone(), ifindex, fib, LogTelemetry);
        sync_loop(&config.ipset, pipeline, &mut socket, shutdown);
    }

    Ok(())
}

fn sync_loop<F: Fib>(
    config: &config::Ipset,
    mut pipeline: Pipeline<F, LogTelemetry>,
    socket: &mut CaptureSocket,
    shutdown: &AtomicBool,
) {
    let batch_size = config.batch_size.max(1);

    while !shutdown.load(Ordering::Relaxed) {
        let batch = match socket.recv_batch(batch_size) {
            Ok(batch) => batch,
            Err(error) => {
                error.log();
                std::thread::sleep(config.read_timeout());
                continue;
            }
        };
        if batch.is_empty() {
            continue;
        }

        // The buffers have no consumer beyond this point.
        let outcome = pipeline.process_batch(batch);
        debug!(
            next_node = %outcome.next_node,
            messages = %outcome.forwarded.len(),
            add = %outcome.counters.add,
            del = %outcome.counters.del,
            errors = %outcome.counters.errors,
            "batch processed"
        );
    }

    let counters = pipeline.counters();
    info!(
        add = %counters.add,
        del = %counters.del,
        unknown = %counters.unknown,
        errors = %counters.errors,
        "route synchronization stopped"
    );

    if config.flush_on_exit {
        pipeline.engine_mut().flush();
    }
}

// ===== main =====

fn main() {
    // Parse command-line parameters.
    let matches = App::new("Holo ipset route synchronization daemon")
        .version(env!("CARGO_PKG_VERSION"))
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("file")
                .help("Specify an alternative configuration file."),
        )
        .get_matches();

    // Read configuration file.
    let config_file = matches.value_of("config");
    let config = Config::load(config_file);

    // Check for root privileges.
    if !Uid::effective().is_root() {
        eprintln!("need privileged user");
        std::process::exit(1);
    }

    // Initialize tracing.
    init_tracing(&config.logging);

    // Drop privileges.
    if let Err(error) = privdrop(&config.user) {
        error!(%error, "failed to drop root privileges");
        std::process::exit(1);
    }

    // We're ready to go!
    info!("starting up");

    // Main loop.
    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to create async runtime")
        .block_on(async {
            let shutdown = Arc::new(AtomicBool::new(false));

            // Spawn signal listener.
            let mut signal_rx = signal_listener();
            let signal_task = tokio::spawn({
                let shutdown = shutdown.clone();
                async move {
                    let _ = signal_rx.recv().await;
                    shutdown.store(true, Ordering::Relaxed);
                }
            });

            // Capture and synchronize until shutdown.
            let result = tokio::task::spawn_blocking(move || {
                run(config, &shutdown)
            })
            .await;
            signal_task.abort();
            result
        });

    match result {
        Ok(Ok(())) => (),
        Ok(Err(error)) => {
            error.log();
            std::process::exit(1);
        }
        Err(error) => {
            error!(%error, "synchronization task failed");
            std::process::exit(1);
        }
    }

    info!("exiting");
}
