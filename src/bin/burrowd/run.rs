// Copyright 2022 Matthew Ingwersen.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you
// may not use this file except in compliance with the License. You may
// obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied. See the License for the specific language governing
// permissions and limitations under the License.

//! Implements the `run` command (i.e., running the server).

use std::fmt::Write;
use std::process;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::{Context, Result};
use env_logger::Env;
use log::{error, info};
use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use tokio::runtime;

use burrow::cache::{unix_now, Cache, Snapshot};
use burrow::io::TokioIoProvider;
use burrow::server::Server;
use burrow::upstream::UdpUpstream;

use crate::args::RunArgs;
use crate::config;

/// Runs the server.
pub fn run(args: RunArgs) {
    env_logger::init_from_env(Env::new().default_filter_or("warn"));

    if let Err(e) = try_running(args) {
        let mut message = String::from("Failed to run:");
        for (i, cause) in e.chain().enumerate() {
            write!(message, "\n[{}] {}", i + 1, cause).unwrap();
        }
        message.push_str("\nExiting with failure.");
        error!("{}", message);
        process::exit(1);
    }
    info!("Exiting with success.");
}

fn try_running(run_args: RunArgs) -> Result<()> {
    info!(
        "Burrow daemon v{}.{}.{} starting.",
        env!("CARGO_PKG_VERSION_MAJOR"),
        env!("CARGO_PKG_VERSION_MINOR"),
        env!("CARGO_PKG_VERSION_PATCH"),
    );

    // Get the configuration, either from the file system or from the
    // command line arguments, as appropriate.
    let config = if let Some(ref config_path) = run_args.config {
        info!("Loading the configuration from {}.", config_path.display());
        config::load_from_path(config_path).context("failed to load the configuration")?
    } else {
        info!("Loading the configuration from the command line.");
        config::load_from_args(run_args)
    };

    let runtime = runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start the Tokio runtime")?;

    // Load the cache snapshot. A missing or unreadable snapshot is not
    // fatal; the cache just starts out empty.
    info!("Loading the cache from {}.", config.cache_file.display());
    let cache = Arc::new(Cache::open(
        Snapshot::new(config.cache_file.clone()),
        unix_now(),
    ));

    // Bind the socket and set up the server.
    let mut io_provider = runtime
        .block_on(TokioIoProvider::bind(config.bind))
        .context("failed to bind the UDP socket")?;
    io_provider.set_sweep_interval(config.sweep_interval());
    let upstream = UdpUpstream::new(config.upstream, config.upstream_timeout());
    let server = Arc::new(Server::new(cache.clone(), upstream));

    // Set up signal handling.
    let mut signals = set_up_signal_handling().context("failed to set up signal handling")?;

    // Start the I/O provider.
    info!("Set-up is complete; starting the server.");
    let shutdown_controller = {
        let _guard = runtime.enter();
        io_provider.start(&server)
    };

    // Wait for a termination signal.
    if let Some(signal) = signals.forever().next() {
        let name = match signal {
            SIGINT => "SIGINT",
            SIGTERM => "SIGTERM",
            _ => unreachable!(),
        };
        info!("Received {}; shutting down.", name);
    }

    // Shut down the server, then save the cache one last time.
    shutdown_controller.blocking_shut_down();
    info!("Saving the cache to {}.", config.cache_file.display());
    cache.save().context("failed to save the cache")?;
    info!("Shutdown complete.");
    Ok(())
}

fn set_up_signal_handling() -> Result<Signals> {
    let term_signals = &[SIGINT, SIGTERM];
    let already_terminating = Arc::new(AtomicBool::new(false));

    // This sets up signal handlers to exit immediately if a second
    // termination signal arrives before the process finishes shutting
    // down gracefully.
    for sig in term_signals {
        signal_hook::flag::register_conditional_shutdown(*sig, 1, already_terminating.clone())?;
        signal_hook::flag::register(*sig, already_terminating.clone())?;
    }

    Signals::new(term_signals).map_err(Into::into)
}
