// Copyright 2023 Matthew Ingwersen.
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

//! Implementation of the Tokio I/O provider.

// NOTE: In this provider, I/O error handling is generally to exit the
// task. The run_with_respawning function acts as a supervisor that will
// respawn the UDP receiver and the sweeper, possibly after a delay, if
// they exit with an error or a panic.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, error};
use tokio::net::UdpSocket;
use tokio::sync::{broadcast, mpsc};

use crate::cache::unix_now;
use crate::message::MAX_UDP_MESSAGE_SIZE;
use crate::server::{Response, Server};
use crate::upstream::Upstream;

/// How often the cache is swept of expired entries by default.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// A Tokio I/O provider.
///
/// This provider uses asynchronous I/O and runs the server by spawning
/// tasks on a Tokio runtime: one receiver task for the UDP socket, one
/// task per received datagram, and one long-lived task that
/// periodically sweeps the server's cache.
///
/// The `TokioIoProvider` supports graceful shutdown. To initiate a
/// graceful shutdown, use the [`TokioShutdownController`] returned by
/// [`TokioIoProvider::start`].
pub struct TokioIoProvider {
    udp_socket: Arc<UdpSocket>,
    sweep_interval: Duration,
}

impl TokioIoProvider {
    /// Creates a new `TokioIoProvider`. This call binds the UDP socket
    /// in preparation, but does not start the server. This function
    /// requires that the Tokio runtime be active.
    pub async fn bind(addr: SocketAddr) -> io::Result<Self> {
        let udp_socket = UdpSocket::bind(addr).await?;
        Ok(Self {
            udp_socket: Arc::new(udp_socket),
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        })
    }

    /// Returns the address the UDP socket is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.udp_socket.local_addr()
    }

    /// Sets how often the cache is swept. The interval must be
    /// non-zero.
    pub fn set_sweep_interval(&mut self, interval: Duration) {
        assert!(!interval.is_zero(), "the sweep interval must be non-zero");
        self.sweep_interval = interval;
    }

    /// Starts the server on the active Tokio runtime.
    ///
    /// This spawns tasks on the active Tokio runtime and then returns
    /// a [`TokioShutdownController`] that can be used to shut down the
    /// tasks at a later time. (The [`TokioShutdownController`] must be
    /// held as long as the server should be running, since dropping it
    /// will trigger shutdown.)
    pub fn start<U>(self, server: &Arc<Server<U>>) -> TokioShutdownController
    where
        U: Upstream + Send + Sync + 'static,
    {
        let (shutdown_controller, shutdown_handle) = make_shutdown_channels();

        tokio::spawn(run_with_respawning(
            run_udp_receiver,
            shutdown_handle.clone(),
            server.clone(),
            self.udp_socket,
        ));
        tokio::spawn(run_with_respawning(
            run_sweeper,
            shutdown_handle,
            server.clone(),
            self.sweep_interval,
        ));

        shutdown_controller
    }
}

/// How long to wait between respawns of a task. This is to prevent
/// tasks that crash immediately from using up significant CPU time.
const TASK_RESPAWN_DELAY: Duration = Duration::from_secs(1);

/// Runs a Tokio task, respawning it if it returns an I/O error, is
/// cancelled, or panics.
async fn run_with_respawning<F, G, U, S>(
    f: F,
    mut shutdown: ShutdownHandle,
    server: Arc<Server<U>>,
    param: S,
) where
    F: Fn(ShutdownHandle, Arc<Server<U>>, S) -> G,
    G: Future<Output = io::Result<()>> + Send + 'static,
    S: Clone,
{
    loop {
        let last_spawn_time = Instant::now();
        match tokio::spawn(f(shutdown.clone(), server.clone(), param.clone())).await {
            Ok(Ok(())) => return,
            Ok(Err(e)) => log_io_error(e),
            Err(_) => (), // The task panicked or was cancelled.
        }

        // If necessary, wait before respawning, but receive shutdown
        // requests immediately.
        let since_last_spawn = Instant::now().duration_since(last_spawn_time);
        if let Some(duration_to_wait) = TASK_RESPAWN_DELAY.checked_sub(since_last_spawn) {
            tokio::select! {
                _ = shutdown.request_receiver.recv() => return,
                _ = tokio::time::sleep(duration_to_wait) => (),
            }
        }
    }
}

/// The UDP receiver loop.
async fn run_udp_receiver<U>(
    mut shutdown: ShutdownHandle,
    server: Arc<Server<U>>,
    socket: Arc<UdpSocket>,
) -> io::Result<()>
where
    U: Upstream + Send + Sync + 'static,
{
    loop {
        let mut received_buf = vec![0; MAX_UDP_MESSAGE_SIZE];

        // Receive a DNS message (or a shutdown request).
        let (received_len, src) = tokio::select! {
            _ = shutdown.request_receiver.recv() => return Ok(()),
            res = socket.recv_from(&mut received_buf) => res?,
        };
        received_buf.truncate(received_len);

        // In a new Tokio task, process the query and send the response
        // (if any).
        let shutdown = shutdown.wait_sender.clone();
        let server = server.clone();
        let socket = socket.clone();
        tokio::spawn(async move {
            match server.handle_query(&received_buf, src).await {
                Response::Single(response) => {
                    if let Err(e) = socket.send_to(&response, src).await {
                        log_io_error(e);
                    }
                }
                Response::None => (),
            }

            // This ensures that the shutdown handle is moved into the
            // new task.
            drop(shutdown);
        });
    }
}

/// The cache sweeper loop. The first sweep happens one interval after
/// the task starts.
async fn run_sweeper<U>(
    mut shutdown: ShutdownHandle,
    server: Arc<Server<U>>,
    interval: Duration,
) -> io::Result<()>
where
    U: Send + Sync + 'static,
{
    let start = tokio::time::Instant::now() + interval;
    let mut ticker = tokio::time::interval_at(start, interval);
    loop {
        tokio::select! {
            _ = shutdown.request_receiver.recv() => return Ok(()),
            _ = ticker.tick() => (),
        }
        if !server.cache().sweep(unix_now()) {
            debug!("Cache sweep found no expired entries.");
        }
    }
}

/// Controls the shutdown of a server's Tokio tasks.
///
/// This type is used to shut down the Tokio tasks spawned by
/// [`TokioIoProvider::start`]. Use
/// [`TokioShutdownController::shut_down`] or its blocking variant,
/// [`TokioShutdownController::blocking_shut_down`], to initiate
/// shutdown and wait for its completion. Shutdown is complete once the
/// receiver and the sweeper have stopped and every in-flight query has
/// been answered. Dropping the controller will also trigger shutdown
/// (but will not wait for it to complete).
#[must_use]
pub struct TokioShutdownController {
    request_sender: broadcast::Sender<()>,
    wait_receiver: mpsc::Receiver<()>,
}

impl TokioShutdownController {
    /// Requests that running server tasks shut down, and then waits for
    /// them to terminate.
    pub async fn shut_down(mut self) {
        drop(self.request_sender);
        let _ = self.wait_receiver.recv().await;
    }

    /// The blocking variant of [`TokioShutdownController::shut_down`].
    pub fn blocking_shut_down(mut self) {
        drop(self.request_sender);
        let _ = self.wait_receiver.blocking_recv();
    }
}

/// A handle held by tasks to interact with the graceful shutdown
/// mechanism.
///
/// This type has two roles:
///
/// 1. It enables tasks to listen for graceful shutdown signals. This
///    is done by waiting for all senders attached to `request_receiver`
///    to close.
/// 2. It prevents graceful shutdown from completing until it is
///    dropped. This is done by holding `wait_sender`. All server tasks
///    therefore own a `ShutdownHandle` (or at least the `wait_sender`
///    component).
struct ShutdownHandle {
    request_receiver: broadcast::Receiver<()>,
    wait_sender: mpsc::Sender<()>,
}

impl Clone for ShutdownHandle {
    fn clone(&self) -> Self {
        // A resubscribed receiver misses values already queued, but no
        // values are ever sent: the signal is all senders being
        // dropped.
        ShutdownHandle {
            request_receiver: self.request_receiver.resubscribe(),
            wait_sender: self.wait_sender.clone(),
        }
    }
}

/// Produces a [`TokioShutdownController`] and an initial
/// [`ShutdownHandle`] connected to it.
fn make_shutdown_channels() -> (TokioShutdownController, ShutdownHandle) {
    let (request_sender, request_receiver) = broadcast::channel(1);
    let (wait_sender, wait_receiver) = mpsc::channel(1);
    let controller = TokioShutdownController {
        request_sender,
        wait_receiver,
    };
    let handle = ShutdownHandle {
        request_receiver,
        wait_sender,
    };
    (controller, handle)
}

/// Logs an I/O error.
fn log_io_error(e: io::Error) {
    error!("I/O error: {e}");
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
