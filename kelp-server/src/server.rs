// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! TCP front-end.
//!
//! A blocking listener with one handler thread per connection. Reads carry
//! a timeout so a connection parked on a half-delivered request still
//! observes shutdown and bucket-delete signals in bounded time. The
//! command machinery itself lives in [`crate::connection`] and
//! [`crate::executor`]; this module only shuttles frames.

use std::io::{BufReader, BufWriter, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};

use kelp_protocol::{ProtocolError, RequestFrame, Response};

use crate::buckets::BucketRegistry;
use crate::buffer::DEFAULT_DYNBUF_MAX;
use crate::connection::{dispatch, Connection, ConnectionRegistry};
use crate::executor::CommandOutcome;
use crate::stats::ServerStats;
use crate::topkeys::DEFAULT_TOPKEYS_PER_SHARD;

/// Name of the bucket every new connection starts bound to.
pub const DEFAULT_BUCKET: &str = "default";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Socket read timeout; bounds how long a parked read can ignore
    /// shutdown and bucket-delete signals.
    pub read_timeout: Duration,
    /// CAS auto-retry bound for sub-document mutations.
    pub retry_limit: u32,
    pub max_buckets: usize,
    pub topkeys_per_shard: usize,
    pub dynbuf_max: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 11211,
            read_timeout: Duration::from_secs(30),
            retry_limit: 100,
            max_buckets: 16,
            topkeys_per_shard: DEFAULT_TOPKEYS_PER_SHARD,
            dynbuf_max: DEFAULT_DYNBUF_MAX,
        }
    }
}

/// Shared server context handed to every dispatcher call.
pub struct ServerCtx {
    pub buckets: Arc<BucketRegistry>,
    pub connections: Arc<ConnectionRegistry>,
    pub stats: Arc<ServerStats>,
    pub config: ServerConfig,
}

pub struct KelpServer {
    ctx: Arc<ServerCtx>,
    shutdown: Arc<AtomicBool>,
    local_addr: SocketAddr,
    accept_thread: Option<JoinHandle<()>>,
}

impl KelpServer {
    /// Bind, create the default bucket, and start accepting.
    pub fn start(config: ServerConfig) -> std::io::Result<Self> {
        let listener = TcpListener::bind((config.host.as_str(), config.port))?;
        let local_addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;

        let buckets = Arc::new(BucketRegistry::new(
            config.max_buckets,
            config.topkeys_per_shard,
        ));
        buckets
            .create(DEFAULT_BUCKET)
            .expect("default bucket name is valid and the registry is empty");

        let stats = Arc::new(ServerStats::new());
        stats.mark_started();

        let ctx = Arc::new(ServerCtx {
            buckets,
            connections: Arc::new(ConnectionRegistry::new()),
            stats,
            config,
        });

        let shutdown = Arc::new(AtomicBool::new(false));
        let accept_ctx = Arc::clone(&ctx);
        let accept_shutdown = Arc::clone(&shutdown);
        let accept_thread = thread::Builder::new()
            .name("kelp-accept".to_owned())
            .spawn(move || accept_loop(listener, accept_ctx, accept_shutdown))?;

        info!(%local_addr, "server listening");
        Ok(Self {
            ctx,
            shutdown,
            local_addr,
            accept_thread: Some(accept_thread),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn ctx(&self) -> &Arc<ServerCtx> {
        &self.ctx
    }

    /// Stop accepting and ask every live connection to wind down.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.accept_thread.take() {
            let _ = handle.join();
        }
        self.ctx.connections.request_close_all();
    }
}

impl Drop for KelpServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn accept_loop(listener: TcpListener, ctx: Arc<ServerCtx>, shutdown: Arc<AtomicBool>) {
    while !shutdown.load(Ordering::Acquire) {
        match listener.accept() {
            Ok((stream, peer)) => {
                debug!(%peer, "accepted connection");
                ctx.stats
                    .connections_total
                    .fetch_add(1, Ordering::Relaxed);
                ctx.stats
                    .connections_active
                    .fetch_add(1, Ordering::Relaxed);

                let conn_ctx = Arc::clone(&ctx);
                let conn_shutdown = Arc::clone(&shutdown);
                let result = thread::Builder::new()
                    .name("kelp-conn".to_owned())
                    .spawn(move || {
                        handle_connection(stream, conn_ctx, conn_shutdown);
                    });
                if result.is_err() {
                    warn!("failed to spawn connection handler");
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(10));
            }
            Err(err) => {
                warn!(%err, "accept failed");
                thread::sleep(Duration::from_millis(100));
            }
        }
    }
}

fn handle_connection(stream: TcpStream, ctx: Arc<ServerCtx>, shutdown: Arc<AtomicBool>) {
    let shared = ctx.connections.register();
    let conn_id = shared.id;

    let result = drive_connection(&stream, &ctx, &shutdown, Arc::clone(&shared));
    if let Err(err) = result {
        debug!(conn_id, %err, "connection ended");
    }

    ctx.connections.unregister(conn_id);
    ctx.stats
        .connections_active
        .fetch_sub(1, Ordering::Relaxed);
    debug!(conn_id, "connection closed");
}

fn drive_connection(
    stream: &TcpStream,
    ctx: &Arc<ServerCtx>,
    shutdown: &AtomicBool,
    shared: Arc<crate::connection::ConnShared>,
) -> Result<(), ProtocolError> {
    stream.set_read_timeout(Some(ctx.config.read_timeout))?;
    stream.set_nodelay(true)?;

    let mut reader = BufReader::new(stream.try_clone()?);
    let mut writer = BufWriter::new(stream.try_clone()?);

    let mut conn = Connection::new(shared, ctx.config.dynbuf_max);
    if let Some(default) = ctx.buckets.get(DEFAULT_BUCKET) {
        conn.bind_bucket(default);
    }

    loop {
        if shutdown.load(Ordering::Acquire) || conn.shared.close_requested() {
            return Ok(());
        }

        let frame = match RequestFrame::read_from(&mut reader) {
            Ok(frame) => frame,
            Err(ProtocolError::ConnectionClosed) => return Ok(()),
            Err(ProtocolError::Io(err))
                if matches!(
                    err.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ) =>
            {
                // Timed out waiting for (more of) a request; loop to
                // observe shutdown / close flags.
                continue;
            }
            Err(err) => {
                // Framing is broken; there is no way to resynchronize.
                warn!(conn_id = conn.id, %err, "dropping connection on framing error");
                return Err(err);
            }
        };

        ctx.stats.requests_total.fetch_add(1, Ordering::Relaxed);
        ctx.stats.bytes_received.fetch_add(
            (kelp_protocol::HEADER_LEN as u64) + frame.header.bodylen as u64,
            Ordering::Relaxed,
        );

        // Drive the command to completion, re-entering across engine
        // suspensions with the connection state intact.
        loop {
            match dispatch(&mut conn, ctx, &frame) {
                CommandOutcome::Respond(response) => {
                    if !response.status.is_success() {
                        ctx.stats.requests_error.fetch_add(1, Ordering::Relaxed);
                    }
                    write_response(ctx, &mut writer, &frame, &response)?;
                    break;
                }
                CommandOutcome::Stats(entries) => {
                    for (key, value) in entries {
                        let mut response = Response::success();
                        response.key = key;
                        response.value = value;
                        write_response(ctx, &mut writer, &frame, &response)?;
                    }
                    // Empty-key terminator.
                    write_response(ctx, &mut writer, &frame, &Response::success())?;
                    break;
                }
                CommandOutcome::Suspend => {
                    // Wait for the engine's completion notification; keep
                    // an eye on close requests while parked.
                    while !conn.cookie.wait_for_notify(ctx.config.read_timeout) {
                        if shutdown.load(Ordering::Acquire) || conn.shared.close_requested() {
                            return Ok(());
                        }
                    }
                    continue;
                }
                CommandOutcome::Close => return Ok(()),
            }
        }

        // Per-command scratch dies with the command.
        conn.dynbuf.reset();
        debug_assert!(conn.context.is_none());
    }
}

fn write_response(
    ctx: &ServerCtx,
    writer: &mut BufWriter<TcpStream>,
    frame: &RequestFrame,
    response: &Response,
) -> Result<(), ProtocolError> {
    response.write_to(writer, frame.header.opcode, frame.header.opaque)?;
    writer.flush()?;
    ctx.stats.bytes_sent.fetch_add(
        (kelp_protocol::HEADER_LEN + response.extras.len() + response.key.len()
            + response.value.len()) as u64,
        Ordering::Relaxed,
    );
    Ok(())
}
