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

//! Per-connection state and command dispatch.
//!
//! Each connection runs single-threaded on its handler; the only state
//! another thread may touch is the [`ConnShared`] record (trace mask,
//! close request, bucket binding name), which is what the connection
//! registry hands to the ioctl surface and to bucket deletion.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use byteorder::{BigEndian, ByteOrder};
use dashmap::DashMap;
use tracing::{debug, trace};

use kelp_engine::{Cookie, EngineError, KvEngine, StoreOp};
use kelp_protocol::{
    validator_for, Datatype, Opcode, RequestFrame, Response, Status,
};
use kelp_subjson::Operation;

use crate::buckets::{Bucket, BucketState};
use crate::buffer::DynamicBuffer;
use crate::context::SubdocCmdContext;
use crate::errmap::engine_status;
use crate::executor::{execute_subdoc, CommandOutcome};
use crate::ioctl;
use crate::server::ServerCtx;
use crate::stats::BucketStats;

/// Connection state visible outside the owning handler thread.
#[derive(Debug)]
pub struct ConnShared {
    pub id: u64,
    trace_mask: AtomicU32,
    close_requested: AtomicBool,
    bucket: parking_lot::Mutex<Option<String>>,
}

impl ConnShared {
    pub fn trace_mask(&self) -> u32 {
        self.trace_mask.load(Ordering::Relaxed)
    }

    pub fn set_trace_mask(&self, mask: u32) {
        self.trace_mask.store(mask, Ordering::Relaxed);
    }

    /// Ask the owning handler to wind the connection down at its next
    /// wakeup (read timeout, suspension timeout, or command boundary).
    pub fn request_close(&self) {
        self.close_requested.store(true, Ordering::Release);
    }

    pub fn close_requested(&self) -> bool {
        self.close_requested.load(Ordering::Acquire)
    }

    pub fn bucket_name(&self) -> Option<String> {
        self.bucket.lock().clone()
    }

    pub fn set_bucket(&self, name: Option<String>) {
        *self.bucket.lock() = name;
    }
}

/// All live connections, for ioctl tracing and bucket-delete signaling.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: DashMap<u64, Arc<ConnShared>>,
    next_id: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self) -> Arc<ConnShared> {
        let id = self.next_id.fetch_add(1, Ordering::AcqRel) + 1;
        let shared = Arc::new(ConnShared {
            id,
            trace_mask: AtomicU32::new(0),
            close_requested: AtomicBool::new(false),
            bucket: parking_lot::Mutex::new(None),
        });
        self.connections.insert(id, Arc::clone(&shared));
        shared
    }

    pub fn unregister(&self, id: u64) {
        self.connections.remove(&id);
    }

    pub fn set_trace_mask(&self, id: u64, mask: u32) -> bool {
        match self.connections.get(&id) {
            Some(shared) => {
                shared.set_trace_mask(mask);
                true
            }
            None => false,
        }
    }

    /// Request close on every connection bound to `bucket`. Returns how
    /// many were signaled.
    pub fn signal_bucket(&self, bucket: &str) -> usize {
        let mut signaled = 0;
        for entry in self.connections.iter() {
            if entry.value().bucket_name().as_deref() == Some(bucket) {
                entry.value().request_close();
                signaled += 1;
            }
        }
        signaled
    }

    pub fn request_close_all(&self) {
        for entry in self.connections.iter() {
            entry.value().request_close();
        }
    }

    pub fn active(&self) -> usize {
        self.connections.len()
    }
}

/// Per-connection command state, owned by the handler thread.
pub struct Connection {
    pub id: u64,
    pub shared: Arc<ConnShared>,
    pub bucket: Option<Arc<Bucket>>,
    pub cookie: Arc<Cookie>,
    pub dynbuf: DynamicBuffer,
    /// Reusable path-operation executor, reset before each use.
    pub subdoc_op: Operation,
    /// Parked sub-document command, present only across suspensions.
    pub context: Option<SubdocCmdContext>,
}

impl Connection {
    pub fn new(shared: Arc<ConnShared>, dynbuf_max: usize) -> Self {
        Self {
            id: shared.id,
            shared,
            bucket: None,
            cookie: Arc::new(Cookie::new()),
            dynbuf: DynamicBuffer::new(dynbuf_max),
            subdoc_op: Operation::new(),
            context: None,
        }
    }

    /// Bind to a bucket, releasing any previous binding.
    pub fn bind_bucket(&mut self, bucket: Arc<Bucket>) -> bool {
        if !bucket.connect() {
            return false;
        }
        self.unbind_bucket();
        self.shared.set_bucket(Some(bucket.name().to_owned()));
        self.bucket = Some(bucket);
        true
    }

    pub fn unbind_bucket(&mut self) {
        if let Some(old) = self.bucket.take() {
            self.shared.set_bucket(None);
            old.disconnect();
        }
    }

    fn engine(&self) -> Option<Arc<dyn KvEngine>> {
        self.bucket.as_ref().map(|b| b.engine())
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        // A suspended command dies with the connection; its context drop
        // returns any held items to the engine first.
        self.context = None;
        self.unbind_bucket();
    }
}

/// Validate and execute one request frame.
pub fn dispatch(conn: &mut Connection, ctx: &ServerCtx, frame: &RequestFrame) -> CommandOutcome {
    let Some(opcode) = Opcode::from_u8(frame.header.opcode) else {
        debug!(conn_id = conn.id, opcode = frame.header.opcode, "unknown opcode");
        return CommandOutcome::Respond(Response::status(Status::UnknownCommand));
    };

    if conn.shared.trace_mask() != 0 {
        trace!(
            conn_id = conn.id,
            opcode = opcode.name(),
            keylen = frame.header.keylen,
            bodylen = frame.header.bodylen,
            "request"
        );
    }

    // Reject before anything downstream can run.
    if let Err(err) = validator_for(opcode)(frame) {
        debug!(conn_id = conn.id, opcode = opcode.name(), %err, "validation failed");
        return CommandOutcome::Respond(Response::status(Status::Einval));
    }

    // A binding to a dying bucket is dissolved at the next command.
    if let Some(bucket) = &conn.bucket {
        if bucket.state() == BucketState::Destroying {
            conn.unbind_bucket();
            return CommandOutcome::Respond(Response::status(Status::Etmpfail));
        }
    }

    match opcode {
        Opcode::Get => get_executor(conn, frame),
        Opcode::Set => set_executor(conn, frame),
        Opcode::Delete => delete_executor(conn, frame),
        Opcode::Noop => CommandOutcome::Respond(Response::success()),
        Opcode::Version => CommandOutcome::Respond(
            Response::success().with_value(env!("CARGO_PKG_VERSION").as_bytes().to_vec()),
        ),
        Opcode::Stat => stat_executor(conn, ctx, frame),
        Opcode::IoctlGet => ioctl_get_executor(frame),
        Opcode::IoctlSet => ioctl_set_executor(conn, ctx, frame),
        Opcode::CreateBucket => create_bucket_executor(ctx, frame),
        Opcode::DeleteBucket => delete_bucket_executor(conn, ctx, frame),
        Opcode::SelectBucket => select_bucket_executor(conn, ctx, frame),
        _ => execute_subdoc(conn, frame, ctx.config.retry_limit),
    }
}

fn respond(status: Status) -> CommandOutcome {
    CommandOutcome::Respond(Response::status(status))
}

fn with_engine(
    conn: &Connection,
) -> Result<(Arc<Bucket>, Arc<dyn KvEngine>), CommandOutcome> {
    match (&conn.bucket, conn.engine()) {
        (Some(bucket), Some(engine)) => Ok((Arc::clone(bucket), engine)),
        _ => Err(respond(Status::Etmpfail)),
    }
}

fn get_executor(conn: &mut Connection, frame: &RequestFrame) -> CommandOutcome {
    let (bucket, engine) = match with_engine(conn) {
        Ok(pair) => pair,
        Err(outcome) => return outcome,
    };
    if let Err(err) = conn.cookie.take_aiostat() {
        return respond(engine_status(err));
    }

    let stats = bucket.stats();
    BucketStats::bump(&stats.cmd_get);

    match engine.get(&conn.cookie, frame.key(), frame.header.vbucket) {
        Ok(item) => {
            let info = match engine.get_item_info(&item) {
                Ok(info) => info,
                Err(_) => {
                    engine.release(item);
                    return respond(Status::Einternal);
                }
            };
            engine.release(item);

            BucketStats::bump(&stats.get_hits);
            bucket.topkeys().update_key(frame.key());

            let mut extras = vec![0u8; 4];
            BigEndian::write_u32(&mut extras, info.flags);
            let mut response = Response::success()
                .with_cas(info.cas)
                .with_extras(extras)
                .with_value(info.value.to_vec());
            response.datatype = info.datatype as u8;
            CommandOutcome::Respond(response)
        }
        Err(EngineError::KeyEnoent) => {
            BucketStats::bump(&stats.get_misses);
            respond(Status::KeyEnoent)
        }
        Err(EngineError::WouldBlock) => CommandOutcome::Suspend,
        Err(EngineError::Disconnect) => CommandOutcome::Close,
        Err(err) => respond(engine_status(err)),
    }
}

fn set_executor(conn: &mut Connection, frame: &RequestFrame) -> CommandOutcome {
    let (bucket, engine) = match with_engine(conn) {
        Ok(pair) => pair,
        Err(outcome) => return outcome,
    };
    if let Err(err) = conn.cookie.take_aiostat() {
        return respond(engine_status(err));
    }

    let extras = frame.extras();
    let flags = BigEndian::read_u32(&extras[0..4]);
    let expiry = BigEndian::read_u32(&extras[4..8]);
    let datatype = Datatype::from_u8(frame.header.datatype).expect("validated datatype");
    let value = frame.value();

    let item = match engine.allocate(
        &conn.cookie,
        frame.key(),
        frame.header.vbucket,
        value.len(),
        flags,
        expiry,
        datatype,
    ) {
        Ok(item) => item,
        Err(EngineError::WouldBlock) => return CommandOutcome::Suspend,
        Err(EngineError::Disconnect) => return CommandOutcome::Close,
        Err(err) => return respond(engine_status(err)),
    };

    if item.fill_value(value.to_vec()).is_err() {
        engine.release(item);
        return respond(Status::Einternal);
    }
    if frame.header.cas != 0 {
        engine.item_set_cas(&item, frame.header.cas);
    }

    let result = engine.store(&conn.cookie, &item, StoreOp::Set, frame.header.vbucket);
    engine.release(item);
    match result {
        Ok(cas) => {
            BucketStats::bump(&bucket.stats().cmd_set);
            bucket.topkeys().update_key(frame.key());
            CommandOutcome::Respond(Response::success().with_cas(cas))
        }
        Err(EngineError::WouldBlock) => CommandOutcome::Suspend,
        Err(EngineError::Disconnect) => CommandOutcome::Close,
        Err(err) => respond(engine_status(err)),
    }
}

fn delete_executor(conn: &mut Connection, frame: &RequestFrame) -> CommandOutcome {
    let (bucket, engine) = match with_engine(conn) {
        Ok(pair) => pair,
        Err(outcome) => return outcome,
    };
    if let Err(err) = conn.cookie.take_aiostat() {
        return respond(engine_status(err));
    }

    let stats = bucket.stats();
    match engine.remove(
        &conn.cookie,
        frame.key(),
        frame.header.vbucket,
        frame.header.cas,
    ) {
        Ok(cas) => {
            BucketStats::bump(&stats.delete_hits);
            bucket.topkeys().update_key(frame.key());
            CommandOutcome::Respond(Response::success().with_cas(cas))
        }
        Err(EngineError::KeyEnoent) => {
            BucketStats::bump(&stats.delete_misses);
            respond(Status::KeyEnoent)
        }
        Err(EngineError::WouldBlock) => CommandOutcome::Suspend,
        Err(EngineError::Disconnect) => CommandOutcome::Close,
        Err(err) => respond(engine_status(err)),
    }
}

fn stat_executor(conn: &mut Connection, ctx: &ServerCtx, frame: &RequestFrame) -> CommandOutcome {
    let group = frame.key();
    let mut entries: Vec<(Vec<u8>, Vec<u8>)> = Vec::new();

    match group {
        b"" => {
            for (k, v) in ctx.stats.entries() {
                entries.push((k.into_bytes(), v.into_bytes()));
            }
            if let Some(bucket) = &conn.bucket {
                for (k, v) in bucket.stats().entries() {
                    entries.push((k.into_bytes(), v.into_bytes()));
                }
            }
        }
        b"topkeys" => {
            if let Some(bucket) = &conn.bucket {
                for (k, v) in bucket.topkeys().entries() {
                    entries.push((k.into_bytes(), v.into_bytes()));
                }
            }
        }
        b"topkeys_json" => {
            if let Some(bucket) = &conn.bucket {
                let json = bucket.topkeys().json_stats().to_string();
                entries.push((b"topkeys_json".to_vec(), json.into_bytes()));
            }
        }
        _ => return respond(Status::KeyEnoent),
    }

    CommandOutcome::Stats(entries)
}

fn ioctl_get_executor(frame: &RequestFrame) -> CommandOutcome {
    let Ok(key) = std::str::from_utf8(frame.key()) else {
        return respond(Status::Einval);
    };
    match ioctl::ioctl_get(key) {
        Ok(value) => CommandOutcome::Respond(Response::success().with_value(value)),
        Err(status) => respond(status),
    }
}

fn ioctl_set_executor(conn: &Connection, ctx: &ServerCtx, frame: &RequestFrame) -> CommandOutcome {
    let Ok(key) = std::str::from_utf8(frame.key()) else {
        return respond(Status::Einval);
    };
    respond(ioctl::ioctl_set(&ctx.connections, conn.id, key, frame.value()))
}

fn create_bucket_executor(ctx: &ServerCtx, frame: &RequestFrame) -> CommandOutcome {
    let Ok(name) = std::str::from_utf8(frame.key()) else {
        return respond(Status::Einval);
    };
    match ctx.buckets.create(name) {
        Ok(_) => respond(Status::Success),
        Err(status) => respond(status),
    }
}

fn delete_bucket_executor(
    conn: &mut Connection,
    ctx: &ServerCtx,
    frame: &RequestFrame,
) -> CommandOutcome {
    let Ok(name) = std::str::from_utf8(frame.key()) else {
        return respond(Status::Einval);
    };

    // Deleting the bucket we are bound to must not wait for ourselves.
    if conn.bucket.as_ref().map(|b| b.name()) == Some(name) {
        conn.unbind_bucket();
    }

    let connections = Arc::clone(&ctx.connections);
    match ctx.buckets.delete(name, |bucket| {
        connections.signal_bucket(bucket);
    }) {
        Ok(()) => respond(Status::Success),
        Err(status) => respond(status),
    }
}

fn select_bucket_executor(
    conn: &mut Connection,
    ctx: &ServerCtx,
    frame: &RequestFrame,
) -> CommandOutcome {
    let Ok(name) = std::str::from_utf8(frame.key()) else {
        return respond(Status::Einval);
    };
    let Some(bucket) = ctx.buckets.get(name) else {
        return respond(Status::KeyEnoent);
    };
    if conn.bind_bucket(bucket) {
        respond(Status::Success)
    } else {
        respond(Status::Etmpfail)
    }
}
