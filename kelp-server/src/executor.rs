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

//! Sub-document command executor.
//!
//! One function drives every sub-document opcode, single- and multi-path:
//! fetch the document, run the path operations, write mutations back, form
//! the response. Behavior differences between opcodes come entirely from
//! the traits table.
//!
//! ```text
//! INIT → FETCHING → OPERATING → UPDATING → RESPONDING → DONE
//!                       │            │
//!                       └──err──►  FAILED (respond with mapped status)
//! ```
//!
//! Any engine call may answer `WouldBlock`; the command context is parked
//! on the connection and the whole function is re-entered once the cookie
//! is notified, resuming at the phase it left off. A store-time CAS
//! conflict retries the entire command from the fetch when the client sent
//! CAS 0, bounded by the configured retry limit.

use std::sync::Arc;

use byteorder::{BigEndian, ByteOrder};
use tracing::warn;

use kelp_engine::{EngineError, KvEngine, StoreOp};
use kelp_protocol::{
    Datatype, Opcode, PathMode, RequestFrame, Response, Status, SubdocTraits,
    SUBDOC_EXPIRY_EXTRAS_LEN,
};
use kelp_subjson::ExecFlags;

use crate::buffer::DynamicBuffer;
use crate::connection::Connection;
use crate::context::{DocBuffer, SubdocCmdContext};
use crate::errmap::{engine_status, subjson_status};
use crate::materialize::{materialize_document, redact_key};
use crate::stats::BucketStats;

/// What the dispatcher should do with the command.
#[derive(Debug)]
pub enum CommandOutcome {
    /// Send this response.
    Respond(Response),
    /// Emit a STAT sequence: one response per entry, then a terminator.
    Stats(Vec<(Vec<u8>, Vec<u8>)>),
    /// The command parked on an engine call; re-enter after the cookie is
    /// notified, with the connection state untouched.
    Suspend,
    /// Transition the connection to closing.
    Close,
}

fn respond(status: Status) -> CommandOutcome {
    CommandOutcome::Respond(Response::status(status))
}

/// The input document for the op currently executing. Distinct from the
/// command context so the ops vector can be mutated while the document is
/// read.
enum CurrentDoc<'a> {
    Shared(Arc<[u8]>),
    Slice(&'a [u8]),
    Owned(Vec<u8>),
}

impl CurrentDoc<'_> {
    fn bytes(&self) -> &[u8] {
        match self {
            CurrentDoc::Shared(arc) => arc,
            CurrentDoc::Slice(slice) => slice,
            CurrentDoc::Owned(vec) => vec,
        }
    }
}

/// Decode the optional expiry from the extras, per path mode.
fn decode_expiration(frame: &RequestFrame, traits: &SubdocTraits) -> u32 {
    let extras = frame.extras();
    match traits.path {
        PathMode::Single if frame.header.extlen == SUBDOC_EXPIRY_EXTRAS_LEN => {
            BigEndian::read_u32(&extras[3..7])
        }
        PathMode::Multi if frame.header.extlen == 4 => BigEndian::read_u32(&extras[0..4]),
        _ => 0,
    }
}

/// Execute one sub-document command against the connection's bucket.
pub fn execute_subdoc(
    conn: &mut Connection,
    frame: &RequestFrame,
    retry_limit: u32,
) -> CommandOutcome {
    let opcode = Opcode::from_u8(frame.header.opcode).expect("dispatched opcode");
    let traits = SubdocTraits::of(opcode).expect("subdoc opcode");

    let Some(bucket) = conn.bucket.clone() else {
        return respond(Status::Etmpfail);
    };
    let engine = bucket.engine();

    let vbucket = frame.header.vbucket;
    let client_cas = frame.header.cas;
    let expiry = decode_expiration(frame, traits);
    let auto_retry = client_cas == 0;

    // Status deposited by a background completion; consumed by the first
    // engine call after re-entry.
    let mut pending = conn.cookie.take_aiostat();

    let mut attempts = 0u32;
    loop {
        attempts += 1;

        let mut ctx = conn
            .context
            .take()
            .unwrap_or_else(|| SubdocCmdContext::from_frame(frame, traits));

        // --- FETCHING ---
        if ctx.fetched.is_none() {
            let ret = match std::mem::replace(&mut pending, Ok(())) {
                Ok(()) => engine.get(&conn.cookie, frame.key(), vbucket),
                Err(err) => Err(err),
            };
            match ret {
                Ok(item) => ctx.fetched = Some(item),
                Err(EngineError::WouldBlock) => {
                    conn.context = Some(ctx);
                    return CommandOutcome::Suspend;
                }
                Err(EngineError::Disconnect) => return CommandOutcome::Close,
                Err(err) => return respond(engine_status(err)),
            }
        }

        if matches!(ctx.in_doc, DocBuffer::None) {
            let item = ctx.fetched.as_ref().expect("fetched above");
            let info = match engine.get_item_info(item) {
                Ok(info) => info,
                Err(_) => return respond(Status::Einternal),
            };
            match materialize_document(&mut conn.dynbuf, &info, client_cas, frame.key(), conn.id) {
                Ok((doc, cas)) => {
                    ctx.in_doc = doc;
                    ctx.in_cas = cas;
                }
                Err(status) => return respond(status),
            }
        }

        // --- OPERATING ---
        if !ctx.executed {
            if let Err(status) = operate(&conn.dynbuf, &mut conn.subdoc_op, &mut ctx) {
                return respond(status);
            }
        }

        // --- UPDATING ---
        if !traits.is_mutator {
            // Lookups report the CAS the document was read at.
            ctx.response_cas = ctx.in_cas;
        } else if ctx.overall_status == Status::Success {
            let last = ctx.ops.len() - 1;
            ctx.out_doc_len = ctx.ops[last].result.newdoc_len();

            if ctx.out_item.is_none() {
                let ret = match std::mem::replace(&mut pending, Ok(())) {
                    Ok(()) => engine.allocate(
                        &conn.cookie,
                        frame.key(),
                        vbucket,
                        ctx.out_doc_len,
                        0,
                        expiry,
                        Datatype::Json,
                    ),
                    Err(err) => Err(err),
                };
                let item = match ret {
                    Ok(item) => item,
                    Err(EngineError::WouldBlock) => {
                        conn.context = Some(ctx);
                        return CommandOutcome::Suspend;
                    }
                    Err(EngineError::Disconnect) => return CommandOutcome::Close,
                    Err(err) => return respond(engine_status(err)),
                };

                // Only replace the generation this document was derived from.
                engine.item_set_cas(&item, ctx.in_cas);

                let assembled = ctx.ops[last].result.materialize(ctx.doc(&conn.dynbuf));
                if item.fill_value(assembled).is_err() {
                    engine.release(item);
                    return respond(Status::Einternal);
                }
                ctx.out_item = Some(item);
            }

            let ret = match std::mem::replace(&mut pending, Ok(())) {
                Ok(()) => engine.store(
                    &conn.cookie,
                    ctx.out_item.as_ref().expect("allocated above"),
                    StoreOp::Replace,
                    vbucket,
                ),
                Err(err) => Err(err),
            };
            match ret {
                Ok(new_cas) => ctx.response_cas = new_cas,
                Err(EngineError::WouldBlock) => {
                    conn.context = Some(ctx);
                    return CommandOutcome::Suspend;
                }
                Err(EngineError::Disconnect) => return CommandOutcome::Close,
                Err(EngineError::KeyEexists) => {
                    if !auto_retry {
                        return respond(Status::KeyEexists);
                    }
                    if attempts >= retry_limit {
                        warn!(
                            conn_id = conn.id,
                            attempts,
                            opcode = opcode.name(),
                            key = %redact_key(frame.key()),
                            "hit maximum auto-retry attempts, returning TMPFAIL"
                        );
                        return respond(Status::Etmpfail);
                    }
                    // Lost the CAS race: drop everything and start over.
                    let (fetched, out) = ctx.take_items();
                    if let Some(item) = fetched {
                        engine.release(item);
                    }
                    if let Some(item) = out {
                        engine.release(item);
                    }
                    drop(ctx);
                    conn.dynbuf.reset();
                    continue;
                }
                Err(err) => return respond(engine_status(err)),
            }
        }

        // --- RESPONDING ---
        let response = build_response(&conn.dynbuf, &ctx, traits);

        let doc_len = ctx.doc(&conn.dynbuf).len() as u64;
        let extracted = response.value.len() as u64;
        let stats = bucket.stats();
        if traits.is_mutator {
            BucketStats::bump(&stats.cmd_subdoc_mutation);
            BucketStats::add(&stats.bytes_subdoc_mutation_total, ctx.out_doc_len as u64);
            BucketStats::add(
                &stats.bytes_subdoc_mutation_inserted,
                ctx.operation_value_bytes(),
            );
            BucketStats::bump(&stats.cmd_set);
        } else {
            BucketStats::bump(&stats.cmd_subdoc_lookup);
            BucketStats::add(&stats.bytes_subdoc_lookup_total, doc_len);
            BucketStats::add(&stats.bytes_subdoc_lookup_extracted, extracted);
            BucketStats::bump(&stats.cmd_get);
            BucketStats::bump(&stats.get_hits);
        }
        bucket.topkeys().update_key(frame.key());

        return CommandOutcome::Respond(response);
    }
}

/// Run every operation spec against the (possibly evolving) document.
///
/// Single-path: a failing op aborts with its mapped status. Multi-lookup:
/// every spec runs, failures are recorded per spec. Multi-mutation: specs
/// apply sequentially to an evolving document and the first failure stops
/// execution with no write-back.
fn operate(
    dynbuf: &DynamicBuffer,
    op: &mut kelp_subjson::Operation,
    ctx: &mut SubdocCmdContext,
) -> Result<(), Status> {
    let mut current = match &ctx.in_doc {
        DocBuffer::None => return Err(Status::Einternal),
        DocBuffer::Item(value) => CurrentDoc::Shared(Arc::clone(value)),
        DocBuffer::Inflated { offset, len } => CurrentDoc::Slice(dynbuf.slice(*offset, *len)),
        DocBuffer::Temp => CurrentDoc::Owned(std::mem::take(&mut ctx.temp_doc)),
    };

    let multi = ctx.traits.path == PathMode::Multi;
    let is_mutator = ctx.traits.is_mutator;
    let op_count = ctx.ops.len();

    for index in 0..op_count {
        let status = exec_one(op, &mut ctx.ops[index], current.bytes());
        ctx.ops[index].status = status;

        if !multi {
            if status != Status::Success {
                return Err(status);
            }
            continue;
        }

        if status == Status::Success {
            if is_mutator && index + 1 != op_count {
                // The result document becomes the input of the next op.
                let next = ctx.ops[index].result.materialize(current.bytes());
                current = CurrentDoc::Owned(next);
            }
        } else {
            ctx.overall_status = Status::SubdocMultiPathFailure;
            if is_mutator {
                // First failing mutation aborts the sequence; the response
                // reports its index.
                break;
            }
        }
    }

    // Keep the final input document reachable for write-back and response
    // assembly.
    if let CurrentDoc::Owned(doc) = current {
        ctx.temp_doc = doc;
        ctx.in_doc = DocBuffer::Temp;
    }

    ctx.executed = true;
    Ok(())
}

/// Execute one spec, translating path-engine errors to wire status.
fn exec_one(
    op: &mut kelp_subjson::Operation,
    spec: &mut crate::context::OperationSpec,
    doc: &[u8],
) -> Status {
    let Ok(path) = std::str::from_utf8(&spec.path) else {
        return Status::SubdocPathEinval;
    };
    let command = spec.traits.command.expect("single-path spec");
    let flags = ExecFlags {
        mkdir_p: spec.flags.contains(kelp_protocol::SubdocFlags::MKDIR_P),
    };
    let value = spec.traits.request_has_value.then_some(&spec.value[..]);

    op.clear();
    match op.op_exec(command, flags, doc, path, value) {
        Ok(()) => {
            spec.result = op.take_result();
            Status::Success
        }
        Err(err) => subjson_status(err),
    }
}

/// Form the response for a completed (possibly partially failed) command.
fn build_response(
    dynbuf: &DynamicBuffer,
    ctx: &SubdocCmdContext,
    traits: &SubdocTraits,
) -> Response {
    match traits.path {
        PathMode::Single => {
            let mut response = Response::success().with_cas(ctx.response_cas);
            if traits.response_has_value {
                let spec = &ctx.ops[0];
                if let Some(loc) = spec.result.matchloc() {
                    response.value = spec.result.resolve(loc, ctx.doc(dynbuf)).to_vec();
                }
            }
            response
        }

        PathMode::Multi if !traits.is_mutator => {
            // status(u16) vallen(u32) value, one record per spec.
            let doc = ctx.doc(dynbuf);
            let mut body = Vec::new();
            for spec in &ctx.ops {
                let value = match (spec.traits.response_has_value, spec.result.matchloc()) {
                    (true, Some(loc)) => spec.result.resolve(loc, doc),
                    _ => &[],
                };
                body.extend_from_slice(&(spec.status as u16).to_be_bytes());
                body.extend_from_slice(&(value.len() as u32).to_be_bytes());
                body.extend_from_slice(value);
            }
            Response::status(ctx.overall_status)
                .with_cas(ctx.response_cas)
                .with_value(body)
        }

        PathMode::Multi => {
            if ctx.overall_status == Status::Success {
                return Response::success().with_cas(ctx.response_cas);
            }
            // status(u16) index(u8) of the first failing spec.
            let (index, status) = ctx
                .ops
                .iter()
                .enumerate()
                .find(|(_, spec)| spec.status != Status::Success)
                .map(|(i, spec)| (i as u8, spec.status))
                .unwrap_or((0xff, Status::Einternal));
            let mut body = Vec::with_capacity(3);
            body.extend_from_slice(&(status as u16).to_be_bytes());
            body.push(index);
            Response::status(ctx.overall_status).with_value(body)
        }
    }
}
