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

//! Sub-document command context.
//!
//! One instance lives for the duration of a sub-document command and
//! carries everything that must survive a cooperative suspension: the
//! decoded operation specs, the input document buffer and its CAS, per-op
//! results, and the output item being built for write-back. Dropping the
//! context releases any items still checked out, on every exit path.

use smallvec::SmallVec;

use kelp_engine::ItemHandle;
use kelp_protocol::{
    Opcode, RequestFrame, Status, SubdocFlags, SubdocTraits, MULTI_LOOKUP_SPEC_HEADER,
    MULTI_MUTATION_SPEC_HEADER,
};
use kelp_subjson::OpResult;

use byteorder::{BigEndian, ByteOrder};

use crate::buffer::DynamicBuffer;

/// Where the input document currently lives.
#[derive(Debug, Default)]
pub enum DocBuffer {
    #[default]
    None,
    /// The fetched item's own value (plain JSON, zero copy).
    Item(std::sync::Arc<[u8]>),
    /// Inflated into the connection's dynamic buffer.
    Inflated { offset: usize, len: usize },
    /// An intermediate multi-mutation document held in `temp_doc`.
    Temp,
}

/// One decoded operation: a single-path command has exactly one of these,
/// a multi-path command 1..=16.
#[derive(Debug)]
pub struct OperationSpec {
    pub opcode: Opcode,
    pub traits: &'static SubdocTraits,
    pub flags: SubdocFlags,
    pub path: Vec<u8>,
    pub value: Vec<u8>,
    pub status: Status,
    pub result: OpResult,
}

impl OperationSpec {
    fn new(opcode: Opcode, flags: SubdocFlags, path: &[u8], value: &[u8]) -> Self {
        Self {
            opcode,
            traits: SubdocTraits::of(opcode).expect("validated subdoc opcode"),
            flags,
            path: path.to_vec(),
            value: value.to_vec(),
            status: Status::Success,
            result: OpResult::default(),
        }
    }
}

#[derive(Debug)]
pub struct SubdocCmdContext {
    pub traits: &'static SubdocTraits,
    pub ops: SmallVec<[OperationSpec; 4]>,

    /// Item fetched from the engine; released on drop.
    pub fetched: Option<ItemHandle>,

    /// The flat input document and the CAS observed when it was fetched.
    pub in_doc: DocBuffer,
    pub in_cas: u64,

    /// Evolving multi-mutation document (`in_doc == Temp` points here).
    pub temp_doc: Vec<u8>,

    /// Mutations only: the new item to store; released on drop if the
    /// command dies before write-back.
    pub out_item: Option<ItemHandle>,
    pub out_doc_len: usize,

    /// Result CAS to report to the client.
    pub response_cas: u64,

    /// Operate phase ran; re-entries after a suspended write-back must not
    /// re-execute path ops.
    pub executed: bool,

    pub overall_status: Status,
}

impl SubdocCmdContext {
    /// Decode the command context from a validated request frame.
    pub fn from_frame(frame: &RequestFrame, traits: &'static SubdocTraits) -> Self {
        let opcode = Opcode::from_u8(frame.header.opcode).expect("validated opcode");
        let mut ops = SmallVec::new();

        match traits.path {
            kelp_protocol::PathMode::Single => {
                let extras = frame.extras();
                let pathlen = BigEndian::read_u16(&extras[0..2]) as usize;
                let flags = SubdocFlags(extras[2]);
                let value = frame.value();
                let (path, operand) = value.split_at(pathlen);
                ops.push(OperationSpec::new(opcode, flags, path, operand));
            }
            kelp_protocol::PathMode::Multi => {
                let specs = frame.value();
                let mut offset = 0;
                while offset < specs.len() {
                    let spec_opcode =
                        Opcode::from_u8(specs[offset]).expect("validated spec opcode");
                    let flags = SubdocFlags(specs[offset + 1]);
                    let pathlen = BigEndian::read_u16(&specs[offset + 2..offset + 4]) as usize;
                    if traits.is_mutator {
                        let valuelen =
                            BigEndian::read_u32(&specs[offset + 4..offset + 8]) as usize;
                        let body = offset + MULTI_MUTATION_SPEC_HEADER;
                        ops.push(OperationSpec::new(
                            spec_opcode,
                            flags,
                            &specs[body..body + pathlen],
                            &specs[body + pathlen..body + pathlen + valuelen],
                        ));
                        offset = body + pathlen + valuelen;
                    } else {
                        let body = offset + MULTI_LOOKUP_SPEC_HEADER;
                        ops.push(OperationSpec::new(
                            spec_opcode,
                            flags,
                            &specs[body..body + pathlen],
                            &[],
                        ));
                        offset = body + pathlen;
                    }
                }
            }
        }

        Self {
            traits,
            ops,
            fetched: None,
            in_doc: DocBuffer::None,
            in_cas: 0,
            temp_doc: Vec::new(),
            out_item: None,
            out_doc_len: 0,
            response_cas: 0,
            executed: false,
            overall_status: Status::Success,
        }
    }

    /// Resolve the current input document bytes.
    pub fn doc<'a>(&'a self, dynbuf: &'a DynamicBuffer) -> &'a [u8] {
        match &self.in_doc {
            DocBuffer::None => &[],
            DocBuffer::Item(value) => value,
            DocBuffer::Inflated { offset, len } => dynbuf.slice(*offset, *len),
            DocBuffer::Temp => &self.temp_doc,
        }
    }

    /// Total bytes of operand values across all specs (mutation stats).
    pub fn operation_value_bytes(&self) -> u64 {
        self.ops.iter().map(|op| op.value.len() as u64).sum()
    }

    /// Take both held items for explicit release (the drop path would
    /// return them too; the executor releases eagerly on retry).
    pub fn take_items(&mut self) -> (Option<ItemHandle>, Option<ItemHandle>) {
        (self.fetched.take(), self.out_item.take())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kelp_protocol::builder::{
        multi_lookup_request, multi_mutation_request, subdoc_request, LookupSpec, MutationSpec,
    };

    fn decode(wire: Vec<u8>) -> RequestFrame {
        RequestFrame::read_from(&mut wire.as_slice()).unwrap()
    }

    #[test]
    fn test_single_path_context() {
        let frame = decode(subdoc_request(
            Opcode::SubdocDictAdd,
            b"doc",
            b"a.b",
            SubdocFlags::MKDIR_P,
            Some(b"42"),
            0,
            0,
        ));
        let traits = SubdocTraits::of(Opcode::SubdocDictAdd).unwrap();
        let ctx = SubdocCmdContext::from_frame(&frame, traits);

        assert_eq!(ctx.ops.len(), 1);
        assert_eq!(ctx.ops[0].path, b"a.b");
        assert_eq!(ctx.ops[0].value, b"42");
        assert!(ctx.ops[0].flags.contains(SubdocFlags::MKDIR_P));
    }

    #[test]
    fn test_multi_lookup_context() {
        let frame = decode(multi_lookup_request(
            b"doc",
            &[LookupSpec::get("a"), LookupSpec::exists("b.c")],
            0,
        ));
        let traits = SubdocTraits::of(Opcode::SubdocMultiLookup).unwrap();
        let ctx = SubdocCmdContext::from_frame(&frame, traits);

        assert_eq!(ctx.ops.len(), 2);
        assert_eq!(ctx.ops[0].opcode, Opcode::SubdocGet);
        assert_eq!(ctx.ops[0].path, b"a");
        assert_eq!(ctx.ops[1].opcode, Opcode::SubdocExists);
        assert_eq!(ctx.ops[1].path, b"b.c");
    }

    #[test]
    fn test_multi_mutation_context() {
        let frame = decode(multi_mutation_request(
            b"doc",
            &[
                MutationSpec::new(Opcode::SubdocDictUpsert, "a", b"1"),
                MutationSpec::new(Opcode::SubdocDelete, "b", b""),
            ],
            0,
            0,
        ));
        let traits = SubdocTraits::of(Opcode::SubdocMultiMutation).unwrap();
        let ctx = SubdocCmdContext::from_frame(&frame, traits);

        assert_eq!(ctx.ops.len(), 2);
        assert_eq!(ctx.ops[0].value, b"1");
        assert_eq!(ctx.ops[1].opcode, Opcode::SubdocDelete);
        assert!(ctx.ops[1].value.is_empty());
    }
}
