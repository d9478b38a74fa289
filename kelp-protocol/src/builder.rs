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

//! Request encoders.
//!
//! Produce complete wire packets for every supported command. The client
//! and the test suites are the primary consumers; the validators' tests
//! use these to start from known-good packets and then break one field at
//! a time.

use byteorder::{BigEndian, ByteOrder};

use crate::datatype::Datatype;
use crate::header::{Magic, RequestHeader};
use crate::opcode::Opcode;
use crate::subdoc::SubdocFlags;

fn packet(
    opcode: Opcode,
    datatype: u8,
    vbucket: u16,
    cas: u64,
    extras: &[u8],
    key: &[u8],
    value: &[u8],
) -> Vec<u8> {
    let header = RequestHeader {
        magic: Magic::Request as u8,
        opcode: opcode as u8,
        keylen: key.len() as u16,
        extlen: extras.len() as u8,
        datatype,
        vbucket,
        bodylen: (extras.len() + key.len() + value.len()) as u32,
        opaque: 0,
        cas,
    };
    let mut wire = Vec::with_capacity(crate::HEADER_LEN + header.bodylen as usize);
    wire.extend_from_slice(&header.to_bytes());
    wire.extend_from_slice(extras);
    wire.extend_from_slice(key);
    wire.extend_from_slice(value);
    wire
}

/// Encode a single-path sub-document request. A non-zero `expiry` selects
/// the extended extras form.
pub fn subdoc_request(
    opcode: Opcode,
    key: &[u8],
    path: &[u8],
    flags: SubdocFlags,
    value: Option<&[u8]>,
    expiry: u32,
    cas: u64,
) -> Vec<u8> {
    let mut extras = Vec::with_capacity(7);
    extras.extend_from_slice(&(path.len() as u16).to_be_bytes());
    extras.push(flags.0);
    if expiry != 0 {
        extras.extend_from_slice(&expiry.to_be_bytes());
    }

    let mut body_value = Vec::with_capacity(path.len() + value.map_or(0, <[u8]>::len));
    body_value.extend_from_slice(path);
    if let Some(value) = value {
        body_value.extend_from_slice(value);
    }

    packet(opcode, 0, 0, cas, &extras, key, &body_value)
}

/// One lookup inside a multi-lookup command.
#[derive(Debug, Clone)]
pub struct LookupSpec {
    pub opcode: Opcode,
    pub flags: SubdocFlags,
    pub path: Vec<u8>,
}

impl LookupSpec {
    pub fn get(path: &str) -> Self {
        Self {
            opcode: Opcode::SubdocGet,
            flags: SubdocFlags::NONE,
            path: path.as_bytes().to_vec(),
        }
    }

    pub fn exists(path: &str) -> Self {
        Self {
            opcode: Opcode::SubdocExists,
            flags: SubdocFlags::NONE,
            path: path.as_bytes().to_vec(),
        }
    }
}

pub fn multi_lookup_request(key: &[u8], specs: &[LookupSpec], cas: u64) -> Vec<u8> {
    let mut value = Vec::new();
    for spec in specs {
        value.push(spec.opcode as u8);
        value.push(spec.flags.0);
        value.extend_from_slice(&(spec.path.len() as u16).to_be_bytes());
        value.extend_from_slice(&spec.path);
    }
    packet(Opcode::SubdocMultiLookup, 0, 0, cas, &[], key, &value)
}

/// One mutation inside a multi-mutation command.
#[derive(Debug, Clone)]
pub struct MutationSpec {
    pub opcode: Opcode,
    pub flags: SubdocFlags,
    pub path: Vec<u8>,
    pub value: Vec<u8>,
}

impl MutationSpec {
    pub fn new(opcode: Opcode, path: &str, value: &[u8]) -> Self {
        Self {
            opcode,
            flags: SubdocFlags::NONE,
            path: path.as_bytes().to_vec(),
            value: value.to_vec(),
        }
    }

    pub fn with_mkdir_p(mut self) -> Self {
        self.flags = SubdocFlags::MKDIR_P;
        self
    }
}

pub fn multi_mutation_request(
    key: &[u8],
    specs: &[MutationSpec],
    expiry: u32,
    cas: u64,
) -> Vec<u8> {
    let mut extras = Vec::new();
    if expiry != 0 {
        extras.extend_from_slice(&expiry.to_be_bytes());
    }
    let mut value = Vec::new();
    for spec in specs {
        value.push(spec.opcode as u8);
        value.push(spec.flags.0);
        value.extend_from_slice(&(spec.path.len() as u16).to_be_bytes());
        value.extend_from_slice(&(spec.value.len() as u32).to_be_bytes());
        value.extend_from_slice(&spec.path);
        value.extend_from_slice(&spec.value);
    }
    packet(Opcode::SubdocMultiMutation, 0, 0, cas, &extras, key, &value)
}

/// Encode a SET with the item metadata in extras: flags(u32) expiry(u32).
pub fn set_request(
    key: &[u8],
    value: &[u8],
    datatype: Datatype,
    flags: u32,
    expiry: u32,
    cas: u64,
) -> Vec<u8> {
    let mut extras = [0u8; 8];
    BigEndian::write_u32(&mut extras[0..4], flags);
    BigEndian::write_u32(&mut extras[4..8], expiry);
    packet(Opcode::Set, datatype as u8, 0, cas, &extras, key, value)
}

pub fn get_request(key: &[u8]) -> Vec<u8> {
    packet(Opcode::Get, 0, 0, 0, &[], key, &[])
}

pub fn delete_request(key: &[u8], cas: u64) -> Vec<u8> {
    packet(Opcode::Delete, 0, 0, cas, &[], key, &[])
}

pub fn noop_request() -> Vec<u8> {
    packet(Opcode::Noop, 0, 0, 0, &[], &[], &[])
}

pub fn version_request() -> Vec<u8> {
    packet(Opcode::Version, 0, 0, 0, &[], &[], &[])
}

pub fn stat_request(group: &[u8]) -> Vec<u8> {
    packet(Opcode::Stat, 0, 0, 0, &[], group, &[])
}

pub fn ioctl_get_request(key: &[u8]) -> Vec<u8> {
    packet(Opcode::IoctlGet, 0, 0, 0, &[], key, &[])
}

pub fn ioctl_set_request(key: &[u8], value: &[u8]) -> Vec<u8> {
    packet(Opcode::IoctlSet, 0, 0, 0, &[], key, value)
}

pub fn create_bucket_request(name: &[u8], config: &[u8]) -> Vec<u8> {
    packet(Opcode::CreateBucket, 0, 0, 0, &[], name, config)
}

pub fn delete_bucket_request(name: &[u8]) -> Vec<u8> {
    packet(Opcode::DeleteBucket, 0, 0, 0, &[], name, &[])
}

pub fn select_bucket_request(name: &[u8]) -> Vec<u8> {
    packet(Opcode::SelectBucket, 0, 0, 0, &[], name, &[])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::RequestFrame;

    #[test]
    fn test_subdoc_request_layout() {
        let wire = subdoc_request(
            Opcode::SubdocGet,
            b"k",
            b"a[1]",
            SubdocFlags::NONE,
            None,
            0,
            9,
        );
        let frame = RequestFrame::read_from(&mut wire.as_slice()).unwrap();
        assert_eq!(frame.header.opcode, Opcode::SubdocGet as u8);
        assert_eq!(frame.header.extlen, 3);
        assert_eq!(frame.header.cas, 9);
        assert_eq!(frame.key(), b"k");
        assert_eq!(&frame.extras()[0..2], &[0, 4]);
        assert_eq!(frame.value(), b"a[1]");
    }

    #[test]
    fn test_multi_lookup_layout() {
        let wire = multi_lookup_request(
            b"doc",
            &[LookupSpec::get("a"), LookupSpec::exists("missing")],
            0,
        );
        let frame = RequestFrame::read_from(&mut wire.as_slice()).unwrap();
        assert_eq!(frame.header.extlen, 0);
        let specs = frame.value();
        assert_eq!(specs[0], Opcode::SubdocGet as u8);
        assert_eq!(&specs[2..4], &[0, 1]);
        assert_eq!(&specs[4..5], b"a");
        assert_eq!(specs[5], Opcode::SubdocExists as u8);
    }

    #[test]
    fn test_set_request_layout() {
        let wire = set_request(b"key", b"{}", Datatype::Json, 7, 100, 0);
        let frame = RequestFrame::read_from(&mut wire.as_slice()).unwrap();
        assert_eq!(frame.header.datatype, Datatype::Json as u8);
        assert_eq!(frame.extras().len(), 8);
        assert_eq!(frame.value(), b"{}");
    }
}
