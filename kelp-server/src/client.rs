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

//! Blocking binary-protocol client.
//!
//! One request, one response (STAT excepted). The integration tests drive
//! a live listener through this, and it doubles as an ad-hoc poking tool.

use std::io::{BufReader, Write};
use std::net::{TcpStream, ToSocketAddrs};

use byteorder::{BigEndian, ByteOrder};

use kelp_protocol::builder;
use kelp_protocol::{
    Datatype, Opcode, ProtocolError, ResponseFrame, Status, SubdocFlags,
};

pub struct BinprotClient {
    stream: TcpStream,
    reader: BufReader<TcpStream>,
}

/// One record of a multi-lookup response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupResult {
    pub status: Status,
    pub value: Vec<u8>,
}

impl BinprotClient {
    pub fn connect<A: ToSocketAddrs>(addr: A) -> std::io::Result<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        let reader = BufReader::new(stream.try_clone()?);
        Ok(Self { stream, reader })
    }

    /// Send a pre-encoded packet and read one response.
    pub fn roundtrip(&mut self, wire: &[u8]) -> Result<ResponseFrame, ProtocolError> {
        self.stream.write_all(wire)?;
        self.stream.flush()?;
        ResponseFrame::read_from(&mut self.reader)
    }

    /// Send raw bytes without waiting for anything. Used to park the
    /// server mid-frame.
    pub fn send_raw(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.stream.write_all(bytes)?;
        self.stream.flush()
    }

    pub fn read_response(&mut self) -> Result<ResponseFrame, ProtocolError> {
        ResponseFrame::read_from(&mut self.reader)
    }

    // -- basic commands -----------------------------------------------------

    pub fn set(
        &mut self,
        key: &[u8],
        value: &[u8],
        datatype: Datatype,
        cas: u64,
    ) -> Result<ResponseFrame, ProtocolError> {
        self.roundtrip(&builder::set_request(key, value, datatype, 0, 0, cas))
    }

    pub fn get(&mut self, key: &[u8]) -> Result<ResponseFrame, ProtocolError> {
        self.roundtrip(&builder::get_request(key))
    }

    pub fn delete(&mut self, key: &[u8], cas: u64) -> Result<ResponseFrame, ProtocolError> {
        self.roundtrip(&builder::delete_request(key, cas))
    }

    pub fn noop(&mut self) -> Result<ResponseFrame, ProtocolError> {
        self.roundtrip(&builder::noop_request())
    }

    pub fn version(&mut self) -> Result<ResponseFrame, ProtocolError> {
        self.roundtrip(&builder::version_request())
    }

    /// Collect a STAT group into key/value pairs (terminated by the
    /// empty-key response).
    pub fn stats(&mut self, group: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, ProtocolError> {
        self.stream.write_all(&builder::stat_request(group))?;
        self.stream.flush()?;
        let mut entries = Vec::new();
        loop {
            let frame = ResponseFrame::read_from(&mut self.reader)?;
            if frame.status() != Some(Status::Success) || frame.key().is_empty() {
                return Ok(entries);
            }
            entries.push((frame.key().to_vec(), frame.value().to_vec()));
        }
    }

    // -- sub-document commands ----------------------------------------------

    pub fn subdoc(
        &mut self,
        opcode: Opcode,
        key: &[u8],
        path: &str,
        value: Option<&[u8]>,
        flags: SubdocFlags,
        cas: u64,
    ) -> Result<ResponseFrame, ProtocolError> {
        self.roundtrip(&builder::subdoc_request(
            opcode,
            key,
            path.as_bytes(),
            flags,
            value,
            0,
            cas,
        ))
    }

    pub fn subdoc_get(&mut self, key: &[u8], path: &str) -> Result<ResponseFrame, ProtocolError> {
        self.subdoc(Opcode::SubdocGet, key, path, None, SubdocFlags::NONE, 0)
    }

    pub fn subdoc_exists(
        &mut self,
        key: &[u8],
        path: &str,
    ) -> Result<ResponseFrame, ProtocolError> {
        self.subdoc(Opcode::SubdocExists, key, path, None, SubdocFlags::NONE, 0)
    }

    pub fn multi_lookup(
        &mut self,
        key: &[u8],
        specs: &[builder::LookupSpec],
    ) -> Result<(ResponseFrame, Vec<LookupResult>), ProtocolError> {
        let frame = self.roundtrip(&builder::multi_lookup_request(key, specs, 0))?;
        let results = parse_lookup_results(frame.value());
        Ok((frame, results))
    }

    pub fn multi_mutation(
        &mut self,
        key: &[u8],
        specs: &[builder::MutationSpec],
        cas: u64,
    ) -> Result<ResponseFrame, ProtocolError> {
        self.roundtrip(&builder::multi_mutation_request(key, specs, 0, cas))
    }

    // -- admin commands -----------------------------------------------------

    pub fn ioctl_get(&mut self, key: &str) -> Result<ResponseFrame, ProtocolError> {
        self.roundtrip(&builder::ioctl_get_request(key.as_bytes()))
    }

    pub fn ioctl_set(&mut self, key: &str, value: &[u8]) -> Result<ResponseFrame, ProtocolError> {
        self.roundtrip(&builder::ioctl_set_request(key.as_bytes(), value))
    }

    pub fn create_bucket(&mut self, name: &str) -> Result<ResponseFrame, ProtocolError> {
        self.roundtrip(&builder::create_bucket_request(name.as_bytes(), b""))
    }

    pub fn delete_bucket(&mut self, name: &str) -> Result<ResponseFrame, ProtocolError> {
        self.roundtrip(&builder::delete_bucket_request(name.as_bytes()))
    }

    pub fn select_bucket(&mut self, name: &str) -> Result<ResponseFrame, ProtocolError> {
        self.roundtrip(&builder::select_bucket_request(name.as_bytes()))
    }
}

/// Decode `status(u16) vallen(u32) value` records.
pub fn parse_lookup_results(mut body: &[u8]) -> Vec<LookupResult> {
    let mut results = Vec::new();
    while body.len() >= 6 {
        let status = Status::from_u16(BigEndian::read_u16(&body[0..2]))
            .unwrap_or(Status::Einternal);
        let len = BigEndian::read_u32(&body[2..6]) as usize;
        if body.len() < 6 + len {
            break;
        }
        results.push(LookupResult {
            status,
            value: body[6..6 + len].to_vec(),
        });
        body = &body[6 + len..];
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lookup_results() {
        let mut body = Vec::new();
        body.extend_from_slice(&(Status::Success as u16).to_be_bytes());
        body.extend_from_slice(&1u32.to_be_bytes());
        body.push(b'1');
        body.extend_from_slice(&(Status::SubdocPathEnoent as u16).to_be_bytes());
        body.extend_from_slice(&0u32.to_be_bytes());

        let results = parse_lookup_results(&body);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].status, Status::Success);
        assert_eq!(results[0].value, b"1");
        assert_eq!(results[1].status, Status::SubdocPathEnoent);
        assert!(results[1].value.is_empty());
    }
}
