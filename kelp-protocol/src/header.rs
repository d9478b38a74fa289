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

//! Fixed 24-byte packet header, request and response flavors.
//!
//! The two flavors share the same layout; requests carry a vbucket id in
//! bytes 6..8 where responses carry a status code.

use std::io::{Read, Write};

use byteorder::{BigEndian, ByteOrder};

use crate::{ProtocolError, Result};

/// Size of the fixed packet header on the wire.
pub const HEADER_LEN: usize = 24;

/// First byte of every packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Magic {
    Request = 0x80,
    Response = 0x81,
}

impl Magic {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x80 => Some(Magic::Request),
            0x81 => Some(Magic::Response),
            _ => None,
        }
    }
}

/// Request packet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestHeader {
    pub magic: u8,
    pub opcode: u8,
    pub keylen: u16,
    pub extlen: u8,
    pub datatype: u8,
    pub vbucket: u16,
    pub bodylen: u32,
    pub opaque: u32,
    pub cas: u64,
}

/// Response packet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHeader {
    pub magic: u8,
    pub opcode: u8,
    pub keylen: u16,
    pub extlen: u8,
    pub datatype: u8,
    pub status: u16,
    pub bodylen: u32,
    pub opaque: u32,
    pub cas: u64,
}

fn decode(buf: &[u8; HEADER_LEN]) -> (u8, u8, u16, u8, u8, u16, u32, u32, u64) {
    (
        buf[0],
        buf[1],
        BigEndian::read_u16(&buf[2..4]),
        buf[4],
        buf[5],
        BigEndian::read_u16(&buf[6..8]),
        BigEndian::read_u32(&buf[8..12]),
        BigEndian::read_u32(&buf[12..16]),
        BigEndian::read_u64(&buf[16..24]),
    )
}

#[allow(clippy::too_many_arguments)]
fn encode(
    buf: &mut [u8; HEADER_LEN],
    magic: u8,
    opcode: u8,
    keylen: u16,
    extlen: u8,
    datatype: u8,
    field6: u16,
    bodylen: u32,
    opaque: u32,
    cas: u64,
) {
    buf[0] = magic;
    buf[1] = opcode;
    BigEndian::write_u16(&mut buf[2..4], keylen);
    buf[4] = extlen;
    buf[5] = datatype;
    BigEndian::write_u16(&mut buf[6..8], field6);
    BigEndian::write_u32(&mut buf[8..12], bodylen);
    BigEndian::write_u32(&mut buf[12..16], opaque);
    BigEndian::write_u64(&mut buf[16..24], cas);
}

impl RequestHeader {
    pub fn from_bytes(buf: &[u8; HEADER_LEN]) -> Self {
        let (magic, opcode, keylen, extlen, datatype, vbucket, bodylen, opaque, cas) = decode(buf);
        Self {
            magic,
            opcode,
            keylen,
            extlen,
            datatype,
            vbucket,
            bodylen,
            opaque,
            cas,
        }
    }

    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        encode(
            &mut buf,
            self.magic,
            self.opcode,
            self.keylen,
            self.extlen,
            self.datatype,
            self.vbucket,
            self.bodylen,
            self.opaque,
            self.cas,
        );
        buf
    }

    /// Read a header from a stream. EOF before the first byte maps to
    /// `ConnectionClosed` so callers can tell a clean close from a
    /// truncated packet.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut buf = [0u8; HEADER_LEN];
        match reader.read_exact(&mut buf) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(ProtocolError::ConnectionClosed);
            }
            Err(e) => return Err(e.into()),
        }
        Ok(Self::from_bytes(&buf))
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.to_bytes())?;
        Ok(())
    }
}

impl ResponseHeader {
    pub fn from_bytes(buf: &[u8; HEADER_LEN]) -> Self {
        let (magic, opcode, keylen, extlen, datatype, status, bodylen, opaque, cas) = decode(buf);
        Self {
            magic,
            opcode,
            keylen,
            extlen,
            datatype,
            status,
            bodylen,
            opaque,
            cas,
        }
    }

    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        encode(
            &mut buf,
            self.magic,
            self.opcode,
            self.keylen,
            self.extlen,
            self.datatype,
            self.status,
            self.bodylen,
            self.opaque,
            self.cas,
        );
        buf
    }

    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut buf = [0u8; HEADER_LEN];
        match reader.read_exact(&mut buf) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(ProtocolError::ConnectionClosed);
            }
            Err(e) => return Err(e.into()),
        }
        Ok(Self::from_bytes(&buf))
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.to_bytes())?;
        Ok(())
    }
}
