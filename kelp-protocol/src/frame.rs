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

//! Request frames and response emission.

use std::io::{Read, Write};

use crate::header::{RequestHeader, ResponseHeader, HEADER_LEN};
use crate::status::Status;
use crate::{ProtocolError, Result, MAX_FRAME_BODY};

/// One complete inbound request: header plus body bytes.
///
/// The body layout is `extras || key || value`; the accessors slice it
/// accordingly. Construction checks that the declared lengths are
/// internally consistent, so the accessors cannot go out of bounds.
#[derive(Debug, Clone)]
pub struct RequestFrame {
    pub header: RequestHeader,
    body: Vec<u8>,
}

impl RequestFrame {
    pub fn new(header: RequestHeader, body: Vec<u8>) -> Result<Self> {
        let extlen = header.extlen as usize;
        let keylen = header.keylen as usize;
        let bodylen = header.bodylen as usize;
        if bodylen != body.len() || bodylen < extlen + keylen {
            return Err(ProtocolError::BodyUnderflow {
                bodylen,
                extlen,
                keylen,
            });
        }
        Ok(Self { header, body })
    }

    /// Read one full frame: header first, then `bodylen` bytes.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let header = RequestHeader::read_from(reader)?;
        if header.magic != crate::header::Magic::Request as u8 {
            return Err(ProtocolError::InvalidMagic(header.magic));
        }
        let bodylen = header.bodylen as usize;
        if bodylen > MAX_FRAME_BODY {
            return Err(ProtocolError::FrameTooLarge(bodylen));
        }
        let mut body = vec![0u8; bodylen];
        reader.read_exact(&mut body)?;
        Self::new(header, body)
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        self.header.write_to(writer)?;
        writer.write_all(&self.body)?;
        Ok(())
    }

    pub fn extras(&self) -> &[u8] {
        &self.body[..self.header.extlen as usize]
    }

    pub fn key(&self) -> &[u8] {
        let start = self.header.extlen as usize;
        &self.body[start..start + self.header.keylen as usize]
    }

    pub fn value(&self) -> &[u8] {
        &self.body[self.header.extlen as usize + self.header.keylen as usize..]
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }
}

/// One outbound response.
#[derive(Debug, Clone, Default)]
pub struct Response {
    pub status: Status,
    pub cas: u64,
    pub datatype: u8,
    pub extras: Vec<u8>,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl Response {
    /// Status-only response, no body.
    pub fn status(status: Status) -> Self {
        Self {
            status,
            ..Default::default()
        }
    }

    pub fn success() -> Self {
        Self::status(Status::Success)
    }

    pub fn with_cas(mut self, cas: u64) -> Self {
        self.cas = cas;
        self
    }

    pub fn with_value(mut self, value: Vec<u8>) -> Self {
        self.value = value;
        self
    }

    pub fn with_extras(mut self, extras: Vec<u8>) -> Self {
        self.extras = extras;
        self
    }

    /// Emit the response for the request identified by `opcode`/`opaque`:
    /// header, then extras, key and value.
    pub fn write_to<W: Write>(&self, writer: &mut W, opcode: u8, opaque: u32) -> Result<()> {
        let header = ResponseHeader {
            magic: crate::header::Magic::Response as u8,
            opcode,
            keylen: self.key.len() as u16,
            extlen: self.extras.len() as u8,
            datatype: self.datatype,
            status: self.status as u16,
            bodylen: (self.extras.len() + self.key.len() + self.value.len()) as u32,
            opaque,
            cas: self.cas,
        };
        header.write_to(writer)?;
        writer.write_all(&self.extras)?;
        writer.write_all(&self.key)?;
        writer.write_all(&self.value)?;
        Ok(())
    }
}

/// A full decoded response, as read back by the client side.
#[derive(Debug, Clone)]
pub struct ResponseFrame {
    pub header: ResponseHeader,
    pub body: Vec<u8>,
}

impl ResponseFrame {
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let header = ResponseHeader::read_from(reader)?;
        let bodylen = header.bodylen as usize;
        if bodylen > MAX_FRAME_BODY {
            return Err(ProtocolError::FrameTooLarge(bodylen));
        }
        let mut body = vec![0u8; bodylen];
        reader.read_exact(&mut body)?;
        Ok(Self { header, body })
    }

    pub fn status(&self) -> Option<Status> {
        Status::from_u16(self.header.status)
    }

    pub fn value(&self) -> &[u8] {
        &self.body[self.header.extlen as usize + self.header.keylen as usize..]
    }

    pub fn key(&self) -> &[u8] {
        let start = self.header.extlen as usize;
        &self.body[start..start + self.header.keylen as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::Magic;

    fn frame(extlen: u8, key: &[u8], value: &[u8]) -> RequestFrame {
        let mut body = vec![0xee; extlen as usize];
        body.extend_from_slice(key);
        body.extend_from_slice(value);
        let header = RequestHeader {
            magic: Magic::Request as u8,
            opcode: 0x00,
            keylen: key.len() as u16,
            extlen,
            datatype: 0,
            vbucket: 0,
            bodylen: body.len() as u32,
            opaque: 1,
            cas: 0,
        };
        RequestFrame::new(header, body).unwrap()
    }

    #[test]
    fn test_frame_slicing() {
        let f = frame(4, b"key", b"value");
        assert_eq!(f.extras(), &[0xee; 4]);
        assert_eq!(f.key(), b"key");
        assert_eq!(f.value(), b"value");
    }

    #[test]
    fn test_frame_underflow_rejected() {
        let header = RequestHeader {
            magic: Magic::Request as u8,
            opcode: 0,
            keylen: 10,
            extlen: 0,
            datatype: 0,
            vbucket: 0,
            bodylen: 4,
            opaque: 0,
            cas: 0,
        };
        assert!(RequestFrame::new(header, vec![0; 4]).is_err());
    }

    #[test]
    fn test_frame_roundtrip() {
        let f = frame(0, b"abc", b"def");
        let mut wire = Vec::new();
        f.write_to(&mut wire).unwrap();
        let decoded = RequestFrame::read_from(&mut wire.as_slice()).unwrap();
        assert_eq!(decoded.key(), b"abc");
        assert_eq!(decoded.value(), b"def");
    }

    #[test]
    fn test_response_roundtrip() {
        let mut wire = Vec::new();
        Response::status(Status::KeyEnoent)
            .with_cas(77)
            .with_value(b"oops".to_vec())
            .write_to(&mut wire, 0xc5, 42)
            .unwrap();
        let decoded = ResponseFrame::read_from(&mut wire.as_slice()).unwrap();
        assert_eq!(decoded.header.opcode, 0xc5);
        assert_eq!(decoded.header.opaque, 42);
        assert_eq!(decoded.header.cas, 77);
        assert_eq!(decoded.status(), Some(Status::KeyEnoent));
        assert_eq!(decoded.value(), b"oops");
    }
}
