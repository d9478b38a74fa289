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

//! KelpKV binary wire protocol.
//!
//! The protocol is the classic memcached binary layout: a fixed 24-byte
//! header followed by `extras || key || value`, all multi-byte fields in
//! network byte order. On top of the basic key/value opcodes KelpKV adds a
//! sub-document command family that reads or mutates a portion of a stored
//! JSON value addressed by a path, without shipping the whole document.
//!
//! # Wire format
//!
//! ```text
//! ┌───────┬────────┬────────┬────────┬──────────┬──────────────────┐
//! │ magic │ opcode │ keylen │ extlen │ datatype │ vbucket / status │
//! │  u8   │   u8   │  u16   │   u8   │    u8    │       u16        │
//! ├───────┴────────┴────────┴────────┴──────────┴──────────────────┤
//! │ bodylen (u32)     │ opaque (u32)      │ cas (u64)              │
//! ├───────────────────┴───────────────────┴────────────────────────┤
//! │ extras (extlen) │ key (keylen) │ value (bodylen-extlen-keylen) │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`header`]: 24-byte request/response header codec
//! - [`frame`]: full request frames and response emission
//! - [`subdoc`]: sub-document flags, limits and the per-opcode traits table
//! - [`validate`]: per-opcode structural validators, run before dispatch
//! - [`builder`]: request encoders used by the client and the test suites

pub mod builder;
pub mod datatype;
pub mod frame;
pub mod header;
pub mod opcode;
pub mod status;
pub mod subdoc;
pub mod validate;

use std::io;
use thiserror::Error;

pub use datatype::Datatype;
pub use frame::{RequestFrame, Response, ResponseFrame};
pub use header::{Magic, RequestHeader, ResponseHeader, HEADER_LEN};
pub use opcode::Opcode;
pub use status::Status;
pub use subdoc::{
    PathMode, SubdocFlags, SubdocTraits, MULTI_LOOKUP_SPEC_HEADER, MULTI_MAX_PATHS,
    MULTI_MUTATION_SPEC_HEADER, SUBDOC_BASIC_EXTRAS_LEN, SUBDOC_EXPIRY_EXTRAS_LEN,
    SUBDOC_PATH_MAX_LENGTH,
};
pub use validate::{validator_for, ValidateError};

/// Hard cap on the declared body length of a single frame. Anything larger
/// is treated as a protocol error rather than an allocation request.
pub const MAX_FRAME_BODY: usize = 20 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("invalid magic byte: {0:#04x}")]
    InvalidMagic(u8),

    #[error("frame body too large: {0} bytes (max {MAX_FRAME_BODY})")]
    FrameTooLarge(usize),

    #[error("declared body length {bodylen} shorter than extras {extlen} + key {keylen}")]
    BodyUnderflow {
        bodylen: usize,
        extlen: usize,
        keylen: usize,
    },
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
