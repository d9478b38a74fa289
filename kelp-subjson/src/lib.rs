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

//! Sub-document operations over raw JSON text.
//!
//! This crate applies a single path operation (lookup, mutation, counter or
//! array op) to a JSON document held as a flat byte buffer. Matching is done
//! directly over the document text: a lightweight scanner locates the byte
//! span of the addressed value, so lookups alias the input buffer and
//! mutations are expressed as an ordered list of fragments
//! (`[doc prefix][splice][doc suffix]`) which, concatenated, form the new
//! document. The caller owns materializing those fragments before the input
//! buffer goes away.
//!
//! # Paths
//!
//! Paths are dotted keys with bracketed array subscripts:
//!
//! ```text
//! user.roles[0].name     third-level lookup
//! items[-1]              last element of an array
//! `dotted.key`.inner     backtick-quoted component
//! ```
//!
//! Limits: at most [`MAX_PATH_COMPONENTS`] components, and neither the
//! document nor the result of an insertion may nest deeper than
//! [`MAX_DOC_DEPTH`] containers.

pub mod op;
pub mod path;
mod scan;

use thiserror::Error;

pub use op::{Loc, OpResult, Operation};
pub use path::{parse_path, Component};

/// Maximum number of path components accepted by the parser.
pub const MAX_PATH_COMPONENTS: usize = 32;

/// Maximum container nesting for documents and for the result of any
/// insertion.
pub const MAX_DOC_DEPTH: usize = 32;

/// Operation codes, one per protocol-level sub-document command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Get,
    Exists,
    DictAdd,
    DictUpsert,
    Remove,
    Replace,
    ArrayAppend,
    ArrayPrepend,
    ArrayAddUnique,
    ArrayInsert,
    Counter,
}

impl Command {
    /// True if executing the command can change the document.
    pub fn is_mutator(self) -> bool {
        !matches!(self, Command::Get | Command::Exists)
    }
}

/// Execution flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecFlags {
    /// Create missing intermediate dictionary components along the path.
    pub mkdir_p: bool,
}

/// Operation failure codes. These are the full vocabulary the executor maps
/// onto protocol statuses; see the server crate for the mapping table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SubjsonError {
    #[error("requested path does not exist in the document")]
    PathEnoent,

    #[error("path and document structure disagree")]
    PathMismatch,

    #[error("document nesting exceeds the supported depth")]
    DocEtoodeep,

    #[error("path syntax is invalid")]
    PathEinval,

    #[error("path already exists")]
    DocEexists,

    #[error("path has too many components")]
    PathE2big,

    #[error("existing number is out of range for arithmetic")]
    NumE2big,

    #[error("delta is invalid or would overflow")]
    DeltaE2big,

    #[error("value cannot be inserted at the requested location")]
    ValueCantinsert,

    #[error("inserting the value would nest too deeply")]
    ValueEtoodeep,

    #[error("document is not valid JSON")]
    DocNotJson,
}

pub type Result<T> = std::result::Result<T, SubjsonError>;
