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

//! Traits of the sub-document command family.
//!
//! Every piece of dispatch-time behavior — does the request carry a value,
//! may the path be empty, which flags are legal, which engine op runs — is
//! read from one record per opcode. Both the validators and the executor
//! consume this table; nothing else switches on sub-document opcodes.

use kelp_subjson::Command;

use crate::opcode::Opcode;

/// Maximum sub-document path length in bytes.
pub const SUBDOC_PATH_MAX_LENGTH: usize = 1024;

/// Maximum number of specs in a multi-path command.
pub const MULTI_MAX_PATHS: usize = 16;

/// Extras length of a single-path request: pathlen(u16) + flags(u8).
pub const SUBDOC_BASIC_EXTRAS_LEN: u8 = 3;

/// Extras length of a single-path request carrying an expiry(u32) as well.
pub const SUBDOC_EXPIRY_EXTRAS_LEN: u8 = 7;

/// Size of one multi-lookup spec header: opcode(u8) flags(u8) pathlen(u16).
pub const MULTI_LOOKUP_SPEC_HEADER: usize = 4;

/// Size of one multi-mutation spec header: opcode(u8) flags(u8) pathlen(u16)
/// valuelen(u32).
pub const MULTI_MUTATION_SPEC_HEADER: usize = 8;

/// Per-operation flag byte.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubdocFlags(pub u8);

impl SubdocFlags {
    pub const NONE: SubdocFlags = SubdocFlags(0);
    /// Create missing intermediate containers along the path.
    pub const MKDIR_P: SubdocFlags = SubdocFlags(0x01);

    pub fn contains(self, flag: SubdocFlags) -> bool {
        self.0 & flag.0 != 0
    }

    /// Bits set here that are not in `valid` — non-zero means reject.
    pub fn invalid_bits(self, valid: SubdocFlags) -> u8 {
        self.0 & !valid.0
    }
}

/// Single-path vs multi-path command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathMode {
    Single,
    Multi,
}

/// Dispatch traits of one sub-document opcode.
#[derive(Debug, Clone, Copy)]
pub struct SubdocTraits {
    pub path: PathMode,
    /// Engine op for single-path commands; multi-path dispatchers have no
    /// single op of their own.
    pub command: Option<Command>,
    pub is_mutator: bool,
    pub request_has_value: bool,
    pub response_has_value: bool,
    pub allow_empty_path: bool,
    pub valid_flags: SubdocFlags,
}

impl SubdocTraits {
    /// Traits for a sub-document opcode, `None` otherwise.
    pub fn of(opcode: Opcode) -> Option<&'static SubdocTraits> {
        use Opcode::*;
        let traits = match opcode {
            SubdocGet => &GET,
            SubdocExists => &EXISTS,
            SubdocDictAdd => &DICT_ADD,
            SubdocDictUpsert => &DICT_UPSERT,
            SubdocDelete => &DELETE,
            SubdocReplace => &REPLACE,
            SubdocArrayPushLast => &ARRAY_PUSH_LAST,
            SubdocArrayPushFirst => &ARRAY_PUSH_FIRST,
            SubdocArrayInsert => &ARRAY_INSERT,
            SubdocArrayAddUnique => &ARRAY_ADD_UNIQUE,
            SubdocCounter => &COUNTER,
            SubdocMultiLookup => &MULTI_LOOKUP,
            SubdocMultiMutation => &MULTI_MUTATION,
            _ => return None,
        };
        Some(traits)
    }
}

const fn single(
    command: Command,
    is_mutator: bool,
    request_has_value: bool,
    response_has_value: bool,
    allow_empty_path: bool,
    valid_flags: SubdocFlags,
) -> SubdocTraits {
    SubdocTraits {
        path: PathMode::Single,
        command: Some(command),
        is_mutator,
        request_has_value,
        response_has_value,
        allow_empty_path,
        valid_flags,
    }
}

static GET: SubdocTraits =
    single(Command::Get, false, false, true, false, SubdocFlags::NONE);

static EXISTS: SubdocTraits =
    single(Command::Exists, false, false, false, false, SubdocFlags::NONE);

static DICT_ADD: SubdocTraits =
    single(Command::DictAdd, true, true, false, false, SubdocFlags::MKDIR_P);

static DICT_UPSERT: SubdocTraits =
    single(Command::DictUpsert, true, true, false, false, SubdocFlags::MKDIR_P);

static DELETE: SubdocTraits =
    single(Command::Remove, true, false, false, false, SubdocFlags::NONE);

static REPLACE: SubdocTraits =
    single(Command::Replace, true, true, false, false, SubdocFlags::NONE);

static ARRAY_PUSH_LAST: SubdocTraits =
    single(Command::ArrayAppend, true, true, false, true, SubdocFlags::MKDIR_P);

static ARRAY_PUSH_FIRST: SubdocTraits =
    single(Command::ArrayPrepend, true, true, false, true, SubdocFlags::MKDIR_P);

static ARRAY_INSERT: SubdocTraits =
    single(Command::ArrayInsert, true, true, false, false, SubdocFlags::NONE);

static ARRAY_ADD_UNIQUE: SubdocTraits =
    single(Command::ArrayAddUnique, true, true, false, true, SubdocFlags::MKDIR_P);

static COUNTER: SubdocTraits =
    single(Command::Counter, true, true, true, true, SubdocFlags::MKDIR_P);

static MULTI_LOOKUP: SubdocTraits = SubdocTraits {
    path: PathMode::Multi,
    command: None,
    is_mutator: false,
    request_has_value: true,
    response_has_value: true,
    allow_empty_path: false,
    valid_flags: SubdocFlags::NONE,
};

static MULTI_MUTATION: SubdocTraits = SubdocTraits {
    path: PathMode::Multi,
    command: None,
    is_mutator: true,
    request_has_value: true,
    response_has_value: false,
    allow_empty_path: false,
    valid_flags: SubdocFlags::NONE,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_covers_family() {
        for byte in 0u8..=255 {
            let Some(op) = Opcode::from_u8(byte) else { continue };
            assert_eq!(SubdocTraits::of(op).is_some(), op.is_subdoc());
        }
    }

    #[test]
    fn test_mutator_classification() {
        assert!(!SubdocTraits::of(Opcode::SubdocGet).unwrap().is_mutator);
        assert!(!SubdocTraits::of(Opcode::SubdocExists).unwrap().is_mutator);
        assert!(SubdocTraits::of(Opcode::SubdocDelete).unwrap().is_mutator);
        assert!(SubdocTraits::of(Opcode::SubdocMultiMutation).unwrap().is_mutator);
        assert!(!SubdocTraits::of(Opcode::SubdocMultiLookup).unwrap().is_mutator);
    }

    #[test]
    fn test_flags() {
        let flags = SubdocFlags(0x03);
        assert!(flags.contains(SubdocFlags::MKDIR_P));
        assert_eq!(flags.invalid_bits(SubdocFlags::MKDIR_P), 0x02);
        assert_eq!(SubdocFlags::MKDIR_P.invalid_bits(SubdocFlags::MKDIR_P), 0);
    }
}
