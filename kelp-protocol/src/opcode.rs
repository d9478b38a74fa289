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

//! Command opcodes.

/// Opcodes understood by the server. Values follow the memcached binary
/// protocol assignments so off-the-shelf tooling can speak to us.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    Get = 0x00,
    Set = 0x01,
    Delete = 0x04,
    Noop = 0x0a,
    Version = 0x0b,
    Stat = 0x10,
    IoctlGet = 0x23,
    IoctlSet = 0x24,
    CreateBucket = 0x85,
    DeleteBucket = 0x86,
    SelectBucket = 0x89,
    SubdocGet = 0xc5,
    SubdocExists = 0xc6,
    SubdocDictAdd = 0xc7,
    SubdocDictUpsert = 0xc8,
    SubdocDelete = 0xc9,
    SubdocReplace = 0xca,
    SubdocArrayPushLast = 0xcb,
    SubdocArrayPushFirst = 0xcc,
    SubdocArrayInsert = 0xcd,
    SubdocArrayAddUnique = 0xce,
    SubdocCounter = 0xcf,
    SubdocMultiLookup = 0xd0,
    SubdocMultiMutation = 0xd1,
}

impl Opcode {
    pub fn from_u8(value: u8) -> Option<Self> {
        use Opcode::*;
        Some(match value {
            0x00 => Get,
            0x01 => Set,
            0x04 => Delete,
            0x0a => Noop,
            0x0b => Version,
            0x10 => Stat,
            0x23 => IoctlGet,
            0x24 => IoctlSet,
            0x85 => CreateBucket,
            0x86 => DeleteBucket,
            0x89 => SelectBucket,
            0xc5 => SubdocGet,
            0xc6 => SubdocExists,
            0xc7 => SubdocDictAdd,
            0xc8 => SubdocDictUpsert,
            0xc9 => SubdocDelete,
            0xca => SubdocReplace,
            0xcb => SubdocArrayPushLast,
            0xcc => SubdocArrayPushFirst,
            0xcd => SubdocArrayInsert,
            0xce => SubdocArrayAddUnique,
            0xcf => SubdocCounter,
            0xd0 => SubdocMultiLookup,
            0xd1 => SubdocMultiMutation,
            _ => return None,
        })
    }

    /// True for every member of the sub-document command family, including
    /// the multi-path dispatchers.
    pub fn is_subdoc(self) -> bool {
        (self as u8) >= Opcode::SubdocGet as u8 && (self as u8) <= Opcode::SubdocMultiMutation as u8
    }

    /// Human-readable name for logs and stats.
    pub fn name(self) -> &'static str {
        use Opcode::*;
        match self {
            Get => "GET",
            Set => "SET",
            Delete => "DELETE",
            Noop => "NOOP",
            Version => "VERSION",
            Stat => "STAT",
            IoctlGet => "IOCTL_GET",
            IoctlSet => "IOCTL_SET",
            CreateBucket => "CREATE_BUCKET",
            DeleteBucket => "DELETE_BUCKET",
            SelectBucket => "SELECT_BUCKET",
            SubdocGet => "SUBDOC_GET",
            SubdocExists => "SUBDOC_EXISTS",
            SubdocDictAdd => "SUBDOC_DICT_ADD",
            SubdocDictUpsert => "SUBDOC_DICT_UPSERT",
            SubdocDelete => "SUBDOC_DELETE",
            SubdocReplace => "SUBDOC_REPLACE",
            SubdocArrayPushLast => "SUBDOC_ARRAY_PUSH_LAST",
            SubdocArrayPushFirst => "SUBDOC_ARRAY_PUSH_FIRST",
            SubdocArrayInsert => "SUBDOC_ARRAY_INSERT",
            SubdocArrayAddUnique => "SUBDOC_ARRAY_ADD_UNIQUE",
            SubdocCounter => "SUBDOC_COUNTER",
            SubdocMultiLookup => "SUBDOC_MULTI_LOOKUP",
            SubdocMultiMutation => "SUBDOC_MULTI_MUTATION",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_u8_roundtrip() {
        for byte in 0u8..=255 {
            if let Some(op) = Opcode::from_u8(byte) {
                assert_eq!(op as u8, byte);
            }
        }
    }

    #[test]
    fn test_subdoc_family() {
        assert!(Opcode::SubdocGet.is_subdoc());
        assert!(Opcode::SubdocMultiMutation.is_subdoc());
        assert!(!Opcode::Get.is_subdoc());
        assert!(!Opcode::IoctlSet.is_subdoc());
    }
}
