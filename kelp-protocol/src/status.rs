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

//! Response status codes.

/// Status word carried in every response header. The `0xc0..` block is the
/// sub-document family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Status {
    Success = 0x0000,
    KeyEnoent = 0x0001,
    KeyEexists = 0x0002,
    E2big = 0x0003,
    Einval = 0x0004,
    NotStored = 0x0005,
    NotMyVbucket = 0x0007,
    AuthError = 0x0020,
    Erange = 0x0022,
    UnknownCommand = 0x0081,
    Enomem = 0x0082,
    NotSupported = 0x0083,
    Einternal = 0x0084,
    Ebusy = 0x0085,
    Etmpfail = 0x0086,

    SubdocPathEnoent = 0x00c0,
    SubdocPathMismatch = 0x00c1,
    SubdocPathEinval = 0x00c2,
    SubdocPathE2big = 0x00c3,
    SubdocDocE2deep = 0x00c4,
    SubdocValueCantinsert = 0x00c5,
    SubdocDocNotJson = 0x00c6,
    SubdocNumErange = 0x00c7,
    SubdocDeltaErange = 0x00c8,
    SubdocPathEexists = 0x00c9,
    SubdocValueEtoodeep = 0x00ca,
    SubdocInvalidCombo = 0x00cb,
    SubdocMultiPathFailure = 0x00cc,
}

impl Default for Status {
    fn default() -> Self {
        Status::Success
    }
}

impl Status {
    pub fn from_u16(value: u16) -> Option<Self> {
        use Status::*;
        Some(match value {
            0x0000 => Success,
            0x0001 => KeyEnoent,
            0x0002 => KeyEexists,
            0x0003 => E2big,
            0x0004 => Einval,
            0x0005 => NotStored,
            0x0007 => NotMyVbucket,
            0x0020 => AuthError,
            0x0022 => Erange,
            0x0081 => UnknownCommand,
            0x0082 => Enomem,
            0x0083 => NotSupported,
            0x0084 => Einternal,
            0x0085 => Ebusy,
            0x0086 => Etmpfail,
            0x00c0 => SubdocPathEnoent,
            0x00c1 => SubdocPathMismatch,
            0x00c2 => SubdocPathEinval,
            0x00c3 => SubdocPathE2big,
            0x00c4 => SubdocDocE2deep,
            0x00c5 => SubdocValueCantinsert,
            0x00c6 => SubdocDocNotJson,
            0x00c7 => SubdocNumErange,
            0x00c8 => SubdocDeltaErange,
            0x00c9 => SubdocPathEexists,
            0x00ca => SubdocValueEtoodeep,
            0x00cb => SubdocInvalidCombo,
            0x00cc => SubdocMultiPathFailure,
            _ => return None,
        })
    }

    pub fn is_success(self) -> bool {
        self == Status::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u16_roundtrip() {
        for value in 0u16..=0x00ff {
            if let Some(status) = Status::from_u16(value) {
                assert_eq!(status as u16, value);
            }
        }
        assert_eq!(Status::from_u16(0x00cc), Some(Status::SubdocMultiPathFailure));
    }
}
