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

//! Item datatype flag.

/// One-byte flag on every stored item describing the payload encoding.
/// `Compressed*` variants are raw-Snappy compressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Datatype {
    Raw = 0x00,
    Json = 0x01,
    Compressed = 0x02,
    CompressedJson = 0x03,
}

impl Datatype {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Datatype::Raw),
            0x01 => Some(Datatype::Json),
            0x02 => Some(Datatype::Compressed),
            0x03 => Some(Datatype::CompressedJson),
            _ => None,
        }
    }

    pub fn is_json(self) -> bool {
        matches!(self, Datatype::Json | Datatype::CompressedJson)
    }

    pub fn is_compressed(self) -> bool {
        matches!(self, Datatype::Compressed | Datatype::CompressedJson)
    }
}
