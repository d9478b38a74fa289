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

//! Error-to-status mapping tables.
//!
//! The only two places engine and path-engine errors become wire statuses.
//! `WouldBlock` and `Disconnect` never reach these: the executor handles
//! them structurally (suspend / close), so seeing one here is an internal
//! fault.

use kelp_engine::EngineError;
use kelp_protocol::Status;
use kelp_subjson::SubjsonError;

pub fn engine_status(err: EngineError) -> Status {
    match err {
        EngineError::KeyEnoent => Status::KeyEnoent,
        EngineError::KeyEexists => Status::KeyEexists,
        EngineError::NotStored => Status::NotStored,
        EngineError::E2big => Status::E2big,
        EngineError::Enomem => Status::Enomem,
        EngineError::Etmpfail => Status::Etmpfail,
        EngineError::Failed => Status::Einternal,
        EngineError::WouldBlock | EngineError::Disconnect => Status::Einternal,
    }
}

pub fn subjson_status(err: SubjsonError) -> Status {
    match err {
        SubjsonError::PathEnoent => Status::SubdocPathEnoent,
        SubjsonError::PathMismatch => Status::SubdocPathMismatch,
        SubjsonError::DocEtoodeep => Status::SubdocDocE2deep,
        SubjsonError::PathEinval => Status::SubdocPathEinval,
        SubjsonError::DocEexists => Status::SubdocPathEexists,
        SubjsonError::PathE2big => Status::SubdocPathE2big,
        SubjsonError::NumE2big => Status::SubdocNumErange,
        SubjsonError::DeltaE2big => Status::SubdocDeltaErange,
        SubjsonError::ValueCantinsert => Status::SubdocValueCantinsert,
        SubjsonError::ValueEtoodeep => Status::SubdocValueEtoodeep,
        SubjsonError::DocNotJson => Status::SubdocDocNotJson,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_errors_map_one_to_one() {
        assert_eq!(subjson_status(SubjsonError::PathEnoent), Status::SubdocPathEnoent);
        assert_eq!(subjson_status(SubjsonError::DocEexists), Status::SubdocPathEexists);
        assert_eq!(subjson_status(SubjsonError::NumE2big), Status::SubdocNumErange);
        assert_eq!(subjson_status(SubjsonError::DeltaE2big), Status::SubdocDeltaErange);
        assert_eq!(subjson_status(SubjsonError::DocEtoodeep), Status::SubdocDocE2deep);
    }

    #[test]
    fn test_engine_errors() {
        assert_eq!(engine_status(EngineError::KeyEnoent), Status::KeyEnoent);
        assert_eq!(engine_status(EngineError::KeyEexists), Status::KeyEexists);
        assert_eq!(engine_status(EngineError::Etmpfail), Status::Etmpfail);
    }
}
