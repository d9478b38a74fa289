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

//! Per-opcode structural request validators.
//!
//! Validation runs before any engine call; a failure here always surfaces
//! to the client as `EINVAL` and the packet is dropped without side
//! effects. The sub-document validators are entirely table-driven off
//! [`SubdocTraits`].

use byteorder::{BigEndian, ByteOrder};
use thiserror::Error;

use crate::frame::RequestFrame;
use crate::header::Magic;
use crate::opcode::Opcode;
use crate::subdoc::{
    PathMode, SubdocFlags, SubdocTraits, MULTI_LOOKUP_SPEC_HEADER, MULTI_MAX_PATHS,
    MULTI_MUTATION_SPEC_HEADER, SUBDOC_BASIC_EXTRAS_LEN, SUBDOC_EXPIRY_EXTRAS_LEN,
    SUBDOC_PATH_MAX_LENGTH,
};

/// Maximum ioctl key and value lengths.
pub const IOCTL_KEY_MAX: usize = 128;
pub const IOCTL_VAL_MAX: usize = 128;

/// Maximum bucket name length.
pub const BUCKET_NAME_MAX: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidateError {
    #[error("magic byte is not a request")]
    BadMagic,

    #[error("request datatype must be raw")]
    BadDatatype,

    #[error("extras length is wrong for this opcode")]
    BadExtras,

    #[error("key length is illegal for this opcode")]
    BadKey,

    #[error("declared lengths are inconsistent")]
    BadBody,

    #[error("path length is out of range")]
    BadPath,

    #[error("unsupported sub-document flags")]
    BadFlags,

    #[error("value presence does not match the opcode")]
    BadValue,

    #[error("multi-path spec count is out of range")]
    BadSpecCount,

    #[error("illegal opcode inside a multi-path command")]
    BadSpecOpcode,

    #[error("multi-path specs do not fill the declared body")]
    BadSpecLayout,
}

type Result = std::result::Result<(), ValidateError>;

/// Validator function type. All validators are pure over the frame.
pub type Validator = fn(&RequestFrame) -> std::result::Result<(), ValidateError>;

/// Look up the validator for an opcode. Total over all known opcodes.
pub fn validator_for(opcode: Opcode) -> Validator {
    use Opcode::*;
    match opcode {
        Get | Delete => validate_key_only,
        Set => validate_set,
        Noop | Version => validate_empty,
        Stat => validate_stat,
        IoctlGet => validate_ioctl_get,
        IoctlSet => validate_ioctl_set,
        CreateBucket => validate_create_bucket,
        DeleteBucket | SelectBucket => validate_bucket_ref,
        SubdocGet | SubdocExists | SubdocDictAdd | SubdocDictUpsert | SubdocDelete
        | SubdocReplace | SubdocArrayPushLast | SubdocArrayPushFirst | SubdocArrayInsert
        | SubdocArrayAddUnique | SubdocCounter => validate_subdoc_single,
        SubdocMultiLookup => validate_multi_lookup,
        SubdocMultiMutation => validate_multi_mutation,
    }
}

fn check_magic(frame: &RequestFrame) -> Result {
    if frame.header.magic != Magic::Request as u8 {
        return Err(ValidateError::BadMagic);
    }
    Ok(())
}

fn check_raw_datatype(frame: &RequestFrame) -> Result {
    if frame.header.datatype != 0 {
        return Err(ValidateError::BadDatatype);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Sub-document validators
// ---------------------------------------------------------------------------

fn validate_subdoc_single(frame: &RequestFrame) -> Result {
    let opcode = Opcode::from_u8(frame.header.opcode).expect("dispatched opcode");
    let traits = SubdocTraits::of(opcode).expect("single-path subdoc opcode");

    check_magic(frame)?;
    check_raw_datatype(frame)?;
    if frame.header.keylen == 0 {
        return Err(ValidateError::BadKey);
    }

    // Lookups carry exactly the path header; mutators may append an expiry.
    let extlen = frame.header.extlen;
    let extras_ok = extlen == SUBDOC_BASIC_EXTRAS_LEN
        || (traits.is_mutator && extlen == SUBDOC_EXPIRY_EXTRAS_LEN);
    if !extras_ok {
        return Err(ValidateError::BadExtras);
    }

    let extras = frame.extras();
    let pathlen = BigEndian::read_u16(&extras[0..2]) as usize;
    let flags = SubdocFlags(extras[2]);

    if pathlen > SUBDOC_PATH_MAX_LENGTH {
        return Err(ValidateError::BadPath);
    }
    if pathlen == 0 && !traits.allow_empty_path {
        return Err(ValidateError::BadPath);
    }
    if flags.invalid_bits(traits.valid_flags) != 0 {
        return Err(ValidateError::BadFlags);
    }

    // Path is the front of the value region; the operand follows it.
    let Some(valuelen) = frame.value().len().checked_sub(pathlen) else {
        return Err(ValidateError::BadBody);
    };
    if traits.request_has_value {
        if valuelen == 0 {
            return Err(ValidateError::BadValue);
        }
    } else if valuelen != 0 {
        return Err(ValidateError::BadValue);
    }

    Ok(())
}

fn validate_multi_lookup(frame: &RequestFrame) -> Result {
    check_magic(frame)?;
    check_raw_datatype(frame)?;
    if frame.header.keylen == 0 {
        return Err(ValidateError::BadKey);
    }
    if frame.header.extlen != 0 {
        return Err(ValidateError::BadExtras);
    }

    let specs = frame.value();
    let mut offset = 0;
    let mut count = 0;

    while offset < specs.len() {
        if count == MULTI_MAX_PATHS {
            return Err(ValidateError::BadSpecCount);
        }
        if specs.len() - offset < MULTI_LOOKUP_SPEC_HEADER {
            return Err(ValidateError::BadSpecLayout);
        }

        let opcode = Opcode::from_u8(specs[offset]).ok_or(ValidateError::BadSpecOpcode)?;
        if !matches!(opcode, Opcode::SubdocGet | Opcode::SubdocExists) {
            return Err(ValidateError::BadSpecOpcode);
        }
        let traits = SubdocTraits::of(opcode).expect("lookup opcode");

        let flags = SubdocFlags(specs[offset + 1]);
        if flags.invalid_bits(traits.valid_flags) != 0 {
            return Err(ValidateError::BadFlags);
        }

        let pathlen = BigEndian::read_u16(&specs[offset + 2..offset + 4]) as usize;
        if pathlen > SUBDOC_PATH_MAX_LENGTH || (pathlen == 0 && !traits.allow_empty_path) {
            return Err(ValidateError::BadPath);
        }
        if specs.len() - offset - MULTI_LOOKUP_SPEC_HEADER < pathlen {
            return Err(ValidateError::BadSpecLayout);
        }

        offset += MULTI_LOOKUP_SPEC_HEADER + pathlen;
        count += 1;
    }

    // The walk must land exactly on the declared end with at least one spec.
    if count == 0 || offset != specs.len() {
        return Err(ValidateError::BadSpecCount);
    }
    Ok(())
}

fn validate_multi_mutation(frame: &RequestFrame) -> Result {
    check_magic(frame)?;
    check_raw_datatype(frame)?;
    if frame.header.keylen == 0 {
        return Err(ValidateError::BadKey);
    }
    // Optional expiry is the only extras a multi-mutation accepts.
    if frame.header.extlen != 0 && frame.header.extlen != 4 {
        return Err(ValidateError::BadExtras);
    }

    let specs = frame.value();
    let mut offset = 0;
    let mut count = 0;

    while offset < specs.len() {
        if count == MULTI_MAX_PATHS {
            return Err(ValidateError::BadSpecCount);
        }
        if specs.len() - offset < MULTI_MUTATION_SPEC_HEADER {
            return Err(ValidateError::BadSpecLayout);
        }

        let opcode = Opcode::from_u8(specs[offset]).ok_or(ValidateError::BadSpecOpcode)?;
        let traits = SubdocTraits::of(opcode).ok_or(ValidateError::BadSpecOpcode)?;
        if !traits.is_mutator || traits.path != PathMode::Single {
            return Err(ValidateError::BadSpecOpcode);
        }

        let flags = SubdocFlags(specs[offset + 1]);
        if flags.invalid_bits(traits.valid_flags) != 0 {
            return Err(ValidateError::BadFlags);
        }

        let pathlen = BigEndian::read_u16(&specs[offset + 2..offset + 4]) as usize;
        let valuelen = BigEndian::read_u32(&specs[offset + 4..offset + 8]) as usize;
        if pathlen > SUBDOC_PATH_MAX_LENGTH || (pathlen == 0 && !traits.allow_empty_path) {
            return Err(ValidateError::BadPath);
        }
        if traits.request_has_value {
            if valuelen == 0 {
                return Err(ValidateError::BadValue);
            }
        } else if valuelen != 0 {
            return Err(ValidateError::BadValue);
        }
        if specs.len() - offset - MULTI_MUTATION_SPEC_HEADER < pathlen + valuelen {
            return Err(ValidateError::BadSpecLayout);
        }

        offset += MULTI_MUTATION_SPEC_HEADER + pathlen + valuelen;
        count += 1;
    }

    if count == 0 || offset != specs.len() {
        return Err(ValidateError::BadSpecCount);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Basic opcode validators
// ---------------------------------------------------------------------------

fn validate_key_only(frame: &RequestFrame) -> Result {
    check_magic(frame)?;
    check_raw_datatype(frame)?;
    if frame.header.extlen != 0 {
        return Err(ValidateError::BadExtras);
    }
    if frame.header.keylen == 0 {
        return Err(ValidateError::BadKey);
    }
    if !frame.value().is_empty() {
        return Err(ValidateError::BadValue);
    }
    Ok(())
}

fn validate_set(frame: &RequestFrame) -> Result {
    check_magic(frame)?;
    // SET names the stored datatype in the header, so anything we know how
    // to store is legal here.
    if crate::datatype::Datatype::from_u8(frame.header.datatype).is_none() {
        return Err(ValidateError::BadDatatype);
    }
    if frame.header.extlen != 8 {
        return Err(ValidateError::BadExtras);
    }
    if frame.header.keylen == 0 {
        return Err(ValidateError::BadKey);
    }
    Ok(())
}

fn validate_empty(frame: &RequestFrame) -> Result {
    check_magic(frame)?;
    check_raw_datatype(frame)?;
    if frame.header.extlen != 0 || frame.header.keylen != 0 || frame.header.bodylen != 0 {
        return Err(ValidateError::BadBody);
    }
    Ok(())
}

fn validate_stat(frame: &RequestFrame) -> Result {
    check_magic(frame)?;
    check_raw_datatype(frame)?;
    if frame.header.extlen != 0 {
        return Err(ValidateError::BadExtras);
    }
    if !frame.value().is_empty() {
        return Err(ValidateError::BadValue);
    }
    Ok(())
}

fn validate_ioctl_get(frame: &RequestFrame) -> Result {
    check_magic(frame)?;
    check_raw_datatype(frame)?;
    if frame.header.extlen != 0 {
        return Err(ValidateError::BadExtras);
    }
    let keylen = frame.header.keylen as usize;
    if keylen == 0 || keylen > IOCTL_KEY_MAX {
        return Err(ValidateError::BadKey);
    }
    if !frame.value().is_empty() {
        return Err(ValidateError::BadValue);
    }
    Ok(())
}

fn validate_ioctl_set(frame: &RequestFrame) -> Result {
    check_magic(frame)?;
    check_raw_datatype(frame)?;
    if frame.header.extlen != 0 {
        return Err(ValidateError::BadExtras);
    }
    let keylen = frame.header.keylen as usize;
    if keylen == 0 || keylen > IOCTL_KEY_MAX {
        return Err(ValidateError::BadKey);
    }
    if frame.value().len() > IOCTL_VAL_MAX {
        return Err(ValidateError::BadValue);
    }
    Ok(())
}

fn validate_create_bucket(frame: &RequestFrame) -> Result {
    check_magic(frame)?;
    check_raw_datatype(frame)?;
    if frame.header.extlen != 0 {
        return Err(ValidateError::BadExtras);
    }
    let keylen = frame.header.keylen as usize;
    if keylen == 0 || keylen > BUCKET_NAME_MAX {
        return Err(ValidateError::BadKey);
    }
    Ok(())
}

fn validate_bucket_ref(frame: &RequestFrame) -> Result {
    check_magic(frame)?;
    check_raw_datatype(frame)?;
    if frame.header.extlen != 0 {
        return Err(ValidateError::BadExtras);
    }
    let keylen = frame.header.keylen as usize;
    if keylen == 0 || keylen > BUCKET_NAME_MAX {
        return Err(ValidateError::BadKey);
    }
    if !frame.value().is_empty() {
        return Err(ValidateError::BadValue);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder;
    use crate::header::RequestHeader;

    fn reframe(mut wire: Vec<u8>, patch: impl FnOnce(&mut RequestHeader)) -> RequestFrame {
        let mut header_bytes = [0u8; crate::HEADER_LEN];
        header_bytes.copy_from_slice(&wire[..crate::HEADER_LEN]);
        let mut header = RequestHeader::from_bytes(&header_bytes);
        patch(&mut header);
        let body = wire.split_off(crate::HEADER_LEN);
        RequestFrame::new(header, body).unwrap()
    }

    fn validate(frame: &RequestFrame) -> Result {
        let opcode = Opcode::from_u8(frame.header.opcode).unwrap();
        validator_for(opcode)(frame)
    }

    #[test]
    fn test_subdoc_get_baseline() {
        let wire = builder::subdoc_request(
            Opcode::SubdocGet,
            b"key",
            b"path",
            SubdocFlags::NONE,
            None,
            0,
            0,
        );
        let frame = reframe(wire, |_| {});
        assert!(validate(&frame).is_ok());
    }

    #[test]
    fn test_subdoc_bad_magic() {
        let wire = builder::subdoc_request(
            Opcode::SubdocGet,
            b"key",
            b"path",
            SubdocFlags::NONE,
            None,
            0,
            0,
        );
        let frame = reframe(wire, |h| h.magic = 0x00);
        assert_eq!(validate(&frame), Err(ValidateError::BadMagic));
    }

    #[test]
    fn test_subdoc_value_presence() {
        // GET must not carry a value...
        let wire = builder::subdoc_request(
            Opcode::SubdocGet,
            b"key",
            b"path",
            SubdocFlags::NONE,
            Some(b"v"),
            0,
            0,
        );
        assert_eq!(validate(&reframe(wire, |_| {})), Err(ValidateError::BadValue));

        // ...and DICT_ADD must.
        let wire = builder::subdoc_request(
            Opcode::SubdocDictAdd,
            b"key",
            b"path",
            SubdocFlags::NONE,
            None,
            0,
            0,
        );
        assert_eq!(validate(&reframe(wire, |_| {})), Err(ValidateError::BadValue));
    }

    #[test]
    fn test_subdoc_flags_masked_by_traits() {
        // MKDIR_P is meaningless on a lookup.
        let wire = builder::subdoc_request(
            Opcode::SubdocGet,
            b"key",
            b"path",
            SubdocFlags::MKDIR_P,
            None,
            0,
            0,
        );
        assert_eq!(validate(&reframe(wire, |_| {})), Err(ValidateError::BadFlags));

        // But accepted by DICT_ADD.
        let wire = builder::subdoc_request(
            Opcode::SubdocDictAdd,
            b"key",
            b"path",
            SubdocFlags::MKDIR_P,
            Some(b"1"),
            0,
            0,
        );
        assert!(validate(&reframe(wire, |_| {})).is_ok());
    }

    #[test]
    fn test_mutator_expiry_extras() {
        let wire = builder::subdoc_request(
            Opcode::SubdocDictUpsert,
            b"key",
            b"path",
            SubdocFlags::NONE,
            Some(b"1"),
            60,
            0,
        );
        assert!(validate(&reframe(wire, |_| {})).is_ok());

        // Expiry extras on a lookup are rejected.
        let wire = builder::subdoc_request(
            Opcode::SubdocExists,
            b"key",
            b"path",
            SubdocFlags::NONE,
            None,
            60,
            0,
        );
        assert_eq!(validate(&reframe(wire, |_| {})), Err(ValidateError::BadExtras));
    }
}
