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

//! Document materialization.
//!
//! Turns a fetched item into one flat, uncompressed JSON buffer for the
//! path engine. Plain JSON items are used in place (the stored value is a
//! single contiguous segment); Snappy-compressed JSON is inflated into the
//! connection's dynamic buffer. Anything that is not JSON is refused
//! before the path engine ever sees it.

use tracing::warn;

use kelp_engine::ItemInfo;
use kelp_protocol::{Datatype, Status};

use crate::buffer::DynamicBuffer;
use crate::context::DocBuffer;

/// Longest key prefix included in log messages.
const LOG_KEY_PREFIX: usize = 32;

/// Render a key for logging: printable prefix only, never the whole key.
pub fn redact_key(key: &[u8]) -> String {
    let prefix: String = key
        .iter()
        .take(LOG_KEY_PREFIX)
        .map(|&b| {
            if b.is_ascii_graphic() || b == b' ' {
                b as char
            } else {
                '.'
            }
        })
        .collect();
    if key.len() > LOG_KEY_PREFIX {
        format!("{prefix}…")
    } else {
        prefix
    }
}

/// Obtain the flat JSON document for `info`, honoring the item datatype.
///
/// A non-zero `client_cas` must match the item's CAS before any inflate
/// work happens. On success the observed CAS is returned alongside the
/// buffer, for the command context to record.
pub fn materialize_document(
    dynbuf: &mut DynamicBuffer,
    info: &ItemInfo,
    client_cas: u64,
    key: &[u8],
    conn_id: u64,
) -> Result<(DocBuffer, u64), Status> {
    if info.segments != 1 {
        warn!(conn_id, segments = info.segments, "document spans multiple segments");
        return Err(Status::Einternal);
    }

    if client_cas != 0 && client_cas != info.cas {
        return Err(Status::KeyEexists);
    }

    match info.datatype {
        Datatype::Json => Ok((DocBuffer::Item(info.value.clone()), info.cas)),

        Datatype::CompressedJson => {
            let uncompressed_len = match snap::raw::decompress_len(&info.value) {
                Ok(len) => len,
                Err(_) => {
                    warn!(
                        conn_id,
                        key = %redact_key(key),
                        "failed to determine inflated body size; item datatype may be wrong"
                    );
                    return Err(Status::Einternal);
                }
            };

            if !dynbuf.grow(uncompressed_len) {
                warn!(
                    conn_id,
                    uncompressed_len, "cannot grow dynamic buffer for inflate"
                );
                return Err(Status::E2big);
            }

            let offset = dynbuf.offset();
            let written = snap::raw::Decoder::new()
                .decompress(&info.value, &mut dynbuf.current_mut()[..uncompressed_len]);
            match written {
                Ok(len) => {
                    dynbuf.move_offset(len);
                    Ok((DocBuffer::Inflated { offset, len }, info.cas))
                }
                Err(_) => {
                    warn!(
                        conn_id,
                        key = %redact_key(key),
                        "failed to inflate body; item datatype may be wrong"
                    );
                    Err(Status::Einternal)
                }
            }
        }

        // Raw and compressed-raw items cannot serve path operations. (The
        // datatype byte is a closed enum on this side of the engine, so
        // there is no unknown-value branch to defend.)
        Datatype::Raw | Datatype::Compressed => Err(Status::SubdocDocNotJson),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn info(datatype: Datatype, cas: u64, value: &[u8]) -> ItemInfo {
        ItemInfo {
            cas,
            flags: 0,
            expiry: 0,
            datatype,
            vbucket: 0,
            segments: 1,
            value: Arc::from(value),
        }
    }

    fn doc_bytes<'a>(doc: &'a DocBuffer, dynbuf: &'a DynamicBuffer) -> &'a [u8] {
        match doc {
            DocBuffer::Item(value) => value,
            DocBuffer::Inflated { offset, len } => dynbuf.slice(*offset, *len),
            other => panic!("unexpected buffer {other:?}"),
        }
    }

    #[test]
    fn test_json_is_zero_copy() {
        let mut dynbuf = DynamicBuffer::default();
        let info = info(Datatype::Json, 7, br#"{"a":1}"#);
        let (doc, cas) = materialize_document(&mut dynbuf, &info, 0, b"k", 1).unwrap();
        assert_eq!(cas, 7);
        assert_eq!(doc_bytes(&doc, &dynbuf), br#"{"a":1}"#);
        // Nothing was written into the scratch buffer.
        assert_eq!(dynbuf.offset(), 0);
    }

    #[test]
    fn test_compressed_json_inflates_into_scratch() {
        let raw = br#"{"k":"v"}"#;
        let compressed = snap::raw::Encoder::new().compress_vec(raw).unwrap();
        let mut dynbuf = DynamicBuffer::default();
        let info = info(Datatype::CompressedJson, 3, &compressed);

        let (doc, cas) = materialize_document(&mut dynbuf, &info, 0, b"k", 1).unwrap();
        assert_eq!(cas, 3);
        assert_eq!(doc_bytes(&doc, &dynbuf), raw);
        assert_eq!(dynbuf.offset(), raw.len());
    }

    #[test]
    fn test_cas_mismatch_before_inflate() {
        let compressed = snap::raw::Encoder::new().compress_vec(b"{}").unwrap();
        let mut dynbuf = DynamicBuffer::default();
        let info = info(Datatype::CompressedJson, 5, &compressed);

        let err = materialize_document(&mut dynbuf, &info, 99, b"k", 1).unwrap_err();
        assert_eq!(err, Status::KeyEexists);
        // The mismatch was detected before any inflate work.
        assert_eq!(dynbuf.offset(), 0);
    }

    #[test]
    fn test_non_json_datatypes_refused() {
        let mut dynbuf = DynamicBuffer::default();
        for datatype in [Datatype::Raw, Datatype::Compressed] {
            let err =
                materialize_document(&mut dynbuf, &info(datatype, 1, b"x"), 0, b"k", 1).unwrap_err();
            assert_eq!(err, Status::SubdocDocNotJson);
        }
    }

    #[test]
    fn test_corrupt_compressed_body() {
        let mut dynbuf = DynamicBuffer::default();
        let info = info(Datatype::CompressedJson, 1, &[0xff, 0xff, 0xff, 0xff, 0xff]);
        let err = materialize_document(&mut dynbuf, &info, 0, b"k", 1).unwrap_err();
        assert_eq!(err, Status::Einternal);
    }

    #[test]
    fn test_multi_segment_is_internal_error() {
        let mut dynbuf = DynamicBuffer::default();
        let mut item = info(Datatype::Json, 1, b"{}");
        item.segments = 2;
        let err = materialize_document(&mut dynbuf, &item, 0, b"k", 1).unwrap_err();
        assert_eq!(err, Status::Einternal);
    }

    #[test]
    fn test_redact_key() {
        assert_eq!(redact_key(b"plain"), "plain");
        assert_eq!(redact_key(&[0x01, b'a', 0xff]), ".a.");
        let long = vec![b'x'; 100];
        assert!(redact_key(&long).ends_with('…'));
    }
}
