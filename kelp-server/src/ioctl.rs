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

//! Runtime knobs: the `ioctl_get` / `ioctl_set` sideband.
//!
//! Recognized keys:
//!
//! - `release_free_memory` (set): ask the allocator to purge free memory
//! - `allocator.aggressive_decommit` (get/set): numeric allocator knob
//! - `trace.connection.<id>` (set): per-connection trace mask
//!
//! Everything else is `EINVAL`.

use tracing::info;

use kelp_protocol::Status;

use crate::alloc;
use crate::connection::ConnectionRegistry;

pub fn ioctl_get(key: &str) -> Result<Vec<u8>, Status> {
    match key {
        "allocator.aggressive_decommit" => {
            Ok(alloc::aggressive_decommit().to_string().into_bytes())
        }
        _ => Err(Status::Einval),
    }
}

pub fn ioctl_set(
    connections: &ConnectionRegistry,
    requester: u64,
    key: &str,
    value: &[u8],
) -> Status {
    if key == "release_free_memory" {
        alloc::release_free_memory();
        info!(conn_id = requester, "IOCTL_SET: release_free_memory called");
        return Status::Success;
    }

    if key == "allocator.aggressive_decommit" {
        let Some(parsed) = std::str::from_utf8(value)
            .ok()
            .and_then(|s| s.trim().parse::<i64>().ok())
        else {
            return Status::Einval;
        };
        alloc::set_aggressive_decommit(parsed);
        info!(
            conn_id = requester,
            value = parsed,
            "IOCTL_SET: allocator.aggressive_decommit updated"
        );
        return Status::Success;
    }

    if let Some(id_text) = key.strip_prefix("trace.connection.") {
        let Ok(target) = id_text.parse::<u64>() else {
            return Status::Einval;
        };
        let Some(mask) = parse_mask(value) else {
            return Status::Einval;
        };
        return if connections.set_trace_mask(target, mask) {
            info!(conn_id = requester, target, mask, "IOCTL_SET: trace mask applied");
            Status::Success
        } else {
            Status::KeyEnoent
        };
    }

    Status::Einval
}

/// Trace masks are decimal or `0x`-prefixed hex.
fn parse_mask(value: &[u8]) -> Option<u32> {
    let text = std::str::from_utf8(value).ok()?.trim();
    if let Some(hex) = text.strip_prefix("0x") {
        u32::from_str_radix(hex, 16).ok()
    } else {
        text.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_keys_are_einval() {
        let connections = ConnectionRegistry::new();
        assert_eq!(ioctl_get("no.such.knob").unwrap_err(), Status::Einval);
        assert_eq!(
            ioctl_set(&connections, 1, "no.such.knob", b"1"),
            Status::Einval
        );
    }

    #[test]
    fn test_release_free_memory() {
        let connections = ConnectionRegistry::new();
        let before = alloc::release_free_memory_calls();
        assert_eq!(
            ioctl_set(&connections, 1, "release_free_memory", b""),
            Status::Success
        );
        assert!(alloc::release_free_memory_calls() > before);
    }

    #[test]
    fn test_decommit_roundtrip() {
        let connections = ConnectionRegistry::new();
        assert_eq!(
            ioctl_set(&connections, 1, "allocator.aggressive_decommit", b"3"),
            Status::Success
        );
        assert_eq!(
            ioctl_get("allocator.aggressive_decommit").unwrap(),
            b"3".to_vec()
        );
        assert_eq!(
            ioctl_set(&connections, 1, "allocator.aggressive_decommit", b"junk"),
            Status::Einval
        );
    }

    #[test]
    fn test_connection_tracing() {
        let connections = ConnectionRegistry::new();
        let shared = connections.register();

        let key = format!("trace.connection.{}", shared.id);
        assert_eq!(ioctl_set(&connections, 0, &key, b"0xff"), Status::Success);
        assert_eq!(shared.trace_mask(), 0xff);

        assert_eq!(
            ioctl_set(&connections, 0, "trace.connection.999999", b"1"),
            Status::KeyEnoent
        );
        assert_eq!(ioctl_set(&connections, 0, &key, b"zz"), Status::Einval);
    }
}
