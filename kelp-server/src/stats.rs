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

//! Server and per-bucket counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::Mutex;

/// Per-bucket command counters. Sub-document mutations also count as
/// `cmd_set` and lookups as `cmd_get`, so the generic dashboards see them.
#[derive(Debug, Default)]
pub struct BucketStats {
    pub cmd_get: AtomicU64,
    pub cmd_set: AtomicU64,
    pub get_hits: AtomicU64,
    pub get_misses: AtomicU64,
    pub delete_hits: AtomicU64,
    pub delete_misses: AtomicU64,
    pub cmd_subdoc_lookup: AtomicU64,
    pub cmd_subdoc_mutation: AtomicU64,
    pub bytes_subdoc_lookup_total: AtomicU64,
    pub bytes_subdoc_lookup_extracted: AtomicU64,
    pub bytes_subdoc_mutation_total: AtomicU64,
    pub bytes_subdoc_mutation_inserted: AtomicU64,
}

impl BucketStats {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicU64, amount: u64) {
        counter.fetch_add(amount, Ordering::Relaxed);
    }

    /// Key/value pairs for the STAT command.
    pub fn entries(&self) -> Vec<(String, String)> {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed).to_string();
        vec![
            ("cmd_get".into(), load(&self.cmd_get)),
            ("cmd_set".into(), load(&self.cmd_set)),
            ("get_hits".into(), load(&self.get_hits)),
            ("get_misses".into(), load(&self.get_misses)),
            ("delete_hits".into(), load(&self.delete_hits)),
            ("delete_misses".into(), load(&self.delete_misses)),
            ("cmd_subdoc_lookup".into(), load(&self.cmd_subdoc_lookup)),
            ("cmd_subdoc_mutation".into(), load(&self.cmd_subdoc_mutation)),
            (
                "bytes_subdoc_lookup_total".into(),
                load(&self.bytes_subdoc_lookup_total),
            ),
            (
                "bytes_subdoc_lookup_extracted".into(),
                load(&self.bytes_subdoc_lookup_extracted),
            ),
            (
                "bytes_subdoc_mutation_total".into(),
                load(&self.bytes_subdoc_mutation_total),
            ),
            (
                "bytes_subdoc_mutation_inserted".into(),
                load(&self.bytes_subdoc_mutation_inserted),
            ),
        ]
    }
}

/// Whole-process counters for the front-end.
#[derive(Debug, Default)]
pub struct ServerStats {
    pub connections_total: AtomicU64,
    pub connections_active: AtomicU64,
    pub requests_total: AtomicU64,
    pub requests_error: AtomicU64,
    pub bytes_received: AtomicU64,
    pub bytes_sent: AtomicU64,
    pub start_time: Mutex<Option<Instant>>,
}

impl ServerStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_started(&self) {
        *self.start_time.lock() = Some(Instant::now());
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time
            .lock()
            .map(|t| t.elapsed().as_secs())
            .unwrap_or(0)
    }

    pub fn entries(&self) -> Vec<(String, String)> {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed).to_string();
        vec![
            ("uptime".into(), self.uptime_secs().to_string()),
            ("connections_total".into(), load(&self.connections_total)),
            ("connections_active".into(), load(&self.connections_active)),
            ("requests_total".into(), load(&self.requests_total)),
            ("requests_error".into(), load(&self.requests_error)),
            ("bytes_received".into(), load(&self.bytes_received)),
            ("bytes_sent".into(), load(&self.bytes_sent)),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_stats_entries() {
        let stats = BucketStats::default();
        BucketStats::bump(&stats.cmd_get);
        BucketStats::add(&stats.bytes_subdoc_lookup_total, 42);
        let entries = stats.entries();
        assert!(entries.contains(&("cmd_get".to_string(), "1".to_string())));
        assert!(entries.contains(&("bytes_subdoc_lookup_total".to_string(), "42".to_string())));
    }
}
