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

//! Bucket registry.
//!
//! A bucket binds a name to a storage engine plus its stats and topkeys.
//! Deletion is the delicate part: it must wait for every in-flight command
//! on the bucket to finish, while never holding the registry lock across
//! that wait, and while making sure parked connections get woken so they
//! can drain rather than stall the delete forever.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::{info, warn};

use kelp_engine::{KvEngine, MemoryEngine};
use kelp_protocol::Status;

use crate::stats::BucketStats;
use crate::topkeys::TopKeys;

/// Longest legal bucket name.
pub const MAX_BUCKET_NAME_LENGTH: usize = 100;

/// Poll interval while waiting for a doomed bucket to drain.
const DRAIN_POLL: Duration = Duration::from_millis(50);

/// Bucket names: 1..=100 chars, alphanumeric plus `_ - . %`.
pub fn validate_bucket_name(name: &str) -> bool {
    if name.is_empty() || name.len() > MAX_BUCKET_NAME_LENGTH {
        return false;
    }
    name.chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '%'))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BucketState {
    Ready = 0,
    Destroying = 1,
}

pub struct Bucket {
    name: String,
    engine: Arc<dyn KvEngine>,
    state: AtomicU8,
    /// Connections currently bound to this bucket.
    clients: AtomicU32,
    drain_lock: Mutex<()>,
    drain_cond: Condvar,
    stats: BucketStats,
    topkeys: TopKeys,
}

impl Bucket {
    fn new(name: &str, engine: Arc<dyn KvEngine>, topkeys_per_shard: usize) -> Self {
        Self {
            name: name.to_owned(),
            engine,
            state: AtomicU8::new(BucketState::Ready as u8),
            clients: AtomicU32::new(0),
            drain_lock: Mutex::new(()),
            drain_cond: Condvar::new(),
            stats: BucketStats::default(),
            topkeys: TopKeys::new(topkeys_per_shard),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn engine(&self) -> Arc<dyn KvEngine> {
        Arc::clone(&self.engine)
    }

    pub fn stats(&self) -> &BucketStats {
        &self.stats
    }

    pub fn topkeys(&self) -> &TopKeys {
        &self.topkeys
    }

    pub fn state(&self) -> BucketState {
        if self.state.load(Ordering::Acquire) == BucketState::Ready as u8 {
            BucketState::Ready
        } else {
            BucketState::Destroying
        }
    }

    fn set_destroying(&self) {
        self.state
            .store(BucketState::Destroying as u8, Ordering::Release);
    }

    /// Bind one connection. Refused once the bucket is being destroyed.
    pub fn connect(&self) -> bool {
        self.clients.fetch_add(1, Ordering::AcqRel);
        if self.state() == BucketState::Destroying {
            self.disconnect();
            return false;
        }
        true
    }

    /// Unbind one connection, waking a pending delete when the last one
    /// leaves.
    pub fn disconnect(&self) {
        if self.clients.fetch_sub(1, Ordering::AcqRel) == 1 {
            let _guard = self.drain_lock.lock();
            self.drain_cond.notify_all();
        }
    }

    pub fn client_count(&self) -> u32 {
        self.clients.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for Bucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bucket")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("clients", &self.client_count())
            .finish()
    }
}

pub struct BucketRegistry {
    buckets: Mutex<HashMap<String, Arc<Bucket>>>,
    max_buckets: usize,
    topkeys_per_shard: usize,
}

impl BucketRegistry {
    pub fn new(max_buckets: usize, topkeys_per_shard: usize) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            max_buckets,
            topkeys_per_shard,
        }
    }

    /// Create a bucket backed by a fresh in-memory engine.
    pub fn create(&self, name: &str) -> Result<Arc<Bucket>, Status> {
        self.create_with_engine(name, Arc::new(MemoryEngine::new()))
    }

    /// Create a bucket over a caller-supplied engine (fault-injection
    /// wrappers in tests).
    pub fn create_with_engine(
        &self,
        name: &str,
        engine: Arc<dyn KvEngine>,
    ) -> Result<Arc<Bucket>, Status> {
        if !validate_bucket_name(name) {
            return Err(Status::Einval);
        }
        let mut buckets = self.buckets.lock();
        if buckets.contains_key(name) {
            return Err(Status::KeyEexists);
        }
        if buckets.len() >= self.max_buckets {
            return Err(Status::E2big);
        }
        let bucket = Arc::new(Bucket::new(name, engine, self.topkeys_per_shard));
        buckets.insert(name.to_owned(), Arc::clone(&bucket));
        info!(bucket = name, "bucket created");
        Ok(bucket)
    }

    pub fn get(&self, name: &str) -> Option<Arc<Bucket>> {
        self.buckets.lock().get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.buckets.lock().keys().cloned().collect()
    }

    /// Delete a bucket, blocking until every bound connection has drained.
    ///
    /// `signal` is invoked (repeatedly while waiting) to wake connections
    /// bound to the bucket — e.g. ones parked mid-read on a half-delivered
    /// request — so they observe the state change and disconnect. The
    /// registry lock is never held while waiting.
    pub fn delete(&self, name: &str, signal: impl Fn(&str)) -> Result<(), Status> {
        let bucket = {
            let buckets = self.buckets.lock();
            match buckets.get(name) {
                Some(bucket) => Arc::clone(bucket),
                None => return Err(Status::KeyEnoent),
            }
        };

        if bucket.state() == BucketState::Destroying {
            // Someone else is already tearing it down.
            return Err(Status::KeyEnoent);
        }
        bucket.set_destroying();
        signal(name);

        let mut waited = Duration::ZERO;
        let mut guard = bucket.drain_lock.lock();
        while bucket.client_count() > 0 {
            bucket.drain_cond.wait_for(&mut guard, DRAIN_POLL);
            waited += DRAIN_POLL;
            if waited.as_secs() >= 5 && waited.as_millis() % 1000 == 0 {
                warn!(
                    bucket = name,
                    clients = bucket.client_count(),
                    "still waiting for bucket to drain"
                );
            }
            // Re-signal: a connection may have parked after the first wave.
            signal(name);
        }
        drop(guard);

        self.buckets.lock().remove(name);
        info!(bucket = name, "bucket deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_name_validation() {
        assert!(validate_bucket_name("default"));
        assert!(validate_bucket_name("a-b_c.d%e123"));
        assert!(!validate_bucket_name(""));
        assert!(!validate_bucket_name("has space"));
        assert!(!validate_bucket_name("has/slash"));
        assert!(validate_bucket_name(&"x".repeat(MAX_BUCKET_NAME_LENGTH)));
        assert!(!validate_bucket_name(&"x".repeat(MAX_BUCKET_NAME_LENGTH + 1)));
    }

    #[test]
    fn test_create_duplicate_and_capacity() {
        let registry = BucketRegistry::new(2, 8);
        registry.create("one").unwrap();
        assert_eq!(registry.create("one").unwrap_err(), Status::KeyEexists);
        registry.create("two").unwrap();
        assert_eq!(registry.create("three").unwrap_err(), Status::E2big);
        assert_eq!(registry.create("bad name!").unwrap_err(), Status::Einval);
    }

    #[test]
    fn test_delete_missing() {
        let registry = BucketRegistry::new(4, 8);
        assert_eq!(registry.delete("ghost", |_| {}).unwrap_err(), Status::KeyEnoent);
    }

    #[test]
    fn test_delete_waits_for_clients() {
        let registry = Arc::new(BucketRegistry::new(4, 8));
        let bucket = registry.create("doomed").unwrap();
        assert!(bucket.connect());

        let registry2 = Arc::clone(&registry);
        let deleter = thread::spawn(move || registry2.delete("doomed", |_| {}).unwrap());

        // Give the deleter time to observe the live client.
        thread::sleep(Duration::from_millis(100));
        assert!(registry.get("doomed").is_some(), "delete must wait");

        bucket.disconnect();
        deleter.join().unwrap();
        assert!(registry.get("doomed").is_none());
    }

    #[test]
    fn test_connect_refused_while_destroying() {
        let registry = BucketRegistry::new(4, 8);
        let bucket = registry.create("b").unwrap();
        assert!(bucket.connect());
        bucket.set_destroying();
        assert!(!bucket.connect());
        assert_eq!(bucket.client_count(), 1);
        bucket.disconnect();
    }
}
