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

//! In-memory storage engine.
//!
//! A sharded hash table of immutable items. CAS is a single engine-wide
//! generation counter: every successful mutation stamps the item with a
//! fresh value, and `store(Replace)` only succeeds when the incoming item
//! was derived from the currently stored generation.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use kelp_protocol::Datatype;

use crate::cookie::Cookie;
use crate::item::{Item, ItemHandle, ItemInfo};
use crate::{EngineError, EngineResult, KvEngine, StoreOp};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    vbucket: u16,
    key: Box<[u8]>,
}

impl CacheKey {
    fn new(vbucket: u16, key: &[u8]) -> Self {
        Self {
            vbucket,
            key: key.into(),
        }
    }
}

/// Engine call counters, exposed so tests can assert that rejected packets
/// never touched the engine.
#[derive(Debug, Default)]
pub struct EngineOpCounts {
    pub gets: AtomicU64,
    pub allocates: AtomicU64,
    pub stores: AtomicU64,
    pub removes: AtomicU64,
}

impl EngineOpCounts {
    pub fn total(&self) -> u64 {
        self.gets.load(Ordering::Relaxed)
            + self.allocates.load(Ordering::Relaxed)
            + self.stores.load(Ordering::Relaxed)
            + self.removes.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Default)]
pub struct MemoryEngine {
    map: DashMap<CacheKey, Arc<Item>>,
    cas_counter: AtomicU64,
    checked_out: Arc<AtomicUsize>,
    counts: EngineOpCounts,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_cas(&self) -> u64 {
        self.cas_counter.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn op_counts(&self) -> &EngineOpCounts {
        &self.counts
    }

    /// Number of items resident in the engine.
    pub fn item_count(&self) -> usize {
        self.map.len()
    }
}

impl KvEngine for MemoryEngine {
    fn get(&self, _cookie: &Cookie, key: &[u8], vbucket: u16) -> EngineResult<ItemHandle> {
        self.counts.gets.fetch_add(1, Ordering::Relaxed);
        let item = self
            .map
            .get(&CacheKey::new(vbucket, key))
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(EngineError::KeyEnoent)?;
        Ok(ItemHandle::new(item, &self.checked_out))
    }

    fn allocate(
        &self,
        _cookie: &Cookie,
        key: &[u8],
        vbucket: u16,
        nbytes: usize,
        flags: u32,
        expiry: u32,
        datatype: Datatype,
    ) -> EngineResult<ItemHandle> {
        self.counts.allocates.fetch_add(1, Ordering::Relaxed);
        let item = Arc::new(Item::new(key, vbucket, flags, expiry, datatype, nbytes));
        Ok(ItemHandle::new(item, &self.checked_out))
    }

    fn store(
        &self,
        _cookie: &Cookie,
        item: &ItemHandle,
        op: StoreOp,
        vbucket: u16,
    ) -> EngineResult<u64> {
        self.counts.stores.fetch_add(1, Ordering::Relaxed);
        let inner = item.item();
        if inner.value_len() != inner.expected_len() {
            return Err(EngineError::Failed);
        }

        let cache_key = CacheKey::new(vbucket, inner.key());
        match op {
            StoreOp::Replace => {
                // The shard entry lock makes compare-and-publish atomic
                // against concurrent writers.
                let Some(mut entry) = self.map.get_mut(&cache_key) else {
                    return Err(EngineError::KeyEnoent);
                };
                if inner.cas() != entry.value().cas() {
                    return Err(EngineError::KeyEexists);
                }
                let cas = self.next_cas();
                inner.set_cas(cas);
                *entry.value_mut() = item.item_arc();
                Ok(cas)
            }
            StoreOp::Add => {
                let entry = self.map.entry(cache_key);
                match entry {
                    dashmap::mapref::entry::Entry::Occupied(_) => Err(EngineError::KeyEexists),
                    dashmap::mapref::entry::Entry::Vacant(slot) => {
                        let cas = self.next_cas();
                        inner.set_cas(cas);
                        slot.insert(item.item_arc());
                        Ok(cas)
                    }
                }
            }
            StoreOp::Set => {
                let entry = self.map.entry(cache_key);
                match entry {
                    dashmap::mapref::entry::Entry::Occupied(mut slot) => {
                        if inner.cas() != 0 && inner.cas() != slot.get().cas() {
                            return Err(EngineError::KeyEexists);
                        }
                        let cas = self.next_cas();
                        inner.set_cas(cas);
                        *slot.get_mut() = item.item_arc();
                        Ok(cas)
                    }
                    dashmap::mapref::entry::Entry::Vacant(slot) => {
                        if inner.cas() != 0 {
                            // CAS set on a missing key cannot match anything.
                            return Err(EngineError::KeyEnoent);
                        }
                        let cas = self.next_cas();
                        inner.set_cas(cas);
                        slot.insert(item.item_arc());
                        Ok(cas)
                    }
                }
            }
        }
    }

    fn release(&self, item: ItemHandle) {
        drop(item);
    }

    fn item_set_cas(&self, item: &ItemHandle, cas: u64) {
        item.item().set_cas(cas);
    }

    fn get_item_info(&self, item: &ItemHandle) -> EngineResult<ItemInfo> {
        let inner = item.item();
        Ok(ItemInfo {
            cas: inner.cas(),
            flags: 0,
            expiry: 0,
            datatype: inner.datatype(),
            vbucket: inner.vbucket(),
            segments: 1,
            value: inner.value(),
        })
    }

    fn remove(&self, _cookie: &Cookie, key: &[u8], vbucket: u16, cas: u64) -> EngineResult<u64> {
        self.counts.removes.fetch_add(1, Ordering::Relaxed);
        let cache_key = CacheKey::new(vbucket, key);
        if self
            .map
            .remove_if(&cache_key, |_, item| cas == 0 || item.cas() == cas)
            .is_some()
        {
            return Ok(self.next_cas());
        }
        // Distinguish a missing key from a CAS conflict.
        if self.map.contains_key(&cache_key) {
            Err(EngineError::KeyEexists)
        } else {
            Err(EngineError::KeyEnoent)
        }
    }

    fn checked_out(&self) -> usize {
        self.checked_out.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_doc(engine: &MemoryEngine, key: &[u8], value: &[u8], datatype: Datatype) -> u64 {
        let cookie = Cookie::new();
        let item = engine
            .allocate(&cookie, key, 0, value.len(), 0, 0, datatype)
            .unwrap();
        item.fill_value(value.to_vec()).unwrap();
        let cas = engine.store(&cookie, &item, StoreOp::Set, 0).unwrap();
        engine.release(item);
        cas
    }

    #[test]
    fn test_get_miss() {
        let engine = MemoryEngine::new();
        let cookie = Cookie::new();
        assert_eq!(
            engine.get(&cookie, b"absent", 0).unwrap_err(),
            EngineError::KeyEnoent
        );
        assert_eq!(engine.checked_out(), 0);
    }

    #[test]
    fn test_set_then_get() {
        let engine = MemoryEngine::new();
        let cookie = Cookie::new();
        let cas = store_doc(&engine, b"k", b"{\"a\":1}", Datatype::Json);
        assert_ne!(cas, 0);

        let item = engine.get(&cookie, b"k", 0).unwrap();
        let info = engine.get_item_info(&item).unwrap();
        assert_eq!(info.cas, cas);
        assert_eq!(info.datatype, Datatype::Json);
        assert_eq!(&info.value[..], b"{\"a\":1}");
        assert_eq!(engine.checked_out(), 1);
        engine.release(item);
        assert_eq!(engine.checked_out(), 0);
    }

    #[test]
    fn test_vbuckets_are_disjoint() {
        let engine = MemoryEngine::new();
        let cookie = Cookie::new();
        store_doc(&engine, b"k", b"1", Datatype::Json);
        assert_eq!(
            engine.get(&cookie, b"k", 7).unwrap_err(),
            EngineError::KeyEnoent
        );
    }

    #[test]
    fn test_replace_requires_matching_cas() {
        let engine = MemoryEngine::new();
        let cookie = Cookie::new();
        let cas = store_doc(&engine, b"k", b"1", Datatype::Json);

        // Derived from the stored generation: succeeds and bumps CAS.
        let item = engine
            .allocate(&cookie, b"k", 0, 1, 0, 0, Datatype::Json)
            .unwrap();
        item.fill_value(b"2".to_vec()).unwrap();
        engine.item_set_cas(&item, cas);
        let new_cas = engine.store(&cookie, &item, StoreOp::Replace, 0).unwrap();
        assert_ne!(new_cas, cas);
        engine.release(item);

        // Derived from a stale generation: conflict.
        let item = engine
            .allocate(&cookie, b"k", 0, 1, 0, 0, Datatype::Json)
            .unwrap();
        item.fill_value(b"3".to_vec()).unwrap();
        engine.item_set_cas(&item, cas);
        assert_eq!(
            engine.store(&cookie, &item, StoreOp::Replace, 0).unwrap_err(),
            EngineError::KeyEexists
        );
        engine.release(item);
        assert_eq!(engine.checked_out(), 0);
    }

    #[test]
    fn test_replace_missing_key() {
        let engine = MemoryEngine::new();
        let cookie = Cookie::new();
        let item = engine
            .allocate(&cookie, b"ghost", 0, 1, 0, 0, Datatype::Json)
            .unwrap();
        item.fill_value(b"1".to_vec()).unwrap();
        assert_eq!(
            engine.store(&cookie, &item, StoreOp::Replace, 0).unwrap_err(),
            EngineError::KeyEnoent
        );
        engine.release(item);
    }

    #[test]
    fn test_add_conflicts_with_existing() {
        let engine = MemoryEngine::new();
        let cookie = Cookie::new();
        store_doc(&engine, b"k", b"1", Datatype::Raw);

        let item = engine
            .allocate(&cookie, b"k", 0, 1, 0, 0, Datatype::Raw)
            .unwrap();
        item.fill_value(b"2".to_vec()).unwrap();
        assert_eq!(
            engine.store(&cookie, &item, StoreOp::Add, 0).unwrap_err(),
            EngineError::KeyEexists
        );
        engine.release(item);
    }

    #[test]
    fn test_remove_with_cas() {
        let engine = MemoryEngine::new();
        let cookie = Cookie::new();
        let cas = store_doc(&engine, b"k", b"1", Datatype::Raw);

        assert_eq!(
            engine.remove(&cookie, b"k", 0, cas + 99).unwrap_err(),
            EngineError::KeyEexists
        );
        engine.remove(&cookie, b"k", 0, cas).unwrap();
        assert_eq!(
            engine.remove(&cookie, b"k", 0, 0).unwrap_err(),
            EngineError::KeyEnoent
        );
    }

    #[test]
    fn test_fill_length_must_match_allocation() {
        let engine = MemoryEngine::new();
        let cookie = Cookie::new();
        let item = engine
            .allocate(&cookie, b"k", 0, 4, 0, 0, Datatype::Json)
            .unwrap();
        assert_eq!(
            item.fill_value(b"12".to_vec()).unwrap_err(),
            EngineError::Failed
        );
        // Unfilled item cannot be stored either.
        assert_eq!(
            engine.store(&cookie, &item, StoreOp::Set, 0).unwrap_err(),
            EngineError::Failed
        );
        engine.release(item);
    }

    #[test]
    fn test_snapshot_isolation_of_handles() {
        let engine = MemoryEngine::new();
        let cookie = Cookie::new();
        let cas = store_doc(&engine, b"k", b"old", Datatype::Raw);

        let held = engine.get(&cookie, b"k", 0).unwrap();

        let item = engine
            .allocate(&cookie, b"k", 0, 3, 0, 0, Datatype::Raw)
            .unwrap();
        item.fill_value(b"new".to_vec()).unwrap();
        engine.item_set_cas(&item, cas);
        engine.store(&cookie, &item, StoreOp::Replace, 0).unwrap();
        engine.release(item);

        // The held handle still sees the value it checked out.
        let info = engine.get_item_info(&held).unwrap();
        assert_eq!(&info.value[..], b"old");
        engine.release(held);
    }
}
