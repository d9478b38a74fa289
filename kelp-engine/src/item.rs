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

//! Items and checkout handles.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use kelp_protocol::Datatype;

use crate::{EngineError, EngineResult};

/// A stored (or about-to-be-stored) value. Published item values are
/// immutable; an allocated item's value is filled exactly once before it is
/// stored.
#[derive(Debug)]
pub struct Item {
    key: Box<[u8]>,
    vbucket: u16,
    flags: u32,
    expiry: u32,
    datatype: Datatype,
    cas: AtomicU64,
    expected_len: usize,
    value: Mutex<Arc<[u8]>>,
}

impl Item {
    pub(crate) fn new(
        key: &[u8],
        vbucket: u16,
        flags: u32,
        expiry: u32,
        datatype: Datatype,
        nbytes: usize,
    ) -> Self {
        Self {
            key: key.into(),
            vbucket,
            flags,
            expiry,
            datatype,
            cas: AtomicU64::new(0),
            expected_len: nbytes,
            value: Mutex::new(Arc::from(&[][..])),
        }
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn vbucket(&self) -> u16 {
        self.vbucket
    }

    pub fn datatype(&self) -> Datatype {
        self.datatype
    }

    pub fn cas(&self) -> u64 {
        self.cas.load(Ordering::Acquire)
    }

    pub(crate) fn set_cas(&self, cas: u64) {
        self.cas.store(cas, Ordering::Release);
    }

    pub fn value(&self) -> Arc<[u8]> {
        Arc::clone(&self.value.lock())
    }

    pub(crate) fn value_len(&self) -> usize {
        self.value.lock().len()
    }

    pub(crate) fn expected_len(&self) -> usize {
        self.expected_len
    }

    pub(crate) fn fill(&self, bytes: Vec<u8>) -> EngineResult<()> {
        if bytes.len() != self.expected_len {
            return Err(EngineError::Failed);
        }
        *self.value.lock() = bytes.into();
        Ok(())
    }
}

/// Keeps the engine-wide checkout count honest; decremented on drop so the
/// count balances on every exit path.
#[derive(Debug)]
pub(crate) struct CheckoutGuard {
    counter: Arc<AtomicUsize>,
}

impl CheckoutGuard {
    pub(crate) fn new(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self {
            counter: Arc::clone(counter),
        }
    }
}

impl Drop for CheckoutGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::AcqRel);
    }
}

/// A checked-out item. Not clonable: one checkout, one handle, one release.
#[derive(Debug)]
pub struct ItemHandle {
    item: Arc<Item>,
    _checkout: CheckoutGuard,
}

impl ItemHandle {
    pub(crate) fn new(item: Arc<Item>, counter: &Arc<AtomicUsize>) -> Self {
        Self {
            item,
            _checkout: CheckoutGuard::new(counter),
        }
    }

    pub fn item(&self) -> &Item {
        &self.item
    }

    pub(crate) fn item_arc(&self) -> Arc<Item> {
        Arc::clone(&self.item)
    }

    /// Copy the assembled value into the item's backing buffer. The length
    /// must match what `allocate` reserved.
    pub fn fill_value(&self, bytes: Vec<u8>) -> EngineResult<()> {
        self.item.fill(bytes)
    }
}

/// Snapshot of a checked-out item's metadata and value.
#[derive(Debug, Clone)]
pub struct ItemInfo {
    pub cas: u64,
    pub flags: u32,
    pub expiry: u32,
    pub datatype: Datatype,
    pub vbucket: u16,
    /// Number of value segments. The in-memory engine always produces one
    /// contiguous segment; consumers must treat anything else as internal
    /// corruption.
    pub segments: usize,
    pub value: Arc<[u8]>,
}
