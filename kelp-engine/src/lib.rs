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

//! Storage engine interface.
//!
//! Buckets plug a [`KvEngine`] behind the command executors. The interface
//! is deliberately narrow: check an item out (`get`), make a new one
//! (`allocate`), publish it (`store`), and hand it back (`release`). An
//! engine may answer any of the blocking entry points with
//! [`EngineError::WouldBlock`], in which case it owes the caller's
//! [`Cookie`] a later [`notify_io_complete`] and the command is re-driven
//! with its context intact.
//!
//! [`notify_io_complete`]: Cookie::notify_io_complete

pub mod cookie;
pub mod ewouldblock;
pub mod item;
pub mod memory;

use thiserror::Error;

pub use cookie::Cookie;
pub use ewouldblock::{EwouldblockEngine, InjectMode};
pub use item::{Item, ItemHandle, ItemInfo};
pub use memory::{EngineOpCounts, MemoryEngine};

use kelp_protocol::Datatype;

/// Engine call outcomes that are not success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EngineError {
    /// The operation cannot complete synchronously; the cookie will be
    /// notified when it can be retried.
    #[error("operation would block")]
    WouldBlock,

    /// The engine wants this connection gone.
    #[error("engine requested disconnect")]
    Disconnect,

    #[error("key not found")]
    KeyEnoent,

    #[error("key exists (or CAS mismatch)")]
    KeyEexists,

    #[error("item not stored")]
    NotStored,

    #[error("item too large")]
    E2big,

    #[error("out of memory")]
    Enomem,

    #[error("temporary failure")]
    Etmpfail,

    #[error("internal engine failure")]
    Failed,
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Mutation mode for [`KvEngine::store`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    /// Store regardless of whether the key exists (CAS still honored when
    /// the item carries one).
    Set,
    /// Store only if the key does not exist.
    Add,
    /// Store only if the key exists and the item CAS matches the stored
    /// generation.
    Replace,
}

/// The storage engine contract.
///
/// Items are checked out by `get`/`allocate` and must be returned exactly
/// once via `release` (dropping the handle releases it too; the handle is
/// not clonable, so the checkout count stays balanced on every path).
pub trait KvEngine: Send + Sync {
    /// Fetch the item stored under `key` in `vbucket`.
    fn get(&self, cookie: &Cookie, key: &[u8], vbucket: u16) -> EngineResult<ItemHandle>;

    /// Create a new, unpublished item with an empty value of `nbytes`.
    fn allocate(
        &self,
        cookie: &Cookie,
        key: &[u8],
        vbucket: u16,
        nbytes: usize,
        flags: u32,
        expiry: u32,
        datatype: Datatype,
    ) -> EngineResult<ItemHandle>;

    /// Publish `item` under its key. Returns the new CAS on success.
    fn store(
        &self,
        cookie: &Cookie,
        item: &ItemHandle,
        op: StoreOp,
        vbucket: u16,
    ) -> EngineResult<u64>;

    /// Return a checked-out item.
    fn release(&self, item: ItemHandle);

    /// Stamp the CAS an item must be derived from for `store(Replace)` to
    /// succeed.
    fn item_set_cas(&self, item: &ItemHandle, cas: u64);

    /// Metadata and value of a checked-out item.
    fn get_item_info(&self, item: &ItemHandle) -> EngineResult<ItemInfo>;

    /// Delete the item under `key`. A non-zero `cas` must match.
    fn remove(&self, cookie: &Cookie, key: &[u8], vbucket: u16, cas: u64) -> EngineResult<u64>;

    /// Number of items currently checked out. Zero whenever no command is
    /// in flight; the resource-safety tests probe this.
    fn checked_out(&self) -> usize;
}
