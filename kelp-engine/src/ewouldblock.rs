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

//! Fault-injection engine wrapper.
//!
//! Wraps a real engine and makes selected blocking entry points answer
//! `WouldBlock` first, immediately notifying the caller's cookie with
//! success so the command machinery re-drives the call. This is how the
//! suspension paths of the executor get exercised without a slow backend.

use parking_lot::Mutex;

use kelp_protocol::Datatype;

use crate::cookie::Cookie;
use crate::item::{ItemHandle, ItemInfo};
use crate::{EngineError, EngineResult, KvEngine, StoreOp};

/// When to inject `WouldBlock`.
#[derive(Debug, Clone)]
pub enum InjectMode {
    /// Never inject; transparent passthrough.
    Never,
    /// Inject on the first blocking call only.
    First,
    /// Inject on each of the next `n` blocking calls.
    NextN(u32),
    /// Scripted: pop one decision per blocking call, front first. Runs
    /// transparent once the script is exhausted.
    Sequence(Vec<bool>),
}

#[derive(Debug)]
struct InjectState {
    mode: InjectMode,
    injected: u64,
}

/// Engine decorator injecting `WouldBlock` per an [`InjectMode`].
pub struct EwouldblockEngine<E> {
    inner: E,
    state: Mutex<InjectState>,
}

impl<E: KvEngine> EwouldblockEngine<E> {
    pub fn new(inner: E, mode: InjectMode) -> Self {
        Self {
            inner,
            state: Mutex::new(InjectState { mode, injected: 0 }),
        }
    }

    pub fn inner(&self) -> &E {
        &self.inner
    }

    /// Re-arm the injection script.
    pub fn set_mode(&self, mode: InjectMode) {
        let mut state = self.state.lock();
        state.mode = mode;
    }

    /// Total number of injected `WouldBlock` answers.
    pub fn injected(&self) -> u64 {
        self.state.lock().injected
    }

    fn should_inject(&self) -> bool {
        let mut state = self.state.lock();
        let inject = match &mut state.mode {
            InjectMode::Never => false,
            InjectMode::First => {
                state.mode = InjectMode::Never;
                true
            }
            InjectMode::NextN(n) => {
                if *n > 0 {
                    *n -= 1;
                    true
                } else {
                    false
                }
            }
            InjectMode::Sequence(script) => {
                if script.is_empty() {
                    false
                } else {
                    script.remove(0)
                }
            }
        };
        if inject {
            state.injected += 1;
        }
        inject
    }

    fn maybe_block(&self, cookie: &Cookie) -> EngineResult<()> {
        if self.should_inject() {
            // The real backend would complete in the background; complete
            // instantly so the retry finds the cookie armed.
            cookie.notify_io_complete(Ok(()));
            return Err(EngineError::WouldBlock);
        }
        Ok(())
    }
}

impl<E: KvEngine> KvEngine for EwouldblockEngine<E> {
    fn get(&self, cookie: &Cookie, key: &[u8], vbucket: u16) -> EngineResult<ItemHandle> {
        self.maybe_block(cookie)?;
        self.inner.get(cookie, key, vbucket)
    }

    fn allocate(
        &self,
        cookie: &Cookie,
        key: &[u8],
        vbucket: u16,
        nbytes: usize,
        flags: u32,
        expiry: u32,
        datatype: Datatype,
    ) -> EngineResult<ItemHandle> {
        self.maybe_block(cookie)?;
        self.inner
            .allocate(cookie, key, vbucket, nbytes, flags, expiry, datatype)
    }

    fn store(
        &self,
        cookie: &Cookie,
        item: &ItemHandle,
        op: StoreOp,
        vbucket: u16,
    ) -> EngineResult<u64> {
        self.maybe_block(cookie)?;
        self.inner.store(cookie, item, op, vbucket)
    }

    fn release(&self, item: ItemHandle) {
        self.inner.release(item);
    }

    fn item_set_cas(&self, item: &ItemHandle, cas: u64) {
        self.inner.item_set_cas(item, cas);
    }

    fn get_item_info(&self, item: &ItemHandle) -> EngineResult<ItemInfo> {
        self.inner.get_item_info(item)
    }

    fn remove(&self, cookie: &Cookie, key: &[u8], vbucket: u16, cas: u64) -> EngineResult<u64> {
        self.maybe_block(cookie)?;
        self.inner.remove(cookie, key, vbucket, cas)
    }

    fn checked_out(&self) -> usize {
        self.inner.checked_out()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryEngine;

    #[test]
    fn test_first_mode_blocks_once() {
        let engine = EwouldblockEngine::new(MemoryEngine::new(), InjectMode::First);
        let cookie = Cookie::new();

        assert_eq!(
            engine.get(&cookie, b"k", 0).unwrap_err(),
            EngineError::WouldBlock
        );
        // Cookie was armed with the background completion.
        assert_eq!(cookie.take_aiostat(), Ok(()));

        // Retry passes through to the real engine (which misses).
        assert_eq!(
            engine.get(&cookie, b"k", 0).unwrap_err(),
            EngineError::KeyEnoent
        );
        assert_eq!(engine.injected(), 1);
    }

    #[test]
    fn test_sequence_mode() {
        let engine =
            EwouldblockEngine::new(MemoryEngine::new(), InjectMode::Sequence(vec![false, true]));
        let cookie = Cookie::new();

        assert_eq!(
            engine.get(&cookie, b"k", 0).unwrap_err(),
            EngineError::KeyEnoent
        );
        assert_eq!(
            engine.get(&cookie, b"k", 0).unwrap_err(),
            EngineError::WouldBlock
        );
        // Script exhausted: passthrough again.
        let _ = cookie.take_aiostat();
        assert_eq!(
            engine.get(&cookie, b"k", 0).unwrap_err(),
            EngineError::KeyEnoent
        );
    }
}
