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

//! Per-connection I/O completion cookie.
//!
//! When an engine call returns `WouldBlock` the command parks; the engine
//! later deposits the real status here and wakes the connection's worker,
//! which re-enters the executor. The deposited status is the pre-seeded
//! engine return for the retried call (so a background failure surfaces
//! without re-issuing the operation).

use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::EngineResult;

#[derive(Debug, Default)]
pub struct Cookie {
    slot: Mutex<Option<EngineResult<()>>>,
    cond: Condvar,
}

impl Cookie {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deposit the completion status of a previously blocked operation and
    /// wake the waiting worker.
    pub fn notify_io_complete(&self, status: EngineResult<()>) {
        let mut slot = self.slot.lock();
        *slot = Some(status);
        self.cond.notify_one();
    }

    /// Block until a completion arrives. Returns `false` on timeout with no
    /// notification (the caller decides whether to keep waiting).
    pub fn wait_for_notify(&self, timeout: Duration) -> bool {
        let mut slot = self.slot.lock();
        if slot.is_some() {
            return true;
        }
        self.cond.wait_for(&mut slot, timeout);
        slot.is_some()
    }

    /// Consume the pending completion status; `Ok` when none is pending.
    /// This is the status the executor seeds its next engine call with.
    pub fn take_aiostat(&self) -> EngineResult<()> {
        self.slot.lock().take().unwrap_or(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EngineError;

    #[test]
    fn test_notify_then_wait() {
        let cookie = Cookie::new();
        cookie.notify_io_complete(Err(EngineError::KeyEnoent));
        assert!(cookie.wait_for_notify(Duration::from_millis(1)));
        assert_eq!(cookie.take_aiostat(), Err(EngineError::KeyEnoent));
        // Drained: next take is the default success.
        assert_eq!(cookie.take_aiostat(), Ok(()));
    }

    #[test]
    fn test_wait_timeout() {
        let cookie = Cookie::new();
        assert!(!cookie.wait_for_notify(Duration::from_millis(5)));
    }

    #[test]
    fn test_cross_thread_wakeup() {
        let cookie = std::sync::Arc::new(Cookie::new());
        let notifier = std::sync::Arc::clone(&cookie);
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            notifier.notify_io_complete(Ok(()));
        });
        assert!(cookie.wait_for_notify(Duration::from_secs(5)));
        handle.join().unwrap();
        assert_eq!(cookie.take_aiostat(), Ok(()));
    }
}
