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

//! Connection-scoped dynamic buffer.
//!
//! A doubling growth buffer used for inflating compressed documents and for
//! assembling response bodies. `grow` ensures headroom past the current
//! offset; `move_offset` commits written bytes so later growth does not
//! reuse them.

/// Default ceiling for a connection's dynamic buffer.
pub const DEFAULT_DYNBUF_MAX: usize = 64 * 1024 * 1024;

#[derive(Debug)]
pub struct DynamicBuffer {
    buffer: Vec<u8>,
    offset: usize,
    max: usize,
}

impl Default for DynamicBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_DYNBUF_MAX)
    }
}

impl DynamicBuffer {
    pub fn new(max: usize) -> Self {
        Self {
            buffer: Vec::new(),
            offset: 0,
            max,
        }
    }

    /// Ensure at least `needed` writable bytes past the offset. Returns
    /// false when that would exceed the configured ceiling.
    pub fn grow(&mut self, needed: usize) -> bool {
        let mut size = self.buffer.len();
        if size == 0 {
            size = 1024;
        }
        while size - self.offset < needed {
            let Some(doubled) = size.checked_mul(2) else {
                return false;
            };
            size = doubled;
            if size > self.max {
                return false;
            }
        }
        if size != self.buffer.len() {
            self.buffer.resize(size, 0);
        }
        true
    }

    /// Writable region past the committed offset.
    pub fn current_mut(&mut self) -> &mut [u8] {
        &mut self.buffer[self.offset..]
    }

    /// Commit `len` bytes written at the current offset.
    pub fn move_offset(&mut self, len: usize) {
        debug_assert!(self.offset + len <= self.buffer.len());
        self.offset += len;
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// A committed region.
    pub fn slice(&self, offset: usize, len: usize) -> &[u8] {
        &self.buffer[offset..offset + len]
    }

    /// Drop all committed data, keeping the allocation.
    pub fn reset(&mut self) {
        self.offset = 0;
    }

    /// Release the backing allocation entirely.
    pub fn clear(&mut self) {
        self.buffer = Vec::new();
        self.offset = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grow_and_commit() {
        let mut buf = DynamicBuffer::new(1 << 20);
        assert!(buf.grow(10));
        buf.current_mut()[..10].copy_from_slice(b"0123456789");
        buf.move_offset(10);
        assert_eq!(buf.offset(), 10);
        assert_eq!(buf.slice(0, 10), b"0123456789");

        // Growth preserves committed bytes.
        assert!(buf.grow(4000));
        assert_eq!(buf.slice(0, 10), b"0123456789");
    }

    #[test]
    fn test_grow_respects_ceiling() {
        let mut buf = DynamicBuffer::new(2048);
        assert!(buf.grow(2000));
        assert!(!buf.grow(4096));
    }

    #[test]
    fn test_reset_keeps_capacity() {
        let mut buf = DynamicBuffer::new(1 << 20);
        assert!(buf.grow(100));
        buf.move_offset(100);
        buf.reset();
        assert_eq!(buf.offset(), 0);
        assert!(buf.grow(100));
    }
}
