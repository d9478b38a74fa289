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

//! Process-wide allocator hooks.
//!
//! [`TrackingAllocator`] wraps the system allocator and exposes the hook
//! surface memory profilers expect: one new-hook and one delete-hook slot,
//! an allocation-size probe, and the knobs the ioctl surface pokes. Hook
//! registration is a single atomic slot per direction; callbacks run under
//! a thread-local recursion guard so a hook that allocates cannot re-enter
//! itself.
//!
//! The size probe is backed by a fixed open-addressing table updated inside
//! the allocator, so it is allocation-free and best-effort: a full
//! neighborhood simply leaves an allocation untracked.

use std::alloc::{GlobalAlloc, Layout, System};
use std::cell::Cell;
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicUsize, Ordering};

/// Called after an allocation with the new pointer and its size.
pub type NewHook = fn(ptr: *mut u8, size: usize);

/// Called before a deallocation with the doomed pointer.
pub type DeleteHook = fn(ptr: *mut u8);

static NEW_HOOK: AtomicUsize = AtomicUsize::new(0);
static DELETE_HOOK: AtomicUsize = AtomicUsize::new(0);

/// Allocator behavior knob mirrored by `ioctl allocator.aggressive_decommit`.
static AGGRESSIVE_DECOMMIT: AtomicI64 = AtomicI64::new(0);

static RELEASE_FREE_MEMORY_CALLS: AtomicU64 = AtomicU64::new(0);

const TRACK_SLOTS: usize = 8192;
const PROBE_LIMIT: usize = 8;

struct TrackSlot {
    ptr: AtomicUsize,
    size: AtomicUsize,
}

#[allow(clippy::declare_interior_mutable_const)]
const EMPTY_SLOT: TrackSlot = TrackSlot {
    ptr: AtomicUsize::new(0),
    size: AtomicUsize::new(0),
};

static TRACK_TABLE: [TrackSlot; TRACK_SLOTS] = [EMPTY_SLOT; TRACK_SLOTS];

thread_local! {
    static IN_HOOK: Cell<bool> = const { Cell::new(false) };
}

fn slot_index(ptr: usize, probe: usize) -> usize {
    // Pointers are at least word-aligned; fold the low bits out.
    ((ptr >> 4).wrapping_add(probe)) & (TRACK_SLOTS - 1)
}

fn track(ptr: usize, size: usize) {
    for probe in 0..PROBE_LIMIT {
        let slot = &TRACK_TABLE[slot_index(ptr, probe)];
        if slot
            .ptr
            .compare_exchange(0, ptr, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
        {
            slot.size.store(size, Ordering::Release);
            return;
        }
    }
}

fn untrack(ptr: usize) {
    for probe in 0..PROBE_LIMIT {
        let slot = &TRACK_TABLE[slot_index(ptr, probe)];
        if slot.ptr.load(Ordering::Acquire) == ptr {
            slot.ptr.store(0, Ordering::Release);
            slot.size.store(0, Ordering::Release);
            return;
        }
    }
}

fn lookup(ptr: usize) -> usize {
    for probe in 0..PROBE_LIMIT {
        let slot = &TRACK_TABLE[slot_index(ptr, probe)];
        if slot.ptr.load(Ordering::Acquire) == ptr {
            return slot.size.load(Ordering::Acquire);
        }
    }
    0
}

fn run_guarded(f: impl FnOnce()) {
    IN_HOOK.with(|guard| {
        if guard.get() {
            return;
        }
        guard.set(true);
        f();
        guard.set(false);
    });
}

/// Register the process-wide new hook. Fails if one is already installed.
pub fn add_new_hook(hook: NewHook) -> bool {
    NEW_HOOK
        .compare_exchange(0, hook as usize, Ordering::AcqRel, Ordering::Relaxed)
        .is_ok()
}

/// Remove the process-wide new hook; the argument must be the installed one.
pub fn remove_new_hook(hook: NewHook) -> bool {
    NEW_HOOK
        .compare_exchange(hook as usize, 0, Ordering::AcqRel, Ordering::Relaxed)
        .is_ok()
}

pub fn add_delete_hook(hook: DeleteHook) -> bool {
    DELETE_HOOK
        .compare_exchange(0, hook as usize, Ordering::AcqRel, Ordering::Relaxed)
        .is_ok()
}

pub fn remove_delete_hook(hook: DeleteHook) -> bool {
    DELETE_HOOK
        .compare_exchange(hook as usize, 0, Ordering::AcqRel, Ordering::Relaxed)
        .is_ok()
}

/// Size recorded for a live tracked allocation, 0 when unknown.
pub fn get_allocation_size(ptr: *const u8) -> usize {
    lookup(ptr as usize)
}

/// Ask the allocator to return free memory to the OS. The system allocator
/// has no purge entry point, so this is a counter the ioctl surface and
/// tests can observe.
pub fn release_free_memory() {
    RELEASE_FREE_MEMORY_CALLS.fetch_add(1, Ordering::Relaxed);
}

pub fn release_free_memory_calls() -> u64 {
    RELEASE_FREE_MEMORY_CALLS.load(Ordering::Relaxed)
}

pub fn set_aggressive_decommit(value: i64) {
    AGGRESSIVE_DECOMMIT.store(value, Ordering::Relaxed);
}

pub fn aggressive_decommit() -> i64 {
    AGGRESSIVE_DECOMMIT.load(Ordering::Relaxed)
}

/// Drop-in global allocator that drives the hook surface.
///
/// ```ignore
/// #[global_allocator]
/// static ALLOC: kelp_server::alloc::TrackingAllocator = TrackingAllocator;
/// ```
pub struct TrackingAllocator;

unsafe impl GlobalAlloc for TrackingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = System.alloc(layout);
        if !ptr.is_null() {
            track(ptr as usize, layout.size());
            let hook = NEW_HOOK.load(Ordering::Acquire);
            if hook != 0 {
                let hook: NewHook = std::mem::transmute(hook);
                run_guarded(|| hook(ptr, layout.size()));
            }
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        let hook = DELETE_HOOK.load(Ordering::Acquire);
        if hook != 0 {
            let hook: DeleteHook = std::mem::transmute(hook);
            run_guarded(|| hook(ptr));
        }
        untrack(ptr as usize);
        System.dealloc(ptr, layout);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hook_slots_are_exclusive() {
        fn hook_a(_ptr: *mut u8, _size: usize) {}
        fn hook_b(_ptr: *mut u8, _size: usize) {}

        assert!(add_new_hook(hook_a));
        assert!(!add_new_hook(hook_b));
        // Removal must name the installed hook.
        assert!(!remove_new_hook(hook_b));
        assert!(remove_new_hook(hook_a));
        assert!(add_new_hook(hook_b));
        assert!(remove_new_hook(hook_b));
    }

    #[test]
    fn test_track_table_roundtrip() {
        let fake_ptr = 0xdead_b000usize;
        track(fake_ptr, 128);
        assert_eq!(lookup(fake_ptr), 128);
        untrack(fake_ptr);
        assert_eq!(lookup(fake_ptr), 0);
    }

    #[test]
    fn test_decommit_knob() {
        set_aggressive_decommit(1);
        assert_eq!(aggressive_decommit(), 1);
        set_aggressive_decommit(0);
    }
}
