//! A counting global allocator, enabled only under the
//! `test-alloc-counter` feature, used to check the zero-allocation claim
//! in `SPEC_FULL.md` §5/§8a. Mirrors the teacher's pattern of gating
//! test-only instrumentation (`fail::cfg`) behind a feature rather than
//! shipping it in ordinary builds.

use std::alloc::{GlobalAlloc, Layout, System};
use std::sync::atomic::{AtomicI64, Ordering};

static LIVE_BYTES: AtomicI64 = AtomicI64::new(0);

/// Wraps the system allocator, tracking net bytes currently allocated.
/// Installed with `#[global_allocator]` by tests that need to assert a
/// duty cycle performs no net allocation.
pub struct CountingAllocator;

unsafe impl GlobalAlloc for CountingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        LIVE_BYTES.fetch_add(layout.size() as i64, Ordering::Relaxed);
        unsafe { System.alloc(layout) }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        LIVE_BYTES.fetch_sub(layout.size() as i64, Ordering::Relaxed);
        unsafe { System.dealloc(ptr, layout) }
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        LIVE_BYTES.fetch_add(new_size as i64 - layout.size() as i64, Ordering::Relaxed);
        unsafe { System.realloc(ptr, layout, new_size) }
    }
}

/// Net bytes currently live through this allocator. Comparing two
/// readings around a call isolates that call's net allocation, immune to
/// whatever ran before the measurement window.
pub fn live_bytes() -> i64 {
    LIVE_BYTES.load(Ordering::Relaxed)
}
