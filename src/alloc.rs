//! Heap introspection and compaction hints.
//!
//! [`CountingAllocator`] wraps the system allocator and keeps live object and
//! byte counts. Install it in a binary with:
//!
//! ```ignore
//! #[global_allocator]
//! static GLOBAL: rss_harness::alloc::CountingAllocator = rss_harness::alloc::CountingAllocator;
//! ```

use std::alloc::{GlobalAlloc, Layout, System};
use std::sync::atomic::{AtomicU64, Ordering};

/// Page size used to express live bytes as a page count.
pub const HEAP_PAGE_SIZE: u64 = 4096;

static LIVE_OBJECTS: AtomicU64 = AtomicU64::new(0);
static LIVE_BYTES: AtomicU64 = AtomicU64::new(0);

pub struct CountingAllocator;

// SAFETY: every call is forwarded unchanged to `System`; the counters are
// only bookkeeping.
unsafe impl GlobalAlloc for CountingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = System.alloc(layout);
        if !ptr.is_null() {
            LIVE_OBJECTS.fetch_add(1, Ordering::Relaxed);
            LIVE_BYTES.fetch_add(layout.size() as u64, Ordering::Relaxed);
        }
        ptr
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let ptr = System.alloc_zeroed(layout);
        if !ptr.is_null() {
            LIVE_OBJECTS.fetch_add(1, Ordering::Relaxed);
            LIVE_BYTES.fetch_add(layout.size() as u64, Ordering::Relaxed);
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        System.dealloc(ptr, layout);
        LIVE_OBJECTS.fetch_sub(1, Ordering::Relaxed);
        LIVE_BYTES.fetch_sub(layout.size() as u64, Ordering::Relaxed);
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let new_ptr = System.realloc(ptr, layout, new_size);
        if !new_ptr.is_null() {
            LIVE_BYTES.fetch_sub(layout.size() as u64, Ordering::Relaxed);
            LIVE_BYTES.fetch_add(new_size as u64, Ordering::Relaxed);
        }
        new_ptr
    }
}

/// Allocations made through [`CountingAllocator`] and not yet freed.
pub fn live_objects() -> u64 {
    LIVE_OBJECTS.load(Ordering::Relaxed)
}

pub fn live_bytes() -> u64 {
    LIVE_BYTES.load(Ordering::Relaxed)
}

/// Best-effort request to hand unused heap memory back to the OS.
pub trait Compactor {
    fn compact(&self);
}

/// `malloc_trim(0)` on glibc; nothing elsewhere.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemCompactor;

impl Compactor for SystemCompactor {
    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    fn compact(&self) {
        // SAFETY: malloc_trim has no preconditions.
        unsafe {
            libc::malloc_trim(0);
        }
    }

    #[cfg(not(all(target_os = "linux", target_env = "gnu")))]
    fn compact(&self) {}
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoCompaction;

impl Compactor for NoCompaction {
    fn compact(&self) {}
}
