//! Allocation accounting via a wrapping global allocator.
//!
//! Install [`TrackingAllocator`] as the binary's `#[global_allocator]` to get
//! `allocated`, `allocs` and `sys-heap` metrics:
//!
//! ```ignore
//! #[global_allocator]
//! static GLOBAL: benchloop_core::TrackingAllocator<std::alloc::System> =
//!     benchloop_core::TrackingAllocator::new(std::alloc::System);
//! ```
//!
//! Counters are process-wide relaxed atomics so allocations made by worker
//! threads are attributed to the run. When the allocator is not installed the
//! counters never move and the metrics are omitted.

use std::alloc::{GlobalAlloc, Layout};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

static ALLOCATED_BYTES: AtomicU64 = AtomicU64::new(0);
static ALLOCATION_COUNT: AtomicU64 = AtomicU64::new(0);
static LIVE_BYTES: AtomicU64 = AtomicU64::new(0);
static PEAK_LIVE_BYTES: AtomicU64 = AtomicU64::new(0);
static INSTALLED: AtomicBool = AtomicBool::new(false);

/// Global allocator wrapper that counts allocations made through it.
#[derive(Debug, Default)]
pub struct TrackingAllocator<A> {
    inner: A,
}

impl<A> TrackingAllocator<A> {
    /// Wrap `inner`.
    pub const fn new(inner: A) -> Self {
        Self { inner }
    }
}

#[inline]
fn on_alloc(size: usize) {
    let size = size as u64;
    ALLOCATED_BYTES.fetch_add(size, Ordering::Relaxed);
    ALLOCATION_COUNT.fetch_add(1, Ordering::Relaxed);
    let live = LIVE_BYTES.fetch_add(size, Ordering::Relaxed) + size;
    PEAK_LIVE_BYTES.fetch_max(live, Ordering::Relaxed);
    if !INSTALLED.load(Ordering::Relaxed) {
        INSTALLED.store(true, Ordering::Relaxed);
    }
}

#[inline]
fn on_dealloc(size: usize) {
    LIVE_BYTES.fetch_sub(size as u64, Ordering::Relaxed);
}

// SAFETY: every call forwards to the wrapped allocator with the caller's
// layout and pointer unchanged; the bookkeeping never touches the memory.
unsafe impl<A: GlobalAlloc> GlobalAlloc for TrackingAllocator<A> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        // SAFETY: forwarded with the same layout.
        let ptr = unsafe { self.inner.alloc(layout) };
        if !ptr.is_null() {
            on_alloc(layout.size());
        }
        ptr
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        // SAFETY: forwarded with the same layout.
        let ptr = unsafe { self.inner.alloc_zeroed(layout) };
        if !ptr.is_null() {
            on_alloc(layout.size());
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        // SAFETY: ptr came from this allocator with the same layout.
        unsafe { self.inner.dealloc(ptr, layout) };
        on_dealloc(layout.size());
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        // SAFETY: ptr came from this allocator with `layout`; new_size is the
        // caller's contract.
        let new_ptr = unsafe { self.inner.realloc(ptr, layout, new_size) };
        if !new_ptr.is_null() {
            on_dealloc(layout.size());
            on_alloc(new_size);
        }
        new_ptr
    }
}

/// Whether a [`TrackingAllocator`] has served at least one allocation.
pub fn tracking_installed() -> bool {
    INSTALLED.load(Ordering::Relaxed)
}

/// Point-in-time copy of the allocation counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocSnapshot {
    /// Cumulative bytes allocated.
    pub allocated_bytes: u64,
    /// Cumulative number of allocations.
    pub allocations: u64,
    /// High-water mark of live heap bytes.
    pub peak_live_bytes: u64,
}

impl AllocSnapshot {
    /// Read the current counters, or `None` if tracking is not installed.
    pub fn take() -> Option<Self> {
        tracking_installed().then(|| Self {
            allocated_bytes: ALLOCATED_BYTES.load(Ordering::Relaxed),
            allocations: ALLOCATION_COUNT.load(Ordering::Relaxed),
            peak_live_bytes: PEAK_LIVE_BYTES.load(Ordering::Relaxed),
        })
    }

    /// Bytes and allocation count between `self` and a later snapshot.
    pub fn since(&self, earlier: &Self) -> (u64, u64) {
        (
            self.allocated_bytes.saturating_sub(earlier.allocated_bytes),
            self.allocations.saturating_sub(earlier.allocations),
        )
    }
}
