//! Per-thread allocation counting.
//!
//! Install [`CountingAllocator`] as the global allocator of the worker
//! binary to make allocation counts available:
//!
//! ```rust,ignore
//! use sidekiq_prometheus::job::CountingAllocator;
//!
//! #[global_allocator]
//! static GLOBAL: CountingAllocator = CountingAllocator::new();
//! ```
//!
//! Without it, [`ThreadAllocations`] always reports zero.
//!
//! Every `alloc`, `alloc_zeroed` and `realloc` counts as one allocation, so
//! a growing `Vec` counts each time it moves to a larger buffer.
//! Deallocations are not counted.

use std::alloc::{GlobalAlloc, Layout, System};
use std::cell::Cell;

thread_local! {
    static ALLOCATED: Cell<u64> = const { Cell::new(0) };
}

fn record_allocation() {
    // try_with: the slot is unavailable while the thread is being torn down.
    let _ = ALLOCATED.try_with(|count| count.set(count.get().wrapping_add(1)));
}

/// Reports a monotonically increasing number of allocations. The difference
/// of two readings taken on the same thread is the number of allocations
/// performed in between.
pub trait AllocationCounter: Send + Sync {
    fn allocated_objects(&self) -> u64;
}

/// Reads the current thread's counter maintained by [`CountingAllocator`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadAllocations;

impl AllocationCounter for ThreadAllocations {
    fn allocated_objects(&self) -> u64 {
        ALLOCATED.try_with(Cell::get).unwrap_or(0)
    }
}

/// A global allocator that forwards to `A` and counts allocations (including
/// reallocations) per thread.
#[derive(Debug, Default)]
pub struct CountingAllocator<A = System> {
    inner: A,
}

impl CountingAllocator<System> {
    pub const fn new() -> Self {
        Self { inner: System }
    }
}

impl<A> CountingAllocator<A> {
    pub const fn wrap(inner: A) -> Self {
        Self { inner }
    }
}

unsafe impl<A: GlobalAlloc> GlobalAlloc for CountingAllocator<A> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        record_allocation();
        self.inner.alloc(layout)
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        record_allocation();
        self.inner.alloc_zeroed(layout)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        self.inner.dealloc(ptr, layout)
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        record_allocation();
        self.inner.realloc(ptr, layout, new_size)
    }
}
