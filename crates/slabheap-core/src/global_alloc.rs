//! `GlobalAlloc` adapter.
//!
//! ```ignore
//! #[global_allocator]
//! static ALLOC: slabheap_core::SlabHeapAlloc = slabheap_core::SlabHeapAlloc::from_env();
//! ```
//!
//! Only layouts a slot can satisfy are pooled: non-zero size up to
//! `MAX_POOLED_SIZE` and alignment up to pointer width. Everything else goes
//! to [`System`] with the caller's layout, untouched.
//!
//! The heap allocates its own bookkeeping (slab vectors, the shadow map)
//! while holding its lock. A thread-local depth counter sends those nested
//! allocations to `System`. A nested free cannot tell a slot from a `System`
//! block without the lock, so it is parked in a thread-local list and
//! released by the outermost call once the lock is free again. A released
//! block the heap does not own goes back to `System`; ownership is decided
//! by slab address range, so the two never mix.
//!
//! The wrapped heap never emits `tracing` events: a subscriber would
//! allocate through the allocator it is reporting from.

use std::alloc::{GlobalAlloc, Layout, System};
use std::cell::{Cell, RefCell};
use std::ptr;

use crate::config::SlabHeapConfig;
use crate::error::SlabError;
use crate::heap::SlabHeap;
use crate::pool::size_class::MAX_POOLED_SIZE;
use crate::pool::slab::SLAB_ALIGN;

/// Nested frees parked per thread. Overflowing entries are leaked.
const DEFERRED_CAPACITY: usize = 64;

struct DeferredFrees {
    len: usize,
    entries: [(*mut u8, Layout); DEFERRED_CAPACITY],
}

impl DeferredFrees {
    const fn new() -> Self {
        Self {
            len: 0,
            entries: [(ptr::null_mut(), Layout::new::<u8>()); DEFERRED_CAPACITY],
        }
    }
}

thread_local! {
    static HEAP_REENTRY_DEPTH: Cell<u32> = const { Cell::new(0) };
    static DEFERRED_FREES: RefCell<DeferredFrees> = const { RefCell::new(DeferredFrees::new()) };
}

struct HeapReentryGuard;

impl Drop for HeapReentryGuard {
    fn drop(&mut self) {
        let _ = HEAP_REENTRY_DEPTH.try_with(|depth| {
            let current = depth.get();
            depth.set(current.saturating_sub(1));
        });
    }
}

/// How the current call relates to other heap calls on this thread.
enum HeapEntry {
    /// First entry; the depth is held until the guard drops.
    Outermost(HeapReentryGuard),
    /// Already inside the heap.
    Nested,
    /// Thread-locals are unavailable (thread teardown).
    Unguarded,
}

#[inline]
fn enter_heap() -> HeapEntry {
    HEAP_REENTRY_DEPTH
        .try_with(|depth| {
            let current = depth.get();
            if current > 0 {
                HeapEntry::Nested
            } else {
                depth.set(current + 1);
                HeapEntry::Outermost(HeapReentryGuard)
            }
        })
        .unwrap_or(HeapEntry::Unguarded)
}

/// Parks a nested free. `false` when the list is full or unavailable.
fn defer_free(ptr: *mut u8, layout: Layout) -> bool {
    DEFERRED_FREES
        .try_with(|deferred| {
            let mut deferred = deferred.borrow_mut();
            if deferred.len == DEFERRED_CAPACITY {
                return false;
            }
            let slot = deferred.len;
            deferred.entries[slot] = (ptr, layout);
            deferred.len += 1;
            true
        })
        .unwrap_or(false)
}

fn pop_deferred() -> Option<(*mut u8, Layout)> {
    DEFERRED_FREES
        .try_with(|deferred| {
            let mut deferred = deferred.borrow_mut();
            deferred.len = deferred.len.checked_sub(1)?;
            Some(deferred.entries[deferred.len])
        })
        .ok()
        .flatten()
}

#[inline]
fn is_poolable(layout: Layout) -> bool {
    layout.size() != 0 && layout.size() <= MAX_POOLED_SIZE && layout.align() <= SLAB_ALIGN
}

/// A [`SlabHeap`] usable as the process allocator.
#[derive(Debug)]
pub struct SlabHeapAlloc {
    heap: SlabHeap,
}

impl SlabHeapAlloc {
    /// Heap built from `config`, with `tracing` events turned off.
    #[must_use]
    pub const fn new(config: SlabHeapConfig) -> Self {
        Self {
            heap: SlabHeap::new(config.with_log_events(false)),
        }
    }

    /// Configuration read from the environment on first allocation.
    #[must_use]
    pub const fn from_env() -> Self {
        Self {
            heap: SlabHeap::from_env_without_events(),
        }
    }

    /// The underlying heap, for stats and tuning.
    #[must_use]
    pub fn heap(&self) -> &SlabHeap {
        &self.heap
    }

    /// Returns a pooled-size block to whichever side owns it.
    ///
    /// # Safety
    ///
    /// `ptr` was returned by `alloc(layout)` on this allocator and is live.
    unsafe fn release(&self, ptr: *mut u8, layout: Layout) {
        // SAFETY: `layout` is the allocation layout, so the size routes to
        // the class that served it if the heap served it at all.
        match unsafe { self.heap.deallocate(ptr, layout.size()) } {
            Ok(()) => {}
            Err(SlabError::PointerNotOwned { .. }) => {
                // SAFETY: not in any slab, so it came from a nested `System` call.
                unsafe { System.dealloc(ptr, layout) };
            }
            // Null and zero size never reach here, and a matching layout
            // cannot mismatch. Leak rather than guess.
            Err(_) => {}
        }
    }

    /// Releases nested frees parked by this thread. Call only as the
    /// outermost entry, with the heap lock not held.
    fn drain_deferred(&self) {
        while let Some((ptr, layout)) = pop_deferred() {
            // SAFETY: parked by `dealloc`, which received this pair.
            unsafe { self.release(ptr, layout) };
        }
    }
}

unsafe impl GlobalAlloc for SlabHeapAlloc {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if !is_poolable(layout) {
            // SAFETY: forwarded caller contract.
            return unsafe { System.alloc(layout) };
        }
        let HeapEntry::Outermost(_reentry_guard) = enter_heap() else {
            // SAFETY: non-zero size checked by `is_poolable`.
            return unsafe { System.alloc(layout) };
        };
        self.drain_deferred();
        let block = self
            .heap
            .allocate(layout.size())
            .map_or(ptr::null_mut(), |block| block.as_ptr());
        self.drain_deferred();
        block
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        if !is_poolable(layout) {
            // SAFETY: non-pooled layouts always came from `System`.
            unsafe { System.dealloc(ptr, layout) };
            return;
        }
        match enter_heap() {
            HeapEntry::Outermost(_reentry_guard) => {
                self.drain_deferred();
                // SAFETY: forwarded caller contract.
                unsafe { self.release(ptr, layout) };
                self.drain_deferred();
            }
            HeapEntry::Nested => {
                // Leaked when the list is full.
                let _ = defer_free(ptr, layout);
            }
            // Heap frees never free through this adapter, so this cannot
            // re-enter the lock.
            // SAFETY: forwarded caller contract.
            HeapEntry::Unguarded => unsafe { self.release(ptr, layout) },
        }
    }
}
