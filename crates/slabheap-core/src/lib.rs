//! # slabheap-core
//!
//! A size-segregated slab heap for small, frequent allocations.
//!
//! Requests up to 256 bytes are served from one of five size classes
//! (16, 32, 64, 128, 256 bytes). Each class keeps an address-sorted set of
//! slabs, each slab a single system allocation carved into equal slots with
//! an index-linked free list. Larger requests go straight to the system
//! allocator. Every free must carry the size used to allocate.
//!
//! Entry points:
//! - [`SlabHeap`]: a lazily initialized, mutex-guarded heap object
//! - [`allocate`] / [`deallocate`]: the process-wide heap
//! - [`SlabHeapAlloc`]: a `GlobalAlloc` over a `SlabHeap`

pub mod config;
pub mod error;
pub mod global_alloc;
pub mod heap;
pub mod pool;

pub use config::SlabHeapConfig;
pub use error::{Result, SlabError};
pub use global_alloc::SlabHeapAlloc;
pub use heap::{
    SlabHeap, allocate, class_element_count, deallocate, global, set_class_element_count,
};
pub use pool::{CLASS_CEILINGS, ClassStats, HeapStats, MAX_POOLED_SIZE, NUM_SIZE_CLASSES};
