//! # slabheap-abi
//!
//! `extern "C"` boundary for the process-wide slab heap.
//!
//! ```text
//! C caller -> slabheap_* entry (this crate) -> slabheap_core::global() -> dispatcher
//! ```
//!
//! Every symbol carries a `slabheap_` prefix, so nothing here shadows the
//! host's `malloc`/`free`. Failures come back as a null pointer (with
//! `errno` set) or as an errno value returned directly.

pub mod heap_abi;

pub use heap_abi::{
    slabheap_allocate, slabheap_class_element_count, slabheap_deallocate,
    slabheap_set_class_element_count,
};
