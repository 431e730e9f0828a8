//! Pooled allocation.
//!
//! Layers, innermost first:
//! - [`slab`]: one buffer of equal slots with an O(1) free list
//! - [`manager`]: a sorted, growable set of slabs for one slot size
//! - [`dispatcher`]: one manager per size class plus a system fallback

pub mod dispatcher;
pub mod manager;
pub mod shadow;
pub mod size_class;
pub mod slab;
pub mod system;

pub use dispatcher::{HeapStats, SizeClassDispatcher};
pub use manager::{ClassStats, SlabManager};
pub use shadow::ShadowRegistry;
pub use size_class::{CLASS_CEILINGS, MAX_POOLED_SIZE, NUM_SIZE_CLASSES, Route};
pub use slab::{POINTER_WIDTH, Slab};
pub use system::SystemFallback;
