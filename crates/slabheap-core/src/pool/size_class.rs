//! Size-class ceilings.
//!
//! Five classes cover requests from 1 to 256 bytes. A request is served by
//! the smallest ceiling that is at least as large as the request; anything
//! above the last ceiling bypasses pooling.

/// Number of pooled size classes.
pub const NUM_SIZE_CLASSES: usize = 5;

/// Ceilings of the pooled classes, ascending.
pub const CLASS_CEILINGS: [usize; NUM_SIZE_CLASSES] = [16, 32, 64, 128, 256];

/// Largest request served from a slab. Above this, use the system fallback.
pub const MAX_POOLED_SIZE: usize = CLASS_CEILINGS[NUM_SIZE_CLASSES - 1];

/// Default slab element count per class.
pub const DEFAULT_CLASS_COUNTS: [usize; NUM_SIZE_CLASSES] = [32, 32, 32, 16, 16];

/// Where a request of a given size is routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    /// Pooled class, by index into [`CLASS_CEILINGS`].
    Class(usize),
    /// Straight to the system allocator.
    System,
}

/// Computes the route for a request of `size` bytes.
///
/// Zero is routed to the first class; callers reject it before routing.
#[must_use]
pub fn route(size: usize) -> Route {
    // Five entries; a scan beats anything cleverer here.
    match CLASS_CEILINGS.iter().position(|&ceiling| size <= ceiling) {
        Some(index) => Route::Class(index),
        None => Route::System,
    }
}

/// Index of the class whose ceiling is exactly `ceiling`.
#[must_use]
pub fn class_index(ceiling: usize) -> Option<usize> {
    CLASS_CEILINGS.iter().position(|&c| c == ceiling)
}

/// Ceiling for a class index, or 0 when out of range.
#[must_use]
pub fn class_ceiling(index: usize) -> usize {
    CLASS_CEILINGS.get(index).copied().unwrap_or(0)
}
