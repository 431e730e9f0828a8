//! Size-class dispatcher.
//!
//! One [`SlabManager`] per ceiling in `CLASS_CEILINGS`. Requests are routed
//! to the smallest ceiling that fits; larger requests go to the system
//! fallback. Frees are routed by the size the caller supplies, which must be
//! the size it allocated with: nothing else is stored per allocation unless
//! the shadow registry is on.

use std::ptr::NonNull;

use tracing::{debug, error, warn};

use crate::config::SlabHeapConfig;
use crate::error::{Result, SlabError};
use crate::pool::manager::{ClassStats, SlabManager};
use crate::pool::shadow::ShadowRegistry;
use crate::pool::size_class::{self, CLASS_CEILINGS, NUM_SIZE_CLASSES, Route};
use crate::pool::system::SystemFallback;

/// Snapshot of every class plus the fallback path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
    /// Per-class occupancy, ordered like `CLASS_CEILINGS`.
    pub classes: [ClassStats; NUM_SIZE_CLASSES],
    /// Fallback blocks outstanding.
    pub fallback_live: usize,
    /// Fallback bytes outstanding.
    pub fallback_bytes: usize,
    /// Allocations tracked by the shadow registry (0 when disabled).
    pub shadow_live: usize,
}

impl HeapStats {
    /// Stats of the class with ceiling `ceiling`.
    #[must_use]
    pub fn class(&self, ceiling: usize) -> Option<&ClassStats> {
        size_class::class_index(ceiling).map(|index| &self.classes[index])
    }

    /// Slots handed out across every class.
    #[must_use]
    pub fn live_slots(&self) -> usize {
        self.classes.iter().map(ClassStats::live_slots).sum()
    }
}

/// Routes requests across the pooled classes and the system fallback.
#[derive(Debug)]
pub struct SizeClassDispatcher {
    /// One manager per class, ordered like `CLASS_CEILINGS`.
    managers: Vec<SlabManager>,
    fallback: SystemFallback,
    shadow: ShadowRegistry,
    log_events: bool,
}

impl SizeClassDispatcher {
    /// Builds every class manager with its configured element count.
    pub fn new(config: &SlabHeapConfig) -> Result<Self> {
        let mut managers = Vec::with_capacity(NUM_SIZE_CLASSES);
        for (&ceiling, &count) in CLASS_CEILINGS.iter().zip(config.class_counts.iter()) {
            managers.push(SlabManager::new(ceiling, count)?.with_log_events(config.log_events));
        }
        if config.log_events {
            debug!(
                class_counts = ?config.class_counts,
                shadow_sizes = config.shadow_sizes,
                "size-class dispatcher constructed"
            );
        }
        Ok(Self {
            managers,
            fallback: SystemFallback::new(),
            shadow: ShadowRegistry::new(config.shadow_sizes),
            log_events: config.log_events,
        })
    }

    /// Allocates `size` bytes from the smallest fitting class, or from the
    /// system when `size` exceeds the largest ceiling.
    pub fn allocate(&mut self, size: usize) -> Result<NonNull<u8>> {
        if size == 0 {
            return Err(SlabError::ZeroSizeRequested);
        }
        let ptr = match size_class::route(size) {
            Route::Class(index) => self.managers[index].allocate()?,
            Route::System => self.fallback.allocate(size).inspect_err(|err| {
                if self.log_events {
                    error!(size, error = %err, "system fallback allocation failed");
                }
            })?,
        };
        self.shadow.record(ptr.as_ptr() as usize, size);
        Ok(ptr)
    }

    /// Releases `ptr`, routed by `size`.
    ///
    /// Pooled sizes never touch memory the dispatcher does not own: a pointer
    /// outside the class's slabs is reported as `PointerNotOwned`.
    ///
    /// # Safety
    ///
    /// `size` must equal the size passed to the `allocate` call that returned
    /// `ptr`. For sizes above the largest ceiling, `ptr` must have come from
    /// this dispatcher and must not have been released already.
    pub unsafe fn deallocate(&mut self, ptr: *mut u8, size: usize) -> Result<()> {
        let Some(ptr) = NonNull::new(ptr) else {
            return Err(SlabError::NullPointerOnFree);
        };
        if size == 0 {
            return Err(SlabError::ZeroSizeOnFree);
        }
        let addr = ptr.as_ptr() as usize;
        if let Err(err) = self.shadow.check(addr, size) {
            if self.log_events {
                warn!(addr, size, error = %err, "shadow registry rejected free");
            }
            return Err(err);
        }

        match size_class::route(size) {
            Route::Class(index) => self.managers[index].deallocate(ptr)?,
            // SAFETY: forwarded caller contract; same size rebuilds the layout.
            Route::System => unsafe { self.fallback.deallocate(ptr, size)? },
        }
        self.shadow.forget(addr);
        Ok(())
    }

    /// Ceiling of the class whose slabs contain `addr`.
    #[must_use]
    pub fn class_of(&self, addr: usize) -> Option<usize> {
        self.managers
            .iter()
            .position(|manager| manager.owns(addr))
            .map(size_class::class_ceiling)
    }

    /// Manager serving the class with ceiling `ceiling`.
    #[must_use]
    pub fn manager(&self, ceiling: usize) -> Option<&SlabManager> {
        size_class::class_index(ceiling).map(|index| &self.managers[index])
    }

    /// Element count used for future slabs of the class `ceiling`.
    pub fn class_element_count(&self, ceiling: usize) -> Result<usize> {
        self.manager(ceiling)
            .map(SlabManager::element_count)
            .ok_or(SlabError::UnknownSizeClass { size: ceiling })
    }

    /// Sets the element count for future slabs of the class `ceiling`.
    pub fn set_class_element_count(&mut self, ceiling: usize, count: usize) -> Result<()> {
        let index =
            size_class::class_index(ceiling).ok_or(SlabError::UnknownSizeClass { size: ceiling })?;
        self.managers[index].set_element_count(count);
        Ok(())
    }

    #[must_use]
    pub fn stats(&self) -> HeapStats {
        HeapStats {
            classes: std::array::from_fn(|index| self.managers[index].stats()),
            fallback_live: self.fallback.live(),
            fallback_bytes: self.fallback.live_bytes(),
            shadow_live: self.shadow.live(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dispatcher(config: SlabHeapConfig) -> SizeClassDispatcher {
        SizeClassDispatcher::new(&config).unwrap()
    }

    #[test]
    fn test_routing_by_size() {
        let mut heap = dispatcher(SlabHeapConfig::new());
        for (size, expected) in [(1, 16), (16, 16), (17, 32), (32, 32), (33, 64), (200, 256)] {
            let ptr = heap.allocate(size).unwrap();
            assert_eq!(heap.class_of(ptr.as_ptr() as usize), Some(expected), "size {size}");
        }

        let big = heap.allocate(257).unwrap();
        assert_eq!(heap.class_of(big.as_ptr() as usize), None);
        assert_eq!(heap.stats().fallback_live, 1);
        assert_eq!(heap.stats().fallback_bytes, 257);
        // SAFETY: same size as the allocation.
        unsafe { heap.deallocate(big.as_ptr(), 257).unwrap() };
        assert_eq!(heap.stats().fallback_live, 0);
    }

    #[test]
    fn test_zero_and_null_rejected() {
        let mut heap = dispatcher(SlabHeapConfig::new());
        assert_eq!(heap.allocate(0), Err(SlabError::ZeroSizeRequested));

        let ptr = heap.allocate(8).unwrap();
        // SAFETY: both calls are rejected before touching memory.
        unsafe {
            assert_eq!(
                heap.deallocate(std::ptr::null_mut(), 8),
                Err(SlabError::NullPointerOnFree)
            );
            assert_eq!(heap.deallocate(ptr.as_ptr(), 0), Err(SlabError::ZeroSizeOnFree));
        }
        assert_eq!(heap.stats().live_slots(), 1);
    }

    #[test]
    fn test_one_element_slabs_grow_and_prune() {
        let mut heap = dispatcher(SlabHeapConfig::uniform(1));
        let a = heap.allocate(10).unwrap();
        let b = heap.allocate(10).unwrap();
        assert_eq!(heap.manager(16).unwrap().slab_count(), 2);

        // SAFETY: sizes match the allocations.
        unsafe {
            heap.deallocate(a.as_ptr(), 10).unwrap();
            heap.deallocate(b.as_ptr(), 10).unwrap();
        }
        assert_eq!(heap.manager(16).unwrap().slab_count(), 1);
        assert_eq!(heap.stats().live_slots(), 0);
    }

    #[test]
    fn test_shadow_catches_size_mismatch() {
        let mut heap = dispatcher(SlabHeapConfig::new().with_shadow_sizes(true));
        let ptr = heap.allocate(10).unwrap();
        let addr = ptr.as_ptr() as usize;
        let before = heap.stats();

        // SAFETY: the shadow registry rejects the mismatched free first.
        let err = unsafe { heap.deallocate(ptr.as_ptr(), 40) }.unwrap_err();
        assert_eq!(
            err,
            SlabError::SizeMismatch {
                addr,
                recorded: 10,
                supplied: 40
            }
        );
        assert_eq!(heap.stats(), before);

        // SAFETY: matching size.
        unsafe { heap.deallocate(ptr.as_ptr(), 10).unwrap() };
        assert_eq!(heap.stats().shadow_live, 0);
    }

    #[test]
    fn test_without_shadow_same_class_size_is_trusted() {
        let mut heap = dispatcher(SlabHeapConfig::new().with_shadow_sizes(false));
        let ptr = heap.allocate(10).unwrap();
        // SAFETY: 16 routes to the same class as 10.
        unsafe { heap.deallocate(ptr.as_ptr(), 16).unwrap() };
        assert_eq!(heap.stats().live_slots(), 0);
        assert_eq!(heap.stats().shadow_live, 0);
    }

    #[test]
    fn test_cross_class_free_is_not_owned() {
        let mut heap = dispatcher(SlabHeapConfig::new().with_shadow_sizes(false));
        let ptr = heap.allocate(10).unwrap();
        let addr = ptr.as_ptr() as usize;
        // SAFETY: pooled route; the 64B manager does not own the pointer.
        let err = unsafe { heap.deallocate(ptr.as_ptr(), 64) }.unwrap_err();
        assert_eq!(err, SlabError::PointerNotOwned { addr });
        assert_eq!(heap.stats().class(16).unwrap().live_slots(), 1);
    }

    #[test]
    fn test_class_tuning() {
        let mut heap = dispatcher(SlabHeapConfig::new());
        assert_eq!(heap.class_element_count(128), Ok(16));
        heap.set_class_element_count(128, 4).unwrap();
        assert_eq!(heap.class_element_count(128), Ok(4));
        assert_eq!(heap.stats().class(128).unwrap().total_slots, 16);

        assert_eq!(
            heap.class_element_count(100),
            Err(SlabError::UnknownSizeClass { size: 100 })
        );
        assert_eq!(
            heap.set_class_element_count(300, 1),
            Err(SlabError::UnknownSizeClass { size: 300 })
        );
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_growth_exhaustion_surfaces_out_of_memory() {
        let mut heap = dispatcher(SlabHeapConfig::uniform(1));
        heap.set_class_element_count(256, 1 << 40).unwrap();
        let _held = heap.allocate(200).unwrap();

        let err = heap.allocate(200).unwrap_err();
        assert!(matches!(err, SlabError::OutOfMemory { .. }));
        assert_eq!(heap.stats().class(256).unwrap().slabs, 1);
    }
}
