//! Slab manager for one size class.
//!
//! Owns a collection of [`Slab`]s kept sorted ascending by `address_min`.
//! Growth inserts a fresh slab at its sorted position; frees locate their
//! slab by binary search; a slab that becomes fully free is dropped unless it
//! is the last one.

use std::ptr::NonNull;

use tracing::{debug, error, warn};

use crate::error::{Result, SlabError};
use crate::pool::slab::Slab;

/// Occupancy snapshot of one manager.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClassStats {
    /// Slot size served by the manager.
    pub element_size: usize,
    /// Element count used for the next slab.
    pub element_count: usize,
    /// Slabs currently owned.
    pub slabs: usize,
    /// Slots across all slabs.
    pub total_slots: usize,
    /// Free slots across all slabs.
    pub free_slots: usize,
    /// Slabs added since construction.
    pub growths: u64,
    /// Slabs removed since construction.
    pub prunes: u64,
}

impl ClassStats {
    /// Slots currently handed out.
    #[must_use]
    pub fn live_slots(&self) -> usize {
        self.total_slots - self.free_slots
    }
}

/// Grows and shrinks a sorted set of equal-size slabs.
#[derive(Debug)]
pub struct SlabManager {
    element_size: usize,
    /// Capacity of slabs created from now on.
    element_count: usize,
    /// Sorted ascending by `address_min`; never empty.
    slabs: Vec<Slab>,
    /// Index of the slab new allocations come from.
    target: usize,
    growths: u64,
    prunes: u64,
    /// Emit `tracing` events.
    log_events: bool,
}

impl SlabManager {
    /// Creates a manager holding one slab.
    pub fn new(element_size: usize, element_count: usize) -> Result<Self> {
        let first = Slab::new(element_size, element_count)?;
        Ok(Self {
            element_size: first.element_size(),
            element_count: first.element_count(),
            slabs: vec![first],
            target: 0,
            growths: 0,
            prunes: 0,
            log_events: true,
        })
    }

    /// Turns this manager's `tracing` events on or off.
    #[must_use]
    pub fn with_log_events(mut self, enabled: bool) -> Self {
        self.log_events = enabled;
        self
    }

    /// Hands out one slot, adding a slab when the target is exhausted.
    ///
    /// On `OutOfMemory` no existing slab is touched.
    pub fn allocate(&mut self) -> Result<NonNull<u8>> {
        if self.slabs[self.target].is_exhausted() {
            self.grow()?;
        }
        self.slabs[self.target]
            .allocate()
            .ok_or(SlabError::OutOfMemory {
                bytes: self.element_size,
            })
    }

    /// Returns a slot to the slab that owns it.
    ///
    /// A pointer outside every slab (or not on a slot boundary) is reported
    /// as `PointerNotOwned` and changes nothing.
    pub fn deallocate(&mut self, ptr: NonNull<u8>) -> Result<()> {
        let addr = ptr.as_ptr() as usize;
        let Some(index) = self.find(addr) else {
            if self.log_events {
                warn!(addr, element_size = self.element_size, "free of pointer outside every slab");
            }
            return Err(SlabError::PointerNotOwned { addr });
        };
        if !self.slabs[index].deallocate(ptr) {
            if self.log_events {
                warn!(addr, element_size = self.element_size, "free of pointer that is not a live slot");
            }
            return Err(SlabError::PointerNotOwned { addr });
        }

        if self.slabs[index].is_unused() && self.slabs.len() > 1 {
            self.prune(index);
        } else if self.slabs[self.target].is_exhausted() {
            // Reuse the slot just returned before growing again.
            self.target = index;
        }
        Ok(())
    }

    /// Index of the slab whose range contains `addr`.
    #[must_use]
    pub fn find(&self, addr: usize) -> Option<usize> {
        let after = self.slabs.partition_point(|slab| slab.address_min() <= addr);
        let index = after.checked_sub(1)?;
        self.slabs[index].contains(addr).then_some(index)
    }

    /// True when some slab's range contains `addr`.
    #[must_use]
    pub fn owns(&self, addr: usize) -> bool {
        self.find(addr).is_some()
    }

    #[must_use]
    pub fn element_size(&self) -> usize {
        self.element_size
    }

    /// Capacity used for slabs created from now on.
    #[must_use]
    pub fn element_count(&self) -> usize {
        self.element_count
    }

    /// Changes the capacity of future slabs; existing slabs keep theirs.
    pub fn set_element_count(&mut self, count: usize) {
        let count = count.max(1);
        if self.log_events {
            debug!(
                element_size = self.element_size,
                from = self.element_count,
                to = count,
                "slab element count changed"
            );
        }
        self.element_count = count;
    }

    /// The owned slabs, ascending by address.
    #[must_use]
    pub fn slabs(&self) -> &[Slab] {
        &self.slabs
    }

    #[must_use]
    pub fn slab_count(&self) -> usize {
        self.slabs.len()
    }

    #[must_use]
    pub fn stats(&self) -> ClassStats {
        ClassStats {
            element_size: self.element_size,
            element_count: self.element_count,
            slabs: self.slabs.len(),
            total_slots: self.slabs.iter().map(Slab::element_count).sum(),
            free_slots: self.slabs.iter().map(Slab::free_count).sum(),
            growths: self.growths,
            prunes: self.prunes,
        }
    }

    fn grow(&mut self) -> Result<()> {
        self.slabs
            .try_reserve(1)
            .map_err(|_| SlabError::OutOfMemory {
                bytes: std::mem::size_of::<Slab>(),
            })?;
        let slab = Slab::new(self.element_size, self.element_count).inspect_err(|err| {
            if self.log_events {
                error!(
                    element_size = self.element_size,
                    element_count = self.element_count,
                    error = %err,
                    "slab buffer allocation failed"
                );
            }
        })?;
        let position = self
            .slabs
            .partition_point(|existing| existing.address_min() < slab.address_min());
        self.slabs.insert(position, slab);
        self.target = position;
        self.growths += 1;
        if self.log_events {
            debug!(
                element_size = self.element_size,
                element_count = self.element_count,
                slabs = self.slabs.len(),
                "slab added"
            );
        }
        Ok(())
    }

    fn prune(&mut self, index: usize) {
        let removed = self.slabs.remove(index);
        self.prunes += 1;
        if self.target == index {
            self.target = self
                .slabs
                .iter()
                .position(|slab| !slab.is_exhausted())
                .unwrap_or(0);
        } else if self.target > index {
            self.target -= 1;
        }
        if self.log_events {
            debug!(
                element_size = self.element_size,
                address_min = removed.address_min(),
                slabs = self.slabs.len(),
                "unused slab released"
            );
        }
    }
}
