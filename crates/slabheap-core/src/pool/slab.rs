//! Fixed-size slab.
//!
//! One system allocation sliced into `element_count` equal slots. Unused
//! slots form a singly-linked free list whose links are slot indices stored
//! in the first word of each free slot:
//!
//! ```text
//!  buffer  [slot 0][slot 1][slot 2] ... [slot n-1]
//!             |  ^    |  ^    |  ^          ^
//!   END <-----'  '----'  '----'  '-- ... ---'-- free_head
//! ```
//!
//! Slots are pushed lowest address first, so a fresh slab hands out its
//! highest slot first.

use std::alloc::{GlobalAlloc, Layout, System};
use std::mem::{align_of, size_of};
use std::ptr::NonNull;

use crate::error::{Result, SlabError};

/// Smallest slot size; a free slot has to hold one link.
pub const POINTER_WIDTH: usize = size_of::<usize>();

/// Alignment of every slab buffer.
pub const SLAB_ALIGN: usize = align_of::<usize>();

/// Free-list terminator.
const END_OF_LIST: usize = usize::MAX;

/// A buffer of equal-size slots with an O(1) free list.
pub struct Slab {
    element_size: usize,
    element_count: usize,
    buffer: NonNull<u8>,
    layout: Layout,
    /// Index of the first free slot, or `END_OF_LIST`.
    free_head: usize,
    free_count: usize,
    address_min: usize,
    address_max: usize,
}

// SAFETY: a Slab exclusively owns its buffer; the raw pointer is never shared
// outside `&mut self` methods, so moving the slab to another thread is sound.
unsafe impl Send for Slab {}

impl Slab {
    /// Allocates the backing buffer and threads every slot onto the free list.
    ///
    /// `element_size` is raised to at least [`POINTER_WIDTH`] and
    /// `element_count` to at least 1.
    pub fn new(element_size: usize, element_count: usize) -> Result<Self> {
        let element_size = element_size.max(POINTER_WIDTH);
        let element_count = element_count.max(1);

        let bytes = element_size
            .checked_mul(element_count)
            .ok_or(SlabError::OutOfMemory { bytes: usize::MAX })?;
        let layout = Layout::from_size_align(bytes, SLAB_ALIGN)
            .map_err(|_| SlabError::OutOfMemory { bytes })?;

        // SAFETY: `layout` has a non-zero size (both factors are >= 1).
        let raw = unsafe { System.alloc(layout) };
        let Some(buffer) = NonNull::new(raw) else {
            return Err(SlabError::OutOfMemory { bytes });
        };

        let address_min = buffer.as_ptr() as usize;
        let mut slab = Self {
            element_size,
            element_count,
            buffer,
            layout,
            free_head: END_OF_LIST,
            free_count: 0,
            address_min,
            address_max: address_min + (bytes - 1),
        };
        for index in 0..element_count {
            slab.push_free(index);
        }
        Ok(slab)
    }

    /// Pops a free slot. `None` once every slot is handed out.
    pub fn allocate(&mut self) -> Option<NonNull<u8>> {
        if self.free_head == END_OF_LIST {
            return None;
        }
        let index = self.free_head;
        let slot = self.slot_ptr(index);
        // SAFETY: `slot` is a free slot of this buffer; its first word holds
        // the link written by `push_free`. Slots may be unaligned for usize.
        self.free_head = unsafe { slot.cast::<usize>().read_unaligned() };
        self.free_count -= 1;
        NonNull::new(slot)
    }

    /// Returns a slot to the free list.
    ///
    /// Pointers outside `[address_min, address_max]`, pointers that do not
    /// start a slot, and frees into an already fully free slab are ignored.
    /// Returns whether the slot was taken back.
    pub fn deallocate(&mut self, ptr: NonNull<u8>) -> bool {
        let addr = ptr.as_ptr() as usize;
        if !self.contains(addr) {
            return false;
        }
        let offset = addr - self.address_min;
        if offset % self.element_size != 0 || self.free_count == self.element_count {
            return false;
        }
        self.push_free(offset / self.element_size);
        true
    }

    /// True when `addr` lies inside this slab's buffer.
    #[inline]
    #[must_use]
    pub fn contains(&self, addr: usize) -> bool {
        (self.address_min..=self.address_max).contains(&addr)
    }

    #[inline]
    #[must_use]
    pub fn address_min(&self) -> usize {
        self.address_min
    }

    /// Address of the last byte of the buffer.
    #[inline]
    #[must_use]
    pub fn address_max(&self) -> usize {
        self.address_max
    }

    #[inline]
    #[must_use]
    pub fn element_size(&self) -> usize {
        self.element_size
    }

    #[inline]
    #[must_use]
    pub fn element_count(&self) -> usize {
        self.element_count
    }

    #[inline]
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.free_count
    }

    /// Every slot is free.
    #[inline]
    #[must_use]
    pub fn is_unused(&self) -> bool {
        self.free_count == self.element_count
    }

    /// No slot is free.
    #[inline]
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.free_count == 0
    }

    fn slot_ptr(&self, index: usize) -> *mut u8 {
        debug_assert!(index < self.element_count);
        // SAFETY: index < element_count, so the offset stays inside the buffer.
        unsafe { self.buffer.as_ptr().add(index * self.element_size) }
    }

    fn push_free(&mut self, index: usize) {
        let slot = self.slot_ptr(index);
        // SAFETY: the slot is inside the buffer and at least one word long.
        unsafe { slot.cast::<usize>().write_unaligned(self.free_head) };
        self.free_head = index;
        self.free_count += 1;
    }
}

impl Drop for Slab {
    fn drop(&mut self) {
        // SAFETY: `buffer` came from `System.alloc(self.layout)` and is released once.
        unsafe { System.dealloc(self.buffer.as_ptr(), self.layout) };
    }
}

impl std::fmt::Debug for Slab {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Slab")
            .field("element_size", &self.element_size)
            .field("element_count", &self.element_count)
            .field("free_count", &self.free_count)
            .field("address_min", &format_args!("{:#x}", self.address_min))
            .field("address_max", &format_args!("{:#x}", self.address_max))
            .finish()
    }
}
