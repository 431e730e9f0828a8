//! System fallback for requests above the largest size class.
//!
//! These blocks never touch a slab. The caller-supplied size rebuilds the
//! same `Layout` on free, so nothing per-block is stored here beyond counters.

use std::alloc::{GlobalAlloc, Layout, System};
use std::ptr::NonNull;

use crate::error::{Result, SlabError};
use crate::pool::slab::SLAB_ALIGN;

/// Counting pass-through to [`System`].
#[derive(Debug, Default)]
pub struct SystemFallback {
    /// Blocks currently outstanding.
    live: usize,
    /// Bytes currently outstanding.
    live_bytes: usize,
    /// Blocks ever handed out.
    total: u64,
}

fn layout_for(size: usize) -> Result<Layout> {
    Layout::from_size_align(size, SLAB_ALIGN).map_err(|_| SlabError::OutOfMemory { bytes: size })
}

impl SystemFallback {
    /// Creates a fallback with zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates `size` bytes with pointer-width alignment.
    pub fn allocate(&mut self, size: usize) -> Result<NonNull<u8>> {
        if size == 0 {
            return Err(SlabError::ZeroSizeRequested);
        }
        let layout = layout_for(size)?;
        // SAFETY: non-zero size checked above.
        let raw = unsafe { System.alloc(layout) };
        let Some(ptr) = NonNull::new(raw) else {
            return Err(SlabError::OutOfMemory { bytes: size });
        };
        self.live += 1;
        self.live_bytes += size;
        self.total += 1;
        Ok(ptr)
    }

    /// Releases a block obtained from [`SystemFallback::allocate`].
    ///
    /// # Safety
    ///
    /// `ptr` must come from `allocate(size)` on this fallback with the same
    /// `size`, and must not have been released already.
    pub unsafe fn deallocate(&mut self, ptr: NonNull<u8>, size: usize) -> Result<()> {
        let layout = layout_for(size)?;
        // SAFETY: caller guarantees `ptr` was allocated with this exact layout.
        unsafe { System.dealloc(ptr.as_ptr(), layout) };
        self.live = self.live.saturating_sub(1);
        self.live_bytes = self.live_bytes.saturating_sub(size);
        Ok(())
    }

    /// Blocks currently outstanding.
    pub fn live(&self) -> usize {
        self.live
    }

    /// Bytes currently outstanding.
    pub fn live_bytes(&self) -> usize {
        self.live_bytes
    }

    /// Blocks ever handed out.
    pub fn total(&self) -> u64 {
        self.total
    }
}
