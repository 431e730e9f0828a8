//! Debug shadow registry: pointer address -> size passed to `allocate`.
//!
//! The heap itself stores no per-allocation size, so a free with the wrong
//! size silently corrupts another class. When enabled, this registry turns
//! that into a `SizeMismatch` error before any slab is touched.

use std::collections::HashMap;

use crate::error::{Result, SlabError};

/// Sizes of live allocations, keyed by address.
#[derive(Debug, Default)]
pub struct ShadowRegistry {
    enabled: bool,
    sizes: HashMap<usize, usize>,
}

impl ShadowRegistry {
    /// Creates a registry; a disabled one ignores every call.
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            sizes: HashMap::new(),
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Remember `size` for `addr`.
    pub fn record(&mut self, addr: usize, size: usize) {
        if self.enabled {
            self.sizes.insert(addr, size);
        }
    }

    /// Check a pending free against the recorded size without forgetting it.
    pub fn check(&self, addr: usize, size: usize) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        match self.sizes.get(&addr) {
            None => Err(SlabError::PointerNotOwned { addr }),
            Some(&recorded) if recorded != size => Err(SlabError::SizeMismatch {
                addr,
                recorded,
                supplied: size,
            }),
            Some(_) => Ok(()),
        }
    }

    /// Forget `addr` after a successful free.
    pub fn forget(&mut self, addr: usize) {
        if self.enabled {
            self.sizes.remove(&addr);
        }
    }

    /// Number of recorded live allocations.
    #[must_use]
    pub fn live(&self) -> usize {
        self.sizes.len()
    }
}
