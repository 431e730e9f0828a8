//! Heap configuration.
//!
//! Per-class slab element counts and the debug shadow switch. The process-wide
//! heap overlays two environment variables on the defaults when it is first used:
//! - `SLABHEAP_CLASS_COUNTS`: comma-separated `ceiling=count` pairs, e.g.
//!   `16=64,256=8`. Unknown ceilings and malformed entries are skipped.
//! - `SLABHEAP_SHADOW`: `on`/`off` (plus the usual boolean spellings). Turns
//!   the pointer-to-size shadow registry on or off.

use crate::error::{Result, SlabError};
use crate::pool::size_class::{self, DEFAULT_CLASS_COUNTS, NUM_SIZE_CLASSES};

/// Environment variable holding per-class count overrides.
pub const CLASS_COUNTS_ENV: &str = "SLABHEAP_CLASS_COUNTS";

/// Environment variable toggling the shadow registry.
pub const SHADOW_ENV: &str = "SLABHEAP_SHADOW";

/// Tuning for a size-class dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlabHeapConfig {
    /// Slab element count per class, indexed like `CLASS_CEILINGS`.
    pub class_counts: [usize; NUM_SIZE_CLASSES],
    /// Record every allocation's size and check it on free.
    pub shadow_sizes: bool,
    /// Emit `tracing` events from inside the heap.
    pub log_events: bool,
}

impl SlabHeapConfig {
    /// Defaults: 16B:32, 32B:32, 64B:32, 128B:16, 256B:16; shadow on in debug builds.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            class_counts: DEFAULT_CLASS_COUNTS,
            shadow_sizes: cfg!(debug_assertions),
            log_events: true,
        }
    }

    /// Every class uses `count` elements per slab.
    #[must_use]
    pub const fn uniform(count: usize) -> Self {
        let count = if count < 1 { 1 } else { count };
        Self {
            class_counts: [count; NUM_SIZE_CLASSES],
            shadow_sizes: cfg!(debug_assertions),
            log_events: true,
        }
    }

    /// Sets the element count for the class with ceiling `ceiling`.
    pub fn with_class_count(mut self, ceiling: usize, count: usize) -> Result<Self> {
        let index =
            size_class::class_index(ceiling).ok_or(SlabError::UnknownSizeClass { size: ceiling })?;
        self.class_counts[index] = count.max(1);
        Ok(self)
    }

    /// Enables or disables the shadow registry.
    #[must_use]
    pub const fn with_shadow_sizes(mut self, enabled: bool) -> Self {
        self.shadow_sizes = enabled;
        self
    }

    /// Enables or disables `tracing` events emitted while the heap lock is
    /// held. Must be off when the heap is the process allocator: a subscriber
    /// would allocate through the heap it is reporting on.
    #[must_use]
    pub const fn with_log_events(mut self, enabled: bool) -> Self {
        self.log_events = enabled;
        self
    }

    /// Element count for the class with ceiling `ceiling`.
    #[must_use]
    pub fn class_count(&self, ceiling: usize) -> Option<usize> {
        size_class::class_index(ceiling).map(|index| self.class_counts[index])
    }

    /// Defaults overlaid with `SLABHEAP_CLASS_COUNTS` and `SLABHEAP_SHADOW`.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::new();
        if let Ok(raw) = std::env::var(CLASS_COUNTS_ENV) {
            config.apply_class_counts(&raw);
        }
        if let Some(enabled) = std::env::var(SHADOW_ENV).ok().as_deref().and_then(parse_switch) {
            config.shadow_sizes = enabled;
        }
        config
    }

    /// Applies `ceiling=count` pairs, skipping anything that does not parse.
    pub fn apply_class_counts(&mut self, raw: &str) {
        for entry in raw.split(',') {
            let Some((ceiling, count)) = entry.split_once('=') else {
                continue;
            };
            let (Ok(ceiling), Ok(count)) =
                (ceiling.trim().parse::<usize>(), count.trim().parse::<usize>())
            else {
                continue;
            };
            if let Some(index) = size_class::class_index(ceiling) {
                self.class_counts[index] = count.max(1);
            }
        }
    }
}

impl Default for SlabHeapConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse a boolean switch (case-insensitive). `None` keeps the default.
#[must_use]
pub fn parse_switch(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "on" | "1" | "true" | "yes" | "debug" => Some(true),
        "off" | "0" | "false" | "no" | "release" => Some(false),
        _ => None,
    }
}
