//! Thread-safe heap facade.
//!
//! A [`SlabHeap`] owns at most one [`SizeClassDispatcher`], built on first
//! use under the same mutex that serializes every later call. The first
//! caller to take the lock constructs it; concurrent first callers block on
//! the lock and then find it ready, so exactly one dispatcher is ever built.
//! A failed construction leaves the heap uninitialized and the next call
//! retries.
//!
//! [`global`] is the process-wide instance. It is never torn down.

use std::ptr::NonNull;

use parking_lot::Mutex;
use tracing::debug;

use crate::config::SlabHeapConfig;
use crate::error::Result;
use crate::pool::{HeapStats, SizeClassDispatcher};

/// Where the dispatcher's configuration comes from at first use.
#[derive(Debug, Clone, Copy)]
enum ConfigSource {
    Fixed(SlabHeapConfig),
    /// Defaults overlaid with the environment, read during initialization.
    Environment { log_events: bool },
}

impl ConfigSource {
    fn resolve(self) -> SlabHeapConfig {
        match self {
            Self::Fixed(config) => config,
            Self::Environment { log_events } => {
                SlabHeapConfig::from_env().with_log_events(log_events)
            }
        }
    }
}

/// Lazily built, mutex-guarded dispatcher.
#[derive(Debug)]
pub struct SlabHeap {
    source: ConfigSource,
    /// `None` until the first call succeeds in building the dispatcher.
    state: Mutex<Option<SizeClassDispatcher>>,
}

static GLOBAL_HEAP: SlabHeap = SlabHeap::from_env();

impl SlabHeap {
    /// A heap that builds its dispatcher from `config` on first use.
    #[must_use]
    pub const fn new(config: SlabHeapConfig) -> Self {
        Self {
            source: ConfigSource::Fixed(config),
            state: Mutex::new(None),
        }
    }

    /// A heap that reads `SLABHEAP_CLASS_COUNTS` / `SLABHEAP_SHADOW` on first use.
    #[must_use]
    pub const fn from_env() -> Self {
        Self {
            source: ConfigSource::Environment { log_events: true },
            state: Mutex::new(None),
        }
    }

    /// Like [`SlabHeap::from_env`], with `tracing` events off.
    pub(crate) const fn from_env_without_events() -> Self {
        Self {
            source: ConfigSource::Environment { log_events: false },
            state: Mutex::new(None),
        }
    }

    /// Runs `op` on the dispatcher, building it first if needed.
    fn with_dispatcher<T>(
        &self,
        op: impl FnOnce(&mut SizeClassDispatcher) -> Result<T>,
    ) -> Result<T> {
        let mut state = self.state.lock();
        let dispatcher = match &mut *state {
            Some(dispatcher) => dispatcher,
            empty => empty.insert(self.build()?),
        };
        op(dispatcher)
    }

    fn build(&self) -> Result<SizeClassDispatcher> {
        let config = self.source.resolve();
        let dispatcher = SizeClassDispatcher::new(&config)?;
        if config.log_events {
            debug!(
                class_counts = ?config.class_counts,
                shadow_sizes = config.shadow_sizes,
                "slab heap initialized"
            );
        }
        Ok(dispatcher)
    }

    /// Builds the dispatcher now instead of on the first allocation.
    pub fn initialize(&self) -> Result<()> {
        self.with_dispatcher(|_| Ok(()))
    }

    /// True once a dispatcher has been built.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.state.lock().is_some()
    }

    /// Allocates `size` bytes.
    pub fn allocate(&self, size: usize) -> Result<NonNull<u8>> {
        self.with_dispatcher(|dispatcher| dispatcher.allocate(size))
    }

    /// Releases `ptr`, which was allocated with `size` bytes.
    ///
    /// # Safety
    ///
    /// Same contract as [`SizeClassDispatcher::deallocate`]: `size` must be the
    /// size passed to the `allocate` call on this heap that returned `ptr`.
    pub unsafe fn deallocate(&self, ptr: *mut u8, size: usize) -> Result<()> {
        // SAFETY: forwarded caller contract.
        self.with_dispatcher(|dispatcher| unsafe { dispatcher.deallocate(ptr, size) })
    }

    /// Slab element count for future slabs of the class `ceiling`.
    pub fn class_element_count(&self, ceiling: usize) -> Result<usize> {
        self.with_dispatcher(|dispatcher| dispatcher.class_element_count(ceiling))
    }

    /// Sets the slab element count for future slabs of the class `ceiling`.
    pub fn set_class_element_count(&self, ceiling: usize, count: usize) -> Result<()> {
        self.with_dispatcher(|dispatcher| dispatcher.set_class_element_count(ceiling, count))
    }

    /// Occupancy snapshot, or `None` before initialization. Never initializes.
    #[must_use]
    pub fn stats(&self) -> Option<HeapStats> {
        self.state.lock().as_ref().map(SizeClassDispatcher::stats)
    }
}

impl Default for SlabHeap {
    fn default() -> Self {
        Self::new(SlabHeapConfig::default())
    }
}

/// The process-wide heap.
#[must_use]
pub fn global() -> &'static SlabHeap {
    &GLOBAL_HEAP
}

/// Allocates `size` bytes from the process-wide heap.
pub fn allocate(size: usize) -> Result<NonNull<u8>> {
    GLOBAL_HEAP.allocate(size)
}

/// Releases `ptr` to the process-wide heap.
///
/// # Safety
///
/// `ptr` and `size` must come from a matching [`allocate`] call.
pub unsafe fn deallocate(ptr: *mut u8, size: usize) -> Result<()> {
    // SAFETY: forwarded caller contract.
    unsafe { GLOBAL_HEAP.deallocate(ptr, size) }
}

/// Element count for future slabs of a class of the process-wide heap.
pub fn class_element_count(ceiling: usize) -> Result<usize> {
    GLOBAL_HEAP.class_element_count(ceiling)
}

/// Tunes a class of the process-wide heap.
pub fn set_class_element_count(ceiling: usize, count: usize) -> Result<()> {
    GLOBAL_HEAP.set_class_element_count(ceiling, count)
}
