//! Allocator failure kinds.
//!
//! Growth-time exhaustion and foreign frees are separate variants so callers
//! can tell "the system refused memory" apart from "that pointer is not ours".

use thiserror::Error;

/// Failure reported by any layer of the slab heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SlabError {
    /// `allocate(0)`.
    #[error("zero-byte allocation requested")]
    ZeroSizeRequested,
    /// The system allocator refused a slab buffer or fallback block, or the
    /// requested byte count does not fit a `Layout`.
    #[error("out of memory while requesting {bytes} bytes from the system allocator")]
    OutOfMemory { bytes: usize },
    /// `deallocate` was handed a null pointer.
    #[error("null pointer passed to deallocate")]
    NullPointerOnFree,
    /// `deallocate` was handed a zero size.
    #[error("zero size passed to deallocate")]
    ZeroSizeOnFree,
    /// No tracked slab owns the address. Nothing was mutated.
    #[error("pointer {addr:#x} is not owned by any slab")]
    PointerNotOwned { addr: usize },
    /// The shadow registry saw a free whose size differs from the allocation.
    #[error("pointer {addr:#x} was allocated with {recorded} bytes but freed with {supplied}")]
    SizeMismatch {
        addr: usize,
        recorded: usize,
        supplied: usize,
    },
    /// A tuning call named a ceiling that is not a configured size class.
    #[error("{size} is not a size-class ceiling")]
    UnknownSizeClass { size: usize },
}

impl SlabError {
    /// errno value used at the C boundary.
    #[must_use]
    pub const fn errno(self) -> i32 {
        match self {
            Self::OutOfMemory { .. } => libc::ENOMEM,
            Self::ZeroSizeRequested | Self::ZeroSizeOnFree | Self::UnknownSizeClass { .. } => {
                libc::EINVAL
            }
            Self::NullPointerOnFree | Self::PointerNotOwned { .. } | Self::SizeMismatch { .. } => {
                libc::EFAULT
            }
        }
    }

    /// True for failures caused by the system allocator rather than the caller.
    #[must_use]
    pub const fn is_exhaustion(self) -> bool {
        matches!(self, Self::OutOfMemory { .. })
    }
}

/// Result alias used across the crate.
pub type Result<T, E = SlabError> = std::result::Result<T, E>;
