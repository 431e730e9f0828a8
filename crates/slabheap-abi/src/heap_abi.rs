//! ABI layer for sized allocation and per-class tuning.
//!
//! All calls go through the process-wide heap, which reads
//! `SLABHEAP_CLASS_COUNTS` / `SLABHEAP_SHADOW` on first use.

use std::ffi::{c_int, c_void};

use slabheap_core::SlabError;

#[cfg(any(target_os = "linux", target_os = "android"))]
#[inline]
fn set_abi_errno(val: c_int) {
    // SAFETY: libc returns this thread's errno slot.
    unsafe { *libc::__errno_location() = val };
}

#[cfg(any(target_os = "macos", target_os = "ios"))]
#[inline]
fn set_abi_errno(val: c_int) {
    // SAFETY: libc returns this thread's errno slot.
    unsafe { *libc::__error() = val };
}

#[cfg(not(any(
    target_os = "linux",
    target_os = "android",
    target_os = "macos",
    target_os = "ios"
)))]
#[inline]
fn set_abi_errno(_val: c_int) {}

#[inline]
fn status(result: Result<(), SlabError>) -> c_int {
    match result {
        Ok(()) => 0,
        Err(err) => err.errno(),
    }
}

// ---------------------------------------------------------------------------
// slabheap_allocate
// ---------------------------------------------------------------------------

/// Allocates `size` bytes, aligned to pointer width.
///
/// Returns null and sets `errno` (`EINVAL` for zero, `ENOMEM` on
/// exhaustion) on failure.
///
/// # Safety
///
/// The block must be released with `slabheap_deallocate` and the same `size`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn slabheap_allocate(size: usize) -> *mut c_void {
    match slabheap_core::allocate(size) {
        Ok(ptr) => ptr.as_ptr().cast(),
        Err(err) => {
            set_abi_errno(err.errno());
            std::ptr::null_mut()
        }
    }
}

// ---------------------------------------------------------------------------
// slabheap_deallocate
// ---------------------------------------------------------------------------

/// Releases `ptr`, which was allocated with `size` bytes.
///
/// Returns 0, or `EFAULT` for a null, foreign or mismatched pointer and
/// `EINVAL` for a zero size. A rejected free changes nothing.
///
/// # Safety
///
/// `ptr` must come from `slabheap_allocate(size)` with the same `size` and
/// must not have been released already.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn slabheap_deallocate(ptr: *mut c_void, size: usize) -> c_int {
    // SAFETY: forwarded caller contract.
    status(unsafe { slabheap_core::deallocate(ptr.cast(), size) })
}

// ---------------------------------------------------------------------------
// class tuning
// ---------------------------------------------------------------------------

/// Element count for future slabs of the class `ceiling`, or 0 if `ceiling`
/// is not a size class or the heap could not be initialized.
#[unsafe(no_mangle)]
pub extern "C" fn slabheap_class_element_count(ceiling: usize) -> usize {
    slabheap_core::class_element_count(ceiling).unwrap_or(0)
}

/// Sets the element count for future slabs of the class `ceiling`.
///
/// Returns 0, or `EINVAL` if `ceiling` is not a size class. A zero count is
/// treated as 1.
#[unsafe(no_mangle)]
pub extern "C" fn slabheap_set_class_element_count(ceiling: usize, count: usize) -> c_int {
    status(slabheap_core::set_class_element_count(ceiling, count))
}
