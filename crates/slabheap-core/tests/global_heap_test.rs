//! The process-wide heap is shared by every test in this binary, so checks
//! here look at the blocks each test owns rather than at global counts.

use std::thread;

use slabheap_core::{SlabError, global};

#[test]
fn free_functions_round_trip() {
    let ptr = slabheap_core::allocate(40).unwrap();
    assert!(global().is_initialized());
    assert_eq!(ptr.as_ptr() as usize % std::mem::align_of::<usize>(), 0);

    // SAFETY: fresh 40-byte block.
    unsafe { std::ptr::write_bytes(ptr.as_ptr(), 0x5A, 40) };
    // SAFETY: same size as the allocation, freed once.
    unsafe { slabheap_core::deallocate(ptr.as_ptr(), 40) }.unwrap();
}

#[test]
fn global_errors_match_taxonomy() {
    assert_eq!(slabheap_core::allocate(0), Err(SlabError::ZeroSizeRequested));
    // SAFETY: rejected before touching memory.
    unsafe {
        assert_eq!(
            slabheap_core::deallocate(std::ptr::null_mut(), 16),
            Err(SlabError::NullPointerOnFree)
        );
    }
    assert_eq!(
        slabheap_core::class_element_count(20),
        Err(SlabError::UnknownSizeClass { size: 20 })
    );
}

#[test]
fn global_tuning_is_visible_to_later_calls() {
    slabheap_core::set_class_element_count(128, 48).unwrap();
    assert_eq!(slabheap_core::class_element_count(128), Ok(48));
}

#[test]
fn global_heap_is_shared_across_threads() {
    let handles: Vec<_> = (0..4)
        .map(|_| thread::spawn(|| slabheap_core::allocate(200).unwrap().as_ptr() as usize))
        .collect();
    let addrs: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let stats = global().stats().unwrap();
    assert!(stats.class(256).unwrap().live_slots() >= addrs.len());

    for addr in addrs {
        // SAFETY: allocated from the global heap with 200 bytes.
        unsafe { slabheap_core::deallocate(addr as *mut u8, 200) }.unwrap();
    }
}
