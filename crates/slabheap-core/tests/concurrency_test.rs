use std::sync::{Arc, Barrier};
use std::thread;

use slabheap_core::{CLASS_CEILINGS, SlabHeap, SlabHeapConfig};

const THREADS: usize = 8;
const ROUNDS: usize = 500;

#[derive(Clone, Copy, Debug)]
struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_u64(&mut self) -> u64 {
        // xorshift64*
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }
}

#[test]
fn concurrent_first_use_builds_one_dispatcher() {
    let heap = Arc::new(SlabHeap::new(SlabHeapConfig::uniform(3)));
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let heap = Arc::clone(&heap);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                heap.allocate(8).unwrap().as_ptr() as usize
            })
        })
        .collect();
    let addrs: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let stats = heap.stats().unwrap();
    let class16 = stats.class(16).unwrap();
    assert_eq!(class16.live_slots(), THREADS);
    // 8 blocks in 3-slot slabs: the initial slab plus exactly two growths.
    assert_eq!(class16.slabs, 3);
    assert_eq!(class16.growths, 2);
    for ceiling in [32, 64, 128, 256] {
        assert_eq!(stats.class(ceiling).unwrap().slabs, 1, "class {ceiling}");
    }

    for addr in addrs {
        // SAFETY: each address came from `allocate(8)` on this heap.
        unsafe { heap.deallocate(addr as *mut u8, 8) }.unwrap();
    }
    assert_eq!(heap.stats().unwrap().live_slots(), 0);
}

#[test]
fn paired_calls_from_many_threads_serialize() {
    let heap = Arc::new(SlabHeap::new(SlabHeapConfig::uniform(4).with_shadow_sizes(true)));
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|tid| {
            let heap = Arc::clone(&heap);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let mut rng = XorShift64::new(tid as u64 + 1);
                let mut held = Vec::new();
                barrier.wait();
                for round in 0..ROUNDS {
                    let size = (rng.next_u64() % 300) as usize + 1;
                    let ptr = heap.allocate(size).unwrap();
                    let tag = (tid * 31 + round) as u8;
                    // SAFETY: fresh block of `size` bytes.
                    unsafe { std::ptr::write_bytes(ptr.as_ptr(), tag, size) };
                    held.push((ptr.as_ptr() as usize, size, tag));

                    if held.len() > 6 || rng.next_u64() % 3 == 0 {
                        let pick = (rng.next_u64() as usize) % held.len();
                        let (addr, size, tag) = held.swap_remove(pick);
                        // SAFETY: block is live and `size` bytes long.
                        let bytes =
                            unsafe { std::slice::from_raw_parts(addr as *const u8, size) };
                        assert!(bytes.iter().all(|&b| b == tag), "thread {tid}: block clobbered");
                        // SAFETY: same size as the allocation, freed once.
                        unsafe { heap.deallocate(addr as *mut u8, size) }.unwrap();
                    }
                }
                for (addr, size, _) in held {
                    // SAFETY: same size as the allocation, freed once.
                    unsafe { heap.deallocate(addr as *mut u8, size) }.unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let stats = heap.stats().unwrap();
    for ceiling in CLASS_CEILINGS {
        let class = stats.class(ceiling).unwrap();
        assert_eq!(class.free_slots, class.total_slots, "class {ceiling}");
        assert!(class.slabs >= 1, "class {ceiling}");
    }
    assert_eq!(stats.fallback_live, 0);
    assert_eq!(stats.fallback_bytes, 0);
    assert_eq!(stats.shadow_live, 0);
}

#[test]
fn tuning_races_with_allocation() {
    let heap = Arc::new(SlabHeap::new(SlabHeapConfig::uniform(2)));

    let tuner = {
        let heap = Arc::clone(&heap);
        thread::spawn(move || {
            for count in 1..=200 {
                heap.set_class_element_count(64, count).unwrap();
            }
        })
    };
    let worker = {
        let heap = Arc::clone(&heap);
        thread::spawn(move || {
            let blocks: Vec<usize> = (0..200)
                .map(|_| heap.allocate(50).unwrap().as_ptr() as usize)
                .collect();
            for addr in blocks {
                // SAFETY: same size as the allocation, freed once.
                unsafe { heap.deallocate(addr as *mut u8, 50) }.unwrap();
            }
        })
    };
    tuner.join().unwrap();
    worker.join().unwrap();

    assert_eq!(heap.class_element_count(64), Ok(200));
    let class = *heap.stats().unwrap().class(64).unwrap();
    assert_eq!(class.live_slots(), 0);
    assert_eq!(class.slabs, 1);
}
