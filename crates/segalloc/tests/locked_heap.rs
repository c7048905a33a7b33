//! Tests of the locking wrapper: its `GlobalAlloc` surface and behavior
//! under thread contention. These run against the real OS-backed source.

use std::alloc::{GlobalAlloc, Layout};
use std::ptr;
use std::sync::{Arc, Barrier};
use std::thread;

use segalloc::LockedHeap;

static HEAP: LockedHeap = LockedHeap::new();

// ---------------------------------------------------------------------------
// GlobalAlloc surface
// ---------------------------------------------------------------------------

#[test]
fn alloc_and_dealloc_round_trip() {
    unsafe {
        let layout = Layout::from_size_align(256, 8).unwrap();
        let p = HEAP.alloc(layout);
        assert!(!p.is_null(), "alloc returned null");
        assert_eq!(p as usize % 8, 0);

        ptr::write_bytes(p, 0xAB, 256);
        let data = std::slice::from_raw_parts(p, 256);
        assert!(data.iter().all(|&b| b == 0xAB));

        HEAP.dealloc(p, layout);
    }
}

#[test]
fn zero_sized_layouts_get_dangling_pointers() {
    // The contract for zero-size allocations: a non-null pointer,
    // aligned to the layout's alignment, that dealloc accepts as a
    // no-op. The alignment gate only applies to non-zero sizes, so
    // over-word alignments must work here too.
    for align in [1usize, 2, 8, 16, 64] {
        unsafe {
            let layout = Layout::from_size_align(0, align).unwrap();
            let p = HEAP.alloc(layout);
            assert!(!p.is_null(), "zero-size alloc returned null for align {align}");
            assert_eq!(
                p as usize % align,
                0,
                "dangling pointer {p:p} not aligned to {align}"
            );
            // Must be a no-op, not a release of the dangling pointer.
            HEAP.dealloc(p, layout);

            let q = HEAP.alloc_zeroed(layout);
            assert!(!q.is_null(), "zero-size alloc_zeroed returned null for align {align}");
            assert_eq!(q as usize % align, 0);
            HEAP.dealloc(q, layout);
        }
    }
}

#[test]
fn beyond_word_alignment_is_refused() {
    unsafe {
        let layout = Layout::from_size_align(64, 64).unwrap();
        assert!(
            HEAP.alloc(layout).is_null(),
            "payloads are 8-byte aligned only; larger demands must fail"
        );
        assert!(HEAP.alloc_zeroed(layout).is_null());
    }
}

#[test]
fn alloc_zeroed_returns_zeroed_memory() {
    unsafe {
        let layout = Layout::from_size_align(1024, 8).unwrap();
        let p = HEAP.alloc_zeroed(layout);
        assert!(!p.is_null());
        let data = std::slice::from_raw_parts(p, 1024);
        assert!(data.iter().all(|&b| b == 0), "alloc_zeroed left dirty bytes");
        HEAP.dealloc(p, layout);
    }
}

#[test]
fn realloc_through_the_trait_preserves_data() {
    unsafe {
        let layout = Layout::from_size_align(64, 8).unwrap();
        let p = HEAP.alloc(layout);
        assert!(!p.is_null());
        for i in 0..64 {
            p.add(i).write(i as u8);
        }

        let q = HEAP.realloc(p, layout, 256);
        assert!(!q.is_null(), "realloc failed");
        for i in 0..64 {
            assert_eq!(q.add(i).read(), i as u8, "byte {i} lost in realloc");
        }

        HEAP.dealloc(q, Layout::from_size_align(256, 8).unwrap());
    }
}

// ---------------------------------------------------------------------------
// Contention
// ---------------------------------------------------------------------------

#[test]
fn contended_allocate_release_cycles() {
    const THREADS: usize = 4;
    const ITERATIONS: usize = 5_000;

    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let marker = t as u8 + 1;
                for i in 0..ITERATIONS {
                    let size = 16 + ((t * 7 + i) % 48) * 8;
                    let p = HEAP.allocate(size).expect("allocation failed under contention");
                    unsafe {
                        ptr::write_bytes(p.as_ptr(), marker, size);
                        let data = std::slice::from_raw_parts(p.as_ptr(), size);
                        assert!(
                            data.iter().all(|&b| b == marker),
                            "cross-thread corruption in a live block"
                        );
                        HEAP.release(p.as_ptr()).expect("release failed under contention");
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("worker panicked");
    }
}

#[test]
fn contended_mixed_sizes_with_handoff_free() {
    const THREADS: usize = 4;
    const PER_THREAD: usize = 512;

    // Each thread allocates a batch; the main thread releases them all,
    // exercising frees of blocks allocated elsewhere.
    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let mut ptrs = Vec::with_capacity(PER_THREAD);
                for i in 0..PER_THREAD {
                    let size = if i % 17 == 0 { 2048 } else { 16 + (i % 64) * 8 };
                    let p = HEAP.allocate(size).expect("allocation failed");
                    unsafe {
                        ptr::write_bytes(p.as_ptr(), (t + 1) as u8, size.min(64));
                    }
                    ptrs.push(p.as_ptr() as usize);
                }
                ptrs
            })
        })
        .collect();

    for handle in handles {
        let ptrs = handle.join().expect("worker panicked");
        for addr in ptrs {
            unsafe {
                HEAP.release(addr as *mut u8).expect("handoff release failed");
            }
        }
    }
}
