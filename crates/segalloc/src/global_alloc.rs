//! The locking wrapper and `#[global_allocator]` support.
//!
//! The engine itself is single-threaded; [`LockedHeap`] is the thin outer
//! serialization layer the engine's contract asks callers to provide: a
//! spinlock around a [`Heap`]`<`[`SystemSource`]`>`.
//!
//! ```rust,ignore
//! use segalloc::LockedHeap;
//!
//! #[global_allocator]
//! static GLOBAL: LockedHeap = LockedHeap::new();
//! ```
//!
//! Payload pointers are 8-byte aligned and nothing more, so `alloc` fails
//! (returns null) for non-zero-size layouts demanding a larger alignment.
//! When used as the global allocator, any installed logger must not
//! itself allocate; the engine only logs on cold paths, but a re-entrant
//! allocation would spin forever on the wrapper's lock.

use core::alloc::{GlobalAlloc, Layout};
use core::cell::UnsafeCell;
use core::ptr::{self, NonNull};
use core::sync::atomic::{AtomicBool, Ordering};

use crate::error::AllocError;
use crate::heap::Heap;
use crate::source::SystemSource;
use crate::util::WORD;

/// Serializes access to the engine.
///
/// A test-and-test-and-set spinlock is all this wrapper needs: every
/// critical section is one bounded engine operation (a placement or a
/// release), and the lock must never allocate since it may be guarding
/// the process's global allocator. `std::sync::Mutex` can allocate, so
/// it is off limits here. Spinners probe a relaxed load between
/// acquisition attempts and yield to the scheduler after a burst of
/// failed probes, so a descheduled lock holder can run.
struct HeapLock {
    locked: AtomicBool,
}

impl HeapLock {
    const fn new() -> Self {
        HeapLock {
            locked: AtomicBool::new(false),
        }
    }

    fn acquire(&self) {
        while self.locked.swap(true, Ordering::Acquire) {
            let mut probes = 0u32;
            while self.locked.load(Ordering::Relaxed) {
                if probes < 64 {
                    probes += 1;
                    core::hint::spin_loop();
                } else {
                    probes = 0;
                    unsafe {
                        libc::sched_yield();
                    }
                }
            }
        }
    }

    fn release(&self) {
        self.locked.store(false, Ordering::Release);
    }
}

/// A [`Heap`] over the OS source behind a [`HeapLock`].
pub struct LockedHeap {
    lock: HeapLock,
    heap: UnsafeCell<Heap<SystemSource>>,
}

// All access funnels through the lock.
unsafe impl Sync for LockedHeap {}

impl LockedHeap {
    pub const fn new() -> Self {
        LockedHeap {
            lock: HeapLock::new(),
            heap: UnsafeCell::new(Heap::new(SystemSource::new())),
        }
    }

    /// Run `f` with exclusive access to the engine.
    fn with<R>(&self, f: impl FnOnce(&mut Heap<SystemSource>) -> R) -> R {
        self.lock.acquire();
        let result = f(unsafe { &mut *self.heap.get() });
        self.lock.release();
        result
    }

    pub fn allocate(&self, size: usize) -> Result<NonNull<u8>, AllocError> {
        self.with(|heap| heap.allocate(size))
    }

    pub fn zero_allocate(&self, count: usize, elem_size: usize) -> Result<NonNull<u8>, AllocError> {
        self.with(|heap| heap.zero_allocate(count, elem_size))
    }

    /// # Safety
    /// See [`Heap::reallocate`].
    pub unsafe fn reallocate(
        &self,
        ptr: *mut u8,
        new_size: usize,
    ) -> Result<Option<NonNull<u8>>, AllocError> {
        self.with(|heap| heap.reallocate(ptr, new_size))
    }

    /// # Safety
    /// See [`Heap::release`].
    pub unsafe fn release(&self, ptr: *mut u8) -> Result<(), AllocError> {
        self.with(|heap| heap.release(ptr))
    }
}

impl Default for LockedHeap {
    fn default() -> Self {
        LockedHeap::new()
    }
}

unsafe impl GlobalAlloc for LockedHeap {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        // Zero-size types get a well-aligned dangling pointer, the
        // pattern the standard library uses.
        if layout.size() == 0 {
            return layout.align() as *mut u8;
        }
        if layout.align() > WORD {
            return ptr::null_mut();
        }
        self.allocate(layout.size())
            .map(NonNull::as_ptr)
            .unwrap_or(ptr::null_mut())
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        if layout.size() == 0 {
            return layout.align() as *mut u8;
        }
        if layout.align() > WORD {
            return ptr::null_mut();
        }
        self.zero_allocate(1, layout.size())
            .map(NonNull::as_ptr)
            .unwrap_or(ptr::null_mut())
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        if layout.size() == 0 {
            return;
        }
        // GlobalAlloc has no channel for failure here; a bad pointer is a
        // caller contract violation either way.
        let _ = self.release(ptr);
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        if layout.align() > WORD {
            return ptr::null_mut();
        }
        // The old allocation was zero-sized: this is a fresh allocation.
        if layout.size() == 0 {
            return self.alloc(Layout::from_size_align_unchecked(new_size, layout.align()));
        }
        // GlobalAlloc's contract guarantees new_size > 0.
        debug_assert!(new_size > 0);
        match self.reallocate(ptr, new_size) {
            Ok(Some(p)) => p.as_ptr(),
            _ => ptr::null_mut(),
        }
    }
}
