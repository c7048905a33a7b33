//! The seam between the block engine and the operating system.
//!
//! The engine consumes exactly two memory primitives: a monotonic heap
//! extender and a page mapper. [`MemorySource`] captures them as a trait
//! so the engine can run over the real OS ([`SystemSource`]) or over a
//! deterministic arena in tests.

use core::ptr;
use core::ptr::NonNull;

use crate::config;
use crate::error::AllocError;
use crate::platform;
use crate::util::{align_up, is_aligned};

/// Memory primitives consumed by the heap engine.
pub trait MemorySource {
    /// Reserve `bytes` more bytes contiguous with the previous extension
    /// and return their start. The first call establishes the heap base.
    ///
    /// Contiguity is part of the contract: the engine walks the heap as
    /// one unbroken run of blocks.
    ///
    /// # Safety
    /// Single caller at a time; the returned region must stay mapped for
    /// the source's lifetime.
    unsafe fn extend_heap(&mut self, bytes: usize) -> Result<NonNull<u8>, AllocError>;

    /// Reserve a standalone region of exactly `bytes` bytes. The engine
    /// rounds `bytes` to page granularity before calling.
    ///
    /// # Safety
    /// Single caller at a time.
    unsafe fn map_pages(&mut self, bytes: usize) -> Result<NonNull<u8>, AllocError>;

    /// Release a region previously returned by [`MemorySource::map_pages`].
    /// `bytes` is the same value `map_pages` was called with.
    ///
    /// # Safety
    /// `ptr`/`bytes` must name exactly one outstanding mapping.
    unsafe fn unmap_pages(&mut self, ptr: NonNull<u8>, bytes: usize);

    /// The system page size; constant over the source's lifetime.
    fn page_size(&self) -> usize;
}

/// OS-backed source.
///
/// The heap extender bumps through one large anonymous reservation
/// created on first use, so extensions stay contiguous no matter what
/// else in the process touches the address space. The page mapper
/// forwards to `mmap`/`munmap` directly.
///
/// The reservation consumes address space only; physical pages are
/// committed lazily as the heap grows into them. Its size is
/// [`crate::util::DEFAULT_HEAP_RESERVATION`] unless overridden through
/// `SEGALLOC_HEAP_RESERVATION`.
pub struct SystemSource {
    base: *mut u8,
    reserved: usize,
    used: usize,
}

impl SystemSource {
    pub const fn new() -> Self {
        SystemSource {
            base: ptr::null_mut(),
            reserved: 0,
            used: 0,
        }
    }

    unsafe fn ensure_reservation(&mut self) -> Result<(), AllocError> {
        if !self.base.is_null() {
            return Ok(());
        }
        config::ensure_loaded();
        let bytes = align_up(config::heap_reservation(), platform::page_size());
        let base = platform::map_reserve(bytes);
        if base.is_null() {
            return Err(AllocError::OutOfMemory);
        }
        log::debug!("reserved {bytes} bytes of heap address space at {base:p}");
        self.base = base;
        self.reserved = bytes;
        Ok(())
    }
}

impl Default for SystemSource {
    fn default() -> Self {
        SystemSource::new()
    }
}

// The raw base pointer is owned exclusively by this source.
unsafe impl Send for SystemSource {}

impl MemorySource for SystemSource {
    unsafe fn extend_heap(&mut self, bytes: usize) -> Result<NonNull<u8>, AllocError> {
        self.ensure_reservation()?;
        if bytes > self.reserved - self.used {
            return Err(AllocError::OutOfMemory);
        }
        let start = self.base.add(self.used);
        self.used += bytes;
        Ok(NonNull::new_unchecked(start))
    }

    unsafe fn map_pages(&mut self, bytes: usize) -> Result<NonNull<u8>, AllocError> {
        debug_assert!(is_aligned(bytes, self.page_size()));
        NonNull::new(platform::map_anonymous(bytes)).ok_or(AllocError::OutOfMemory)
    }

    unsafe fn unmap_pages(&mut self, ptr: NonNull<u8>, bytes: usize) {
        platform::unmap(ptr.as_ptr(), bytes);
    }

    fn page_size(&self) -> usize {
        platform::page_size()
    }
}
