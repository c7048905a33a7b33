#[cfg(unix)]
pub mod unix;
#[cfg(unix)]
pub use unix as sys;

/// Map anonymous read-write memory. Returns null on failure.
///
/// # Safety
/// `size` must be page-aligned and non-zero.
#[inline]
pub unsafe fn map_anonymous(size: usize) -> *mut u8 {
    sys::map_anonymous(size)
}

/// Reserve a large span of address space without committing physical
/// pages up front. Returns null on failure.
///
/// # Safety
/// `size` must be page-aligned and non-zero.
#[inline]
pub unsafe fn map_reserve(size: usize) -> *mut u8 {
    sys::map_reserve(size)
}

/// Unmap previously mapped memory.
///
/// # Safety
/// `ptr` must have been returned by one of the map functions and `size`
/// must match.
#[inline]
pub unsafe fn unmap(ptr: *mut u8, size: usize) {
    sys::unmap(ptr, size);
}

/// The system page size, cached after the first query.
pub fn page_size() -> usize {
    sys::page_size()
}
