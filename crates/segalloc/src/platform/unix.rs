use core::ptr;
use core::sync::atomic::{AtomicUsize, Ordering};

/// Map anonymous read-write memory.
///
/// # Safety
/// `size` must be page-aligned and non-zero.
pub unsafe fn map_anonymous(size: usize) -> *mut u8 {
    mmap_with_flags(size, libc::MAP_PRIVATE | libc::MAP_ANON)
}

/// Reserve address space for the heap. On Linux `MAP_NORESERVE` keeps the
/// kernel from charging commit for pages the heap never grows into.
///
/// # Safety
/// `size` must be page-aligned and non-zero.
pub unsafe fn map_reserve(size: usize) -> *mut u8 {
    #[cfg(target_os = "linux")]
    let flags = libc::MAP_PRIVATE | libc::MAP_ANON | libc::MAP_NORESERVE;
    #[cfg(not(target_os = "linux"))]
    let flags = libc::MAP_PRIVATE | libc::MAP_ANON;
    mmap_with_flags(size, flags)
}

unsafe fn mmap_with_flags(size: usize, flags: libc::c_int) -> *mut u8 {
    let result = libc::mmap(
        ptr::null_mut(),
        size,
        libc::PROT_READ | libc::PROT_WRITE,
        flags,
        -1,
        0,
    );
    if result == libc::MAP_FAILED {
        ptr::null_mut()
    } else {
        result as *mut u8
    }
}

/// Unmap memory.
///
/// # Safety
/// `ptr` must have been returned by a map function with the same `size`.
pub unsafe fn unmap(ptr: *mut u8, size: usize) {
    let ret = libc::munmap(ptr as *mut libc::c_void, size);
    debug_assert!(ret == 0, "munmap failed");
}

/// The system page size. Queried once through sysconf, then cached.
pub fn page_size() -> usize {
    static PAGE_SIZE: AtomicUsize = AtomicUsize::new(0);
    let cached = PAGE_SIZE.load(Ordering::Relaxed);
    if cached != 0 {
        return cached;
    }
    let raw = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    let size = if raw <= 0 { 4096 } else { raw as usize };
    PAGE_SIZE.store(size, Ordering::Relaxed);
    size
}
