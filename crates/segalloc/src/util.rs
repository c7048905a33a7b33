/// Align `value` up to the next multiple of `align`.
/// `align` must be a power of two.
#[inline(always)]
pub const fn align_up(value: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two());
    (value + align - 1) & !(align - 1)
}

/// Align `value` down to the previous multiple of `align`.
/// `align` must be a power of two.
#[inline(always)]
pub const fn align_down(value: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two());
    value & !(align - 1)
}

/// Check if `value` is aligned to `align`.
#[inline(always)]
pub const fn is_aligned(value: usize, align: usize) -> bool {
    value & (align - 1) == 0
}

/// Alignment unit. Every payload size, offset, and returned pointer is a
/// multiple of this.
pub const WORD: usize = 8;

/// Smallest payload a block may carry. A free block's payload must hold
/// the two intrusive link words, so this cannot shrink below 16.
pub const MIN_PAYLOAD: usize = 16;

/// Smallest heap block overall: header, minimum payload, footer.
pub const MIN_BLOCK: usize = MIN_PAYLOAD + 2 * WORD;

/// Largest payload served from the contiguous heap. Anything above goes
/// through the page mapper instead.
pub const HEAP_MAX_PAYLOAD: usize = 1024;

/// Exclusive upper bound on payloads representable in a packed tag word
/// (the size field occupies the word above the two flag bits).
pub const MAX_PAYLOAD: usize = 1 << 62;

/// Default address-space reservation backing the heap extender.
pub const DEFAULT_HEAP_RESERVATION: usize = 256 * 1024 * 1024; // 256 MiB

/// Report an unrecoverable corruption diagnostic and abort.
///
/// The message goes through the `log` facade first, like every other
/// cold-path event in the engine, then straight to stderr: the abort
/// must stay visible when no logger is installed, and the raw write
/// keeps that fallback allocation-free.
#[cold]
#[inline(never)]
pub(crate) fn fatal(msg: &str) -> ! {
    log::error!("{msg}");
    unsafe {
        libc::write(2, msg.as_ptr() as *const libc::c_void, msg.len());
        libc::write(2, b"\n".as_ptr() as *const libc::c_void, 1);
        libc::abort();
    }
}
