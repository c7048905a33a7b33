//! Environment configuration, read exactly once at first use.
//!
//! Everything here goes through `libc::getenv` and a hand-rolled digit
//! parser: this path may run inside a global allocator, so it must not
//! allocate.

use core::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

use crate::util::DEFAULT_HEAP_RESERVATION;

const UNREAD: u8 = 0;
const READING: u8 = 1;
const READY: u8 = 2;

static STATE: AtomicU8 = AtomicU8::new(UNREAD);
static HEAP_RESERVATION: AtomicUsize = AtomicUsize::new(DEFAULT_HEAP_RESERVATION);
static VERIFY: AtomicUsize = AtomicUsize::new(0);

/// Load configuration from the environment if that has not happened yet.
/// Losers of the one-time race spin until the winner finishes, so every
/// caller observes final values.
#[inline]
pub fn ensure_loaded() {
    if STATE.load(Ordering::Acquire) == READY {
        return;
    }
    load_slow();
}

#[cold]
#[inline(never)]
fn load_slow() {
    match STATE.compare_exchange(UNREAD, READING, Ordering::AcqRel, Ordering::Acquire) {
        Ok(_) => {}
        Err(READING) => {
            while STATE.load(Ordering::Acquire) == READING {
                core::hint::spin_loop();
            }
            return;
        }
        Err(_) => return,
    }

    unsafe {
        if let Some(bytes) = getenv_usize(b"SEGALLOC_HEAP_RESERVATION\0") {
            if bytes > 0 {
                HEAP_RESERVATION.store(bytes, Ordering::Relaxed);
            }
        }
        if let Some(level) = getenv_usize(b"SEGALLOC_VERIFY\0") {
            VERIFY.store(level, Ordering::Relaxed);
        }
    }

    log::debug!(
        "config loaded: heap_reservation={} verify={}",
        HEAP_RESERVATION.load(Ordering::Relaxed),
        VERIFY.load(Ordering::Relaxed),
    );
    STATE.store(READY, Ordering::Release);
}

/// Bytes of address space the system source reserves for the heap
/// extender.
pub fn heap_reservation() -> usize {
    HEAP_RESERVATION.load(Ordering::Relaxed)
}

/// Whether the heap verifier runs after every release, aborting the
/// process on an inconsistent heap.
pub fn verify_on_release() -> bool {
    VERIFY.load(Ordering::Relaxed) != 0
}

/// Parse an environment variable as a decimal usize. `key` must be
/// NUL-terminated. Returns `None` when unset or malformed.
///
/// # Safety
/// Calls `libc::getenv`, which must not race with `setenv`.
unsafe fn getenv_usize(key: &[u8]) -> Option<usize> {
    let raw = libc::getenv(key.as_ptr() as *const libc::c_char);
    if raw.is_null() {
        return None;
    }

    let mut value: usize = 0;
    let mut cursor = raw as *const u8;
    if *cursor == 0 {
        return None;
    }
    while *cursor != 0 {
        let digit = *cursor;
        if !digit.is_ascii_digit() {
            return None;
        }
        value = value
            .checked_mul(10)?
            .checked_add((digit - b'0') as usize)?;
        cursor = cursor.add(1);
    }
    Some(value)
}
