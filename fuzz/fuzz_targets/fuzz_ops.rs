#![no_main]

use libfuzzer_sys::fuzz_target;
use segalloc::LockedHeap;

/// Interprets the input as a sequence of allocator operations.
///
/// Each operation is four bytes:
///   byte 0: opcode (0=allocate, 1=release, 2=reallocate, 3=zero_allocate)
///   bytes 1-2: size (little-endian u16)
///   byte 3: slot index into the tracked pointer table
const MAX_SLOTS: usize = 64;

static HEAP: LockedHeap = LockedHeap::new();

fuzz_target!(|data: &[u8]| {
    let mut slots: [*mut u8; MAX_SLOTS] = [std::ptr::null_mut(); MAX_SLOTS];

    let mut i = 0;
    while i + 4 <= data.len() {
        let opcode = data[i] & 0x03;
        let size = u16::from_le_bytes([data[i + 1], data[i + 2]]) as usize;
        let slot = (data[i + 3] as usize) % MAX_SLOTS;
        i += 4;

        match opcode {
            0 => {
                if slots[slot].is_null() {
                    let size = size.max(1);
                    if let Ok(p) = HEAP.allocate(size) {
                        unsafe {
                            std::ptr::write_bytes(p.as_ptr(), 0x5A, size);
                        }
                        slots[slot] = p.as_ptr();
                    }
                }
            }
            1 => {
                if !slots[slot].is_null() {
                    unsafe {
                        HEAP.release(slots[slot]).expect("release of a live pointer failed");
                    }
                    slots[slot] = std::ptr::null_mut();
                }
            }
            2 => {
                if !slots[slot].is_null() {
                    unsafe {
                        match HEAP.reallocate(slots[slot], size) {
                            Ok(Some(p)) => {
                                slots[slot] = p.as_ptr();
                            }
                            Ok(None) => {
                                // reallocate(p, 0) released the block.
                                slots[slot] = std::ptr::null_mut();
                            }
                            Err(_) => {}
                        }
                    }
                }
            }
            3 => {
                if slots[slot].is_null() {
                    let size = size.max(1);
                    if let Ok(p) = HEAP.zero_allocate(size, 1) {
                        let bytes = unsafe { std::slice::from_raw_parts(p.as_ptr(), size) };
                        assert!(bytes.iter().all(|&b| b == 0), "zero_allocate left dirty bytes");
                        slots[slot] = p.as_ptr();
                    }
                }
            }
            _ => unreachable!(),
        }
    }

    // Drain live pointers so iterations are independent.
    for slot in slots.iter_mut() {
        if !slot.is_null() {
            unsafe {
                HEAP.release(*slot).expect("drain release failed");
            }
            *slot = std::ptr::null_mut();
        }
    }
});
