//! A segregated free-list heap allocator with boundary-tag coalescing.
//!
//! Small requests (payloads up to 1 KiB) live in one contiguous heap
//! extent as boundary-tagged blocks filed into eight size-class buckets;
//! larger requests get their own page mappings. Placement is first-fit
//! from the tightest sufficient class upward, oversized hits are split
//! when the remainder can stand alone, and released blocks coalesce
//! eagerly with their physical neighbors.
//!
//! The engine is the single-threaded [`Heap`], generic over a
//! [`MemorySource`]; [`LockedHeap`] wraps it in an allocation-free
//! spinlock and implements [`core::alloc::GlobalAlloc`].

pub mod block;
pub mod buckets;
pub mod check;
pub mod config;
pub mod error;
pub mod global_alloc;
pub mod heap;
pub mod platform;
pub mod source;
pub mod util;

pub use check::{BlockView, HeapReport};
pub use error::AllocError;
pub use global_alloc::LockedHeap;
pub use heap::Heap;
pub use source::{MemorySource, SystemSource};
