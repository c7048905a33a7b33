//! The block engine: placement, splitting, boundary-tag coalescing, and
//! the four public operations.
//!
//! A [`Heap`] owns a contiguous run of boundary-tagged blocks between
//! `heap_start` and `heap_end`, an index of eight free lists keyed by
//! size class, and the [`MemorySource`] it draws address space from.
//! Requests up to [`HEAP_MAX_PAYLOAD`] bytes of payload are served from
//! the heap; larger ones get a standalone page mapping whose header
//! carries the mapped bit and which never enters a free list.
//!
//! The engine is single-threaded: operations take `&mut self` and run to
//! completion. Callers wanting shared access serialize outside, e.g.
//! through [`crate::LockedHeap`].

use core::ptr::{self, NonNull};

use crate::block::{Block, FreeBlock, Tag};
use crate::buckets::{bucket_index, FreeListIndex, NUM_BUCKETS};
use crate::config;
use crate::error::AllocError;
use crate::source::MemorySource;
use crate::util::{align_up, fatal, is_aligned, HEAP_MAX_PAYLOAD, MAX_PAYLOAD, MIN_BLOCK, MIN_PAYLOAD, WORD};

/// Round a caller-requested size to a legal payload: word-aligned with a
/// floor of [`MIN_PAYLOAD`].
fn rounded_request(size: usize) -> Result<usize, AllocError> {
    if size == 0 {
        return Err(AllocError::InvalidArgument);
    }
    if size >= MAX_PAYLOAD {
        return Err(AllocError::SizeOverflow);
    }
    let rounded = align_up(size, WORD).max(MIN_PAYLOAD);
    if rounded >= MAX_PAYLOAD {
        return Err(AllocError::SizeOverflow);
    }
    Ok(rounded)
}

/// The allocator engine.
pub struct Heap<S: MemorySource> {
    pub(crate) source: S,
    pub(crate) index: FreeListIndex,
    pub(crate) heap_start: *mut u8,
    pub(crate) heap_end: *mut u8,
}

// The raw extent pointers refer to memory owned exclusively by this heap.
unsafe impl<S: MemorySource + Send> Send for Heap<S> {}

impl<S: MemorySource> Heap<S> {
    pub const fn new(source: S) -> Self {
        Heap {
            source,
            index: FreeListIndex::new(),
            heap_start: ptr::null_mut(),
            heap_end: ptr::null_mut(),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Bounds of the contiguous heap extent as raw addresses. Both are
    /// zero before the first heap extension; mappings never move them.
    pub fn heap_bounds(&self) -> (usize, usize) {
        (self.heap_start as usize, self.heap_end as usize)
    }

    // ------------------------------------------------------------------
    // Public operations
    // ------------------------------------------------------------------

    /// Allocate `size` bytes. The returned payload pointer is word
    /// aligned and stays valid until passed to [`Heap::release`] or
    /// [`Heap::reallocate`].
    pub fn allocate(&mut self, size: usize) -> Result<NonNull<u8>, AllocError> {
        let request = rounded_request(size)?;
        unsafe {
            let block = self.get_free(request)?;
            // Mapping-resident blocks were never filed into a bucket.
            if !block.is_mapped() {
                self.index.remove(FreeBlock::assume(block));
            }
            self.mark_allocated(block);
            Ok(NonNull::new_unchecked(block.payload_addr()))
        }
    }

    /// Allocate `count * elem_size` bytes and zero them.
    pub fn zero_allocate(&mut self, count: usize, elem_size: usize) -> Result<NonNull<u8>, AllocError> {
        if count == 0 || elem_size == 0 {
            return Err(AllocError::InvalidArgument);
        }
        let total = count.checked_mul(elem_size).ok_or(AllocError::SizeOverflow)?;
        let payload = self.allocate(total)?;
        unsafe {
            ptr::write_bytes(payload.as_ptr(), 0, total);
        }
        Ok(payload)
    }

    /// Resize the allocation behind `ptr`.
    ///
    /// A null `ptr` is a plain allocation; `new_size == 0` releases `ptr`
    /// and returns `Ok(None)`. Otherwise the data moves: a new block is
    /// allocated, `min(old payload, new_size)` bytes are copied, and the
    /// old block is released.
    ///
    /// # Safety
    /// `ptr`, when non-null, must have come from this heap and still be
    /// live.
    pub unsafe fn reallocate(
        &mut self,
        ptr: *mut u8,
        new_size: usize,
    ) -> Result<Option<NonNull<u8>>, AllocError> {
        if ptr.is_null() {
            return self.allocate(new_size).map(Some);
        }
        if new_size == 0 {
            self.release(ptr)?;
            return Ok(None);
        }

        let old = self.resolve(ptr)?;
        let old_payload = old.payload_size();
        let new_ptr = self.allocate(new_size)?;
        ptr::copy_nonoverlapping(ptr, new_ptr.as_ptr(), old_payload.min(new_size));
        self.release(ptr)?;
        Ok(Some(new_ptr))
    }

    /// Return the allocation behind `ptr` to the heap. Heap-resident
    /// blocks coalesce with free physical neighbors and go back into
    /// their bucket; mapping-resident blocks go back to the OS.
    ///
    /// # Safety
    /// `ptr`, when non-null, must have come from this heap.
    pub unsafe fn release(&mut self, ptr: *mut u8) -> Result<(), AllocError> {
        if ptr.is_null() {
            return Err(AllocError::InvalidArgument);
        }
        let block = self.resolve(ptr)?;
        if !block.is_allocated() {
            return Err(AllocError::DoubleFree);
        }
        self.debug_check_header(block);

        if block.is_mapped() {
            let bytes = self.mapping_extent(block.payload_size());
            log::trace!("unmapping {bytes}-byte region at {:p}", block.header_addr());
            self.source
                .unmap_pages(NonNull::new_unchecked(block.header_addr()), bytes);
        } else {
            self.mark_free(block);
            let merged = self.coalesce(block);
            self.index.insert(FreeBlock::assume(merged));
        }

        self.maybe_verify();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Placement
    // ------------------------------------------------------------------

    /// Find a free block whose payload covers `request`, creating one
    /// when every suitable bucket misses. Heap-resident results are
    /// split when profitable and are still threaded into their bucket on
    /// return; mapping-resident results are in no bucket.
    unsafe fn get_free(&mut self, request: usize) -> Result<Block, AllocError> {
        if let Some(found) = self.search(request) {
            return Ok(self.maybe_split(found, request));
        }
        if request <= HEAP_MAX_PAYLOAD {
            self.grow_heap(request)
        } else {
            self.map_block(request)
        }
    }

    /// First fit, scanning from the tightest sufficient class upward.
    unsafe fn search(&self, request: usize) -> Option<FreeBlock> {
        for idx in bucket_index(request)..NUM_BUCKETS {
            if let Some(hit) = self.index.first_fit(idx, request) {
                return Some(hit);
            }
        }
        None
    }

    /// Extend the heap by one fresh block sized for `request` and file
    /// it into its bucket.
    unsafe fn grow_heap(&mut self, request: usize) -> Result<Block, AllocError> {
        let bytes = request + 2 * WORD;
        let start = self.source.extend_heap(bytes)?;
        if self.heap_start.is_null() {
            self.heap_start = start.as_ptr();
        } else {
            // Extender contract: extensions are contiguous.
            debug_assert_eq!(start.as_ptr(), self.heap_end);
        }
        self.heap_end = start.as_ptr().add(bytes);
        log::trace!(
            "heap grown by {bytes} bytes, extent {:#x}..{:#x}",
            self.heap_start as usize,
            self.heap_end as usize
        );

        let block = Block::from_header(start);
        block.set_tag(Tag::new(request, false, false));
        block.write_footer();
        self.index.insert(FreeBlock::assume(block));
        Ok(block)
    }

    /// Create a standalone mapping-resident block: a header but no
    /// footer, never in a free list, untouched by `heap_start`/`heap_end`.
    unsafe fn map_block(&mut self, request: usize) -> Result<Block, AllocError> {
        let bytes = self.mapping_extent(request);
        let start = self.source.map_pages(bytes)?;
        log::trace!("mapped {bytes}-byte region for a {request}-byte payload");
        let block = Block::from_header(start);
        block.set_tag(Tag::new(request, false, true));
        Ok(block)
    }

    /// Page-rounded extent behind a mapping-resident block: the header
    /// word plus the payload, rounded up to page granularity.
    fn mapping_extent(&self, payload: usize) -> usize {
        let page = self.source.page_size();
        debug_assert!(page.is_power_of_two());
        align_up(payload + WORD, page)
    }

    // ------------------------------------------------------------------
    // Split / coalesce
    // ------------------------------------------------------------------

    /// Split `free` into a `request`-sized left piece and a free
    /// remainder, provided the remainder can stand as a block of its own
    /// (at least [`MIN_BLOCK`] bytes). Both pieces end up filed in their
    /// buckets; the left one is returned for the caller to claim.
    unsafe fn maybe_split(&mut self, free: FreeBlock, request: usize) -> Block {
        let block = free.block();
        debug_assert!(!block.is_mapped());
        let full = block.payload_size();
        if full < request + MIN_BLOCK {
            return block;
        }

        self.index.remove(free);
        let remainder = full - request - 2 * WORD;

        block.set_tag(Tag::new(request, false, false));
        block.write_footer();

        let right = Block::at(block.next_header());
        right.set_tag(Tag::new(remainder, false, false));
        right.write_footer();

        self.index.insert(FreeBlock::assume(block));
        self.index.insert(FreeBlock::assume(right));
        block
    }

    /// Merge a freshly freed heap block with whichever physical
    /// neighbors are free. Previous first, then next; the size
    /// arithmetic agrees either way, the order is fixed for determinism.
    /// The merged block is returned unfiled.
    unsafe fn coalesce(&mut self, block: Block) -> Block {
        let mut merged = block;
        if self.prev_is_free(merged) {
            merged = self.merge_with_prev(merged);
        }
        if self.next_is_free(merged) {
            merged = self.merge_with_next(merged);
        }
        merged
    }

    unsafe fn prev_is_free(&self, block: Block) -> bool {
        if block.header_addr() == self.heap_start {
            return false;
        }
        !block.prev_footer().is_allocated()
    }

    unsafe fn next_is_free(&self, block: Block) -> bool {
        let next = block.next_header();
        debug_assert!(next <= self.heap_end);
        if next >= self.heap_end {
            return false;
        }
        !Block::at(next).is_allocated()
    }

    unsafe fn merge_with_prev(&mut self, block: Block) -> Block {
        let prev = block.prev_block();
        self.index.remove(FreeBlock::assume(prev));
        // One absorbed footer+header pair joins the payload.
        let merged_payload = prev.payload_size() + block.payload_size() + 2 * WORD;
        prev.set_tag(Tag::new(merged_payload, false, false));
        prev.write_footer();
        prev
    }

    unsafe fn merge_with_next(&mut self, block: Block) -> Block {
        let next = Block::at(block.next_header());
        self.index.remove(FreeBlock::assume(next));
        let merged_payload = block.payload_size() + next.payload_size() + 2 * WORD;
        block.set_tag(Tag::new(merged_payload, false, false));
        block.write_footer();
        block
    }

    // ------------------------------------------------------------------
    // Marking and classification
    // ------------------------------------------------------------------

    /// Flip the allocation bit on. Heap blocks mirror the new tag into
    /// their footer; mapping-resident blocks have none.
    unsafe fn mark_allocated(&mut self, block: Block) {
        let tag = block.tag().with_allocated(true);
        block.set_tag(tag);
        if !tag.is_mapped() {
            block.write_footer();
        }
    }

    /// Flip the allocation bit off on a heap-resident block.
    unsafe fn mark_free(&mut self, block: Block) {
        let tag = block.tag().with_allocated(false);
        block.set_tag(tag);
        block.write_footer();
    }

    /// Classify the block behind a payload pointer: heap-resident if its
    /// header lies inside the heap extent, otherwise mapping-resident if
    /// its header carries the mapped bit.
    unsafe fn resolve(&self, ptr: *mut u8) -> Result<Block, AllocError> {
        let block = Block::from_payload(ptr);
        if self.in_heap(block.header_addr()) {
            return Ok(block);
        }
        if block.is_mapped() {
            return Ok(block);
        }
        Err(AllocError::InvalidPointer)
    }

    fn in_heap(&self, header: *mut u8) -> bool {
        !self.heap_start.is_null() && header >= self.heap_start && header < self.heap_end
    }

    /// Internal-consistency assertions on a header about to be released.
    /// Compiled out of release builds.
    unsafe fn debug_check_header(&self, block: Block) {
        let tag = block.tag();
        debug_assert!(is_aligned(tag.payload(), WORD), "payload size unaligned");
        debug_assert!(tag.payload() >= MIN_PAYLOAD, "payload below minimum");
        if !tag.is_mapped() {
            debug_assert_eq!(tag.raw(), block.footer().raw(), "boundary tags disagree");
        }
    }

    fn maybe_verify(&self) {
        config::ensure_loaded();
        if config::verify_on_release() && !self.verify().is_consistent() {
            fatal("segalloc: heap verification failed after release");
        }
    }
}
