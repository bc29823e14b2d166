// Copyright 2025 The Cinder Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Kernel Heap Allocator
//!
//! First-fit allocator over a single contiguous byte range.
//!
//! # Design
//!
//! Every block is prefixed by an in-band [`BlockHeader`]. Blocks partition
//! the region back to back: the physical successor of the block at offset
//! `off` starts at `off + HEADER_SIZE + size`. Free blocks are additionally
//! linked into a doubly linked free list ordered by ascending address.
//!
//! Links are stored as byte offsets from the heap base instead of raw
//! pointers, so every hop can be bounds-checked against the region before
//! it is dereferenced. [`NIL`] terminates the list.
//!
//! Because the free list is address ordered, the only candidates for
//! coalescing a freshly freed block are its list neighbours; whether they
//! are also its *physical* neighbours is then a single address comparison.
//!
//! # Usage
//!
//! ```ignore
//! use cinder::mm::Heap;
//!
//! let mut heap = Heap::new();
//! unsafe { heap.init(region_start, region_len)? };
//!
//! let ptr = heap.alloc(128)?;
//! unsafe { heap.free(ptr.as_ptr())? };
//! ```

use core::fmt;
use core::mem::size_of;
use core::ptr::{self, NonNull};

use super::{align_down, align_up, checked_align_up};
use crate::config::{HEAP_ALIGNMENT, HEAP_MAGIC, HEAP_MIN_PAYLOAD, PAGE_SIZE};

/// End-of-list marker for free list links
const NIL: usize = usize::MAX;

/// Width of the back pointer stashed in front of an aligned allocation
const PTR_WIDTH: usize = size_of::<usize>();

/// Heap block header
///
/// `is_free` is a `u32` rather than a `bool` so that reading a header out
/// of scribbled memory can never produce an invalid value.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct BlockHeader {
    /// Corruption sentinel, always [`HEAP_MAGIC`] for a live header
    magic: u32,

    /// Non-zero while the block sits in the free list
    is_free: u32,

    /// Payload bytes (header excluded), multiple of [`HEAP_ALIGNMENT`]
    size: usize,

    /// Offset of the next free block, or [`NIL`]
    next: usize,

    /// Offset of the previous free block, or [`NIL`]
    prev: usize,
}

/// Size of the header that prefixes every block
pub const HEADER_SIZE: usize = size_of::<BlockHeader>();

impl BlockHeader {
    const fn free(size: usize) -> Self {
        Self {
            magic: HEAP_MAGIC,
            is_free: 1,
            size,
            next: NIL,
            prev: NIL,
        }
    }

    fn is_valid(&self) -> bool {
        self.magic == HEAP_MAGIC
    }

    fn is_free(&self) -> bool {
        self.is_free != 0
    }
}

/// Offset of the block physically following the block at `off`
#[inline]
const fn block_end(off: usize, size: usize) -> usize {
    off + HEADER_SIZE + size
}

/// Heap allocator errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeapError {
    /// `init` has not been called yet
    Uninitialized,
    /// `init` was called twice
    AlreadyInitialized,
    /// The region cannot hold a single block
    RegionTooSmall,
    /// Zero-byte requests are refused
    ZeroSize,
    /// No free block is large enough
    OutOfMemory,
    /// Size arithmetic overflowed
    Overflow,
    /// Alignment is not a power of two
    BadAlignment,
    /// Pointer does not belong to the heap region
    OutOfRange,
    /// Block header failed validation
    Corrupted,
    /// Block was already free
    DoubleFree,
    /// Pointer refers to a free block
    NotAllocated,
}

impl fmt::Display for HeapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::Uninitialized => "heap not initialized",
            Self::AlreadyInitialized => "heap already initialized",
            Self::RegionTooSmall => "heap region too small",
            Self::ZeroSize => "zero-sized allocation",
            Self::OutOfMemory => "out of memory",
            Self::Overflow => "allocation size overflow",
            Self::BadAlignment => "alignment is not a power of two",
            Self::OutOfRange => "pointer outside the heap",
            Self::Corrupted => "heap corruption detected",
            Self::DoubleFree => "double free",
            Self::NotAllocated => "block is not allocated",
        };
        f.write_str(msg)
    }
}

/// Snapshot of heap counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeapStats {
    /// Payload capacity of the pristine heap (region minus one header)
    pub total: usize,
    /// Payload bytes held by allocated blocks
    pub used: usize,
    /// Payload bytes held by free blocks
    pub free: usize,
    /// Length of the free list
    pub free_blocks: usize,
    /// Largest single free payload
    pub largest_free: usize,
}

/// First-fit heap over a fixed byte range
#[derive(Debug)]
pub struct Heap {
    /// Aligned base address of the region
    start: usize,
    /// Usable length of the region (multiple of [`HEAP_ALIGNMENT`])
    len: usize,
    /// Offset of the lowest free block, or [`NIL`]
    free_head: usize,
    /// Payload capacity right after `init`
    total: usize,
    /// Payload bytes currently handed out
    used: usize,
    initialized: bool,
}

impl Heap {
    /// Create an empty, uninitialized heap
    pub const fn new() -> Self {
        Self {
            start: 0,
            len: 0,
            free_head: NIL,
            total: 0,
            used: 0,
            initialized: false,
        }
    }

    /// Install a single free block spanning `[start, start + size)`
    ///
    /// The base is rounded up and the length down to [`HEAP_ALIGNMENT`].
    ///
    /// # Safety
    ///
    /// The caller must ensure that:
    /// - The memory region is valid, writable and not used for anything else
    /// - The region outlives every allocation made from this heap
    pub unsafe fn init(&mut self, start: usize, size: usize) -> Result<(), HeapError> {
        if self.initialized {
            return Err(HeapError::AlreadyInitialized);
        }
        if start == 0 {
            return Err(HeapError::OutOfRange);
        }

        let base = checked_align_up(start, HEAP_ALIGNMENT).ok_or(HeapError::Overflow)?;
        let skipped = base - start;
        if size < skipped {
            return Err(HeapError::RegionTooSmall);
        }
        let len = align_down(size - skipped, HEAP_ALIGNMENT);
        if len < HEADER_SIZE + HEAP_MIN_PAYLOAD || base.checked_add(len).is_none() {
            return Err(HeapError::RegionTooSmall);
        }

        self.start = base;
        self.len = len;
        self.store(0, BlockHeader::free(len - HEADER_SIZE));
        self.free_head = 0;
        self.total = len - HEADER_SIZE;
        self.used = 0;
        self.initialized = true;

        log::debug!(
            "heap: {:#x}..{:#x} ({} bytes usable)",
            base,
            base + len,
            self.total
        );
        Ok(())
    }

    /// Whether `init` has run
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Aligned base address and length of the managed region
    pub fn region(&self) -> (usize, usize) {
        (self.start, self.len)
    }

    /// Whether `ptr` points into the managed region
    pub fn contains(&self, ptr: *const u8) -> bool {
        let addr = ptr as usize;
        self.initialized && addr >= self.start && addr < self.start + self.len
    }

    /// Allocate `size` bytes (first fit, rounded up to [`HEAP_ALIGNMENT`])
    pub fn alloc(&mut self, size: usize) -> Result<NonNull<u8>, HeapError> {
        if !self.initialized {
            return Err(HeapError::Uninitialized);
        }
        if size == 0 {
            return Err(HeapError::ZeroSize);
        }
        let need = checked_align_up(size, HEAP_ALIGNMENT).ok_or(HeapError::Overflow)?;

        let off = self.find_first_fit(need)?;
        self.unlink(off);

        let mut header = self.header(off);
        header.is_free = 0;
        self.store(off, header);
        self.split(off, need);

        self.used += self.header(off).size;
        Ok(self.payload(off))
    }

    /// Allocate `n * size` zeroed bytes
    pub fn calloc(&mut self, n: usize, size: usize) -> Result<NonNull<u8>, HeapError> {
        let bytes = n.checked_mul(size).ok_or(HeapError::Overflow)?;
        let ptr = self.alloc(bytes)?;
        // SAFETY: the block was just carved out with at least `bytes` of payload.
        unsafe { ptr::write_bytes(ptr.as_ptr(), 0, bytes) };
        Ok(ptr)
    }

    /// Resize the allocation at `ptr`
    ///
    /// A null `ptr` allocates; `size == 0` frees and returns `Ok(None)`.
    /// Shrinking happens in place. Growing moves the data into a fresh
    /// block; on failure the original block is left untouched.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a pointer previously returned by this heap.
    pub unsafe fn realloc(
        &mut self,
        ptr: *mut u8,
        size: usize,
    ) -> Result<Option<NonNull<u8>>, HeapError> {
        if ptr.is_null() {
            return self.alloc(size).map(Some);
        }
        if size == 0 {
            self.free(ptr)?;
            return Ok(None);
        }

        let off = match self.block_of(ptr) {
            Ok(off) => off,
            Err(HeapError::Corrupted) if self.absorbed(ptr) => {
                log::warn!("heap: realloc({:p}) on a free block", ptr);
                return Err(HeapError::NotAllocated);
            }
            Err(err) => {
                log::error!("heap: realloc({:p}): {}", ptr, err);
                return Err(err);
            }
        };
        let header = self.header(off);
        if header.is_free() {
            log::warn!("heap: realloc({:p}) on a free block", ptr);
            return Err(HeapError::NotAllocated);
        }
        let need = checked_align_up(size, HEAP_ALIGNMENT).ok_or(HeapError::Overflow)?;

        if header.size >= need {
            self.split(off, need);
            self.used -= header.size - self.header(off).size;
            return Ok(Some(self.payload(off)));
        }

        let fresh = self.alloc(size)?;
        ptr::copy_nonoverlapping(ptr, fresh.as_ptr(), header.size.min(size));
        self.free(ptr)?;
        Ok(Some(fresh))
    }

    /// Return the block at `ptr` to the free list
    ///
    /// Null is a no-op. A pointer that fails validation, or a block that
    /// is already free, is reported and leaves the heap untouched.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a pointer previously returned by this heap.
    pub unsafe fn free(&mut self, ptr: *mut u8) -> Result<(), HeapError> {
        if ptr.is_null() {
            return Ok(());
        }
        if !self.initialized {
            return Err(HeapError::Uninitialized);
        }

        let off = match self.block_of(ptr) {
            Ok(off) => off,
            Err(HeapError::Corrupted) if self.absorbed(ptr) => {
                log::warn!("heap: double free of {:p}", ptr);
                return Err(HeapError::DoubleFree);
            }
            Err(err) => {
                log::warn!("heap: invalid free({:p}): {}", ptr, err);
                return Err(err);
            }
        };
        let mut header = self.header(off);
        if header.is_free() {
            log::warn!("heap: double free of {:p}", ptr);
            return Err(HeapError::DoubleFree);
        }

        self.used -= header.size;
        header.is_free = 1;
        self.store(off, header);
        self.insert_sorted(off);
        self.coalesce(off);
        Ok(())
    }

    /// Allocate `size` bytes aligned to `align`
    ///
    /// Over-allocates and stores the underlying block's payload address in
    /// the word just below the returned pointer; release with
    /// [`aligned_free`](Self::aligned_free).
    pub fn aligned_alloc(&mut self, size: usize, align: usize) -> Result<NonNull<u8>, HeapError> {
        if !align.is_power_of_two() {
            return Err(HeapError::BadAlignment);
        }
        if size == 0 {
            return Err(HeapError::ZeroSize);
        }
        let padded = size
            .checked_add(align)
            .and_then(|n| n.checked_add(PTR_WIDTH))
            .ok_or(HeapError::Overflow)?;

        let raw = self.alloc(padded)?.as_ptr() as usize;
        let aligned = align_up(raw + PTR_WIDTH, align);
        // SAFETY: `aligned - PTR_WIDTH >= raw` and `aligned + size` stays
        // within the `padded` bytes just allocated.
        unsafe {
            ptr::write_unaligned((aligned - PTR_WIDTH) as *mut usize, raw);
            Ok(NonNull::new_unchecked(aligned as *mut u8))
        }
    }

    /// Release a pointer obtained from [`aligned_alloc`](Self::aligned_alloc)
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a pointer previously returned by
    /// `aligned_alloc` on this heap.
    pub unsafe fn aligned_free(&mut self, ptr: *mut u8) -> Result<(), HeapError> {
        if ptr.is_null() {
            return Ok(());
        }
        let addr = ptr as usize;
        if !self.contains(ptr) || addr < self.start + HEADER_SIZE + PTR_WIDTH {
            log::warn!("heap: invalid aligned free({:p})", ptr);
            return Err(HeapError::OutOfRange);
        }
        let raw = ptr::read_unaligned((addr - PTR_WIDTH) as *const usize);
        self.free(raw as *mut u8)
    }

    /// Page-aligned allocation
    pub fn valloc(&mut self, size: usize) -> Result<NonNull<u8>, HeapError> {
        self.aligned_alloc(size, PAGE_SIZE)
    }

    /// Release a pointer obtained from [`valloc`](Self::valloc)
    ///
    /// # Safety
    ///
    /// Same contract as [`aligned_free`](Self::aligned_free).
    pub unsafe fn vfree(&mut self, ptr: *mut u8) -> Result<(), HeapError> {
        self.aligned_free(ptr)
    }

    /// Payload capacity of the allocated block owning `ptr`
    pub fn usable_size(&self, ptr: *const u8) -> Option<usize> {
        let off = self.block_of(ptr).ok()?;
        Some(self.header(off).size)
    }

    /// Total payload capacity of the pristine heap
    pub fn total(&self) -> usize {
        self.total
    }

    /// Payload bytes held by allocated blocks
    pub fn used(&self) -> usize {
        self.used
    }

    /// Payload bytes held by free blocks
    pub fn free_bytes(&self) -> usize {
        self.stats().free
    }

    /// Collect the heap counters
    pub fn stats(&self) -> HeapStats {
        let mut stats = HeapStats {
            total: self.total,
            used: self.used,
            ..HeapStats::default()
        };
        if !self.initialized {
            return stats;
        }

        let mut off = self.free_head;
        while off != NIL && self.in_bounds(off) {
            let header = self.header(off);
            if !header.is_valid() {
                break;
            }
            stats.free += header.size;
            stats.free_blocks += 1;
            stats.largest_free = stats.largest_free.max(header.size);
            off = header.next;
        }
        stats
    }

    /// Verify the block partition and the free list
    ///
    /// Checks that blocks tile the region exactly, that every header is
    /// intact and aligned, that no two free blocks are physically adjacent,
    /// and that the free list holds exactly the free blocks in address order.
    pub fn check(&self) -> Result<(), HeapError> {
        if !self.initialized {
            return Err(HeapError::Uninitialized);
        }

        let mut off = 0;
        let mut free_blocks = 0;
        let mut prev_free = false;
        while off < self.len {
            if !self.in_bounds(off) {
                return self.corrupt("block header past region end", off);
            }
            let header = self.header(off);
            if !header.is_valid() {
                return self.corrupt("bad magic", off);
            }
            if header.size % HEAP_ALIGNMENT != 0 {
                return self.corrupt("unaligned size", off);
            }
            if block_end(off, header.size) > self.len {
                return self.corrupt("block overruns region", off);
            }
            if header.is_free() {
                if prev_free {
                    return self.corrupt("adjacent free blocks", off);
                }
                free_blocks += 1;
            }
            prev_free = header.is_free();
            off = block_end(off, header.size);
        }

        let mut listed = 0;
        let mut prev = NIL;
        let mut off = self.free_head;
        while off != NIL {
            if !self.in_bounds(off) || listed > free_blocks {
                return self.corrupt("free list link out of range", off);
            }
            let header = self.header(off);
            if !header.is_valid() || !header.is_free() {
                return self.corrupt("allocated block in free list", off);
            }
            if header.prev != prev || (prev != NIL && prev >= off) {
                return self.corrupt("free list out of order", off);
            }
            listed += 1;
            prev = off;
            off = header.next;
        }
        if listed != free_blocks {
            return self.corrupt("free block missing from free list", self.free_head);
        }
        Ok(())
    }

    /// Log the heap layout
    pub fn dump(&self) {
        let stats = self.stats();
        let (start, len) = self.region();
        log::debug!("heap: start {:#x} end {:#x}", start, start + len);
        log::debug!(
            "heap: total {} used {} free {} ({} blocks, largest {})",
            stats.total,
            stats.used,
            stats.free,
            stats.free_blocks,
            stats.largest_free
        );
        let mut off = self.free_head;
        while off != NIL && self.in_bounds(off) {
            let header = self.header(off);
            log::debug!("heap:   free {:#x} +{}", self.start + off, header.size);
            if !header.is_valid() {
                break;
            }
            off = header.next;
        }
    }

    // ------------------------------------------------------------------
    // Block plumbing
    // ------------------------------------------------------------------

    fn in_bounds(&self, off: usize) -> bool {
        off % HEAP_ALIGNMENT == 0 && off.checked_add(HEADER_SIZE).map_or(false, |end| end <= self.len)
    }

    fn header(&self, off: usize) -> BlockHeader {
        debug_assert!(self.in_bounds(off));
        // SAFETY: `off` lies inside the region handed to `init`, and any bit
        // pattern is a valid `BlockHeader`.
        unsafe { ptr::read((self.start + off) as *const BlockHeader) }
    }

    fn store(&mut self, off: usize, header: BlockHeader) {
        debug_assert!(self.in_bounds(off));
        // SAFETY: see `header`.
        unsafe { ptr::write((self.start + off) as *mut BlockHeader, header) }
    }

    fn set_next(&mut self, off: usize, next: usize) {
        let mut header = self.header(off);
        header.next = next;
        self.store(off, header);
    }

    fn set_prev(&mut self, off: usize, prev: usize) {
        let mut header = self.header(off);
        header.prev = prev;
        self.store(off, header);
    }

    fn payload(&self, off: usize) -> NonNull<u8> {
        // SAFETY: `start` is non-zero (checked in `init`), so is any address
        // past it.
        unsafe { NonNull::new_unchecked((self.start + off + HEADER_SIZE) as *mut u8) }
    }

    /// Map a payload pointer back to its header offset and validate it
    fn block_of(&self, ptr: *const u8) -> Result<usize, HeapError> {
        if !self.initialized {
            return Err(HeapError::Uninitialized);
        }
        let addr = ptr as usize;
        if addr < self.start + HEADER_SIZE || addr >= self.start + self.len {
            return Err(HeapError::OutOfRange);
        }
        let off = addr - self.start - HEADER_SIZE;
        if !self.in_bounds(off) {
            return Err(HeapError::OutOfRange);
        }
        if !self.header(off).is_valid() {
            return Err(HeapError::Corrupted);
        }
        Ok(off)
    }

    /// Whether `ptr` names a header swallowed by a free block on coalesce
    ///
    /// A freed block merged into its free predecessor loses its magic, so
    /// a second `free` would otherwise look like a stray pointer.
    fn absorbed(&self, ptr: *const u8) -> bool {
        let target = (ptr as usize).wrapping_sub(self.start + HEADER_SIZE);
        let mut off = self.free_head;
        for _ in 0..self.len / HEADER_SIZE {
            if off == NIL || off > target || !self.in_bounds(off) {
                return false;
            }
            let header = self.header(off);
            if !header.is_valid() {
                return false;
            }
            if target < block_end(off, header.size) {
                return off < target;
            }
            off = header.next;
        }
        false
    }

    fn find_first_fit(&self, need: usize) -> Result<usize, HeapError> {
        let mut off = self.free_head;
        while off != NIL {
            if !self.in_bounds(off) {
                log::error!("heap: free list link {:#x} out of range", off);
                return Err(HeapError::Corrupted);
            }
            let header = self.header(off);
            if !header.is_valid() {
                log::error!("heap: corrupted free block at {:#x}", self.start + off);
                return Err(HeapError::Corrupted);
            }
            if header.is_free() && header.size >= need {
                return Ok(off);
            }
            off = header.next;
        }
        Err(HeapError::OutOfMemory)
    }

    fn unlink(&mut self, off: usize) {
        let header = self.header(off);
        if header.prev != NIL {
            self.set_next(header.prev, header.next);
        } else {
            self.free_head = header.next;
        }
        if header.next != NIL {
            self.set_prev(header.next, header.prev);
        }

        let mut header = self.header(off);
        header.next = NIL;
        header.prev = NIL;
        self.store(off, header);
    }

    /// Link `off` into the free list, keeping it address ordered
    fn insert_sorted(&mut self, off: usize) {
        let mut prev = NIL;
        let mut next = self.free_head;
        while next != NIL && next < off {
            prev = next;
            next = self.header(next).next;
        }

        let mut header = self.header(off);
        header.prev = prev;
        header.next = next;
        self.store(off, header);

        if prev != NIL {
            self.set_next(prev, off);
        } else {
            self.free_head = off;
        }
        if next != NIL {
            self.set_prev(next, off);
        }
    }

    /// Trim the block at `off` to `need` bytes, returning the tail
    ///
    /// The tail becomes a free block only when it can hold a header plus
    /// [`HEAP_MIN_PAYLOAD`]; otherwise the block keeps the slack.
    fn split(&mut self, off: usize, need: usize) {
        let mut header = self.header(off);
        if header.size < need + HEADER_SIZE + HEAP_MIN_PAYLOAD {
            return;
        }

        let tail = block_end(off, need);
        self.store(tail, BlockHeader::free(header.size - need - HEADER_SIZE));
        header.size = need;
        self.store(off, header);

        self.insert_sorted(tail);
        self.coalesce(tail);
    }

    /// Merge the free block at `off` with free physical neighbours
    ///
    /// Returns the offset of the surviving block. Absorbed headers have
    /// their magic wiped so stale pointers into them fail validation.
    fn coalesce(&mut self, off: usize) -> usize {
        let header = self.header(off);
        let next = header.next;
        if next != NIL && next == block_end(off, header.size) {
            let absorbed = self.header(next);
            if absorbed.is_valid() && absorbed.is_free() {
                self.unlink(next);
                let mut header = self.header(off);
                header.size += HEADER_SIZE + absorbed.size;
                self.store(off, header);
                self.scrub(next);
            }
        }

        let header = self.header(off);
        let prev = header.prev;
        if prev != NIL {
            let survivor = self.header(prev);
            if survivor.is_valid() && survivor.is_free() && block_end(prev, survivor.size) == off {
                self.unlink(off);
                let mut survivor = self.header(prev);
                survivor.size += HEADER_SIZE + header.size;
                self.store(prev, survivor);
                self.scrub(off);
                return prev;
            }
        }
        off
    }

    fn scrub(&mut self, off: usize) {
        let mut header = self.header(off);
        header.magic = 0;
        header.is_free = 0;
        self.store(off, header);
    }

    fn corrupt(&self, what: &str, off: usize) -> Result<(), HeapError> {
        log::error!("heap: {} at {:#x}", what, self.start.wrapping_add(off));
        Err(HeapError::Corrupted)
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{TestRegion, XorShift};

    fn addr(ptr: NonNull<u8>) -> usize {
        ptr.as_ptr() as usize
    }

    #[test]
    fn test_header_layout() {
        assert_eq!(HEADER_SIZE, 32);
        assert_eq!(HEADER_SIZE % HEAP_ALIGNMENT, 0);
    }

    #[test]
    fn test_init_single_free_block() {
        let region = TestRegion::new(4096);
        let heap = region.heap();

        let stats = heap.stats();
        assert_eq!(stats.total, 4096 - HEADER_SIZE);
        assert_eq!(stats.used, 0);
        assert_eq!(stats.free, stats.total);
        assert_eq!(stats.free_blocks, 1);
        assert!(heap.check().is_ok());
    }

    #[test]
    fn test_init_rejects_tiny_region_and_reinit() {
        let region = TestRegion::new(4096);
        let mut heap = Heap::new();
        unsafe {
            assert_eq!(heap.init(region.start(), HEADER_SIZE), Err(HeapError::RegionTooSmall));
            assert!(heap.init(region.start(), region.len()).is_ok());
            assert_eq!(
                heap.init(region.start(), region.len()),
                Err(HeapError::AlreadyInitialized)
            );
        }
    }

    #[test]
    fn test_alloc_failures() {
        let mut heap = Heap::new();
        assert_eq!(heap.alloc(16), Err(HeapError::Uninitialized));

        let region = TestRegion::new(4096);
        let mut heap = region.heap();
        assert_eq!(heap.alloc(0), Err(HeapError::ZeroSize));
        assert_eq!(heap.alloc(1 << 20), Err(HeapError::OutOfMemory));
        assert_eq!(heap.alloc(usize::MAX), Err(HeapError::Overflow));
        assert_eq!(heap.stats().free_blocks, 1);
    }

    #[test]
    fn test_first_fit_scenario() {
        let region = TestRegion::new(4096);
        let mut heap = region.heap();

        let block1 = heap.alloc(100).unwrap();
        assert_eq!(addr(block1), region.start() + HEADER_SIZE);

        let block2 = heap.alloc(200).unwrap();
        assert_eq!(addr(block2), addr(block1) + align_up(100, HEAP_ALIGNMENT) + HEADER_SIZE);

        unsafe { heap.free(block1.as_ptr()).unwrap() };
        let block3 = heap.alloc(50).unwrap();
        assert_eq!(block3, block1);
        assert!(heap.check().is_ok());
    }

    #[test]
    fn test_round_trip_reuse() {
        let region = TestRegion::new(8192);
        let mut heap = region.heap();

        let first = heap.alloc(256).unwrap();
        unsafe { heap.free(first.as_ptr()).unwrap() };
        let second = heap.alloc(256).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_coalesce_three_neighbours() {
        let region = TestRegion::new(4096);
        let mut heap = region.heap();

        let a = heap.alloc(64).unwrap();
        let b = heap.alloc(64).unwrap();
        let c = heap.alloc(64).unwrap();
        let _fence = heap.alloc(64).unwrap();

        unsafe {
            heap.free(a.as_ptr()).unwrap();
            heap.free(c.as_ptr()).unwrap();
            assert_eq!(heap.stats().free_blocks, 3);
            heap.free(b.as_ptr()).unwrap();
        }

        let merged = heap.usable_size(a.as_ptr()).unwrap();
        assert_eq!(merged, 3 * 64 + 2 * HEADER_SIZE);
        assert_eq!(heap.stats().free_blocks, 2);
        assert!(heap.check().is_ok());

        // The merged block is found first again
        let big = heap.alloc(merged).unwrap();
        assert_eq!(big, a);
    }

    #[test]
    fn test_free_merges_with_tail() {
        let region = TestRegion::new(4096);
        let mut heap = region.heap();

        let ptr = heap.alloc(512).unwrap();
        unsafe { heap.free(ptr.as_ptr()).unwrap() };

        let stats = heap.stats();
        assert_eq!(stats.free_blocks, 1);
        assert_eq!(stats.free, stats.total);
        assert_eq!(stats.used, 0);
    }

    #[test]
    fn test_double_free_is_reported_and_harmless() {
        let region = TestRegion::new(4096);
        let mut heap = region.heap();

        let a = heap.alloc(64).unwrap();
        let _b = heap.alloc(64).unwrap();
        unsafe {
            heap.free(a.as_ptr()).unwrap();
            let before = heap.stats();
            assert_eq!(heap.free(a.as_ptr()), Err(HeapError::DoubleFree));
            assert_eq!(heap.stats(), before);
        }
        assert!(heap.check().is_ok());

        let x = heap.alloc(48).unwrap();
        let y = heap.alloc(48).unwrap();
        assert!(addr(x) + 48 <= addr(y) || addr(y) + 48 <= addr(x));
        assert!(heap.check().is_ok());
    }

    #[test]
    fn test_double_free_after_merge_with_predecessor() {
        let region = TestRegion::new(4096);
        let mut heap = region.heap();

        let a = heap.alloc(64).unwrap();
        let b = heap.alloc(64).unwrap();
        let _c = heap.alloc(64).unwrap();
        unsafe {
            heap.free(a.as_ptr()).unwrap();
            // b merges into a and loses its header
            heap.free(b.as_ptr()).unwrap();
            let before = heap.stats();
            assert_eq!(heap.free(b.as_ptr()), Err(HeapError::DoubleFree));
            assert_eq!(heap.realloc(b.as_ptr(), 32), Err(HeapError::NotAllocated));
            assert_eq!(heap.stats(), before);
        }
        assert!(heap.check().is_ok());
    }

    #[test]
    fn test_double_free_after_merge_with_successor() {
        let region = TestRegion::new(4096);
        let mut heap = region.heap();

        let a = heap.alloc(64).unwrap();
        let b = heap.alloc(64).unwrap();
        unsafe {
            // b merges into the tail block, then a swallows both
            heap.free(b.as_ptr()).unwrap();
            heap.free(a.as_ptr()).unwrap();
            assert_eq!(heap.stats().free_blocks, 1);
            assert_eq!(heap.free(b.as_ptr()), Err(HeapError::DoubleFree));
            assert_eq!(heap.free(a.as_ptr()), Err(HeapError::DoubleFree));
        }
        assert!(heap.check().is_ok());
    }

    #[test]
    fn test_region_reports_aligned_bounds() {
        let region = TestRegion::new(4096);
        let heap = region.heap();
        assert_eq!(heap.region(), (region.start(), region.len()));
    }

    #[test]
    fn test_invalid_free_is_noop() {
        let region = TestRegion::new(4096);
        let mut heap = region.heap();

        let a = heap.alloc(128).unwrap();
        let before = heap.stats();
        let mut outside = 0u64;
        unsafe {
            assert_eq!(heap.free(core::ptr::null_mut()), Ok(()));
            assert_eq!(
                heap.free(&mut outside as *mut u64 as *mut u8),
                Err(HeapError::OutOfRange)
            );
            // Middle of a payload: zeroed memory has no magic
            assert_eq!(heap.free(a.as_ptr().add(64)), Err(HeapError::Corrupted));
            assert_eq!(heap.free(a.as_ptr().add(3)), Err(HeapError::OutOfRange));
        }
        assert_eq!(heap.stats(), before);
        assert!(heap.check().is_ok());
    }

    #[test]
    fn test_calloc_zeroes_and_checks_overflow() {
        let region = TestRegion::new(4096);
        let mut heap = region.heap();

        let dirty = heap.alloc(256).unwrap();
        unsafe {
            core::ptr::write_bytes(dirty.as_ptr(), 0xAB, 256);
            heap.free(dirty.as_ptr()).unwrap();
        }

        let ptr = heap.calloc(16, 16).unwrap();
        assert_eq!(ptr, dirty);
        let bytes = unsafe { core::slice::from_raw_parts(ptr.as_ptr(), 256) };
        assert!(bytes.iter().all(|&b| b == 0));

        assert_eq!(heap.calloc(usize::MAX, 2), Err(HeapError::Overflow));
    }

    #[test]
    fn test_realloc_null_and_zero() {
        let region = TestRegion::new(4096);
        let mut heap = region.heap();

        unsafe {
            let ptr = heap.realloc(core::ptr::null_mut(), 64).unwrap().unwrap();
            assert_eq!(heap.used(), 64);
            assert_eq!(heap.realloc(ptr.as_ptr(), 0), Ok(None));
            assert_eq!(heap.used(), 0);
        }
        assert_eq!(heap.stats().free_blocks, 1);
    }

    #[test]
    fn test_realloc_shrinks_in_place() {
        let region = TestRegion::new(4096);
        let mut heap = region.heap();

        let ptr = heap.alloc(256).unwrap();
        let _fence = heap.alloc(64).unwrap();

        let shrunk = unsafe { heap.realloc(ptr.as_ptr(), 64).unwrap().unwrap() };
        assert_eq!(shrunk, ptr);
        assert_eq!(heap.usable_size(ptr.as_ptr()), Some(64));
        assert_eq!(heap.used(), 128);
        assert!(heap.check().is_ok());

        // The released remainder is the first fit for a mid-sized request
        let reuse = heap.alloc(100).unwrap();
        assert_eq!(addr(reuse), addr(ptr) + 64 + HEADER_SIZE);
    }

    #[test]
    fn test_realloc_shrink_merges_remainder_with_free_neighbour() {
        let region = TestRegion::new(4096);
        let mut heap = region.heap();

        let ptr = heap.alloc(256).unwrap();
        unsafe { heap.realloc(ptr.as_ptr(), 32).unwrap() };

        let stats = heap.stats();
        assert_eq!(stats.free_blocks, 1);
        assert_eq!(stats.free, stats.total - 32 - HEADER_SIZE);
        assert!(heap.check().is_ok());
    }

    #[test]
    fn test_realloc_grow_copies() {
        let region = TestRegion::new(4096);
        let mut heap = region.heap();

        let ptr = heap.alloc(16).unwrap();
        let _fence = heap.alloc(16).unwrap();
        unsafe {
            for i in 0..16 {
                *ptr.as_ptr().add(i) = i as u8;
            }
            let grown = heap.realloc(ptr.as_ptr(), 512).unwrap().unwrap();
            assert_ne!(grown, ptr);
            let bytes = core::slice::from_raw_parts(grown.as_ptr(), 16);
            assert_eq!(bytes, &(0..16).collect::<Vec<u8>>()[..]);
            assert_eq!(heap.free(ptr.as_ptr()), Err(HeapError::DoubleFree));
        }
        assert!(heap.check().is_ok());
    }

    #[test]
    fn test_realloc_detects_corruption_without_mutation() {
        let region = TestRegion::new(4096);
        let mut heap = region.heap();

        let ptr = heap.alloc(32).unwrap();
        unsafe {
            core::ptr::write((ptr.as_ptr() as usize - HEADER_SIZE) as *mut u32, 0);
            let before = heap.stats();
            assert_eq!(heap.realloc(ptr.as_ptr(), 64), Err(HeapError::Corrupted));
            assert_eq!(heap.free(ptr.as_ptr()), Err(HeapError::Corrupted));
            assert_eq!(heap.stats(), before);
        }
        assert_eq!(heap.check(), Err(HeapError::Corrupted));
    }

    #[test]
    fn test_aligned_alloc_and_reclaim() {
        let region = TestRegion::new(8192);
        let mut heap = region.heap();
        let _pin = heap.alloc(8).unwrap();
        let before = heap.free_bytes();

        for align in [8usize, 16, 64] {
            let ptr = heap.aligned_alloc(100, align).unwrap();
            assert_eq!(addr(ptr) % align, 0);
            unsafe {
                core::ptr::write_bytes(ptr.as_ptr(), 0x5A, 100);
                heap.aligned_free(ptr.as_ptr()).unwrap();
            }
            assert_eq!(heap.free_bytes(), before);
            assert!(heap.check().is_ok());
        }

        assert_eq!(heap.aligned_alloc(64, 24), Err(HeapError::BadAlignment));
    }

    #[test]
    fn test_valloc_is_page_aligned() {
        let region = TestRegion::new(4 * PAGE_SIZE);
        let mut heap = region.heap();

        let ptr = heap.valloc(512).unwrap();
        assert_eq!(addr(ptr) % PAGE_SIZE, 0);
        unsafe { heap.vfree(ptr.as_ptr()).unwrap() };
        assert_eq!(heap.stats().free_blocks, 1);
    }

    #[test]
    fn test_random_workload_never_overlaps() {
        let region = TestRegion::new(64 * 1024);
        let mut heap = region.heap();
        let mut rng = XorShift::new(0x9E37_79B9_7F4A_7C15);
        let mut live: Vec<(usize, usize)> = Vec::new();

        for _ in 0..2000 {
            if live.is_empty() || rng.next() % 3 != 0 {
                let size = (rng.next() % 700) as usize + 1;
                if let Ok(ptr) = heap.alloc(size) {
                    let start = addr(ptr);
                    for &(other, len) in &live {
                        assert!(start + size <= other || other + len <= start);
                    }
                    live.push((start, size));
                }
            } else {
                let idx = (rng.next() as usize) % live.len();
                let (start, _) = live.swap_remove(idx);
                unsafe { heap.free(start as *mut u8).unwrap() };
            }
            assert!(heap.check().is_ok());
        }

        for (start, _) in live.drain(..) {
            unsafe { heap.free(start as *mut u8).unwrap() };
        }
        let stats = heap.stats();
        assert_eq!(stats.free_blocks, 1);
        assert_eq!(stats.free, stats.total);
        assert_eq!(stats.used, 0);
    }
}
