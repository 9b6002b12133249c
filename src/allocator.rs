// Copyright 2025 The Blockheap Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! The top-level allocator: orchestrates the quick lists, main lists,
//! splitter, coalescer and heap lifecycle behind `allocate`/`free`/
//! `reallocate`.

use core::ptr::NonNull;

use crate::block::BlockPtr;
use crate::coalesce::coalesce;
use crate::config::{ALIGN, EPILOGUE_SIZE, HEAP_PREFIX, MIN_BLOCK, MROW, PROLOGUE_SIZE};
use crate::diagnostics::{Diagnostics, LogDiagnostics};
use crate::error::AllocError;
use crate::header;
use crate::heap::{self, HeapBounds};
use crate::list::FreeLists;
use crate::page::PageSource;
use crate::quicklist::{quick_index, QuickLists};
use crate::split::{split_allocated, split_free};
use crate::stats::Stats;
use crate::util::align_up;

/// Smallest block, including header and footer, that can hold `payload_size`
/// bytes of payload.
fn required_block_size(payload_size: usize) -> usize {
    core::cmp::max(MIN_BLOCK, align_up(payload_size + 2 * MROW, ALIGN))
}

/// A single-threaded dynamic memory allocator managing one contiguous
/// heap, grown a page at a time through `P`. Non-fatal problems are
/// reported through `D`; an invalid pointer handed to [`Self::free`] is
/// fatal and always goes through `D::fatal`, per the design's error model.
pub struct Allocator<P: PageSource, D: Diagnostics = LogDiagnostics> {
    pages: P,
    diagnostics: D,
    main: FreeLists,
    quick: QuickLists,
    stats: Stats,
    last_error: Option<AllocError>,
}

impl<P: PageSource, D: Diagnostics + Default> Allocator<P, D> {
    pub fn new(pages: P) -> Self {
        Self::with_diagnostics(pages, D::default())
    }
}

impl<P: PageSource, D: Diagnostics> Allocator<P, D> {
    pub fn with_diagnostics(pages: P, diagnostics: D) -> Self {
        Allocator {
            pages,
            diagnostics,
            main: FreeLists::new(),
            quick: QuickLists::new(),
            stats: Stats::new(),
            last_error: None,
        }
    }

    /// The error (if any) from the most recent failed [`Self::allocate`] or
    /// [`Self::reallocate`] call.
    pub fn last_error(&self) -> Option<AllocError> {
        self.last_error
    }

    /// Allocate at least `size` bytes, growing the heap as needed. Returns
    /// `None` for a zero-byte request or if the page source is exhausted
    /// (in which case [`Self::last_error`] explains why).
    pub fn allocate(&mut self, size: usize) -> Option<NonNull<u8>> {
        if size == 0 {
            return None;
        }

        self.main.ensure_initialized();

        if HeapBounds::of(&self.pages).is_empty() {
            if let Err(e) = unsafe { heap::init_heap(&mut self.pages, &mut self.main) } {
                self.last_error = Some(e);
                return None;
            }
        }

        let block_size = required_block_size(size);

        if let Some(index) = quick_index(block_size) {
            if let Some(block) = unsafe { self.quick.pop(index) } {
                unsafe {
                    let word = header::pack(size as u32, block_size as u32, false, true);
                    block.set_header_and_footer(word, block_size);
                }
                self.stats.adjust(size as i64);
                return Some(block.payload());
            }
        }

        loop {
            if let Some(found) = unsafe { self.main.find_fit(block_size) } {
                unsafe {
                    self.main.remove(found);
                    let carved = split_free(&mut self.main, found, block_size);
                    let word =
                        header::pack(size as u32, carved.block_size() as u32, false, true);
                    carved.set_header_and_footer(word, carved.block_size());
                    self.stats.adjust(size as i64);
                    return Some(carved.payload());
                }
            }

            if let Err(e) =
                unsafe { heap::extend_heap(&mut self.pages, &mut self.main, &self.diagnostics) }
            {
                self.last_error = Some(e);
                return None;
            }
        }
    }

    /// Return `payload` to the heap. Aborts through [`Diagnostics::fatal`]
    /// if `payload` does not name a currently allocated block this
    /// allocator handed out.
    pub fn free(&mut self, payload: NonNull<u8>) {
        let block = BlockPtr::from_payload(payload);
        if !self.validate(payload) {
            self.diagnostics
                .fatal(format_args!("free: invalid pointer {:p}", payload.as_ptr()));
        }

        let payload_size = unsafe { block.payload_size() };
        self.stats.adjust(-(payload_size as i64));

        let size = unsafe { block.block_size() };
        if let Some(index) = quick_index(size) {
            unsafe { self.quick.insert(block, &mut self.main, &self.diagnostics) };
        } else {
            unsafe {
                let word = header::pack(0, size as u32, false, false);
                block.set_header_and_footer(word, size);
                let merged = coalesce(block, &mut self.main, &self.diagnostics);
                self.main.insert(merged);
            }
        }
    }

    /// Resize the allocation at `payload` to `new_size` bytes, copying the
    /// lesser of the old and new payload sizes on a move. `new_size == 0`
    /// is equivalent to freeing `payload` and returns `None`. An invalid
    /// `payload` sets [`Self::last_error`] to [`AllocError::InvalidPointer`]
    /// and returns `None` without touching the heap.
    pub fn reallocate(&mut self, payload: NonNull<u8>, new_size: usize) -> Option<NonNull<u8>> {
        let block = BlockPtr::from_payload(payload);
        if !self.validate(payload) {
            self.last_error = Some(AllocError::InvalidPointer);
            return None;
        }

        if new_size == 0 {
            self.free(payload);
            return None;
        }

        let required = required_block_size(new_size);
        let current = unsafe { block.block_size() };

        if required <= current {
            let old_payload = unsafe { block.payload_size() } as i64;
            let shrunk = unsafe {
                split_allocated(&mut self.main, block, required, new_size as u32, &self.diagnostics)
            };
            self.stats.adjust(new_size as i64 - old_payload);
            return Some(shrunk.payload());
        }

        let old_payload_size = unsafe { block.payload_size() } as usize;
        let new_ptr = self.allocate(new_size)?;
        unsafe {
            let copy_len = core::cmp::min(old_payload_size, new_size);
            core::ptr::copy_nonoverlapping(payload.as_ptr(), new_ptr.as_ptr(), copy_len);
        }
        self.free(payload);
        Some(new_ptr)
    }

    /// Average payload-to-block-size ratio over every live, non-quick-list
    /// allocation. `0.0` if none exist.
    pub fn fragmentation(&self) -> f64 {
        let bounds = HeapBounds::of(&self.pages);
        unsafe { self.stats.fragmentation(bounds) }
    }

    /// Ratio of peak live payload bytes to current total heap size.
    pub fn utilization(&self) -> f64 {
        let bounds = HeapBounds::of(&self.pages);
        self.stats.utilization(bounds)
    }

    /// Check that `payload` names a currently allocated, non-quick-list
    /// block this allocator owns, with a footer that agrees with its
    /// header on size.
    fn validate(&self, payload: NonNull<u8>) -> bool {
        if payload.as_ptr() as usize % ALIGN != 0 {
            return false;
        }

        let bounds = HeapBounds::of(&self.pages);
        if bounds.is_empty() {
            return false;
        }

        let block = BlockPtr::from_payload(payload);
        let addr = block.addr();
        let lo = bounds.start + HEAP_PREFIX + PROLOGUE_SIZE;
        let hi = bounds.end - EPILOGUE_SIZE;
        if addr < lo || addr >= hi {
            return false;
        }

        let word = unsafe { block.header_word() };
        let block_size = header::block_size_of(word) as usize;
        if block_size < MIN_BLOCK || block_size % ALIGN != 0 {
            return false;
        }
        if addr + block_size > hi {
            return false;
        }
        if !header::is_allocated(word) || header::is_in_quick_list(word) {
            return false;
        }

        let footer = unsafe { block.footer_word(block_size) };
        header::block_size_of(footer) as usize == block_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::PanicDiagnostics;
    use crate::page::VecPageSource;

    type TestAllocator = Allocator<VecPageSource, PanicDiagnostics>;

    fn new_allocator(max_pages: usize) -> TestAllocator {
        let _ = env_logger::builder().is_test(true).try_init();
        Allocator::with_diagnostics(VecPageSource::new(max_pages), PanicDiagnostics)
    }

    #[test]
    fn allocate_zero_returns_none() {
        let mut a = new_allocator(4);
        assert!(a.allocate(0).is_none());
    }

    #[test]
    fn allocate_then_free_restores_empty_stats() {
        let mut a = new_allocator(4);
        let p = a.allocate(40).unwrap();
        assert!(a.fragmentation() > 0.0);
        a.free(p);
        assert_eq!(a.fragmentation(), 0.0);
    }

    #[test]
    fn sequential_small_allocations_are_carved_from_one_page() {
        let mut a = new_allocator(4);
        let p0 = a.allocate(16).unwrap();
        let p1 = a.allocate(16).unwrap();
        let p2 = a.allocate(16).unwrap();
        assert_ne!(p0, p1);
        assert_ne!(p1, p2);
        assert_eq!(p1.as_ptr() as usize - p0.as_ptr() as usize, 32);
    }

    #[test]
    fn large_allocation_grows_the_heap_across_multiple_pages() {
        let mut a = new_allocator(4);
        let p = a.allocate(9000).unwrap();
        assert!(a.utilization() > 0.0);
        a.free(p);
    }

    #[test]
    fn freeing_a_small_block_and_reallocating_the_same_size_reuses_it_via_quick_list() {
        let mut a = new_allocator(4);
        let p0 = a.allocate(16).unwrap();
        a.free(p0);
        let p1 = a.allocate(16).unwrap();
        assert_eq!(p0, p1);
    }

    #[test]
    fn quick_list_overflow_flushes_and_coalesces() {
        let mut a = new_allocator(4);
        let mut pointers = std::vec::Vec::new();
        for _ in 0..8 {
            pointers.push(a.allocate(16).unwrap());
        }
        for p in pointers.drain(..) {
            a.free(p);
        }
        let big = a.allocate(400).unwrap();
        a.free(big);
    }

    #[test]
    fn realloc_shrink_keeps_the_same_address() {
        let mut a = new_allocator(4);
        let p = a.allocate(200).unwrap();
        let shrunk = a.reallocate(p, 32).unwrap();
        assert_eq!(p, shrunk);
    }

    #[test]
    fn realloc_to_same_size_is_a_no_op() {
        let mut a = new_allocator(4);
        let p = a.allocate(64).unwrap();
        let same = a.reallocate(p, 64).unwrap();
        assert_eq!(p, same);
    }

    #[test]
    fn realloc_grow_preserves_contents_and_moves() {
        let mut a = new_allocator(4);
        let p = a.allocate(16).unwrap();
        unsafe {
            core::ptr::write_bytes(p.as_ptr(), 0xAB, 16);
        }
        let grown = a.reallocate(p, 4000).unwrap();
        unsafe {
            assert_eq!(*grown.as_ptr(), 0xAB);
        }
    }

    #[test]
    fn realloc_to_zero_frees_and_returns_none() {
        let mut a = new_allocator(4);
        let p = a.allocate(64).unwrap();
        assert!(a.reallocate(p, 0).is_none());
        assert_eq!(a.fragmentation(), 0.0);
    }

    #[test]
    #[should_panic]
    fn free_of_invalid_pointer_is_fatal() {
        let mut a = new_allocator(4);
        let p = a.allocate(32).unwrap();
        a.free(p);
        a.free(p); // double free: no longer allocated, validation fails
    }

    #[test]
    fn reallocate_invalid_pointer_sets_last_error() {
        let mut a = new_allocator(4);
        let p = a.allocate(32).unwrap();
        a.free(p);
        assert!(a.reallocate(p, 64).is_none());
        assert_eq!(a.last_error(), Some(AllocError::InvalidPointer));
    }
}
