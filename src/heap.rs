// Copyright 2025 The Blockheap Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Heap lifecycle: laying down the prologue and epilogue on the very
//! first page, and folding each subsequent page into the heap on
//! extension.

use crate::block::BlockPtr;
use crate::coalesce::coalesce;
use crate::config::{EPILOGUE_SIZE, HEAP_PREFIX, MROW, PAGE, PROLOGUE_SIZE};
use crate::diagnostics::Diagnostics;
use crate::error::{AllocError, Result};
use crate::header;
use crate::list::FreeLists;
use crate::page::PageSource;

/// Current bounds of the managed heap region, snapshotted for use by
/// validation and statistics.
#[derive(Debug, Clone, Copy)]
pub struct HeapBounds {
    pub start: usize,
    pub end: usize,
}

impl HeapBounds {
    pub fn of<P: PageSource>(pages: &P) -> Self {
        HeapBounds {
            start: pages.heap_start() as usize,
            end: pages.heap_end() as usize,
        }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }
}

/// Write the epilogue sentinel (a bare allocated, zero-size header) at the
/// last `MROW` bytes of the heap.
unsafe fn write_epilogue(heap_end: *mut u8) {
    let epilogue = BlockPtr::from_raw((heap_end as usize - MROW) as *mut u8);
    let word = header::pack(0, 0, false, true);
    epilogue.set_header(word);
}

/// Lay down the prologue, the initial free block, and the epilogue on a
/// freshly grown first page. Inserts the initial free block into `main`.
///
/// # Safety
/// Must be called exactly once, before any other heap operation, while
/// `pages` reports an empty heap.
pub unsafe fn init_heap<P: PageSource>(pages: &mut P, main: &mut FreeLists) -> Result<()> {
    if pages.grow().is_none() {
        return Err(AllocError::OutOfMemory);
    }

    let heap_start = pages.heap_start();
    let prologue = BlockPtr::from_raw((heap_start as usize + HEAP_PREFIX) as *mut u8);
    let prologue_word = header::pack(0, PROLOGUE_SIZE as u32, false, true);
    prologue.set_header_and_footer(prologue_word, PROLOGUE_SIZE);

    let first_free_size = PAGE - EPILOGUE_SIZE - PROLOGUE_SIZE - HEAP_PREFIX;
    let first_free = BlockPtr::from_raw((prologue.addr() + PROLOGUE_SIZE) as *mut u8);
    let free_word = header::pack(0, first_free_size as u32, false, false);
    first_free.set_header_and_footer(free_word, first_free_size);

    write_epilogue(pages.heap_end());

    main.insert(first_free);
    Ok(())
}

/// Grow the heap by one page, fold it into a free block (overwriting the
/// old epilogue position), coalesce with whatever preceded it, write a
/// fresh epilogue, and insert the (possibly merged) block into `main`.
///
/// # Safety
/// The heap must already be initialized.
pub unsafe fn extend_heap<P: PageSource, D: Diagnostics>(
    pages: &mut P,
    main: &mut FreeLists,
    diagnostics: &D,
) -> Result<()> {
    let new_page = match pages.grow() {
        Some(p) => p,
        None => return Err(AllocError::OutOfMemory),
    };

    let free_block = BlockPtr::from_raw((new_page as usize - MROW) as *mut u8);
    let word = header::pack(0, PAGE as u32, false, false);
    free_block.set_header_and_footer(word, PAGE);

    write_epilogue(pages.heap_end());

    let merged = coalesce(free_block, main, diagnostics);
    main.insert(merged);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::PanicDiagnostics;
    use crate::page::VecPageSource;

    #[test]
    fn init_heap_lays_out_prologue_free_block_and_epilogue() {
        let mut pages = VecPageSource::new(4);
        let mut main = FreeLists::new();
        main.ensure_initialized();

        unsafe {
            init_heap(&mut pages, &mut main).unwrap();

            let bounds = HeapBounds::of(&pages);
            assert_eq!(bounds.len(), PAGE);

            let prologue = BlockPtr::from_raw((bounds.start + HEAP_PREFIX) as *mut u8);
            assert_eq!(prologue.block_size(), PROLOGUE_SIZE);
            assert!(prologue.is_allocated());

            let first_free = prologue.next_block();
            assert!(!first_free.is_allocated());
            assert_eq!(
                first_free.block_size(),
                PAGE - EPILOGUE_SIZE - PROLOGUE_SIZE - HEAP_PREFIX
            );

            let epilogue = first_free.next_block();
            assert!(epilogue.is_allocated());
            assert_eq!(epilogue.block_size(), 0);
            assert_eq!(epilogue.addr(), bounds.end - MROW);
        }
    }

    #[test]
    fn extend_heap_coalesces_with_trailing_free_block() {
        let mut pages = VecPageSource::new(4);
        let mut main = FreeLists::new();
        main.ensure_initialized();

        unsafe {
            init_heap(&mut pages, &mut main).unwrap();
            let before = HeapBounds::of(&pages);
            extend_heap(&mut pages, &mut main, &PanicDiagnostics).unwrap();
            let after = HeapBounds::of(&pages);
            assert_eq!(after.len(), before.len() + PAGE);

            let prologue = BlockPtr::from_raw((after.start + HEAP_PREFIX) as *mut u8);
            let merged_free = prologue.next_block();
            assert!(!merged_free.is_allocated());
            assert_eq!(
                merged_free.block_size(),
                PAGE - EPILOGUE_SIZE - PROLOGUE_SIZE - HEAP_PREFIX + PAGE
            );
        }
    }
}
