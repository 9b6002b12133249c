// Copyright 2025 The Blockheap Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Quick lists: bounded singly linked caches of recently freed small
//! blocks, indexed by exact size. Freeing a small block skips coalescing
//! and just pushes onto its quick list; coalescing happens later, in a
//! batch, when the list overflows and is flushed to the main lists. This
//! amortizes the common case (free immediately followed by an
//! equal-sized allocate) at the cost of briefly retaining same-shaped
//! blocks that could otherwise have merged with their neighbors.

use crate::block::BlockPtr;
use crate::config::{MIN_BLOCK, NUM_QUICK_LISTS, QL_CAPACITY, QL_MAX, QL_MIN};
use crate::coalesce::coalesce;
use crate::diagnostics::Diagnostics;
use crate::header;
use crate::list::FreeLists;

/// Map a block size to its quick-list index. Defined only for
/// `QL_MIN <= size < QL_MAX`; the allocator checks this range before
/// calling in.
pub fn quick_index(size: usize) -> Option<usize> {
    if size < QL_MIN || size >= QL_MAX {
        return None;
    }
    Some((size - MIN_BLOCK) / 16)
}

struct QuickListHead {
    first: *mut u8,
    length: usize,
}

/// The quick lists.
pub struct QuickLists {
    heads: [QuickListHead; NUM_QUICK_LISTS],
}

impl QuickLists {
    pub const fn new() -> Self {
        const EMPTY: QuickListHead = QuickListHead {
            first: core::ptr::null_mut(),
            length: 0,
        };
        QuickLists {
            heads: [EMPTY; NUM_QUICK_LISTS],
        }
    }

    /// Push `block` onto the quick list matching its size, flushing that
    /// list first if it is already at [`QL_CAPACITY`].
    ///
    /// # Safety
    /// `block` must be a free block of a size in the quick-list range, not
    /// already linked anywhere.
    pub unsafe fn insert<D: Diagnostics>(&mut self, block: BlockPtr, main: &mut FreeLists, diagnostics: &D) {
        let size = block.block_size();
        let index = quick_index(size).expect("insert called with an out-of-range block size");

        if self.heads[index].length >= QL_CAPACITY {
            self.flush(index, main, diagnostics);
        }

        // A quick-list block intentionally keeps its allocated bit set so
        // neighbors never try to coalesce into it; only the footer is left
        // alone, since coalescing only ever reads a free neighbor's footer.
        let word = block.header_word();
        let word = header::pack(
            header::payload_size_of(word),
            size as u32,
            true,
            true,
        );
        block.set_header(word);

        let head = &mut self.heads[index];
        *(block.quick_next_slot()) = head.first as usize;
        head.first = block.as_ptr();
        head.length += 1;
    }

    /// Pop the most recently freed block of the given quick-list index, if
    /// any.
    ///
    /// # Safety
    /// `index` must be in range.
    pub unsafe fn pop(&mut self, index: usize) -> Option<BlockPtr> {
        let head = &mut self.heads[index];
        if head.first.is_null() {
            return None;
        }
        let block = BlockPtr::from_raw(head.first);
        head.first = *(block.quick_next_slot()) as *mut u8;
        *(block.quick_next_slot()) = 0;
        head.length -= 1;
        Some(block)
    }

    /// Move every entry in quick list `index` back into the main lists,
    /// coalescing each with its neighbors first.
    ///
    /// # Safety
    /// `index` must be in range.
    pub unsafe fn flush<D: Diagnostics>(&mut self, index: usize, main: &mut FreeLists, diagnostics: &D) {
        while let Some(block) = self.pop(index) {
            let size = block.block_size();
            let word = header::pack(0, size as u32, false, false);
            block.set_header_and_footer(word, size);
            let merged = coalesce(block, main, diagnostics);
            main.insert(merged);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quick_index_range() {
        assert_eq!(quick_index(32), Some(0));
        assert_eq!(quick_index(48), Some(1));
        assert_eq!(quick_index(QL_MAX - 16), Some(NUM_QUICK_LISTS - 1));
        assert_eq!(quick_index(QL_MAX), None);
        assert_eq!(quick_index(16), None);
    }
}
