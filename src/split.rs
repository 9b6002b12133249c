// Copyright 2025 The Blockheap Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Carving a request-sized prefix off a larger free block. If what would
//! be left over is smaller than [`MIN_BLOCK`], the whole block is handed
//! out instead — the extra bytes become internal fragmentation rather
//! than an unusably small free fragment.

use crate::block::BlockPtr;
use crate::coalesce::coalesce;
use crate::config::MIN_BLOCK;
use crate::diagnostics::Diagnostics;
use crate::header;
use crate::list::FreeLists;

/// Split `block` (already unlinked from its main list) down to
/// `requested_block_size`, inserting the leftover fragment into the main
/// lists unconditionally. Used on the allocate path.
///
/// # Safety
/// `block` must be a free block of at least `requested_block_size` bytes,
/// unlinked from any list.
pub unsafe fn split_free(main: &mut FreeLists, block: BlockPtr, requested_block_size: usize) -> BlockPtr {
    let fragment_size = block.block_size() - requested_block_size;
    if fragment_size < MIN_BLOCK {
        return block;
    }

    let word = header::pack(0, requested_block_size as u32, false, false);
    block.set_header_and_footer(word, requested_block_size);

    let fragment = BlockPtr::from_raw((block.addr() + requested_block_size) as *mut u8);
    let fragment_word = header::pack(0, fragment_size as u32, false, false);
    fragment.set_header_and_footer(fragment_word, fragment_size);
    main.insert(fragment);

    block
}

/// Split an allocated `block` (still marked allocated, not linked
/// anywhere) down to `requested_block_size`, writing `payload_size` into
/// the retained prefix. The leftover fragment is coalesced with its new
/// right neighbor — which may have been free before the call — before
/// being inserted into the main lists. Used on the realloc-shrink path.
///
/// # Safety
/// `block` must be an allocated block of at least `requested_block_size`
/// bytes; its old right neighbor must be intact (untouched by this call
/// until the fragment's coalesce reads it).
pub unsafe fn split_allocated<D: Diagnostics>(
    main: &mut FreeLists,
    block: BlockPtr,
    requested_block_size: usize,
    payload_size: u32,
    diagnostics: &D,
) -> BlockPtr {
    let fragment_size = block.block_size() - requested_block_size;
    if fragment_size < MIN_BLOCK {
        return block;
    }

    let word = header::pack(payload_size, requested_block_size as u32, false, true);
    block.set_header_and_footer(word, requested_block_size);

    let fragment = BlockPtr::from_raw((block.addr() + requested_block_size) as *mut u8);
    let fragment_word = header::pack(0, fragment_size as u32, false, false);
    fragment.set_header_and_footer(fragment_word, fragment_size);

    let merged = coalesce(fragment, main, diagnostics);
    main.insert(merged);

    block
}
