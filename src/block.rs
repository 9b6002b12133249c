// Copyright 2025 The Blockheap Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Block addressing and raw header/footer access.
//!
//! A [`BlockPtr`] addresses the first byte of a block's header. Every
//! method here is `unsafe`: the caller must guarantee the address lies
//! within the managed heap and names the start of a real block.

use core::ptr::NonNull;

use crate::config::MROW;
use crate::header;
use crate::list::ListLinks;

/// Address of a block's header word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct BlockPtr(NonNull<u8>);

impl BlockPtr {
    /// Build a `BlockPtr` from the address of its header byte.
    #[inline]
    pub fn from_header(addr: NonNull<u8>) -> Self {
        BlockPtr(addr)
    }

    /// Build a `BlockPtr` from a raw, non-null address.
    ///
    /// # Safety
    /// `addr` must name the start of a block's header.
    #[inline]
    pub unsafe fn from_raw(addr: *mut u8) -> Self {
        BlockPtr(NonNull::new_unchecked(addr))
    }

    /// Recover the block owning a payload pointer (one `MROW` before it).
    #[inline]
    pub fn from_payload(payload: NonNull<u8>) -> Self {
        let addr = (payload.as_ptr() as usize).wrapping_sub(MROW);
        BlockPtr(unsafe { NonNull::new_unchecked(addr as *mut u8) })
    }

    /// The block's header address.
    #[inline]
    pub fn addr(self) -> usize {
        self.0.as_ptr() as usize
    }

    #[inline]
    pub fn as_ptr(self) -> *mut u8 {
        self.0.as_ptr()
    }

    /// The payload address: one `MROW` past the header.
    #[inline]
    pub fn payload(self) -> NonNull<u8> {
        unsafe { NonNull::new_unchecked((self.addr() + MROW) as *mut u8) }
    }

    #[inline]
    fn header_ptr(self) -> *mut u64 {
        self.0.as_ptr() as *mut u64
    }

    #[inline]
    fn footer_ptr(self, block_size: usize) -> *mut u64 {
        (self.addr() + block_size - MROW) as *mut u64
    }

    /// Read and de-obfuscate the header word.
    ///
    /// # Safety
    /// The header must have been written by `set_header`.
    #[inline]
    pub unsafe fn header_word(self) -> u64 {
        header::obfuscate(self.header_ptr().read())
    }

    /// Read and de-obfuscate the footer word of a block of `block_size`
    /// bytes, independent of whatever this block's header currently says.
    /// Used by validation, which must cross-check the two.
    ///
    /// # Safety
    /// The footer at `addr + block_size - MROW` must have been written by
    /// `set_footer`.
    #[inline]
    pub unsafe fn footer_word(self, block_size: usize) -> u64 {
        header::obfuscate(self.footer_ptr(block_size).read())
    }

    /// Obfuscate and write the header word.
    ///
    /// # Safety
    /// The header address must be writable heap memory.
    #[inline]
    pub unsafe fn set_header(self, logical: u64) {
        self.header_ptr().write(header::obfuscate(logical));
    }

    /// Obfuscate and write the footer word for a block of `block_size` bytes.
    ///
    /// # Safety
    /// `block_size` must be this block's real size and the footer address
    /// must lie within the heap.
    pub unsafe fn set_footer(self, block_size: usize, logical: u64) {
        self.footer_ptr(block_size).write(header::obfuscate(logical));
    }

    /// Write identical header and footer words, as every non-epilogue
    /// block requires.
    ///
    /// # Safety
    /// See [`Self::set_header`] and [`Self::set_footer`].
    pub unsafe fn set_header_and_footer(self, logical: u64, block_size: usize) {
        self.set_header(logical);
        self.set_footer(block_size, logical);
    }

    /// # Safety
    /// See [`Self::header_word`].
    #[inline]
    pub unsafe fn block_size(self) -> usize {
        header::block_size_of(self.header_word()) as usize
    }

    /// # Safety
    /// See [`Self::header_word`].
    #[inline]
    pub unsafe fn payload_size(self) -> u32 {
        header::payload_size_of(self.header_word())
    }

    /// # Safety
    /// See [`Self::header_word`].
    #[inline]
    pub unsafe fn is_allocated(self) -> bool {
        header::is_allocated(self.header_word())
    }

    /// # Safety
    /// See [`Self::header_word`].
    #[inline]
    pub unsafe fn is_in_quick_list(self) -> bool {
        header::is_in_quick_list(self.header_word())
    }

    /// The block immediately to the right, found via this block's own size.
    ///
    /// # Safety
    /// See [`Self::header_word`]; the right neighbor must exist (i.e. this
    /// is not the epilogue).
    pub unsafe fn next_block(self) -> BlockPtr {
        BlockPtr::from_raw((self.addr() + self.block_size()) as *mut u8)
    }

    /// The block immediately to the left, found via its footer.
    ///
    /// # Safety
    /// The preceding `MROW` bytes must be a valid footer (i.e. this is not
    /// the prologue).
    pub unsafe fn prev_block(self) -> BlockPtr {
        let footer_addr = self.addr() - MROW;
        let footer_word = header::obfuscate((footer_addr as *const u64).read());
        let prev_size = header::block_size_of(footer_word) as usize;
        BlockPtr::from_raw((self.addr() - prev_size) as *mut u8)
    }

    /// The in-band doubly linked list node overlaid on this block's body.
    /// Valid only while the block is free and a member of a main list.
    #[inline]
    pub fn links(self) -> *mut ListLinks {
        self.payload().as_ptr() as *mut ListLinks
    }

    /// The in-band singly linked "next" slot overlaid on this block's body.
    /// Valid only while the block is parked in a quick list.
    #[inline]
    pub fn quick_next_slot(self) -> *mut usize {
        self.payload().as_ptr() as *mut usize
    }
}

#[cfg(test)]
mod layout_tests {
    use super::*;

    #[repr(C)]
    struct BodyLayout {
        header: u64,
        link0: usize,
        link1: usize,
    }

    #[test]
    fn body_starts_one_mrow_past_header() {
        assert_eq!(memoffset::offset_of!(BodyLayout, link0), MROW);
        assert_eq!(memoffset::offset_of!(BodyLayout, link1), 2 * MROW);
    }
}
