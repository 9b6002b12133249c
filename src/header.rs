// Copyright 2025 The Blockheap Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Codec for the 64-bit header/footer word shared by every block.
//!
//! ```text
//! bit   63..32        31..4          3..2       1              0
//!     payload_size   block_size    reserved   in_quick_list  allocated
//! ```
//!
//! Every word stored in heap memory is XOR'd with [`MAGIC`](crate::config::MAGIC);
//! the functions here operate on the logical (de-obfuscated) word. `obfuscate`
//! is its own inverse, so the same call site XORs a word on the way into
//! memory and on the way out.

use crate::config::MAGIC;

bitflags::bitflags! {
    /// The two low flag bits of a header/footer word.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BlockFlags: u64 {
        /// Block is allocated (set for ordinary allocations and for
        /// blocks currently parked in a quick list).
        const ALLOCATED = 1 << 0;
        /// Block currently sits in a quick list.
        const IN_QUICK_LIST = 1 << 1;
    }
}

/// Pack a logical header/footer word.
///
/// `block_size` must already be a multiple of 16; its low 4 bits are
/// reserved for the flag bits and must be zero.
#[inline]
pub fn pack(payload_size: u32, block_size: u32, in_quick_list: bool, allocated: bool) -> u64 {
    debug_assert!(block_size & 0xF == 0);
    let mut flags = BlockFlags::empty();
    flags.set(BlockFlags::IN_QUICK_LIST, in_quick_list);
    flags.set(BlockFlags::ALLOCATED, allocated);
    ((payload_size as u64) << 32) | (block_size as u64) | flags.bits()
}

/// XOR a word with the obfuscation constant. Self-inverse.
#[inline]
pub const fn obfuscate(word: u64) -> u64 {
    word ^ MAGIC
}

/// Extract the block size (total bytes, including header and footer).
#[inline]
pub const fn block_size_of(word: u64) -> u32 {
    (word as u32) & !0xF
}

/// Extract the payload size (meaningful only on allocated, non-quick-list blocks).
#[inline]
pub const fn payload_size_of(word: u64) -> u32 {
    (word >> 32) as u32
}

/// Test the allocated flag.
#[inline]
pub fn is_allocated(word: u64) -> bool {
    BlockFlags::from_bits_truncate(word).contains(BlockFlags::ALLOCATED)
}

/// Test the in-quick-list flag.
#[inline]
pub fn is_in_quick_list(word: u64) -> bool {
    BlockFlags::from_bits_truncate(word).contains(BlockFlags::IN_QUICK_LIST)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_and_unpack_round_trip() {
        let word = pack(100, 128, false, true);
        assert_eq!(block_size_of(word), 128);
        assert_eq!(payload_size_of(word), 100);
        assert!(is_allocated(word));
        assert!(!is_in_quick_list(word));
    }

    #[test]
    fn obfuscate_is_self_inverse() {
        let word = pack(4, 32, false, true);
        assert_eq!(obfuscate(obfuscate(word)), word);
        assert_ne!(obfuscate(word), word);
    }

    #[test]
    fn quick_list_flag_independent_of_allocated() {
        let word = pack(0, 48, true, true);
        assert!(is_allocated(word));
        assert!(is_in_quick_list(word));
    }
}
