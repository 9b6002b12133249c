// Copyright 2025 The Blockheap Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Error codes surfaced to callers of the allocator.
//!
//! The two kinds mirror the two client-visible failure modes the design
//! allows: resource exhaustion on page growth, and an invalid pointer
//! handed to [`crate::Allocator::reallocate`]. Anything else (a bogus
//! pointer handed to `free`, or an internal bookkeeping inconsistency) is
//! not representable as an [`AllocError`] — it goes through
//! [`crate::diagnostics::Diagnostics`] instead.

/// Error conditions the allocator can report to a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    /// The page source could not grow the heap any further.
    OutOfMemory,
    /// A pointer passed to `reallocate` did not pass validation.
    InvalidPointer,
}

impl core::fmt::Display for AllocError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            AllocError::OutOfMemory => f.write_str("heap exhausted: page source returned none"),
            AllocError::InvalidPointer => f.write_str("pointer failed validation"),
        }
    }
}

/// Result type for fallible allocator operations.
pub type Result<T> = core::result::Result<T, AllocError>;
