//! Word offsets inside a node slot.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │ Cache Line 0: header                                     │
//! │   0 switch_counter   1 level      2 leftmost_ptr         │
//! │   3 sibling_ptr   4 last_index+1   5 flags   6 high_key  │
//! ├──────────────────────────────────────────────────────────┤
//! │ Cache Lines 1..: records                                 │
//! │   8+2i key   9+2i ptr                                    │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! `last_index` is stored biased by one so that a zeroed slot reads as an
//! empty node. A record never straddles a cache line.
//!
//! `high_key` is the fence a split leaves behind: every key at or above it
//! belongs to `sibling_ptr` or further right. It is written before
//! `sibling_ptr`, in the same header line, and is never changed by deletes.
//! It means nothing while `sibling_ptr` is 0.

/// Switch counter word.
pub const SWITCH_COUNTER: usize = 0;

/// Level (0 = leaf).
pub const LEVEL: usize = 1;

/// Leftmost child, 0 for leaves.
pub const LEFTMOST: usize = 2;

/// Right sibling at the same level, 0 if none.
pub const SIBLING: usize = 3;

/// `last_index + 1`.
pub const LAST_INDEX: usize = 4;

/// Flag bits.
pub const FLAGS: usize = 5;

/// Smallest key owned by the right sibling.
pub const HIGH_KEY: usize = 6;

/// First record word.
pub const RECORDS: usize = 8;

/// Node was the root and has been retired by a root collapse.
pub const FLAG_DELETED: u64 = 1 << 0;

/// Word holding the key of record `i`.
#[inline]
#[must_use]
pub const fn key_word(i: usize) -> usize {
    RECORDS + 2 * i
}

/// Word holding the ptr of record `i`.
#[inline]
#[must_use]
pub const fn ptr_word(i: usize) -> usize {
    RECORDS + 2 * i + 1
}
