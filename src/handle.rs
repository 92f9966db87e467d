//! Pool handles.
//!
//! Nodes and value cells are named by non-zero integer handles rather than
//! addresses, so a pool image stays meaningful after it is reopened. The raw
//! value `0` is the null reference stored in empty `leftmost_ptr`,
//! `sibling_ptr` and record slots.

use std::fmt as StdFmt;
use std::num::NonZeroU64;

/// Handle of a node slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeRef(NonZeroU64);

/// Handle of a durable value cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ValueRef(NonZeroU64);

impl NodeRef {
    /// Decode a stored word; `0` is null.
    #[inline]
    #[must_use]
    pub const fn from_raw(raw: u64) -> Option<Self> {
        match NonZeroU64::new(raw) {
            Some(id) => Some(Self(id)),
            None => None,
        }
    }

    /// The word stored in the pool.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0.get()
    }

    /// Zero-based slot index.
    #[inline]
    #[must_use]
    #[expect(clippy::cast_possible_truncation, reason = "capacity fits in usize")]
    pub(crate) const fn index(self) -> usize {
        (self.0.get() - 1) as usize
    }
}

impl ValueRef {
    /// Decode a stored word; `0` is null.
    #[inline]
    #[must_use]
    pub const fn from_raw(raw: u64) -> Option<Self> {
        match NonZeroU64::new(raw) {
            Some(id) => Some(Self(id)),
            None => None,
        }
    }

    /// The word stored in the pool.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0.get()
    }

    /// Zero-based cell index.
    #[inline]
    #[must_use]
    #[expect(clippy::cast_possible_truncation, reason = "capacity fits in usize")]
    pub(crate) const fn index(self) -> usize {
        (self.0.get() - 1) as usize
    }
}

/// Encode an optional node handle as a pool word.
#[inline]
#[must_use]
pub(crate) const fn raw_node(node: Option<NodeRef>) -> u64 {
    match node {
        Some(n) => n.raw(),
        None => 0,
    }
}

impl StdFmt::Display for NodeRef {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        write!(f, "n{}", self.0)
    }
}

impl StdFmt::Display for ValueRef {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        write!(f, "v{}", self.0)
    }
}
