//! Filepath: src/node.rs
//!
//! Durable B+tree node (page).
//!
//! A node is a fixed run of pool words: one header line followed by
//! `cardinality` `(key, ptr)` records. Leaves store value-cell handles in
//! `ptr`; internal nodes store child handles and keep the child for keys
//! below every record in `leftmost_ptr`.
//!
//! # Shadow Rule
//!
//! Records are shifted in place, one entry at a time, and each step is
//! persisted. A shift leaves a transient duplicate behind: a slot whose ptr
//! equals the ptr of the slot to its left (for slot 0, `leftmost_ptr`).
//! Such a slot is a *shadow* and is skipped by every reader:
//!
//! ```text
//! live(i)  <=>  ptr[i] != 0  &&  ptr[i] != prev_ptr(i)
//! ```
//!
//! Because value cells and child nodes are never shared between records,
//! every intermediate state of a shift (and therefore every state a crash
//! can leave behind) maps to the same set of live records as either the
//! state before or the state after the operation.
//!
//! # Thread Safety
//!
//! - **Readers** never latch. They read a stable switch counter, scan, and
//!   rescan if the counter moved (see [`crate::version`]).
//! - **Writers** hold the node's exclusive latch through a [`NodeGuard`],
//!   which is the only type with mutating methods.

use std::fmt as StdFmt;
use std::ops::Deref;
use std::sync::atomic::AtomicU64;

use parking_lot::RwLockWriteGuard;

use crate::handle::{NodeRef, raw_node};
use crate::latch::LatchTable;
use crate::ordering::{READ_ORD, WRITE_ORD};
use crate::pool::PmemPool;
use crate::version::{SwitchCounter, SwitchGuard};

pub mod layout;
mod remove;
mod search;
mod store;

pub use remove::InternalRemoval;
pub use search::{LeafSearch, RangeStep, Step};
pub use store::Propagation;

use layout::{
    FLAG_DELETED, FLAGS, HIGH_KEY, LAST_INDEX, LEFTMOST, LEVEL, SIBLING, SWITCH_COUNTER, key_word,
    ptr_word,
};

// ============================================================================
//  NodeOutcome
// ============================================================================

/// Result of a node-level mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeOutcome<T> {
    /// The operation took effect.
    Success(T),

    /// A concurrent structural change got in the way; retry from the root.
    Conflict,

    /// The key is not in this node.
    NotFound,
}

// ============================================================================
//  Node
// ============================================================================

/// Read-only view of a node slot.
#[derive(Clone, Copy)]
pub struct Node<'a> {
    pool: &'a PmemPool,
    id: NodeRef,
    base: usize,
}

impl StdFmt::Debug for Node<'_> {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("level", &self.level())
            .field("count", &self.count())
            .field("sibling", &self.sibling())
            .finish_non_exhaustive()
    }
}

impl<'a> Node<'a> {
    /// View `id` inside `pool`.
    #[inline]
    #[must_use]
    pub const fn new(pool: &'a PmemPool, id: NodeRef) -> Self {
        Self {
            pool,
            id,
            base: pool.node_base(id),
        }
    }

    /// Handle of this node.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> NodeRef {
        self.id
    }

    /// Pool the node lives in.
    #[inline]
    #[must_use]
    pub const fn pool(&self) -> &'a PmemPool {
        self.pool
    }

    #[inline]
    fn word(&self, offset: usize) -> &'a AtomicU64 {
        self.pool.word(self.base + offset)
    }

    #[inline]
    fn load(&self, offset: usize) -> u64 {
        self.word(offset).load(READ_ORD)
    }

    /// View of another node in the same pool.
    #[inline]
    #[must_use]
    pub const fn at(&self, id: NodeRef) -> Self {
        Self::new(self.pool, id)
    }

    // ========================================================================
    //  Header
    // ========================================================================

    /// Level of the node, 0 for leaves.
    #[inline]
    #[must_use]
    #[expect(clippy::cast_possible_truncation, reason = "levels are small")]
    pub fn level(&self) -> u32 {
        self.load(LEVEL) as u32
    }

    /// Whether the node is a leaf.
    #[inline]
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.level() == 0
    }

    /// Raw leftmost pointer.
    #[inline]
    #[must_use]
    pub fn leftmost_raw(&self) -> u64 {
        self.load(LEFTMOST)
    }

    /// Child for keys below every record, `None` for leaves.
    #[inline]
    #[must_use]
    pub fn leftmost(&self) -> Option<NodeRef> {
        NodeRef::from_raw(self.leftmost_raw())
    }

    /// Right neighbour at the same level.
    #[inline]
    #[must_use]
    pub fn sibling(&self) -> Option<NodeRef> {
        NodeRef::from_raw(self.load(SIBLING))
    }

    /// Right sibling and the smallest key it owns.
    ///
    /// The sibling is loaded first; a writer stores the key before the link,
    /// so a reader that sees a new sibling also sees its fence.
    #[inline]
    #[must_use]
    pub fn fence(&self) -> Option<(NodeRef, u64)> {
        let sibling: NodeRef = self.sibling()?;
        Some((sibling, self.load(HIGH_KEY)))
    }

    /// Exclusive upper bound of this node's keys, `None` at the end of a level.
    #[inline]
    #[must_use]
    pub fn high_key(&self) -> Option<u64> {
        self.fence().map(|(_, high_key)| high_key)
    }

    /// Index of the last used slot, `-1` when empty.
    #[inline]
    #[must_use]
    #[expect(clippy::cast_possible_wrap, reason = "bounded by cardinality")]
    pub fn last_index(&self) -> isize {
        self.load(LAST_INDEX) as isize - 1
    }

    /// Number of used slots (`last_index + 1`).
    #[inline]
    #[must_use]
    #[expect(clippy::cast_possible_truncation, reason = "bounded by cardinality")]
    pub fn count(&self) -> usize {
        self.load(LAST_INDEX) as usize
    }

    /// Whether the node was retired by a root collapse.
    #[inline]
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.load(FLAGS) & FLAG_DELETED != 0
    }

    /// The node's switch counter.
    #[inline]
    #[must_use]
    pub fn counter(&self) -> SwitchCounter<'a> {
        SwitchCounter::new(self.word(SWITCH_COUNTER))
    }

    // ========================================================================
    //  Records
    // ========================================================================

    /// Key of slot `i`.
    #[inline]
    #[must_use]
    pub fn key(&self, i: usize) -> u64 {
        self.load(key_word(i))
    }

    /// Ptr of slot `i`.
    #[inline]
    #[must_use]
    pub fn ptr(&self, i: usize) -> u64 {
        self.load(ptr_word(i))
    }

    /// Ptr of the slot left of `i` (`leftmost_ptr` for slot 0).
    #[inline]
    #[must_use]
    pub fn prev_ptr(&self, i: usize) -> u64 {
        if i == 0 {
            self.leftmost_raw()
        } else {
            self.ptr(i - 1)
        }
    }

    /// Whether slot `i` holds a live record.
    #[inline]
    #[must_use]
    pub fn is_live(&self, i: usize) -> bool {
        let ptr: u64 = self.ptr(i);
        ptr != 0 && ptr != self.prev_ptr(i)
    }

    /// Live records in slot order. Meant for latched or quiescent nodes.
    #[must_use]
    pub fn live_records(&self) -> Vec<(u64, u64)> {
        (0..self.count().min(self.pool.cardinality()))
            .filter(|&i| self.is_live(i))
            .map(|i| (self.key(i), self.ptr(i)))
            .collect()
    }

    /// Slot of live `key`. Meant for latched or quiescent nodes.
    #[must_use]
    pub fn find_live(&self, key: u64) -> Option<usize> {
        (0..self.count()).find(|&i| self.is_live(i) && self.key(i) == key)
    }

    // ========================================================================
    //  Latching
    // ========================================================================

    /// Take the node's exclusive latch.
    #[must_use]
    pub fn lock(self, latches: &'a LatchTable) -> NodeGuard<'a> {
        let latch: RwLockWriteGuard<'a, ()> = latches.write(self.id);
        NodeGuard {
            switch: self.counter().begin(),
            node: self,
            _latch: latch,
        }
    }
}

// ============================================================================
//  NodeGuard
// ============================================================================

/// Exclusive access to a node.
///
/// Holds the latch and a [`SwitchGuard`]. Fields drop in declaration order,
/// so a pending split is finished before the latch is released.
#[must_use = "dropping the guard releases the latch"]
pub struct NodeGuard<'a> {
    switch: SwitchGuard<'a>,
    node: Node<'a>,
    _latch: RwLockWriteGuard<'a, ()>,
}

impl StdFmt::Debug for NodeGuard<'_> {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.debug_struct("NodeGuard")
            .field("node", &self.node)
            .field("switch", &self.switch.value())
            .finish()
    }
}

impl<'a> Deref for NodeGuard<'a> {
    type Target = Node<'a>;

    fn deref(&self) -> &Self::Target {
        &self.node
    }
}

impl<'a> NodeGuard<'a> {
    /// The latched node.
    #[inline]
    #[must_use]
    pub const fn node(&self) -> Node<'a> {
        self.node
    }

    #[inline]
    fn store(&self, offset: usize, value: u64) {
        self.node.word(offset).store(value, WRITE_ORD);
    }

    pub(crate) fn set_key(&self, i: usize, key: u64) {
        self.store(key_word(i), key);
    }

    pub(crate) fn set_ptr(&self, i: usize, ptr: u64) {
        self.store(ptr_word(i), ptr);
    }

    pub(crate) fn set_count(&self, count: usize) {
        self.store(LAST_INDEX, count as u64);
    }

    /// Link `sibling` as the owner of every key at or above `high_key`.
    pub(crate) fn set_fence(&self, sibling: NodeRef, high_key: u64) {
        self.store(HIGH_KEY, high_key);
        self.store(SIBLING, sibling.raw());
    }

    pub(crate) fn set_deleted(&self) {
        let flags: u64 = self.node.load(FLAGS);
        self.store(FLAGS, flags | FLAG_DELETED);
    }

    /// Persist the header line.
    pub(crate) fn persist_header(&self) {
        self.node.pool.persist(self.node.base..self.node.base + 8);
    }

    /// Persist record `i`.
    pub(crate) fn persist_record(&self, i: usize) {
        let start: usize = self.node.base + key_word(i);
        self.node.pool.persist(start..start + 2);
    }

    /// Announce a right shift.
    pub(crate) fn mark_forward(&mut self) {
        self.switch.mark_forward();
    }

    /// Announce a left shift.
    pub(crate) fn mark_backward(&mut self) {
        self.switch.mark_backward();
    }

    /// Announce a structural change; readers wait until the guard drops.
    pub(crate) fn mark_split(&mut self) {
        self.switch.mark_split();
    }
}

// ============================================================================
//  Unpublished
// ============================================================================

/// Writer for a freshly allocated node that no other thread can reach yet.
///
/// Nothing is persisted until [`publish_ready`](Self::publish_ready); the
/// caller links the node only after that returns.
#[derive(Debug)]
pub(crate) struct Unpublished<'a> {
    node: Node<'a>,
}

impl<'a> Unpublished<'a> {
    pub(crate) const fn new(node: Node<'a>) -> Self {
        Self { node }
    }

    fn store(&self, offset: usize, value: u64) {
        self.node.word(offset).store(value, WRITE_ORD);
    }

    pub(crate) fn set_leftmost(&self, leftmost: Option<NodeRef>) {
        self.store(LEFTMOST, raw_node(leftmost));
    }

    /// Inherit a fence (or its absence) from the node being split.
    pub(crate) fn set_fence(&self, fence: Option<(NodeRef, u64)>) {
        let (sibling, high_key) = fence.map_or((None, 0), |(s, k)| (Some(s), k));
        self.store(HIGH_KEY, high_key);
        self.store(SIBLING, raw_node(sibling));
    }

    pub(crate) fn set_record(&self, i: usize, key: u64, ptr: u64) {
        self.store(key_word(i), key);
        self.store(ptr_word(i), ptr);
    }

    pub(crate) fn set_count(&self, count: usize) {
        self.store(LAST_INDEX, count as u64);
    }

    /// Insert into sorted position; the node is private so no shift protocol.
    pub(crate) fn insert_sorted(&self, key: u64, ptr: u64) {
        let count: usize = self.node.count();
        let mut j: usize = count;
        while j > 0 && key < self.node.key(j - 1) {
            self.set_record(j, self.node.key(j - 1), self.node.ptr(j - 1));
            j -= 1;
        }
        self.set_record(j, key, ptr);
        self.set_count(count + 1);
    }

    /// Persist the whole slot. Returns the node, now safe to link.
    pub(crate) fn publish_ready(self) -> Node<'a> {
        let base: usize = self.node.base;
        self.node
            .pool
            .persist(base..base + self.node.pool.node_words());
        self.node
    }
}
