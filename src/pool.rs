//! Filepath: src/pool.rs
//!
//! Simulated persistent-memory pool.
//!
//! [`PmemPool`] is a word-addressed arena holding a superblock, a fixed number
//! of node slots and a fixed number of value cells. Every word is an
//! `AtomicU64` so readers can traverse nodes while writers mutate them in place.
//!
//! Next to the working words the pool keeps a *media image*: the state that
//! would survive a power failure. The media image only changes on
//! [`persist`](PmemPool::persist), which copies whole cache lines, the same
//! granularity at which real hardware writes back. [`crash_image`](PmemPool::crash_image)
//! builds a fresh pool from the media image alone, and
//! [`arm_crash_after`](PmemPool::arm_crash_after) drops every persist after
//! the n-th, so tests can cut power at any durability boundary.
//!
//! # Layout
//!
//! ```text
//! word 0..8            superblock (one cache line)
//! word 8..             node slots, node_words each
//! word value_base..    value cells, one word each
//! ```
//!
//! Nodes are allocated zeroed, durably, and are never freed.

use std::fmt as StdFmt;
use std::ops::Range;
use std::sync::atomic::AtomicU64;

use crate::config::{LINE_WORDS, PoolConfig};
use crate::error::PoolError;
use crate::handle::{NodeRef, ValueRef, raw_node};
use crate::ordering::{ALLOC_ORD, MEDIA_ORD, READ_ORD, RELAXED, WRITE_ORD};
use crate::tracing_helpers::{debug_log, trace_log};

// ============================================================================
//  Superblock
// ============================================================================

/// Magic word identifying a formatted pool ("FASTFAIR").
pub const POOL_MAGIC: u64 = 0x4641_5354_4641_4952;

const SB_MAGIC: usize = 0;
const SB_CARDINALITY: usize = 1;
const SB_ROOT: usize = 2;
const SB_HEIGHT: usize = 3;
const SB_NEXT_NODE: usize = 4;
const SB_NEXT_VALUE: usize = 5;
const SB_NODE_CAPACITY: usize = 6;
const SB_VALUE_CAPACITY: usize = 7;

/// First word of the node region.
const NODE_REGION: usize = LINE_WORDS;

/// Sentinel meaning "no crash armed".
const NEVER: u64 = u64::MAX;

// ============================================================================
//  PmemPool
// ============================================================================

/// A persistent pool with an explicit media image.
pub struct PmemPool {
    words: Box<[AtomicU64]>,
    media: Box<[AtomicU64]>,
    config: PoolConfig,
    node_words: usize,
    value_base: usize,

    /// Persists issued so far.
    persists: AtomicU64,

    /// Persists with a sequence number above this are dropped.
    crash_after: AtomicU64,
}

impl StdFmt::Debug for PmemPool {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.debug_struct("PmemPool")
            .field("config", &self.config)
            .field("nodes", &self.allocated_nodes())
            .field("values", &self.allocated_values())
            .field("persists", &self.persist_count())
            .finish_non_exhaustive()
    }
}

fn zeroed(len: usize) -> Box<[AtomicU64]> {
    (0..len).map(|_| AtomicU64::new(0)).collect()
}

impl PmemPool {
    /// Format a fresh pool. The superblock is durable on return; the pool has
    /// no root yet.
    ///
    /// # Errors
    ///
    /// [`PoolError::Config`] if the configuration is rejected.
    pub fn create(config: PoolConfig) -> Result<Self, PoolError> {
        config.validate()?;

        let pool: Self = Self::blank(config);
        pool.store(SB_MAGIC, POOL_MAGIC);
        pool.store(SB_CARDINALITY, config.cardinality as u64);
        pool.store(SB_NODE_CAPACITY, config.node_capacity as u64);
        pool.store(SB_VALUE_CAPACITY, config.value_capacity as u64);
        pool.persist(0..LINE_WORDS);

        debug_log!(
            cardinality = config.cardinality,
            nodes = config.node_capacity,
            values = config.value_capacity,
            "pool formatted"
        );
        Ok(pool)
    }

    fn blank(config: PoolConfig) -> Self {
        let node_words: usize = config.node_words();
        let value_base: usize = NODE_REGION + config.node_capacity * node_words;
        let total: usize = (value_base + config.value_capacity).div_ceil(LINE_WORDS) * LINE_WORDS;

        Self {
            words: zeroed(total),
            media: zeroed(total),
            config,
            node_words,
            value_base,
            persists: AtomicU64::new(0),
            crash_after: AtomicU64::new(NEVER),
        }
    }

    /// Geometry this pool was laid out with.
    #[must_use]
    pub const fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Records per node.
    #[inline]
    #[must_use]
    pub const fn cardinality(&self) -> usize {
        self.config.cardinality
    }

    /// Check the superblock of a reopened image.
    ///
    /// # Errors
    ///
    /// [`PoolError::NotFormatted`] without the magic word,
    /// [`PoolError::CardinalityMismatch`] if the recorded geometry differs,
    /// [`PoolError::MissingRoot`] if no root was ever installed.
    pub fn validate_superblock(&self) -> Result<NodeRef, PoolError> {
        let magic: u64 = self.load(SB_MAGIC);
        if magic != POOL_MAGIC {
            return Err(PoolError::NotFormatted { found: magic });
        }

        let recorded: u64 = self.load(SB_CARDINALITY);
        if recorded != self.config.cardinality as u64 {
            return Err(PoolError::CardinalityMismatch {
                expected: self.config.cardinality,
                found: usize::try_from(recorded).unwrap_or(usize::MAX),
            });
        }

        self.root().ok_or(PoolError::MissingRoot)
    }

    // ========================================================================
    //  Word Access
    // ========================================================================

    /// The working word at `index`.
    #[inline]
    pub(crate) fn word(&self, index: usize) -> &AtomicU64 {
        &self.words[index]
    }

    #[inline]
    fn load(&self, index: usize) -> u64 {
        self.words[index].load(READ_ORD)
    }

    #[inline]
    fn store(&self, index: usize, value: u64) {
        self.words[index].store(value, WRITE_ORD);
    }

    /// First word of `node`.
    #[inline]
    pub(crate) const fn node_base(&self, node: NodeRef) -> usize {
        NODE_REGION + node.index() * self.node_words
    }

    /// Words per node slot.
    #[inline]
    pub(crate) const fn node_words(&self) -> usize {
        self.node_words
    }

    /// Whether `raw` names an allocated node.
    #[must_use]
    pub fn is_node(&self, raw: u64) -> bool {
        raw != 0 && raw <= self.load(SB_NEXT_NODE)
    }

    /// Whether `raw` names an allocated value cell.
    #[must_use]
    pub fn is_value(&self, raw: u64) -> bool {
        raw != 0 && raw <= self.load(SB_NEXT_VALUE)
    }

    // ========================================================================
    //  Durability
    // ========================================================================

    /// Write back every cache line overlapping `words` to the media image.
    ///
    /// Once an armed crash point has passed, the write-back is dropped.
    pub fn persist(&self, words: Range<usize>) {
        if words.is_empty() {
            return;
        }

        let seq: u64 = self.persists.fetch_add(1, ALLOC_ORD) + 1;
        if seq > self.crash_after.load(RELAXED) {
            trace_log!(seq, "persist dropped after crash point");
            return;
        }

        let first: usize = words.start / LINE_WORDS;
        let last: usize = (words.end - 1) / LINE_WORDS;
        for line in first..=last {
            for index in line * LINE_WORDS..(line + 1) * LINE_WORDS {
                self.media[index].store(self.words[index].load(MEDIA_ORD), MEDIA_ORD);
            }
        }
    }

    /// Number of persists issued since the pool was created or opened.
    #[must_use]
    pub fn persist_count(&self) -> u64 {
        self.persists.load(RELAXED)
    }

    /// Drop every persist after the next `n`.
    pub fn arm_crash_after(&self, n: u64) {
        let base: u64 = self.persists.load(RELAXED);
        self.crash_after.store(base.saturating_add(n), RELAXED);
    }

    /// Cancel an armed crash point.
    pub fn disarm(&self) {
        self.crash_after.store(NEVER, RELAXED);
    }

    /// A new pool containing only what reached the media image.
    ///
    /// Both the working words and the media of the new pool equal this pool's
    /// media; the persist counter starts at zero and no crash is armed.
    #[must_use]
    pub fn crash_image(&self) -> Self {
        let pool: Self = Self::blank(self.config);
        for (index, word) in self.media.iter().enumerate() {
            let value: u64 = word.load(MEDIA_ORD);
            pool.words[index].store(value, RELAXED);
            pool.media[index].store(value, RELAXED);
        }
        pool
    }

    // ========================================================================
    //  Superblock Slots
    // ========================================================================

    /// Durable root reference.
    #[must_use]
    pub fn root(&self) -> Option<NodeRef> {
        NodeRef::from_raw(self.load(SB_ROOT))
    }

    /// Replace the root reference and make it durable.
    pub(crate) fn set_root(&self, root: NodeRef) {
        self.store(SB_ROOT, raw_node(Some(root)));
        self.persist(SB_ROOT..SB_ROOT + 1);
    }

    /// Durable tree height (root level + 1).
    #[must_use]
    pub fn height(&self) -> u64 {
        self.load(SB_HEIGHT)
    }

    /// Replace the height and make it durable.
    pub(crate) fn set_height(&self, height: u64) {
        self.store(SB_HEIGHT, height);
        self.persist(SB_HEIGHT..SB_HEIGHT + 1);
    }

    // ========================================================================
    //  Allocation
    // ========================================================================

    /// Nodes handed out so far.
    #[must_use]
    pub fn allocated_nodes(&self) -> usize {
        usize::try_from(self.load(SB_NEXT_NODE)).unwrap_or(usize::MAX)
    }

    /// Value cells handed out so far.
    #[must_use]
    pub fn allocated_values(&self) -> usize {
        usize::try_from(self.load(SB_NEXT_VALUE)).unwrap_or(usize::MAX)
    }

    fn bump(&self, cursor: usize, capacity: usize) -> Option<u64> {
        self.words[cursor]
            .fetch_update(ALLOC_ORD, READ_ORD, |used| {
                (used < capacity as u64).then_some(used + 1)
            })
            .ok()
            .map(|used| used + 1)
    }

    /// Allocate an empty node at `level`. The node is durable (and the
    /// allocation cursor with it) before the handle is returned.
    ///
    /// # Errors
    ///
    /// [`PoolError::NodesExhausted`] when every slot is in use.
    pub fn alloc_node(&self, level: u32) -> Result<NodeRef, PoolError> {
        let raw: u64 = self
            .bump(SB_NEXT_NODE, self.config.node_capacity)
            .ok_or(PoolError::NodesExhausted {
                capacity: self.config.node_capacity,
            })?;
        self.persist(SB_NEXT_NODE..SB_NEXT_NODE + 1);

        let node: NodeRef = NodeRef::from_raw(raw).ok_or(PoolError::NodesExhausted {
            capacity: self.config.node_capacity,
        })?;
        let base: usize = self.node_base(node);
        for index in base..base + self.node_words {
            self.store(index, 0);
        }
        self.store(base + crate::node::layout::LEVEL, u64::from(level));
        self.persist(base..base + self.node_words);

        trace_log!(node = raw, level, "node allocated");
        Ok(node)
    }

    /// Allocate a value cell holding `value`, durable before return.
    ///
    /// # Errors
    ///
    /// [`PoolError::ValuesExhausted`] when every cell is in use.
    pub fn alloc_value(&self, value: u64) -> Result<ValueRef, PoolError> {
        let exhausted = PoolError::ValuesExhausted {
            capacity: self.config.value_capacity,
        };
        let raw: u64 = self
            .bump(SB_NEXT_VALUE, self.config.value_capacity)
            .ok_or_else(|| exhausted.clone())?;
        self.persist(SB_NEXT_VALUE..SB_NEXT_VALUE + 1);

        let cell: ValueRef = ValueRef::from_raw(raw).ok_or(exhausted)?;
        let index: usize = self.value_base + cell.index();
        self.store(index, value);
        self.persist(index..index + 1);
        Ok(cell)
    }

    /// The value stored in `cell`.
    #[must_use]
    pub fn value(&self, cell: ValueRef) -> u64 {
        self.load(self.value_base + cell.index())
    }
}
