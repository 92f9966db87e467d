//! Filepath: src/tree.rs
//! `FastFairTree` - a concurrent, crash-consistent B+tree over a persistent pool.
//!
//! The tree controller owns the [`PmemPool`] (root reference, height, nodes,
//! value cells) and the volatile [`LatchTable`]. It descends from the root,
//! delegates to the node-level routines in [`crate::node`] and absorbs
//! `Conflict` outcomes by restarting from the root.
//!
//! # Concurrency
//!
//! - `search` and `range_scan` never latch.
//! - `insert` and `delete` latch one node at a time.
//! - Split propagation stores the separator one level up after the child's
//!   latch is released; until then the new node is reachable through the
//!   sibling chain.

use std::convert::Infallible;
use std::fmt as StdFmt;

use crate::config::PoolConfig;
use crate::error::TreeError;
use crate::handle::{NodeRef, ValueRef};
use crate::latch::LatchTable;
use crate::node::{LeafSearch, Node, NodeOutcome, Propagation, RangeStep};
use crate::pool::PmemPool;
use crate::tracing_helpers::{debug_log, info_log};

pub mod counters;
mod diagnostics;
mod internal;
mod recovery;
mod retry;
pub mod root_creation;


#[cfg(test)]
pub mod test_hooks;

pub use counters::{DebugCounters, get_debug_counters, reset_debug_counters};
pub use diagnostics::{NodeDump, TreeDump, TreeStats};
pub use recovery::RecoveryReport;

use retry::retry_from_root;
use root_creation::RootCreation;

// ============================================================================
//  FastFairTree
// ============================================================================

/// A FAST-FAIR B+tree mapping `u64` keys to `u64` values.
///
/// All operations take `&self`; share the tree between threads with `Arc`.
///
/// # Example
///
/// ```rust
/// use fastfair::{FastFairTree, PoolConfig};
///
/// let tree = FastFairTree::create(PoolConfig::new()).unwrap();
/// tree.insert(42, 4200).unwrap();
/// assert_eq!(tree.search(42), Some(4200));
///
/// // Simulate a power failure and reopen.
/// let image = tree.pool().crash_image();
/// let reopened = FastFairTree::open(image).unwrap();
/// assert_eq!(reopened.search(42), Some(4200));
/// ```
pub struct FastFairTree {
    pool: PmemPool,
    latches: LatchTable,

    /// What recovery did when this tree was opened.
    recovery: RecoveryReport,
}

impl StdFmt::Debug for FastFairTree {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.debug_struct("FastFairTree")
            .field("root", &self.pool.root())
            .field("height", &self.pool.height())
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

impl FastFairTree {
    // ========================================================================
    //  Lifecycle
    // ========================================================================

    /// Format a fresh pool and install an empty leaf as the root.
    ///
    /// # Errors
    ///
    /// [`TreeError::Pool`] if the configuration is invalid or the pool has no
    /// room for the first node.
    pub fn create(config: PoolConfig) -> Result<Self, TreeError> {
        let pool: PmemPool = PmemPool::create(config)?;
        let latches: LatchTable = LatchTable::new(config.node_capacity);
        RootCreation::initial(&pool)?;

        info_log!(root = ?pool.root(), cardinality = config.cardinality, "tree created");
        Ok(Self {
            pool,
            latches,
            recovery: RecoveryReport::default(),
        })
    }

    /// Open a pool image (typically a [`PmemPool::crash_image`]) and run
    /// recovery.
    ///
    /// # Errors
    ///
    /// [`TreeError::Pool`] if the superblock is not a formatted tree, or if
    /// recovery needs a new root and the pool is full.
    pub fn open(pool: PmemPool) -> Result<Self, TreeError> {
        pool.validate_superblock()?;
        let latches: LatchTable = LatchTable::new(pool.config().node_capacity);

        let mut tree = Self {
            pool,
            latches,
            recovery: RecoveryReport::default(),
        };
        tree.recovery = tree.recover()?;

        info_log!(root = ?tree.pool.root(), report = ?tree.recovery, "tree opened");
        Ok(tree)
    }

    /// Give the pool back, e.g. to reopen it later.
    #[must_use]
    pub fn close(self) -> PmemPool {
        self.pool
    }

    // ========================================================================
    //  Accessors
    // ========================================================================

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PmemPool {
        &self.pool
    }

    /// Number of levels (1 for a single leaf).
    #[must_use]
    pub fn height(&self) -> u64 {
        self.pool.height()
    }

    /// Report of the recovery pass run by [`open`](Self::open). All zero for
    /// a tree made with [`create`](Self::create).
    #[must_use]
    pub const fn last_recovery(&self) -> &RecoveryReport {
        &self.recovery
    }

    #[inline]
    pub(crate) const fn node(&self, id: NodeRef) -> Node<'_> {
        Node::new(&self.pool, id)
    }

    #[inline]
    pub(crate) fn root_node(&self) -> Option<Node<'_>> {
        self.pool.root().map(|root| self.node(root))
    }

    /// Descend from the root to the leaf level along the path for `key`.
    fn find_leaf(&self, key: u64) -> Option<Node<'_>> {
        let mut node: Node<'_> = self.root_node()?;
        while !node.is_leaf() {
            node = node.at(node.search_internal(key).node());
        }
        Some(node)
    }

    /// Leaf holding `key` (following sibling redirects) and its value cell.
    fn locate(&self, key: u64) -> Option<(Node<'_>, ValueRef)> {
        let mut leaf: Node<'_> = self.find_leaf(key)?;
        loop {
            match leaf.search_leaf(key) {
                LeafSearch::Found(cell) => return Some((leaf, cell)),
                LeafSearch::Sibling(next) => leaf = leaf.at(next),
                LeafSearch::Missing => return None,
            }
        }
    }

    // ========================================================================
    //  Point Operations
    // ========================================================================

    /// Look up `key`. Lock-free.
    #[must_use]
    pub fn search(&self, key: u64) -> Option<u64> {
        self.locate(key).map(|(_, cell)| self.pool.value(cell))
    }

    /// Insert `key -> value`, overwriting an existing mapping.
    ///
    /// The value cell is durable before any node references it. Node splits
    /// propagate upwards; a split of the root grows the tree by one level.
    ///
    /// # Errors
    ///
    /// [`TreeError::Pool`] if the value cell or a new node cannot be
    /// allocated. A failed split leaves the tree consistent.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "trace", skip(self, value)))]
    pub fn insert(&self, key: u64, value: u64) -> Result<(), TreeError> {
        let cell: ValueRef = self.pool.alloc_value(value)?;

        let outcome: Option<Propagation> = retry_from_root(|| {
            let Some(leaf) = self.find_leaf(key) else {
                return Ok(NodeOutcome::NotFound);
            };
            leaf.store(&self.latches, key, cell.raw())
        })?;

        match outcome {
            Some(Propagation::Separator { key, right, level }) => {
                self.insert_internal(key, right, level)
            }
            Some(Propagation::Done) | None => Ok(()),
        }
    }

    /// Remove `key`, returning its value. Deleting an absent key is a no-op.
    ///
    /// Leaves are never merged; an emptied leaf stays in the sibling chain.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "trace", skip(self)))]
    pub fn delete(&self, key: u64) -> Option<u64> {
        let removed: Result<Option<u64>, Infallible> = retry_from_root(|| {
            let Some((leaf, _)) = self.locate(key) else {
                return Ok(NodeOutcome::NotFound);
            };
            Ok(leaf.remove(&self.latches, key))
        });

        let removed: Option<u64> = match removed {
            Ok(removed) => removed,
            Err(never) => match never {},
        };
        let value: Option<u64> = removed
            .and_then(ValueRef::from_raw)
            .map(|cell| self.pool.value(cell));
        if value.is_none() {
            debug_log!(key, "delete of absent key");
        }
        value
    }

    // ========================================================================
    //  Range Operations
    // ========================================================================

    /// Values of keys in `[min, max]`, in key order, at most `limit` of them.
    #[must_use]
    pub fn range_scan(&self, min: u64, max: u64, limit: usize) -> Vec<u64> {
        self.range_scan_entries(min, max, limit)
            .into_iter()
            .map(|(_, value)| value)
            .collect()
    }

    /// `(key, value)` pairs with keys in `[min, max]`, in key order, at most
    /// `limit` of them.
    ///
    /// Each leaf is read under its own validated snapshot; the result is not
    /// a snapshot of the whole tree.
    #[must_use]
    pub fn range_scan_entries(&self, min: u64, max: u64, limit: usize) -> Vec<(u64, u64)> {
        let mut found: Vec<(u64, ValueRef)> = Vec::new();
        if min > max || limit == 0 {
            return Vec::new();
        }
        let Some(mut leaf) = self.find_leaf(min) else {
            return Vec::new();
        };

        loop {
            let after: Option<u64> = found.last().map(|&(key, _)| key);
            match leaf.scan_range(min, max, after, limit, &mut found) {
                RangeStep::Next(next) => leaf = leaf.at(next),
                RangeStep::Done => break,
            }
        }

        found
            .into_iter()
            .map(|(key, cell)| (key, self.pool.value(cell)))
            .collect()
    }
}
