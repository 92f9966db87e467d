//! Filepath: src/latch.rs
//!
//! Volatile per-node latches.
//!
//! One `parking_lot::RwLock<()>` per node slot, indexed by handle. The table
//! lives outside the pool: latches have no meaning across restarts, so a
//! fresh table is built every time a pool is opened. Writers take the
//! exclusive side; the diagnostic dump takes the shared side so it sees each
//! node between modifications. Ordinary readers never touch the table.

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::handle::NodeRef;

/// Latches for every node slot of one pool.
#[derive(Debug)]
pub struct LatchTable {
    latches: Box<[RwLock<()>]>,
}

impl LatchTable {
    /// A table with `capacity` unlocked latches.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            latches: (0..capacity).map(|_| RwLock::new(())).collect(),
        }
    }

    /// Exclusive latch on `node`, blocking until available.
    #[inline]
    pub fn write(&self, node: NodeRef) -> RwLockWriteGuard<'_, ()> {
        self.latches[node.index()].write()
    }

    /// Shared latch on `node`.
    #[inline]
    pub fn read(&self, node: NodeRef) -> RwLockReadGuard<'_, ()> {
        self.latches[node.index()].read()
    }

    /// Whether some writer holds `node`.
    #[must_use]
    pub fn is_locked_exclusive(&self, node: NodeRef) -> bool {
        self.latches[node.index()].is_locked_exclusive()
    }

    /// Number of latches.
    #[must_use]
    pub fn len(&self) -> usize {
        self.latches.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.latches.is_empty()
    }
}
