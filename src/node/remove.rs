//! In-place removal.

use crate::handle::NodeRef;
use crate::latch::LatchTable;
use crate::tracing_helpers::{debug_log, trace_log};
use crate::tree::counters::DebugCounters;

use super::{Node, NodeGuard, NodeOutcome};

/// Result of removing a child reference from an internal node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InternalRemoval {
    /// The child is the node's `leftmost_ptr`; nothing was changed.
    Leftmost,

    /// The record routing to the child was removed.
    Removed {
        /// Separator key of the removed record.
        key: u64,
        /// Child immediately left of the removed one.
        left_sibling: NodeRef,
    },

    /// No live record points at the child.
    Absent,
}

impl<'a> Node<'a> {
    /// Remove `key` from this leaf, taking its latch. Returns the removed ptr.
    #[must_use]
    pub fn remove(self, latches: &'a LatchTable, key: u64) -> NodeOutcome<u64> {
        let mut guard: NodeGuard<'a> = self.lock(latches);
        guard.remove_locked(key)
    }
}

impl NodeGuard<'_> {
    /// Remove `key` while already holding the latch.
    ///
    /// `Conflict` if the node was retired or the key now lies at or above the
    /// high key (a split moved it right after the caller's descent).
    pub fn remove_locked(&mut self, key: u64) -> NodeOutcome<u64> {
        if self.is_deleted() || self.redirect(key).is_some() {
            return NodeOutcome::Conflict;
        }

        let Some(slot) = self.find_live(key) else {
            return NodeOutcome::NotFound;
        };
        let ptr: u64 = self.ptr(slot);
        self.remove_slot(slot);
        trace_log!(node = %self.id(), key, slot, "record removed");
        NodeOutcome::Success(ptr)
    }

    /// Remove the record in `slot`, pulling later records left.
    ///
    /// The slot is first turned into a shadow of its left neighbour; that ptr
    /// store is the commit. Each later record is then copied one slot left
    /// (key first, ptr last), and `last_index` drops once the trailing slot
    /// is a shadow. Also used by recovery to squeeze out a slot that is
    /// already a shadow.
    pub(crate) fn remove_slot(&mut self, slot: usize) {
        self.mark_backward();
        let n: usize = self.count();

        self.set_ptr(slot, self.prev_ptr(slot));
        self.persist_record(slot);

        for j in slot..n - 1 {
            self.set_key(j, self.key(j + 1));
            self.set_ptr(j, self.ptr(j + 1));
            self.persist_record(j);
        }

        self.set_count(n - 1);
        self.persist_header();
    }

    /// Remove the record pointing at `child`.
    ///
    /// Removing the last record of an internal root without a sibling
    /// collapses the root: `leftmost_ptr` becomes the root, the height
    /// drops and this node is flagged deleted.
    pub fn remove_child(&mut self, child: NodeRef) -> InternalRemoval {
        if self.leftmost() == Some(child) {
            return InternalRemoval::Leftmost;
        }

        let target: u64 = child.raw();
        let Some(slot) = (0..self.count()).find(|&i| self.is_live(i) && self.ptr(i) == target)
        else {
            return InternalRemoval::Absent;
        };

        let key: u64 = self.key(slot);
        let Some(left_sibling) = NodeRef::from_raw(self.prev_ptr(slot)) else {
            return InternalRemoval::Absent;
        };
        self.remove_slot(slot);

        if self.count() == 0 && self.sibling().is_none() && self.pool().root() == Some(self.id()) {
            self.collapse_root();
        }

        InternalRemoval::Removed { key, left_sibling }
    }

    fn collapse_root(&mut self) {
        let Some(child) = self.leftmost() else {
            return;
        };
        let pool = self.pool();

        pool.set_root(child);
        pool.set_height(pool.height().saturating_sub(1));
        self.set_deleted();
        self.persist_header();

        DebugCounters::record_root_change();
        debug_log!(old = %self.id(), new = %child, "root collapsed");
    }
}
