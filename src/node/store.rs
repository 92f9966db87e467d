//! In-place insert (FAST) and split (FAIR).

use crate::error::PoolError;
use crate::handle::NodeRef;
use crate::latch::LatchTable;
use crate::tracing_helpers::{debug_log, trace_log};
use crate::tree::counters::DebugCounters;
use crate::tree::root_creation::RootCreation;

#[cfg(test)]
use crate::tree::test_hooks;

use super::{Node, NodeGuard, NodeOutcome, Unpublished};

/// Work left for the caller after a successful store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Propagation {
    /// Nothing to do.
    Done,

    /// A split produced `right`; its separator must be stored at `level`.
    Separator {
        /// Smallest key routed to `right`.
        key: u64,
        /// The new right sibling.
        right: NodeRef,
        /// Level of the parent that should receive the separator.
        level: u32,
    },
}

/// What a latched store attempt decided.
enum Attempt {
    Stored(Propagation),
    MoveRight(NodeRef),
    Conflict,
}

impl<'a> Node<'a> {
    /// Store `(key, ptr)` in this node, taking its latch.
    ///
    /// Moves right (releasing each latch first) while the key lies at or
    /// above the node's high key.
    ///
    /// # Errors
    ///
    /// [`PoolError::NodesExhausted`] if a split or root growth cannot
    /// allocate.
    pub fn store(
        self,
        latches: &'a LatchTable,
        key: u64,
        ptr: u64,
    ) -> Result<NodeOutcome<Propagation>, PoolError> {
        let mut node: Self = self;
        loop {
            let mut guard: NodeGuard<'a> = node.lock(latches);
            match guard.store_attempt(key, ptr)? {
                Attempt::Stored(propagation) => return Ok(NodeOutcome::Success(propagation)),
                Attempt::Conflict => return Ok(NodeOutcome::Conflict),
                Attempt::MoveRight(next) => {
                    drop(guard);
                    DebugCounters::record_redirect();
                    node = node.at(next);
                }
            }
        }
    }
}

impl NodeGuard<'_> {
    /// Store `(key, ptr)` while already holding the latch.
    ///
    /// Returns `Conflict` instead of moving right, since the caller owns the
    /// latch and decides where to go next.
    ///
    /// # Errors
    ///
    /// As [`Node::store`].
    pub fn store_locked(&mut self, key: u64, ptr: u64) -> Result<NodeOutcome<Propagation>, PoolError> {
        Ok(match self.store_attempt(key, ptr)? {
            Attempt::Stored(propagation) => NodeOutcome::Success(propagation),
            Attempt::MoveRight(_) | Attempt::Conflict => NodeOutcome::Conflict,
        })
    }

    fn store_attempt(&mut self, key: u64, ptr: u64) -> Result<Attempt, PoolError> {
        if self.is_deleted() {
            return Ok(Attempt::Conflict);
        }

        if let Some(sibling) = self.redirect(key) {
            return Ok(Attempt::MoveRight(sibling));
        }

        if let Some(slot) = self.find_live(key) {
            self.set_ptr(slot, ptr);
            self.persist_record(slot);
            trace_log!(node = %self.id(), key, slot, "record overwritten");
            return Ok(Attempt::Stored(Propagation::Done));
        }

        if self.count() < self.pool().cardinality() {
            self.insert_key(key, ptr);
            return Ok(Attempt::Stored(Propagation::Done));
        }

        self.split(key, ptr).map(Attempt::Stored)
    }

    // ========================================================================
    //  FAST insert
    // ========================================================================

    /// Insert a record that fits, shifting larger records right one entry at
    /// a time.
    ///
    /// Slot `n` is first opened as a shadow of slot `n-1`. Each shift step
    /// then turns slot `j-1` into a shadow of its left neighbour (ptr first,
    /// then key), which makes the copy already sitting in slot `j` live. The
    /// new record is written key first, ptr last; the ptr store is the commit.
    pub(crate) fn insert_key(&mut self, key: u64, ptr: u64) {
        self.mark_forward();
        let n: usize = self.count();

        if n == 0 {
            self.set_key(0, key);
            self.set_ptr(0, ptr);
            self.persist_record(0);
            self.set_count(1);
            self.persist_header();
            return;
        }

        self.set_key(n, self.key(n - 1));
        self.set_ptr(n, self.ptr(n - 1));
        self.persist_record(n);
        self.set_count(n + 1);
        self.persist_header();

        let mut j: usize = n;
        while j > 0 && key < self.key(j - 1) {
            self.set_ptr(j - 1, self.prev_ptr(j - 1));
            if j >= 2 {
                self.set_key(j - 1, self.key(j - 2));
            }
            self.persist_record(j - 1);
            j -= 1;
        }

        self.set_key(j, key);
        self.set_ptr(j, ptr);
        self.persist_record(j);
    }

    // ========================================================================
    //  FAIR split
    // ========================================================================

    /// Split a full node and store `(key, ptr)` on the correct side.
    ///
    /// Order of durable steps:
    /// 1. sibling filled with the upper half (plus the new record if it
    ///    belongs right), given this node's old fence, and persisted while
    ///    still unreachable;
    /// 2. `high_key` set to the split key and `sibling_ptr` linked, persisted
    ///    together in the header line;
    /// 3. `last_index` lowered, persisted;
    /// 4. new record inserted on the left if it belongs there;
    /// 5. root growth, or the separator is handed back for the parent.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "debug", skip(self, ptr), fields(node = %self.id()))
    )]
    fn split(&mut self, key: u64, ptr: u64) -> Result<Propagation, PoolError> {
        let n: usize = self.count();
        let m: usize = n / 2;
        let split_key: u64 = self.key(m);
        let level: u32 = self.level();

        let right_id: NodeRef = self.pool().alloc_node(level)?;
        let right = Unpublished::new(self.at(right_id));

        if self.is_leaf() {
            for i in m..n {
                right.set_record(i - m, self.key(i), self.ptr(i));
            }
            right.set_count(n - m);
        } else {
            right.set_leftmost(NodeRef::from_raw(self.ptr(m)));
            for i in m + 1..n {
                right.set_record(i - m - 1, self.key(i), self.ptr(i));
            }
            right.set_count(n - m - 1);
        }

        if key >= split_key {
            right.insert_sorted(key, ptr);
        }
        right.set_fence(self.fence());
        right.publish_ready();

        self.mark_split();
        self.set_fence(right_id, split_key);
        self.persist_header();

        #[cfg(test)]
        test_hooks::call_after_split_link_hook();

        self.set_count(m);
        self.persist_header();

        if key < split_key {
            self.insert_key(key, ptr);
        }

        DebugCounters::record_split();
        debug_log!(node = %self.id(), right = %right_id, split_key, level, "node split");

        if self.pool().root() == Some(self.id()) {
            RootCreation::grow(self.pool(), self.id(), split_key, right_id, level + 1)?;
            return Ok(Propagation::Done);
        }

        Ok(Propagation::Separator {
            key: split_key,
            right: right_id,
            level: level + 1,
        })
    }
}
