//! Optimistic in-node search.
//!
//! Every routine follows the same pattern: take a stable switch counter,
//! check the high key, scan in the direction the counter announces,
//! then rescan if the counter moved. `last_index` is re-read on every step so
//! a record pushed into a newly opened slot by a concurrent insert is still
//! seen.

use crate::handle::{NodeRef, ValueRef};
use crate::version::SwitchCounter;

use super::Node;

/// Result of a leaf lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeafSearch {
    /// The key is live in this leaf.
    Found(ValueRef),

    /// The key belongs to the right sibling.
    Sibling(NodeRef),

    /// The key is not in the tree.
    Missing,
}

/// Result of an internal-node lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Descend to this child.
    Child(NodeRef),

    /// The key belongs to the right sibling at the same level.
    Sibling(NodeRef),
}

impl Step {
    /// The node to visit next.
    #[must_use]
    pub const fn node(self) -> NodeRef {
        match self {
            Self::Child(node) | Self::Sibling(node) => node,
        }
    }
}

/// Where a range scan continues after one leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeStep {
    /// Keep scanning in the right sibling.
    Next(NodeRef),

    /// The scan is complete.
    Done,
}

impl Node<'_> {
    /// Right sibling if `key` is at or above this node's high key.
    #[inline]
    pub(crate) fn redirect(&self, key: u64) -> Option<NodeRef> {
        let (sibling, high_key) = self.fence()?;
        (key >= high_key).then_some(sibling)
    }

    #[inline]
    fn in_range(&self, i: usize) -> bool {
        usize::try_from(self.last_index()).is_ok_and(|last| i <= last)
    }

    /// Value reference of live slot `i` if it holds `key`.
    #[inline]
    fn leaf_match(&self, i: usize, key: u64) -> Option<u64> {
        let k: u64 = self.key(i);
        if k != key {
            return None;
        }
        let ptr: u64 = self.ptr(i);
        (ptr != 0 && ptr != self.prev_ptr(i) && self.key(i) == k).then_some(ptr)
    }

    // ========================================================================
    //  Leaf
    // ========================================================================

    /// Look `key` up in this leaf.
    #[must_use]
    pub fn search_leaf(&self, key: u64) -> LeafSearch {
        let counter: SwitchCounter<'_> = self.counter();
        loop {
            let version: u64 = counter.stable();

            let result: LeafSearch = if let Some(sibling) = self.redirect(key) {
                LeafSearch::Sibling(sibling)
            } else {
                let found: Option<u64> = if SwitchCounter::is_forward(version) {
                    self.leaf_forward(key)
                } else {
                    self.leaf_backward(key)
                };
                found
                    .and_then(ValueRef::from_raw)
                    .map_or(LeafSearch::Missing, LeafSearch::Found)
            };

            if !counter.has_changed(version) {
                return result;
            }
        }
    }

    fn leaf_forward(&self, key: u64) -> Option<u64> {
        let mut i: usize = 0;
        while self.in_range(i) {
            if let Some(ptr) = self.leaf_match(i, key) {
                return Some(ptr);
            }
            i += 1;
        }
        None
    }

    fn leaf_backward(&self, key: u64) -> Option<u64> {
        let last: usize = usize::try_from(self.last_index()).ok()?;
        (0..=last).rev().find_map(|i| self.leaf_match(i, key))
    }

    // ========================================================================
    //  Internal
    // ========================================================================

    /// Child (or sibling) to visit for `key` in this internal node.
    #[must_use]
    pub fn search_internal(&self, key: u64) -> Step {
        let counter: SwitchCounter<'_> = self.counter();
        loop {
            let version: u64 = counter.stable();

            let result: Option<Step> = if let Some(sibling) = self.redirect(key) {
                Some(Step::Sibling(sibling))
            } else {
                let child: u64 = if SwitchCounter::is_forward(version) {
                    self.internal_forward(key)
                } else {
                    self.internal_backward(key)
                };
                NodeRef::from_raw(child).map(Step::Child)
            };

            if counter.has_changed(version) {
                continue;
            }
            if let Some(step) = result {
                return step;
            }
        }
    }

    fn internal_forward(&self, key: u64) -> u64 {
        let leftmost: u64 = self.leftmost_raw();
        if self.last_index() < 0 {
            return leftmost;
        }

        if key < self.key(0) && leftmost != self.ptr(0) {
            return leftmost;
        }

        let mut i: usize = 1;
        while self.in_range(i) {
            if key < self.key(i) {
                let left: u64 = self.ptr(i - 1);
                if left != self.ptr(i) {
                    return left;
                }
            }
            i += 1;
        }
        self.ptr(i - 1)
    }

    fn internal_backward(&self, key: u64) -> u64 {
        let Ok(last) = usize::try_from(self.last_index()) else {
            return self.leftmost_raw();
        };
        for slot in (0..=last).rev() {
            if key >= self.key(slot) {
                let ptr: u64 = self.ptr(slot);
                if self.prev_ptr(slot) != ptr {
                    return ptr;
                }
            }
        }
        self.leftmost_raw()
    }

    // ========================================================================
    //  Range
    // ========================================================================

    /// Append live records of this leaf with keys in `[min, max]` to `out`.
    ///
    /// Keys at or above the high key are left to the sibling, and
    /// keys not above `after` are skipped so output stays strictly ascending
    /// while a concurrent split moves records right.
    pub fn scan_range(
        &self,
        min: u64,
        max: u64,
        after: Option<u64>,
        limit: usize,
        out: &mut Vec<(u64, ValueRef)>,
    ) -> RangeStep {
        let counter: SwitchCounter<'_> = self.counter();
        let mut batch: Vec<(u64, u64)> = Vec::new();

        let fence: Option<(NodeRef, u64)> = loop {
            let version: u64 = counter.stable();
            batch.clear();

            let fence: Option<(NodeRef, u64)> = self.fence();

            if SwitchCounter::is_forward(version) {
                let mut i: usize = 0;
                while self.in_range(i) {
                    self.collect_live(i, &mut batch);
                    i += 1;
                }
            } else if let Ok(last) = usize::try_from(self.last_index()) {
                for i in (0..=last).rev() {
                    self.collect_live(i, &mut batch);
                }
            }

            if !counter.has_changed(version) {
                break fence;
            }
        };

        batch.sort_unstable_by_key(|&(key, _)| key);
        batch.dedup_by_key(|&mut (key, _)| key);

        let mut past_max: bool = false;
        for (key, ptr) in batch {
            if key > max {
                past_max = true;
                break;
            }
            if fence.is_some_and(|(_, high_key)| key >= high_key) {
                break;
            }
            if key < min || after.is_some_and(|a| key <= a) {
                continue;
            }
            if out.len() >= limit {
                return RangeStep::Done;
            }
            if let Some(cell) = ValueRef::from_raw(ptr) {
                out.push((key, cell));
            }
        }

        match fence {
            Some((next, _)) if !past_max && out.len() < limit => RangeStep::Next(next),
            _ => RangeStep::Done,
        }
    }

    fn collect_live(&self, i: usize, batch: &mut Vec<(u64, u64)>) {
        let key: u64 = self.key(i);
        let ptr: u64 = self.ptr(i);
        if ptr != 0 && ptr != self.prev_ptr(i) && self.key(i) == key {
            batch.push((key, ptr));
        }
    }
}
