//! Separator maintenance in internal nodes.
//!
//! Splits hand their separator to [`FastFairTree::insert_internal`], which
//! stores it one level up and keeps going while that store splits too.
//! [`FastFairTree::delete_internal`] is the inverse maintenance primitive:
//! it unlinks a child from its parent without merging anything.

use std::convert::Infallible;

use crate::error::TreeError;
use crate::handle::NodeRef;
use crate::node::{InternalRemoval, Node, NodeGuard, NodeOutcome, Propagation};
use crate::tracing_helpers::{debug_log, warn_log};

use super::FastFairTree;
use super::retry::retry_from_root;

impl FastFairTree {
    /// Node at `level` on the search path for `key`, `None` if the tree is
    /// not that tall.
    pub(crate) fn descend_to(&self, key: u64, level: u32) -> Option<Node<'_>> {
        let mut node: Node<'_> = self.root_node()?;
        if node.level() < level {
            return None;
        }
        while node.level() > level {
            node = node.at(node.search_internal(key).node());
        }
        Some(node)
    }

    /// Store separator `key -> right` at `level`, propagating further splits.
    ///
    /// A separator for a level above the root is dropped with a warning; the
    /// new node stays reachable through its left sibling.
    ///
    /// # Errors
    ///
    /// [`TreeError::Pool`] if a split cannot allocate.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "debug", skip(self), fields(right = %right))
    )]
    pub(crate) fn insert_internal(&self, key: u64, right: NodeRef, level: u32) -> Result<(), TreeError> {
        let mut pending: Option<(u64, NodeRef, u32)> = Some((key, right, level));

        while let Some((key, right, level)) = pending.take() {
            #[cfg(test)]
            super::test_hooks::call_before_separator_hook(level);

            let outcome: Option<Propagation> = retry_from_root(|| {
                let Some(node) = self.descend_to(key, level) else {
                    warn_log!(key, level, right = %right, "no node at level, separator dropped");
                    return Ok(NodeOutcome::Success(Propagation::Done));
                };
                node.store(&self.latches, key, right.raw())
            })?;

            if let Some(Propagation::Separator { key, right, level }) = outcome {
                pending = Some((key, right, level));
            }
        }
        Ok(())
    }

    /// Unlink `child` from the node at `level` on the path for `key`.
    ///
    /// - `child` is that node's `leftmost_ptr`: [`InternalRemoval::Leftmost`],
    ///   nothing changes;
    /// - a live record points at `child`: the record is removed and its key
    ///   is returned with the child on its left;
    /// - otherwise [`InternalRemoval::Absent`].
    ///
    /// Removing the last record of an internal root that has no sibling
    /// collapses the root by one level.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "debug", skip(self), fields(child = %child))
    )]
    pub fn delete_internal(&self, key: u64, child: NodeRef, level: u32) -> InternalRemoval {
        if level == 0 {
            return InternalRemoval::Absent;
        }

        let result: Result<Option<InternalRemoval>, Infallible> = retry_from_root(|| {
            let Some(mut node) = self.descend_to(key, level) else {
                return Ok(NodeOutcome::NotFound);
            };

            loop {
                let mut guard: NodeGuard<'_> = node.lock(&self.latches);
                if guard.is_deleted() {
                    return Ok(NodeOutcome::Conflict);
                }
                if let Some(sibling) = guard.redirect(key) {
                    drop(guard);
                    node = node.at(sibling);
                    continue;
                }

                let removal: InternalRemoval = guard.remove_child(child);
                debug_log!(key, level, ?removal, "delete_internal");
                return Ok(NodeOutcome::Success(removal));
            }
        });

        match result {
            Ok(removal) => removal.unwrap_or(InternalRemoval::Absent),
            Err(never) => match never {},
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::PoolConfig;
    use crate::node::InternalRemoval;
    use crate::tree::FastFairTree;

    fn tree() -> FastFairTree {
        FastFairTree::create(
            PoolConfig::new()
                .with_cardinality(4)
                .with_node_capacity(1024)
                .with_value_capacity(1024),
        )
        .unwrap()
    }

    #[test]
    fn test_separators_propagate_to_new_levels() {
        let tree = tree();
        for key in 0..200 {
            tree.insert(key, key * 10).unwrap();
        }

        assert!(tree.height() >= 3, "height {}", tree.height());
        for key in 0..200 {
            assert_eq!(tree.search(key), Some(key * 10));
        }
        tree.verify().unwrap();
    }

    #[test]
    fn test_delete_internal_unlinks_child() {
        let tree = tree();
        // Leaves [1,2] [3,4] [5,6,7,8] under a root with two records.
        for key in 1..=8 {
            tree.insert(key, key).unwrap();
        }
        assert_eq!(tree.height(), 2);

        let root = tree.root_node().unwrap();
        let records = root.live_records();
        assert_eq!(records.len(), 2);
        let (sep, child) = records[0];
        let child = crate::handle::NodeRef::from_raw(child).unwrap();
        let left = root.leftmost().unwrap();

        assert_eq!(tree.delete_internal(sep, left, 1), InternalRemoval::Leftmost);
        assert_eq!(
            tree.delete_internal(sep, child, 1),
            InternalRemoval::Removed {
                key: sep,
                left_sibling: left,
            }
        );
        assert_eq!(tree.delete_internal(sep, child, 1), InternalRemoval::Absent);
        assert_eq!(tree.height(), 2);

        // The leaf is still reachable through the sibling chain.
        for key in 1..=8 {
            assert_eq!(tree.search(key), Some(key));
        }
    }

    #[test]
    fn test_delete_internal_collapses_root() {
        let tree = tree();
        for key in 1..=5 {
            tree.insert(key, key).unwrap();
        }
        let root = tree.root_node().unwrap();
        assert_eq!(root.count(), 1);
        let (sep, child) = root.live_records()[0];
        let child = crate::handle::NodeRef::from_raw(child).unwrap();
        let left = root.leftmost().unwrap();

        let _ = tree.delete_internal(sep, child, 1);

        assert_eq!(tree.height(), 1);
        assert_eq!(tree.root_node().unwrap().id(), left);
        assert!(root.is_deleted());
        for key in 1..=5 {
            assert_eq!(tree.search(key), Some(key));
        }

        // Writers that start at the new root still work.
        tree.insert(100, 1).unwrap();
        assert_eq!(tree.search(100), Some(1));
    }

    #[test]
    fn test_delete_internal_on_leaf_level_is_absent() {
        let tree = tree();
        tree.insert(1, 1).unwrap();
        let leaf = tree.root_node().unwrap().id();

        assert_eq!(tree.delete_internal(1, leaf, 0), InternalRemoval::Absent);
    }
}
