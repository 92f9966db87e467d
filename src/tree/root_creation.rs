//! Root creation helpers.
//!
//! A new root is always allocated, filled and persisted before the durable
//! root reference is replaced, and the height is persisted last. A crash
//! between the two leaves a root whose level disagrees with the height;
//! recovery recomputes the height from the root.

use crate::error::PoolError;
use crate::handle::NodeRef;
use crate::node::{Node, Unpublished};
use crate::pool::PmemPool;
use crate::tracing_helpers::debug_log;

use super::counters::DebugCounters;

#[cfg(test)]
use super::test_hooks;

/// Unit struct namespace for root creation operations.
///
/// All methods are stateless.
pub struct RootCreation;

impl RootCreation {
    /// Format the first root: an empty leaf.
    ///
    /// # Errors
    ///
    /// [`PoolError::NodesExhausted`] if the pool has no node slot left.
    pub fn initial(pool: &PmemPool) -> Result<NodeRef, PoolError> {
        let root: NodeRef = pool.alloc_node(0)?;
        pool.set_root(root);
        pool.set_height(1);
        Ok(root)
    }

    /// Grow the tree by one level after `left` (the root) split.
    ///
    /// The new root routes keys below `split_key` to `left` and the rest to
    /// `right`. Called while `left` is still latched.
    ///
    /// # Errors
    ///
    /// [`PoolError::NodesExhausted`] if the root cannot be allocated. The
    /// split itself is already durable and `right` stays reachable through
    /// the sibling chain.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "debug", skip(pool), fields(left = %left, right = %right))
    )]
    pub fn grow(
        pool: &PmemPool,
        left: NodeRef,
        split_key: u64,
        right: NodeRef,
        level: u32,
    ) -> Result<NodeRef, PoolError> {
        Self::install(pool, left, &[(split_key, right)], level)
    }

    /// Allocate a root at `level` over `leftmost` and `records`, then make it
    /// the durable root.
    ///
    /// # Errors
    ///
    /// [`PoolError::NodesExhausted`] if the root cannot be allocated.
    pub fn install(
        pool: &PmemPool,
        leftmost: NodeRef,
        records: &[(u64, NodeRef)],
        level: u32,
    ) -> Result<NodeRef, PoolError> {
        let root_id: NodeRef = pool.alloc_node(level)?;
        let root = Unpublished::new(Node::new(pool, root_id));
        root.set_leftmost(Some(leftmost));
        for (i, &(key, child)) in records.iter().enumerate() {
            root.set_record(i, key, child.raw());
        }
        root.set_count(records.len());
        root.publish_ready();

        #[cfg(test)]
        test_hooks::call_before_root_install_hook();

        pool.set_root(root_id);
        pool.set_height(u64::from(level) + 1);

        DebugCounters::record_root_change();
        debug_log!(root = %root_id, level, children = records.len() + 1, "root installed");
        Ok(root_id)
    }
}
