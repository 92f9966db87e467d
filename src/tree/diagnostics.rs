//! Tree inspection: dump, statistics, structural verification and counter
//! perturbation for tests.

use std::fmt as StdFmt;

use parking_lot::RwLockReadGuard;
use rand::Rng;

use crate::error::InvariantViolation;
use crate::handle::NodeRef;
use crate::node::Node;

use super::FastFairTree;

// ============================================================================
//  Dump and Stats
// ============================================================================

/// One node as seen by [`FastFairTree::dump`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeDump {
    /// Node handle.
    pub id: NodeRef,
    /// Live keys in slot order.
    pub keys: Vec<u64>,
    /// Right sibling.
    pub sibling: Option<NodeRef>,
}

/// Every level of the tree, root level first, each left to right.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeDump {
    /// Levels from the root down to the leaves.
    pub levels: Vec<Vec<NodeDump>>,
    /// Live keys over all leaves.
    pub total_keys: usize,
}

impl StdFmt::Display for TreeDump {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        let height: usize = self.levels.len();
        for (depth, level) in self.levels.iter().enumerate() {
            write!(f, "level {}:", height - depth - 1)?;
            for node in level {
                write!(f, " {}[", node.id)?;
                for (i, key) in node.keys.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{key}")?;
                }
                write!(f, "]")?;
            }
            writeln!(f)?;
        }
        write!(f, "total keys: {}", self.total_keys)
    }
}

/// Shape of the tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeStats {
    /// Stored height.
    pub height: u64,
    /// Leaves reachable from the root.
    pub leaves: usize,
    /// Internal nodes reachable from the root.
    pub internal_nodes: usize,
    /// Leaves without live records.
    pub empty_leaves: usize,
    /// Live keys.
    pub keys: usize,
    /// Node slots handed out by the pool.
    pub allocated_nodes: usize,
    /// Value cells handed out by the pool.
    pub allocated_values: usize,
}

impl FastFairTree {
    /// Nodes of every level, root level first, each following the sibling
    /// chain from the leftmost node. Bounded by the allocation count.
    fn levels(&self) -> Vec<Vec<Node<'_>>> {
        let mut levels: Vec<Vec<Node<'_>>> = Vec::new();
        let budget: usize = self.pool.allocated_nodes();
        let mut seen: usize = 0;
        let mut head: Option<Node<'_>> = self.root_node();

        while let Some(first) = head {
            let mut level: Vec<Node<'_>> = Vec::new();
            let mut current: Option<Node<'_>> = Some(first);
            while let Some(node) = current {
                if seen >= budget {
                    break;
                }
                seen += 1;
                level.push(node);
                current = node.sibling().map(|next| node.at(next));
            }
            levels.push(level);

            head = if first.is_leaf() {
                None
            } else {
                first.leftmost().map(|child| first.at(child))
            };
        }
        levels
    }

    /// Snapshot every level, left to right, holding each node's shared
    /// latch while it is read.
    #[must_use]
    pub fn dump(&self) -> TreeDump {
        let mut total_keys: usize = 0;
        let levels: Vec<Vec<NodeDump>> = self
            .levels()
            .into_iter()
            .map(|level| {
                level
                    .into_iter()
                    .map(|node| {
                        let _latch: RwLockReadGuard<'_, ()> = self.latches.read(node.id());
                        let keys: Vec<u64> =
                            node.live_records().into_iter().map(|(key, _)| key).collect();
                        if node.is_leaf() {
                            total_keys += keys.len();
                        }
                        NodeDump {
                            id: node.id(),
                            keys,
                            sibling: node.sibling(),
                        }
                    })
                    .collect()
            })
            .collect();

        TreeDump { levels, total_keys }
    }

    /// Count nodes and keys. Meant for a quiescent tree.
    #[must_use]
    pub fn stats(&self) -> TreeStats {
        let mut stats = TreeStats {
            height: self.pool.height(),
            allocated_nodes: self.pool.allocated_nodes(),
            allocated_values: self.pool.allocated_values(),
            ..TreeStats::default()
        };

        for node in self.levels().into_iter().flatten() {
            if node.is_leaf() {
                let keys: usize = node.live_records().len();
                stats.leaves += 1;
                stats.keys += keys;
                if keys == 0 {
                    stats.empty_leaves += 1;
                }
            } else {
                stats.internal_nodes += 1;
            }
        }
        stats
    }

    // ========================================================================
    //  Verification
    // ========================================================================

    /// Check the structural invariants of a quiescent tree.
    ///
    /// # Errors
    ///
    /// The first [`InvariantViolation`] found.
    pub fn verify(&self) -> Result<(), InvariantViolation> {
        let Some(root) = self.root_node() else {
            return Ok(());
        };
        let height: u64 = self.pool.height();
        if height != u64::from(root.level()) + 1 {
            return Err(InvariantViolation::Height {
                height,
                root_level: root.level(),
            });
        }

        for level in self.levels() {
            let mut previous: Option<(NodeRef, u64)> = None;
            let mut low: Option<u64> = None;
            for node in level {
                self.verify_node(node, low)?;

                let records: Vec<(u64, u64)> = node.live_records();
                let high: Option<u64> = node.high_key();
                check_range(node, &records, low, high)?;
                low = high;

                if let (Some((left, last)), Some(&(first, _))) = (previous, records.first()) {
                    if first <= last {
                        return Err(InvariantViolation::UnsortedChain {
                            level: node.level(),
                            left,
                            right: node.id(),
                        });
                    }
                }
                if let Some(&(last, _)) = records.last() {
                    previous = Some((node.id(), last));
                }
            }
        }
        Ok(())
    }

    /// Check one node. `low` is the high key of its left neighbour, the
    /// lower bound of everything the node routes to.
    fn verify_node(&self, node: Node<'_>, low: Option<u64>) -> Result<(), InvariantViolation> {
        let id: NodeRef = node.id();
        let level: u32 = node.level();

        if node.count() > self.pool.cardinality() {
            return Err(InvariantViolation::Overfull {
                node: id,
                last_index: node.last_index(),
            });
        }
        if node.is_leaf() == (node.leftmost_raw() != 0) {
            return Err(InvariantViolation::LeftmostMismatch { node: id, level });
        }
        if let Some(sibling) = node.sibling() {
            if !self.pool.is_node(sibling.raw()) {
                return Err(InvariantViolation::Dangling {
                    node: id,
                    raw: sibling.raw(),
                });
            }
        }

        let records: Vec<(u64, u64)> = node.live_records();
        for (slot, pair) in records.windows(2).enumerate() {
            if pair[1].0 <= pair[0].0 {
                return Err(InvariantViolation::UnsortedNode {
                    node: id,
                    slot: slot + 1,
                });
            }
        }

        if node.is_leaf() {
            for &(_, ptr) in &records {
                if !self.pool.is_value(ptr) {
                    return Err(InvariantViolation::Dangling { node: id, raw: ptr });
                }
            }
            return Ok(());
        }

        // Child i covers [separator i-1, separator i); the ends come from the
        // node's own bounds.
        let children = std::iter::once(node.leftmost_raw()).chain(records.iter().map(|&(_, ptr)| ptr));
        for (i, raw) in children.enumerate() {
            let Some(child) = NodeRef::from_raw(raw).filter(|_| self.pool.is_node(raw)) else {
                return Err(InvariantViolation::Dangling { node: id, raw });
            };
            let child: Node<'_> = node.at(child);
            let found: u32 = child.level();
            if found + 1 != level {
                return Err(InvariantViolation::LevelMismatch {
                    parent: id,
                    child: child.id(),
                    expected: level - 1,
                    found,
                });
            }

            let child_low: Option<u64> = if i == 0 { low } else { Some(records[i - 1].0) };
            let child_high: Option<u64> = records.get(i).map(|&(key, _)| key).or_else(|| node.high_key());
            check_range(child, &child.live_records(), child_low, child_high)?;
        }
        Ok(())
    }

    // ========================================================================
    //  Test Support
    // ========================================================================

    /// Overwrite every reachable switch counter with a random value without
    /// the splitting bit.
    ///
    /// Readers must behave identically for any counter value; this shakes out
    /// code that depends on a particular scan direction.
    pub fn randomize_counters<R: Rng + ?Sized>(&self, rng: &mut R) {
        for node in self.levels().into_iter().flatten() {
            let _latch = self.latches.write(node.id());
            node.counter().randomize(rng);
        }
    }
}

/// Every live key of `node` must lie in `[low, high)`.
fn check_range(
    node: Node<'_>,
    records: &[(u64, u64)],
    low: Option<u64>,
    high: Option<u64>,
) -> Result<(), InvariantViolation> {
    let stray: Option<u64> = records
        .iter()
        .map(|&(key, _)| key)
        .find(|&key| low.is_some_and(|l| key < l) || high.is_some_and(|h| key >= h));
    match stray {
        Some(key) => Err(InvariantViolation::KeyOutOfRange {
            node: node.id(),
            key,
            low,
            high,
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use crate::config::PoolConfig;
    use crate::error::InvariantViolation;
    use crate::tree::FastFairTree;

    fn tree_with(keys: impl IntoIterator<Item = u64>) -> FastFairTree {
        let tree = FastFairTree::create(
            PoolConfig::new()
                .with_cardinality(4)
                .with_node_capacity(256)
                .with_value_capacity(1024),
        )
        .unwrap();
        for key in keys {
            tree.insert(key, key).unwrap();
        }
        tree
    }

    #[test]
    fn test_dump_lists_levels() {
        let tree = tree_with([5, 3, 8, 1, 9, 2]);
        let dump = tree.dump();

        assert_eq!(dump.levels.len(), 2);
        assert_eq!(dump.levels[0][0].keys, vec![5]);
        assert_eq!(dump.levels[1][0].keys, vec![1, 2, 3]);
        assert_eq!(dump.levels[1][1].keys, vec![5, 8, 9]);
        assert_eq!(dump.total_keys, 6);

        let text = dump.to_string();
        assert!(text.starts_with("level 1:"), "{text}");
        assert!(text.ends_with("total keys: 6"), "{text}");
    }

    #[test]
    fn test_stats_counts_empty_leaves() {
        let tree = tree_with(1..=8);
        for key in 3..=4 {
            tree.delete(key);
        }
        let stats = tree.stats();

        assert_eq!(stats.height, 2);
        assert_eq!(stats.leaves, 3);
        assert_eq!(stats.internal_nodes, 1);
        assert_eq!(stats.empty_leaves, 1);
        assert_eq!(stats.keys, 6);
    }

    #[test]
    fn test_verify_detects_height_mismatch() {
        let tree = tree_with(1..=10);
        tree.verify().unwrap();

        tree.pool().set_height(1);
        assert_eq!(
            tree.verify(),
            Err(InvariantViolation::Height {
                height: 1,
                root_level: 1,
            })
        );
    }

    #[test]
    fn test_verify_detects_key_outside_node_range() {
        // Leaves [1,2] [3,4] [5,6,7,8] under root [3,5].
        let tree = tree_with(1..=8);
        tree.verify().unwrap();

        let root = tree.root_node().unwrap();
        let first = root.at(root.leftmost().unwrap());
        assert_eq!(first.high_key(), Some(3));

        let cell = tree.pool().alloc_value(40).unwrap();
        let mut guard = first.lock(&tree.latches);
        guard.insert_key(4, cell.raw());
        drop(guard);

        assert_eq!(
            tree.verify(),
            Err(InvariantViolation::KeyOutOfRange {
                node: first.id(),
                key: 4,
                low: None,
                high: Some(3),
            })
        );
    }

    #[test]
    fn test_verify_detects_key_outside_parent_slot() {
        let tree = tree_with(1..=8);
        let root = tree.root_node().unwrap();
        let (_, middle) = root.live_records()[0];
        let middle = root.at(crate::handle::NodeRef::from_raw(middle).unwrap());

        // Fence intact, but the key sits below the parent's separator 3.
        let cell = tree.pool().alloc_value(20).unwrap();
        let mut guard = middle.lock(&tree.latches);
        guard.insert_key(2, cell.raw());
        drop(guard);

        assert!(matches!(
            tree.verify(),
            Err(InvariantViolation::KeyOutOfRange {
                key: 2,
                low: Some(3),
                ..
            })
        ));
    }

    #[test]
    fn test_randomized_counters_do_not_change_answers() {
        let tree = tree_with((0..100).map(|k| k * 3));
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..4 {
            tree.randomize_counters(&mut rng);
            for key in 0..100 {
                assert_eq!(tree.search(key * 3), Some(key * 3));
                assert_eq!(tree.search(key * 3 + 1), None);
            }
            assert_eq!(tree.range_scan(0, 30, 100).len(), 11);
        }

        // Writers still work after the perturbation.
        tree.insert(1, 1).unwrap();
        assert_eq!(tree.delete(3), Some(3));
        tree.verify().unwrap();
    }
}
