//! Open-time recovery.
//!
//! Traversal is correct on any crash image: shadows are skipped, split
//! leftovers sit at or above the high key, and a missing separator is
//! covered by the sibling chain. Recovery restores writer hygiene so that
//! in-place shifts, splits and `verify` see clean nodes again:
//!
//! 1. every switch counter loses its splitting bit (no writer survived);
//! 2. records a split left behind in the left node are trimmed;
//! 3. shadow slots are squeezed out with ordinary crash-safe left shifts;
//! 4. the stored height is matched to the root's level;
//! 5. a root that gained right siblings before the new root was installed
//!    gets that root now.
//!
//! Every repair is itself a sequence of persisted steps that maps to the same
//! set of live records, so a crash during recovery is recovered the same way.

use crate::error::TreeError;
use crate::handle::NodeRef;
use crate::node::{Node, NodeGuard};
use crate::tracing_helpers::{debug_log, info_log, warn_log};

use super::FastFairTree;
use super::root_creation::RootCreation;

/// What the last recovery pass changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Nodes reached from the root.
    pub nodes_visited: usize,
    /// Switch counters whose splitting bit was cleared.
    pub counters_reset: usize,
    /// Shadow slots removed.
    pub shadows_compacted: usize,
    /// Records dropped from the left half of an interrupted split.
    pub records_trimmed: usize,
    /// Whether the stored height was rewritten.
    pub height_repaired: bool,
    /// Whether a new root was installed over a chain of root-level siblings.
    pub root_healed: bool,
}

impl FastFairTree {
    /// Run every repair step on the pool this tree was opened on.
    ///
    /// # Errors
    ///
    /// [`TreeError::Pool`] if the root heal cannot allocate its node.
    pub(crate) fn recover(&self) -> Result<RecoveryReport, TreeError> {
        let mut report = RecoveryReport::default();
        let Some(root) = self.root_node() else {
            return Ok(report);
        };
        let budget: usize = self.pool.allocated_nodes();

        let mut head: Option<Node<'_>> = Some(root);
        let mut root_chain: Vec<Node<'_>> = Vec::new();

        while let Some(first) = head {
            let mut current: Option<Node<'_>> = Some(first);
            while let Some(node) = current {
                if report.nodes_visited >= budget {
                    warn_log!(budget, "node walk exceeded allocation count, stopping");
                    break;
                }
                report.nodes_visited += 1;

                self.repair_node(node, &mut report);
                if first.id() == root.id() {
                    root_chain.push(node);
                }
                current = node.sibling().map(|next| node.at(next));
            }
            head = if first.is_leaf() {
                None
            } else {
                first.leftmost().map(|child| first.at(child))
            };
        }

        let expected: u64 = u64::from(root.level()) + 1;
        if self.pool.height() != expected {
            warn_log!(stored = self.pool.height(), expected, "height repaired");
            self.pool.set_height(expected);
            report.height_repaired = true;
        }

        if root_chain.len() > 1 {
            report.root_healed = self.heal_root(&root_chain)?;
        }

        info_log!(?report, "recovery finished");
        Ok(report)
    }

    /// Clean one node.
    fn repair_node(&self, node: Node<'_>, report: &mut RecoveryReport) {
        if node.counter().normalize() {
            report.counters_reset += 1;
        }

        let mut guard: NodeGuard<'_> = node.lock(&self.latches);
        let cardinality: usize = self.pool.cardinality();
        if guard.count() > cardinality {
            warn_log!(node = %node.id(), count = guard.count(), "last_index clamped");
            guard.set_count(cardinality);
            guard.persist_header();
        }

        trim_split_leftovers(&mut guard, report);

        let mut slot: usize = 0;
        while slot < guard.count() {
            if guard.is_live(slot) {
                slot += 1;
            } else {
                guard.remove_slot(slot);
                report.shadows_compacted += 1;
            }
        }
    }

    /// Install a root over `chain` (the old root and its right siblings),
    /// using each node's high key as the separator for the next one.
    ///
    /// Skipped when the chain does not fit in one node; the siblings stay
    /// reachable through the chain.
    fn heal_root(&self, chain: &[Node<'_>]) -> Result<bool, TreeError> {
        let cardinality: usize = self.pool.cardinality();
        if chain.len() - 1 > cardinality {
            warn_log!(siblings = chain.len() - 1, "root chain too long to heal");
            return Ok(false);
        }

        let records: Vec<(u64, NodeRef)> = chain
            .iter()
            .filter_map(|node| node.fence())
            .map(|(sibling, high_key)| (high_key, sibling))
            .collect();

        let old_root: Node<'_> = chain[0];
        RootCreation::install(&self.pool, old_root.id(), &records, old_root.level() + 1)?;
        debug_log!(old = %old_root.id(), children = records.len() + 1, "root healed");
        Ok(true)
    }
}

/// Drop the records a split copied to the sibling but had not yet cut from
/// this node: every slot from the first key at or above the high key. For an
/// internal node that first key is the separator itself, whose child became
/// the sibling's `leftmost_ptr`.
fn trim_split_leftovers(guard: &mut NodeGuard<'_>, report: &mut RecoveryReport) {
    let Some(high_key) = guard.high_key() else {
        return;
    };
    let count: usize = guard.count();
    let Some(cut) = (0..count).find(|&i| guard.key(i) >= high_key) else {
        return;
    };

    guard.set_count(cut);
    guard.persist_header();
    report.records_trimmed += count - cut;
    debug_log!(node = %guard.id(), cut, trimmed = count - cut, "split leftovers trimmed");
}
