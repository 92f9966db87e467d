//! Error types.
//!
//! Only fatal conditions cross the public boundary: allocator exhaustion,
//! an unusable pool image, or a bad configuration. Lost races are absorbed by
//! the tree's retry loop and a missing key is an ordinary `None`.

use thiserror::Error;

use crate::handle::NodeRef;

/// Errors raised by the persistent pool.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    /// Every node slot has been handed out.
    #[error("node arena exhausted ({capacity} nodes)")]
    NodesExhausted {
        /// Configured node capacity.
        capacity: usize,
    },

    /// Every value cell has been handed out.
    #[error("value arena exhausted ({capacity} cells)")]
    ValuesExhausted {
        /// Configured value capacity.
        capacity: usize,
    },

    /// The superblock does not carry the pool magic.
    #[error("pool is not formatted (magic {found:#018x})")]
    NotFormatted {
        /// Magic word found in the image.
        found: u64,
    },

    /// The image was formatted with a different node cardinality.
    #[error("pool cardinality {found} does not match configured {expected}")]
    CardinalityMismatch {
        /// Cardinality requested by the caller.
        expected: usize,
        /// Cardinality recorded in the image.
        found: usize,
    },

    /// The superblock has no root node.
    #[error("pool has no root node")]
    MissingRoot,

    /// The pool configuration was rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Configuration validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Nodes need room for at least three records so both halves of a split
    /// stay non-empty.
    #[error("cardinality {value} is outside {min}..={max}")]
    Cardinality {
        /// Requested cardinality.
        value: usize,
        /// Smallest accepted value.
        min: usize,
        /// Largest accepted value.
        max: usize,
    },

    /// A capacity was zero or too large to address.
    #[error("{name} capacity {value} is outside 1..={max}")]
    Capacity {
        /// Which arena.
        name: &'static str,
        /// Requested capacity.
        value: usize,
        /// Largest accepted value.
        max: usize,
    },

    /// An environment override could not be parsed.
    #[error("environment variable {var} has invalid value {value:?}")]
    Env {
        /// Variable name.
        var: &'static str,
        /// Raw value.
        value: String,
    },
}

/// Errors returned by tree operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    /// Allocation or pool-image failure. Unrecoverable for this tree.
    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// Structural problems found by [`FastFairTree::verify`](crate::FastFairTree::verify).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    /// Live keys inside one node are not strictly increasing.
    #[error("node {node} keys out of order at slot {slot}")]
    UnsortedNode {
        /// Offending node.
        node: NodeRef,
        /// Slot of the first out-of-order key.
        slot: usize,
    },

    /// Keys along a level are not strictly increasing across siblings.
    #[error("level {level} keys out of order between {left} and {right}")]
    UnsortedChain {
        /// Level of the chain.
        level: u32,
        /// Left node.
        left: NodeRef,
        /// Right node.
        right: NodeRef,
    },

    /// A leaf carries a leftmost pointer or an internal node lacks one.
    #[error("node {node} at level {level} has inconsistent leftmost pointer")]
    LeftmostMismatch {
        /// Offending node.
        node: NodeRef,
        /// Its level.
        level: u32,
    },

    /// A child sits at the wrong level below its parent.
    #[error("node {child} below {parent} has level {found}, expected {expected}")]
    LevelMismatch {
        /// Parent node.
        parent: NodeRef,
        /// Child node.
        child: NodeRef,
        /// Level the child should have.
        expected: u32,
        /// Level found.
        found: u32,
    },

    /// `last_index` exceeds the node capacity.
    #[error("node {node} last_index {last_index} exceeds capacity")]
    Overfull {
        /// Offending node.
        node: NodeRef,
        /// Stored last index.
        last_index: isize,
    },

    /// A reference points outside the allocated arena.
    #[error("dangling reference {raw:#x} in node {node}")]
    Dangling {
        /// Node holding the reference.
        node: NodeRef,
        /// Raw handle value.
        raw: u64,
    },

    /// A live key lies outside the range its node is responsible for: the
    /// parent's slot for it, or its neighbour's high key up to its own.
    #[error("node {node} holds key {key} outside [{low:?}, {high:?})")]
    KeyOutOfRange {
        /// Offending node.
        node: NodeRef,
        /// The stray key.
        key: u64,
        /// Inclusive lower bound, `None` for unbounded.
        low: Option<u64>,
        /// Exclusive upper bound, `None` for unbounded.
        high: Option<u64>,
    },

    /// The stored height disagrees with the root level.
    #[error("height {height} does not match root level {root_level}")]
    Height {
        /// Durable height.
        height: u64,
        /// Level of the root node.
        root_level: u32,
    },
}
