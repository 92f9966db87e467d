//! # `fastfair`
//!
//! A concurrent, crash-consistent B+tree for byte-addressable persistent
//! memory, following the FAST-FAIR design.
//!
//! - **FAST** (Failure-Atomic ShifT): records are shifted in place one entry
//!   at a time. Every intermediate state is a valid node in which duplicated
//!   entries (*shadows*) are recognised and skipped, so no logging is needed.
//! - **FAIR** (Failure-Atomic In-place Rebalance): a split fills and persists
//!   the new sibling first, links it, and only then cuts the left node. A
//!   crash at any point leaves every key reachable.
//!
//! Readers never latch: they validate against a per-node switch counter whose
//! low bit announces the scan direction. Writers take a per-node exclusive
//! latch.
//!
//! ## Status
//!
//! | Feature | Status |
//! |---------|--------|
//! | Concurrent search / range scan | Works (latch-free, counter-validated) |
//! | Concurrent insert / delete | Works (per-node latches) |
//! | Split propagation, root growth | Works |
//! | Crash recovery | Works (shadow compaction, split repair, root heal) |
//! | Merge / redistribution | Not implemented (underflow is tolerated) |
//! | Memory reclamation | None (nodes and value cells are never freed) |
//!
//! ## Persistence Model
//!
//! The tree lives in a [`PmemPool`]: an arena of `AtomicU64` words next to a
//! *media image* that only changes on [`PmemPool::persist`]. Tests cut power
//! with [`PmemPool::arm_crash_after`] and reopen the result of
//! [`PmemPool::crash_image`] with [`FastFairTree::open`].
//!
//! ```rust
//! use fastfair::{FastFairTree, PoolConfig};
//!
//! let tree = FastFairTree::create(PoolConfig::new().with_cardinality(8)).unwrap();
//! for key in 0..100 {
//!     tree.insert(key, key * 2).unwrap();
//! }
//! assert_eq!(tree.range_scan(10, 13, 10), vec![20, 22, 24, 26]);
//! assert_eq!(tree.delete(10), Some(20));
//!
//! let recovered = FastFairTree::open(tree.pool().crash_image()).unwrap();
//! assert_eq!(recovered.search(10), None);
//! assert_eq!(recovered.search(11), Some(22));
//! recovered.verify().unwrap();
//! ```
//!
//! ## Thread Safety
//!
//! `FastFairTree` is `Send + Sync`; every operation takes `&self`.

#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod config;
pub mod error;
pub mod handle;
pub mod latch;
pub mod node;
pub mod ordering;
pub mod pool;
pub mod tree;
pub mod version;

mod tracing_helpers;

// Re-export main types for convenience
pub use config::PoolConfig;
pub use error::{ConfigError, InvariantViolation, PoolError, TreeError};
pub use handle::{NodeRef, ValueRef};
pub use node::InternalRemoval;
pub use pool::PmemPool;
pub use tree::{
    DebugCounters, FastFairTree, RecoveryReport, TreeDump, TreeStats, get_debug_counters,
    reset_debug_counters,
};
