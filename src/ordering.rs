//! Standard memory orderings for pool word access.
//!
//! Every durable field is an `AtomicU64` word in the pool. These constants
//! keep the orderings consistent across the node, pool and tree code and
//! make the intent clear at each access point.

use std::sync::atomic::Ordering;

/// Ordering for reading node words during optimistic traversal.
/// Pairs with writer's Release stores.
pub const READ_ORD: Ordering = Ordering::Acquire;

/// Ordering for writing node words under the node latch.
/// Pairs with reader's Acquire loads.
pub const WRITE_ORD: Ordering = Ordering::Release;

/// Ordering for allocation cursors (`fetch_add` on the superblock).
pub const ALLOC_ORD: Ordering = Ordering::AcqRel;

/// Ordering for relaxed loads (within a latched region, or counters).
pub const RELAXED: Ordering = Ordering::Relaxed;

/// Ordering for switch counter loads in `stable()` and `has_changed()`.
/// Must see splitting-bit updates.
pub const VERSION_ORD: Ordering = Ordering::Acquire;

/// Ordering for switch counter stores that end a modification.
/// Must be visible to spinning readers.
pub const UNLOCK_ORD: Ordering = Ordering::Release;

/// Ordering for copying words into the media image on persist.
pub const MEDIA_ORD: Ordering = Ordering::SeqCst;
