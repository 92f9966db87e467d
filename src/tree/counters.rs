//! Process-wide debug counters.
//!
//! Relaxed atomics bumped on the slow paths (retries, splits, sibling
//! redirects, root changes). They are shared by every tree in the process,
//! so tests that assert on them should compare deltas.

use std::sync::atomic::AtomicU64;

use crate::ordering::RELAXED;

/// Operations restarted from the root after a `Conflict`.
pub static RETRY_COUNT: AtomicU64 = AtomicU64::new(0);

/// Node splits.
pub static SPLIT_COUNT: AtomicU64 = AtomicU64::new(0);

/// Moves to a right sibling because the key was past the boundary.
pub static REDIRECT_COUNT: AtomicU64 = AtomicU64::new(0);

/// Root growths, collapses and heals.
pub static ROOT_CHANGE_COUNT: AtomicU64 = AtomicU64::new(0);

/// Snapshot of the debug counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DebugCounters {
    /// See [`RETRY_COUNT`].
    pub retries: u64,
    /// See [`SPLIT_COUNT`].
    pub splits: u64,
    /// See [`REDIRECT_COUNT`].
    pub redirects: u64,
    /// See [`ROOT_CHANGE_COUNT`].
    pub root_changes: u64,
}

impl DebugCounters {
    #[inline]
    pub(crate) fn record_retry() {
        RETRY_COUNT.fetch_add(1, RELAXED);
    }

    #[inline]
    pub(crate) fn record_split() {
        SPLIT_COUNT.fetch_add(1, RELAXED);
    }

    #[inline]
    pub(crate) fn record_redirect() {
        REDIRECT_COUNT.fetch_add(1, RELAXED);
    }

    #[inline]
    pub(crate) fn record_root_change() {
        ROOT_CHANGE_COUNT.fetch_add(1, RELAXED);
    }

    /// Counter growth from `earlier` to `self`.
    #[must_use]
    pub const fn since(&self, earlier: &Self) -> Self {
        Self {
            retries: self.retries.wrapping_sub(earlier.retries),
            splits: self.splits.wrapping_sub(earlier.splits),
            redirects: self.redirects.wrapping_sub(earlier.redirects),
            root_changes: self.root_changes.wrapping_sub(earlier.root_changes),
        }
    }
}

/// Read every counter.
#[must_use]
pub fn get_debug_counters() -> DebugCounters {
    DebugCounters {
        retries: RETRY_COUNT.load(RELAXED),
        splits: SPLIT_COUNT.load(RELAXED),
        redirects: REDIRECT_COUNT.load(RELAXED),
        root_changes: ROOT_CHANGE_COUNT.load(RELAXED),
    }
}

/// Zero every counter.
pub fn reset_debug_counters() {
    RETRY_COUNT.store(0, RELAXED);
    SPLIT_COUNT.store(0, RELAXED);
    REDIRECT_COUNT.store(0, RELAXED);
    ROOT_CHANGE_COUNT.store(0, RELAXED);
}
