//! Filepath: src/version.rs
//!
//! Switch counter for optimistic node reads.
//!
//! Every node carries one durable `u64` word packing a splitting flag, a scan
//! direction and a change counter. Readers never take the node latch; they
//! validate against the counter instead.
//!
//! # Concurrency Model
//! 1. Readers: call `stable()`, scan the node, call `has_changed()`. On change, rescan.
//! 2. Writers: hold the node latch, call `begin()` to get a [`SwitchGuard`],
//!    announce the direction of the in-place shift (or a split), let the guard drop.
//!
//! In-place inserts shift records right and removes shift left. A reader that
//! scans in the same direction as the shift sees every live record exactly
//! once, so only a *change* of direction bumps the counter. A split sets the
//! splitting bit, which is the only state readers wait on.
//!
//! ```rust,ignore
//! let _latch = latches.write(node);
//! let mut guard = SwitchCounter::new(word).begin();
//! guard.mark_forward();
//! // shift records right
//! // guard drops; counter unchanged unless the direction flipped
//! ```

use std::hint;
use std::marker::PhantomData;
use std::sync::atomic::AtomicU64;
use std::thread;

use rand::Rng;

use crate::ordering::{RELAXED, UNLOCK_ORD, VERSION_ORD};

// ============================================================================
//  Bit Constants
// ============================================================================

/// Splitting bit: a structural change is in progress (counter is odd).
pub const SPLITTING_BIT: u64 = 1 << 0;

/// Direction bit: the last in-place shift moved records left (remove).
pub const BACKWARD_BIT: u64 = 1 << 1;

/// Low bit of the change counter.
pub const COUNTER_LOWBIT: u64 = 1 << 2;

/// Spins before a waiting reader starts yielding.
const SPIN_LIMIT: u32 = 64;

// ============================================================================
//  SwitchCounter
// ============================================================================

/// View of a node's switch counter word.
///
/// # Layout
/// Bits 2-63: change counter | Bit 1: backward | Bit 0: splitting
///
/// # Example
///
/// ```rust
/// use std::sync::atomic::AtomicU64;
/// use fastfair::version::SwitchCounter;
///
/// let word = AtomicU64::new(0);
/// let counter = SwitchCounter::new(&word);
///
/// let before = counter.stable();
/// counter.begin().mark_backward();
/// assert!(counter.has_changed(before));
/// assert!(!SwitchCounter::is_forward(counter.stable()));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct SwitchCounter<'a> {
    word: &'a AtomicU64,
}

// ============================================================================
//  SwitchGuard (Type-State Pattern)
// ============================================================================

/// Proof that the caller is the single writer of a node.
///
/// Only obtainable from [`SwitchCounter::begin`], which callers invoke while
/// holding the node latch. On drop a pending split is finished: the splitting
/// bit is cleared and the counter advances, so every reader that overlapped
/// the split rescans.
///
/// Guards are `!Send` and `!Sync` via `PhantomData<*mut ()>`.
#[derive(Debug)]
#[must_use = "dropping the guard immediately ends the modification"]
pub struct SwitchGuard<'a> {
    counter: SwitchCounter<'a>,
    value: u64,
    _marker: PhantomData<*mut ()>,
}

impl Drop for SwitchGuard<'_> {
    fn drop(&mut self) {
        if self.value & SPLITTING_BIT != 0 {
            let done: u64 = (self.value & !SPLITTING_BIT).wrapping_add(COUNTER_LOWBIT);
            self.counter.word.store(done, UNLOCK_ORD);
        }
    }
}

impl SwitchGuard<'_> {
    /// Counter value as last written by this guard.
    #[inline]
    #[must_use]
    pub const fn value(&self) -> u64 {
        self.value
    }

    fn publish(&mut self, value: u64) {
        self.value = value;
        self.counter.word.store(value, UNLOCK_ORD);
    }

    /// Announce a right shift (insert). Bumps the counter only if the previous
    /// shift went the other way.
    #[inline]
    pub fn mark_forward(&mut self) {
        if self.value & BACKWARD_BIT != 0 {
            self.publish((self.value & !BACKWARD_BIT).wrapping_add(COUNTER_LOWBIT));
        }
    }

    /// Announce a left shift (remove). Bumps the counter only if the previous
    /// shift went the other way.
    #[inline]
    pub fn mark_backward(&mut self) {
        if self.value & BACKWARD_BIT == 0 {
            self.publish((self.value | BACKWARD_BIT).wrapping_add(COUNTER_LOWBIT));
        }
    }

    /// Announce a structural change. Readers wait until the guard drops.
    #[inline]
    pub fn mark_split(&mut self) {
        if self.value & SPLITTING_BIT == 0 {
            self.publish(self.value | SPLITTING_BIT);
        }
    }

    /// Whether a split is pending on this guard.
    #[inline]
    #[must_use]
    pub const fn is_splitting(&self) -> bool {
        self.value & SPLITTING_BIT != 0
    }
}

impl<'a> SwitchCounter<'a> {
    /// Wrap a counter word.
    #[inline]
    #[must_use]
    pub const fn new(word: &'a AtomicU64) -> Self {
        Self { word }
    }

    /// Raw counter value.
    #[inline]
    #[must_use]
    pub fn value(&self) -> u64 {
        self.word.load(VERSION_ORD)
    }

    /// Whether a split is in progress.
    #[inline]
    #[must_use]
    pub fn is_splitting(&self) -> bool {
        self.value() & SPLITTING_BIT != 0
    }

    /// Whether readers should scan forward for counter value `v`.
    #[inline]
    #[must_use]
    pub const fn is_forward(v: u64) -> bool {
        v & BACKWARD_BIT == 0
    }

    // ========================================================================
    //  Stable Version (for optimistic reads)
    // ========================================================================

    /// A counter value with the splitting bit clear.
    ///
    /// Spins while a split is in progress, then yields. In-place inserts and
    /// removes never make a reader wait.
    #[inline]
    #[must_use]
    pub fn stable(&self) -> u64 {
        let mut spins: u32 = 0;
        loop {
            let value: u64 = self.word.load(VERSION_ORD);
            if value & SPLITTING_BIT == 0 {
                return value;
            }

            if spins < SPIN_LIMIT {
                spins += 1;
                hint::spin_loop();
            } else {
                thread::yield_now();
            }
        }
    }

    /// Whether anything changed since `old` was read.
    #[inline]
    #[must_use]
    pub fn has_changed(&self, old: u64) -> bool {
        self.word.load(VERSION_ORD) != old
    }

    // ========================================================================
    //  Writer Side
    // ========================================================================

    /// Start a modification. Callers must hold the node latch.
    #[inline]
    pub fn begin(&self) -> SwitchGuard<'a> {
        SwitchGuard {
            counter: *self,
            value: self.word.load(RELAXED),
            _marker: PhantomData,
        }
    }

    /// Clear a splitting bit left behind by a crash, advancing the counter.
    ///
    /// Returns `true` if the word was rewritten.
    pub fn normalize(&self) -> bool {
        let value: u64 = self.word.load(RELAXED);
        if value & SPLITTING_BIT == 0 {
            return false;
        }
        let clean: u64 = (value & !SPLITTING_BIT).wrapping_add(COUNTER_LOWBIT);
        self.word.store(clean, UNLOCK_ORD);
        true
    }

    /// Overwrite the counter with a random even value.
    pub fn randomize<R: Rng + ?Sized>(&self, rng: &mut R) {
        let value: u64 = rng.r#gen::<u64>() & !SPLITTING_BIT;
        self.word.store(value, UNLOCK_ORD);
    }
}
