//! Benchmarks for `SwitchCounter` using Divan.
//!
//! Run with: `cargo bench --bench version`

use std::sync::atomic::AtomicU64;

use divan::{Bencher, black_box};
use fastfair::version::{COUNTER_LOWBIT, SwitchCounter};

fn main() {
    divan::main();
}

// =============================================================================
// Reader Side (hot path)
// =============================================================================

#[divan::bench_group]
mod reader {
    use super::{AtomicU64, Bencher, SwitchCounter, black_box};

    #[divan::bench]
    fn stable(bencher: Bencher) {
        let word = AtomicU64::new(0);
        let counter = SwitchCounter::new(&word);
        bencher.bench_local(|| black_box(&counter).stable());
    }

    #[divan::bench]
    fn stable_then_validate(bencher: Bencher) {
        let word = AtomicU64::new(0);
        let counter = SwitchCounter::new(&word);
        bencher.bench_local(|| {
            let v = black_box(&counter).stable();
            black_box(counter.has_changed(v))
        });
    }

    #[divan::bench]
    fn is_forward(bencher: Bencher) {
        bencher.bench_local(|| SwitchCounter::is_forward(black_box(0x1234)));
    }
}

// =============================================================================
// Writer Side
// =============================================================================

#[divan::bench_group]
mod writer {
    use super::{AtomicU64, Bencher, SwitchCounter, black_box};

    #[divan::bench]
    fn same_direction(bencher: Bencher) {
        let word = AtomicU64::new(0);
        let counter = SwitchCounter::new(&word);
        bencher.bench_local(|| {
            let mut guard = black_box(&counter).begin();
            guard.mark_forward();
        });
    }

    #[divan::bench]
    fn alternating_direction(bencher: Bencher) {
        let word = AtomicU64::new(0);
        let counter = SwitchCounter::new(&word);
        bencher.bench_local(|| {
            let mut guard = black_box(&counter).begin();
            guard.mark_backward();
            guard.mark_forward();
        });
    }

    #[divan::bench]
    fn split(bencher: Bencher) {
        let word = AtomicU64::new(0);
        let counter = SwitchCounter::new(&word);
        bencher.bench_local(|| {
            let mut guard = black_box(&counter).begin();
            guard.mark_split();
        });
    }

    #[divan::bench]
    fn normalize(bencher: Bencher) {
        bencher
            .with_inputs(|| AtomicU64::new(COUNTER_LOWBIT | 1))
            .bench_local_refs(|word| SwitchCounter::new(word).normalize());
    }
}

// =============================================================================
// Contention
// =============================================================================

#[divan::bench(threads = [1, 2, 4, 8])]
fn contended_stable(bencher: Bencher<'_, '_>) {
    let word = AtomicU64::new(0);
    bencher.bench(|| black_box(SwitchCounter::new(&word).stable()));
}
