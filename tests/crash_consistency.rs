//! Crash-injection tests.
//!
//! For a single mutation, count the persists it issues, then replay it once
//! per crash point: the pool drops every persist after the k-th, the media
//! image is reopened, and the recovered tree must hold exactly the mapping
//! from before or from after the mutation and pass `verify`.

#![expect(clippy::unwrap_used, reason = "fail fast in tests")]

mod common;

use std::collections::BTreeMap;

use fastfair::{FastFairTree, PoolConfig};

fn crash_config() -> PoolConfig {
    PoolConfig::new()
        .with_cardinality(4)
        .with_node_capacity(256)
        .with_value_capacity(1024)
}

fn tree_with(keys: impl IntoIterator<Item = u64>) -> FastFairTree {
    let tree = FastFairTree::create(crash_config()).unwrap();
    for key in keys {
        tree.insert(key, key * 10).unwrap();
    }
    tree
}

/// Replay `op` against `base` with a crash after every persist it issues.
/// Returns the number of crash points checked.
fn check_every_crash_point(base: &FastFairTree, op: impl Fn(&FastFairTree)) -> u64 {
    common::init_tracing();
    let pre: BTreeMap<u64, u64> = common::snapshot(base);

    let dry_run = FastFairTree::open(base.pool().crash_image()).unwrap();
    let start = dry_run.pool().persist_count();
    op(&dry_run);
    let total = dry_run.pool().persist_count() - start;
    let post: BTreeMap<u64, u64> = common::snapshot(&dry_run);
    assert_ne!(total, 0, "mutation issued no persists");

    for k in 0..=total {
        let tree = FastFairTree::open(base.pool().crash_image()).unwrap();
        tree.pool().arm_crash_after(k);
        op(&tree);

        let recovered = FastFairTree::open(tree.pool().crash_image()).unwrap();
        let state = common::snapshot(&recovered);
        assert!(
            state == pre || state == post,
            "crash after {k}/{total} persists: {state:?}\npre:  {pre:?}\npost: {post:?}\n{}",
            recovered.dump()
        );
        if let Err(violation) = recovered.verify() {
            panic!(
                "crash after {k}/{total} persists: {violation}\n{}",
                recovered.dump()
            );
        }
        for (&key, &value) in &state {
            assert_eq!(recovered.search(key), Some(value), "crash point {k}");
        }

        // The recovered tree is writable.
        recovered.insert(1_000_000, 1).unwrap();
        assert_eq!(recovered.search(1_000_000), Some(1));
        recovered.verify().unwrap();
    }
    total
}

#[test]
fn crash_during_in_place_insert() {
    let base = tree_with([10, 20, 30]);
    check_every_crash_point(&base, |tree| tree.insert(5, 50).unwrap());
}

#[test]
fn crash_during_append_insert() {
    let base = tree_with([10, 20, 30]);
    check_every_crash_point(&base, |tree| tree.insert(40, 400).unwrap());
}

#[test]
fn crash_during_overwrite() {
    let base = tree_with([10, 20, 30]);
    check_every_crash_point(&base, |tree| tree.insert(20, 999).unwrap());
}

#[test]
fn crash_during_root_split_new_key_right() {
    let base = tree_with([1, 2, 3, 4]);
    check_every_crash_point(&base, |tree| tree.insert(5, 50).unwrap());
}

#[test]
fn crash_during_root_split_new_key_left() {
    let base = tree_with([1, 2, 3, 4]);
    check_every_crash_point(&base, |tree| tree.insert(0, 7).unwrap());
}

#[test]
fn crash_during_leaf_split_below_root() {
    // Leaves [1,2] [3,4] [5,6,7,8].
    let base = tree_with(1..=8);
    check_every_crash_point(&base, |tree| tree.insert(9, 90).unwrap());
}

#[test]
fn crash_during_cascading_splits() {
    // Some of these inserts split an internal node and grow the root.
    for n in 8..40 {
        let base = tree_with(0..n);
        check_every_crash_point(&base, move |tree| tree.insert(n, n).unwrap());
    }
}

#[test]
fn crash_during_descending_splits() {
    for n in 8..30 {
        let base = tree_with((0..n).map(|k| 1_000 - k));
        check_every_crash_point(&base, move |tree| tree.insert(1_000 - n, 1).unwrap());
    }
}

#[test]
fn crash_during_remove() {
    let base = tree_with([10, 20, 30, 40]);
    for key in [10, 20, 40] {
        check_every_crash_point(&base, move |tree| {
            tree.delete(key);
        });
    }
}

#[test]
fn crash_during_remove_in_multi_level_tree() {
    let base = tree_with(0..30);
    for key in [0, 13, 29] {
        check_every_crash_point(&base, move |tree| {
            tree.delete(key);
        });
    }
}

#[test]
fn crash_during_recovery_is_recoverable() {
    let base = tree_with([1, 2, 3, 4]);

    // Leave a torn split behind, then crash inside recovery itself.
    let torn = FastFairTree::open(base.pool().crash_image()).unwrap();
    torn.pool().arm_crash_after(6);
    torn.insert(5, 50).unwrap();
    let image = torn.pool().crash_image();

    let mut k = 0;
    loop {
        let attempt = image.crash_image();
        attempt.arm_crash_after(k);
        let partial = FastFairTree::open(attempt).unwrap();
        let recovered = FastFairTree::open(partial.pool().crash_image()).unwrap();

        let state = common::snapshot(&recovered);
        assert!(state.len() == 4 || state.len() == 5, "{state:?}");
        recovered.verify().unwrap();

        // Stop once recovery ran to completion without a crash.
        if partial.pool().persist_count() <= k {
            break;
        }
        k += 1;
    }
}
