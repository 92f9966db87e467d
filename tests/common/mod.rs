//! Shared helpers for integration tests: log capture, pool geometries and
//! tree snapshots.
//!
//! ```rust,ignore
//! mod common;
//!
//! #[test]
//! fn my_test() {
//!     common::init_tracing();
//!     let tree = common::small_tree();
//!     // ...
//! }
//! ```
//!
//! Library events only exist in builds with `--features tracing`. They are
//! filtered by `RUST_LOG` (default `warn`) and written twice: compact lines
//! on stderr (disable with `FASTFAIR_LOG_CONSOLE=0`) and NDJSON appended to
//! `$FASTFAIR_LOG_DIR/fastfair.jsonl` (default directory `logs/`).
//!
//! ```bash
//! # Splits and root changes from the last stress run
//! jq 'select(.fields.message | test("split|root"))' logs/fastfair.jsonl
//! ```

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::env;
use std::fs::{self, File, OpenOptions};
use std::path::PathBuf;
use std::sync::{Mutex, Once};

use fastfair::{FastFairTree, PoolConfig};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

const LOG_FILE: &str = "fastfair.jsonl";
const DEFAULT_FILTER: &str = "warn";

static INIT: Once = Once::new();

// ============================================================================
//  Tracing
// ============================================================================

/// Install the test subscriber. Only the first call in a process does
/// anything; a subscriber installed elsewhere wins silently.
pub fn init_tracing() {
    INIT.call_once(install_subscriber);
}

fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

fn log_dir() -> PathBuf {
    env::var_os("FASTFAIR_LOG_DIR").map_or_else(|| PathBuf::from("logs"), PathBuf::from)
}

fn console_enabled() -> bool {
    !env::var("FASTFAIR_LOG_CONSOLE").is_ok_and(|v| v == "0")
}

/// Log file in append mode: nextest runs every test in its own process.
fn open_log_file() -> Option<File> {
    let dir: PathBuf = log_dir();
    fs::create_dir_all(&dir).ok()?;
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join(LOG_FILE))
        .ok()
}

fn install_subscriber() {
    let console = console_enabled().then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_thread_ids(true)
            .with_target(true)
            .compact()
            .with_filter(filter())
    });

    let file = open_log_file().map(|file| {
        tracing_subscriber::fmt::layer()
            .with_writer(Mutex::new(file))
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .with_span_events(FmtSpan::CLOSE)
            .json()
            .with_filter(filter())
    });

    let _ = Registry::default().with(console).with(file).try_init();
}

// ============================================================================
//  Trees
// ============================================================================

/// Geometry that splits often: four records per node.
pub fn small_config() -> PoolConfig {
    PoolConfig::new()
        .with_cardinality(4)
        .with_node_capacity(1 << 12)
        .with_value_capacity(1 << 14)
}

/// Empty tree with [`small_config`].
#[expect(clippy::expect_used)]
pub fn small_tree() -> FastFairTree {
    FastFairTree::create(small_config()).expect("small tree")
}

/// Every live mapping, read through a full range scan.
pub fn snapshot(tree: &FastFairTree) -> BTreeMap<u64, u64> {
    tree.range_scan_entries(0, u64::MAX, usize::MAX)
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_tracing_twice_is_harmless() {
        init_tracing();
        init_tracing();
        tracing::warn!(key = 42, "subscriber installed");
    }

    #[test]
    fn snapshot_of_small_tree() {
        let tree = small_tree();
        for key in [3, 1, 2] {
            tree.insert(key, key * 10).unwrap();
        }
        assert_eq!(
            snapshot(&tree).into_iter().collect::<Vec<_>>(),
            vec![(1, 10), (2, 20), (3, 30)]
        );
    }
}
