//! Logging macros gated on the `tracing` feature.
//!
//! With the feature on, `trace_log!`, `debug_log!`, `info_log!` and
//! `warn_log!` forward to the matching `tracing` macro. With it off they
//! expand to nothing, arguments included, so a value computed only for a log
//! line must not be bound outside the macro call.
//!
//! Levels used in this crate:
//!
//! | Level | Events |
//! |-------|--------|
//! | trace | record overwrite/removal, node allocation, dropped persists, retries |
//! | debug | splits, root changes, pool formatting, trimmed split leftovers |
//! | info  | tree created/opened, recovery summary |
//! | warn  | dropped separators, repaired height, clamped `last_index` |
//!
//! ```bash
//! RUST_LOG=fastfair=debug cargo test --features tracing --test stress_tests
//! ```

#![allow(unused_macros, unused_imports)]

#[cfg(feature = "tracing")]
mod imp {
    macro_rules! trace_log {
        ($($arg:tt)*) => { ::tracing::trace!($($arg)*) };
    }
    macro_rules! debug_log {
        ($($arg:tt)*) => { ::tracing::debug!($($arg)*) };
    }
    macro_rules! info_log {
        ($($arg:tt)*) => { ::tracing::info!($($arg)*) };
    }
    macro_rules! warn_log {
        ($($arg:tt)*) => { ::tracing::warn!($($arg)*) };
    }

    pub(crate) use {debug_log, info_log, trace_log, warn_log};
}

#[cfg(not(feature = "tracing"))]
mod imp {
    macro_rules! trace_log {
        ($($arg:tt)*) => {};
    }
    macro_rules! debug_log {
        ($($arg:tt)*) => {};
    }
    macro_rules! info_log {
        ($($arg:tt)*) => {};
    }
    macro_rules! warn_log {
        ($($arg:tt)*) => {};
    }

    pub(crate) use {debug_log, info_log, trace_log, warn_log};
}

pub(crate) use imp::{debug_log, info_log, trace_log, warn_log};
