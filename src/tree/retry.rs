//! Retry combinator for node-level outcomes.
//!
//! Node operations report a lost race as [`NodeOutcome::Conflict`] instead of
//! looping themselves. The controller wraps each attempt (descent plus node
//! operation) in [`retry_from_root`], which restarts the whole attempt from
//! the current root until it either succeeds or reports `NotFound`. There is
//! no retry bound: every conflict is caused by a writer that finishes.

use std::hint;

use crate::node::NodeOutcome;
use crate::tracing_helpers::trace_log;

use super::counters::DebugCounters;

/// Run `attempt` until it stops reporting `Conflict`.
///
/// `Success(v)` becomes `Some(v)`, `NotFound` becomes `None`; errors from the
/// attempt are returned unchanged.
///
/// # Errors
///
/// The first error returned by `attempt`.
pub(crate) fn retry_from_root<T, E>(
    mut attempt: impl FnMut() -> Result<NodeOutcome<T>, E>,
) -> Result<Option<T>, E> {
    loop {
        match attempt()? {
            NodeOutcome::Success(value) => return Ok(Some(value)),
            NodeOutcome::NotFound => return Ok(None),
            NodeOutcome::Conflict => {
                DebugCounters::record_retry();
                trace_log!("conflict, retrying from root");
                hint::spin_loop();
            }
        }
    }
}
