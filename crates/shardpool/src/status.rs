use crate::Value;
use core::time::Duration;

/// Outcome of a single non-blocking pop attempt against a [`ValueStore`].
///
/// Mirrors the shape of a poll: a value is either ready, the partition is
/// known to be empty, or the partition lock is busy and the caller should back
/// off for `yield_for` before trying again.
///
/// [`ValueStore`]: crate::ValueStore
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopStatus {
    /// An unconsumed value was selected and marked consumed.
    Ready { value: Value },
    /// No unconsumed rows remain in the partition.
    Empty,
    /// The partition is locked by another caller.
    Pending { yield_for: Duration },
}
