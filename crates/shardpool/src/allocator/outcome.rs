use crate::{Kind, PartitionId, Value};
use core::fmt;

/// Result of [`PoolAllocator::pop`](crate::PoolAllocator::pop).
///
/// A failed pop is an expected, retryable business outcome, so it is a value
/// rather than an [`Error`](crate::Error).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Allocation {
    /// `value` was taken from `partition` and will never be served again.
    Ready { partition: PartitionId, value: Value },
    /// Nothing could be served right now; the caller may retry.
    Unavailable { reason: Unavailable },
}

impl Allocation {
    pub const fn value(&self) -> Option<Value> {
        match self {
            Self::Ready { value, .. } => Some(*value),
            Self::Unavailable { .. } => None,
        }
    }

    pub const fn is_ready(&self) -> bool {
        matches!(self, Self::Ready { .. })
    }
}

/// Why a pop could not be served.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Unavailable {
    /// Every matching partition is exhausted or refilling.
    NoActivePartition { kind: Option<Kind> },
    /// The selected partition ran dry; a refill has been scheduled.
    PartitionExhausted { partition: PartitionId },
    /// The selected partition stayed locked past the retry budget.
    StorageBusy { partition: PartitionId },
    /// The selected partition failed to serve; details are in the logs.
    StorageFault { partition: PartitionId },
}

impl Unavailable {
    pub const fn partition(&self) -> Option<PartitionId> {
        match self {
            Self::NoActivePartition { .. } => None,
            Self::PartitionExhausted { partition }
            | Self::StorageBusy { partition }
            | Self::StorageFault { partition } => Some(*partition),
        }
    }
}

impl fmt::Display for Unavailable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoActivePartition { kind: None } => {
                f.write_str("No partitions are available. A refill is in progress, try again later.")
            }
            Self::NoActivePartition { kind: Some(kind) } => write!(
                f,
                "No {kind} partitions are available. A refill is in progress, try again later."
            ),
            Self::PartitionExhausted { partition } => write!(
                f,
                "Partition {partition} is empty. Refilling, try again later."
            ),
            Self::StorageBusy { partition } => {
                write!(f, "Partition {partition} is busy, try again later.")
            }
            Self::StorageFault { partition } => write!(
                f,
                "Partition {partition} could not serve a value, try again later."
            ),
        }
    }
}
