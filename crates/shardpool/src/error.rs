//! Error types for the value pool.
//!
//! Only faults live here. Business outcomes such as an exhausted partition or
//! a refill shortfall are modelled as values ([`PopStatus`],
//! [`Allocation`], [`RefillReport`]) and never travel through `Err`.
//!
//! [`PopStatus`]: crate::PopStatus
//! [`Allocation`]: crate::Allocation
//! [`RefillReport`]: crate::RefillReport

use crate::{Kind, PartitionId};

pub type Result<T, E = Error> = core::result::Result<T, E>;

/// All faults the pool can produce.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// A storage lock could not be acquired within the configured backoff
    /// budget. Transient; callers degrade it to an unavailable response.
    #[error("storage contention: {context}")]
    StorageContention { context: String },

    /// The backing journal could not be read or written.
    #[error("storage I/O error: {context}")]
    Io { context: String },

    /// A journal contains a record that cannot be decoded and is not a torn
    /// trailing write.
    #[error("corrupt journal {path} at line {line}: {reason}")]
    CorruptJournal {
        path: String,
        line: usize,
        reason: String,
    },

    /// The pool is misconfigured, e.g. a partition store is missing at
    /// startup or a journal header disagrees with the configuration.
    #[error("configuration fault: {reason}")]
    ConfigurationFault { reason: String },

    /// The requested partition is not part of this pool.
    #[error("unknown partition {0}")]
    UnknownPartition(PartitionId),

    /// A value of one kind was offered to a table of another kind.
    #[error("{found} value offered to {expected} table")]
    KindMismatch { expected: Kind, found: Kind },
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            context: err.to_string(),
        }
    }
}
