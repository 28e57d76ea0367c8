use crate::{Kind, PartitionId, PopStatus, Result, Value};

/// A durable table of candidate values for a single partition.
///
/// Each row is a value plus a consumed flag. Rows are only ever added
/// ([`ValueStore::bulk_insert`]) or flipped to consumed
/// ([`ValueStore::pop_random`]); nothing is deleted.
///
/// Implementations serialize mutations per partition, never across the whole
/// store, so pops on different partitions do not contend.
pub trait ValueStore: Send + Sync {
    /// The partition this table backs.
    fn partition(&self) -> PartitionId;

    /// The kind every value in this table belongs to.
    fn kind(&self) -> Kind;

    /// Ensures the backing table exists. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing medium cannot be (re)created.
    fn create_schema(&self) -> Result<()>;

    /// Whether the backing table is present. Used to fail fast at startup.
    fn exists(&self) -> bool;

    /// Whether a pop writes to disk before returning. Async callers run such
    /// pops on the blocking pool instead of polling them on the executor.
    fn blocks_on_io(&self) -> bool {
        false
    }

    /// Inserts every value not already present; duplicates, whether within
    /// `values` or against existing rows, are silently skipped. Returns the
    /// number of rows added.
    ///
    /// # Errors
    ///
    /// - [`Error::KindMismatch`] if a value is of the wrong kind; nothing is
    ///   inserted.
    /// - [`Error::StorageContention`] if the partition stays locked.
    /// - [`Error::Io`] if the insert cannot be made durable.
    ///
    /// [`Error::KindMismatch`]: crate::Error::KindMismatch
    /// [`Error::StorageContention`]: crate::Error::StorageContention
    /// [`Error::Io`]: crate::Error::Io
    fn bulk_insert(&self, values: &[Value]) -> Result<usize>;

    /// Atomically selects a uniformly random unconsumed value, marks it
    /// consumed and returns it. Returns `None` if the partition is exhausted.
    ///
    /// Waits for the partition lock with bounded backoff; use
    /// [`ValueStore::try_pop_random`] from async contexts.
    ///
    /// # Errors
    ///
    /// [`Error::StorageContention`] when the backoff budget runs out, or
    /// [`Error::Io`] if the consumed flag cannot be made durable.
    ///
    /// [`Error::StorageContention`]: crate::Error::StorageContention
    /// [`Error::Io`]: crate::Error::Io
    fn pop_random(&self) -> Result<Option<Value>>;

    /// Non-blocking variant of [`ValueStore::pop_random`]: returns
    /// [`PopStatus::Pending`] instead of waiting when the partition is locked.
    ///
    /// # Errors
    ///
    /// [`Error::Io`] if the consumed flag cannot be made durable.
    ///
    /// [`Error::Io`]: crate::Error::Io
    fn try_pop_random(&self) -> Result<PopStatus>;

    /// Rows not yet consumed.
    ///
    /// # Errors
    ///
    /// [`Error::StorageContention`] when the partition stays locked.
    ///
    /// [`Error::StorageContention`]: crate::Error::StorageContention
    fn count_unconsumed(&self) -> Result<usize>;

    /// All rows, consumed or not.
    ///
    /// # Errors
    ///
    /// [`Error::StorageContention`] when the partition stays locked.
    ///
    /// [`Error::StorageContention`]: crate::Error::StorageContention
    fn count_total(&self) -> Result<usize>;
}
