use crate::{Kind, Result, Value};
use std::collections::HashSet;

/// Durable, monotonically growing record of every value ever allocated to a
/// partition, scoped per [`Kind`].
///
/// The registry is consulted only when values are generated. It is the sole
/// source of truth for cross-partition uniqueness: once a value is reserved it
/// is never released, even if the partition that received it is lost.
pub trait UniquenessRegistry: Send + Sync {
    /// Ensures the backing table for `kind` exists. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing medium cannot be (re)created.
    fn create_schema(&self, kind: Kind) -> Result<()>;

    /// Whether `value` has been reserved within its kind.
    ///
    /// # Errors
    ///
    /// [`Error::StorageContention`] if the kind's table stays locked.
    ///
    /// [`Error::StorageContention`]: crate::Error::StorageContention
    fn contains(&self, value: &Value) -> Result<bool>;

    /// Atomically records `value` within its kind. Returns `true` if it was
    /// newly reserved, `false` if some partition already owns it.
    ///
    /// # Errors
    ///
    /// [`Error::StorageContention`] if the kind's table stays locked, or
    /// [`Error::Io`] if the reservation cannot be made durable (the value is
    /// then *not* reserved).
    ///
    /// [`Error::StorageContention`]: crate::Error::StorageContention
    /// [`Error::Io`]: crate::Error::Io
    fn reserve(&self, value: &Value) -> Result<bool>;

    /// Every value ever reserved for `kind`.
    ///
    /// A full scan: meant for cold-start seeding and diagnostics, not for the
    /// refill path, which must go through [`UniquenessRegistry::reserve`].
    ///
    /// # Errors
    ///
    /// [`Error::StorageContention`] if the kind's table stays locked.
    ///
    /// [`Error::StorageContention`]: crate::Error::StorageContention
    fn all_values(&self, kind: Kind) -> Result<HashSet<Value>>;

    /// Number of values reserved for `kind`.
    ///
    /// # Errors
    ///
    /// [`Error::StorageContention`] if the kind's table stays locked.
    ///
    /// [`Error::StorageContention`]: crate::Error::StorageContention
    fn count(&self, kind: Kind) -> Result<usize>;
}
