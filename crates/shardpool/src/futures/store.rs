use crate::{Backoff, Error, PopStatus, Result, Value, ValueStore, futures::SleepProvider};
use core::future::Future;

/// Extension trait for popping from a [`ValueStore`] without blocking the
/// executor.
///
/// Polls [`ValueStore::try_pop_random`] and, while the partition is locked,
/// sleeps through `S` with bounded exponential backoff.
pub trait ValueStoreAsyncExt {
    /// Resolves to the popped value, or `None` if the partition is exhausted.
    ///
    /// # Errors
    ///
    /// [`Error::StorageContention`] once `backoff.attempts` polls found the
    /// partition locked, or any error from the store itself.
    fn pop_random_async<S>(
        &self,
        backoff: &Backoff,
    ) -> impl Future<Output = Result<Option<Value>>> + Send
    where
        S: SleepProvider;
}

impl<T> ValueStoreAsyncExt for T
where
    T: ValueStore + ?Sized,
{
    fn pop_random_async<S>(
        &self,
        backoff: &Backoff,
    ) -> impl Future<Output = Result<Option<Value>>> + Send
    where
        S: SleepProvider,
    {
        async move {
            for attempt in 0..backoff.attempts.max(1) {
                let dur = match self.try_pop_random()? {
                    PopStatus::Ready { value } => return Ok(Some(value)),
                    PopStatus::Empty => return Ok(None),
                    PopStatus::Pending { yield_for } => yield_for.max(backoff.delay(attempt)),
                };
                S::sleep_for(dur).await;
            }
            Err(Error::StorageContention {
                context: format!(
                    "partition {} stayed locked for {} attempts",
                    self.partition(),
                    backoff.attempts
                ),
            })
        }
    }
}
