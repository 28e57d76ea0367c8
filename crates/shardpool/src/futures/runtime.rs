use crate::futures::SleepProvider;
use core::time::Duration;

/// An implementation of [`SleepProvider`] using Tokio's timer.
///
/// This is the default provider used by the allocator.
pub struct TokioSleep;
impl SleepProvider for TokioSleep {
    async fn sleep_for(dur: Duration) {
        tokio::time::sleep(dur).await;
    }
}

/// An implementation of [`SleepProvider`] using Tokio's yield.
///
/// Hands control back to the scheduler immediately instead of waiting on a
/// timer. Partition locks are held for microseconds, so under light load this
/// retries sooner; under heavy load it spins the scheduler harder than
/// [`TokioSleep`].
pub struct TokioYield;
impl SleepProvider for TokioYield {
    async fn sleep_for(_dur: Duration) {
        tokio::task::yield_now().await;
    }
}
