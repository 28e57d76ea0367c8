use core::{future::Future, time::Duration};

/// Abstracts how to sleep for a [`Duration`] in async contexts.
///
/// Lets the async pop path back off under storage contention without tying
/// it to one timer implementation.
pub trait SleepProvider {
    fn sleep_for(dur: Duration) -> impl Future<Output = ()> + Send;
}
