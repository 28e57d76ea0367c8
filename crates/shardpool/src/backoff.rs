use core::time::Duration;

/// Bounded exponential backoff used to absorb transient storage contention.
///
/// The delay before attempt `n` (zero-based) is `base * 2^n`, capped at
/// `max`. After `attempts` tries the operation gives up and reports
/// [`Error::StorageContention`](crate::Error::StorageContention).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Backoff {
    pub attempts: u32,
    pub base: Duration,
    pub max: Duration,
    /// How long a single attempt may wait on a storage lock.
    pub lock_timeout: Duration,
}

impl Backoff {
    pub const fn new(attempts: u32, base: Duration, max: Duration, lock_timeout: Duration) -> Self {
        Self {
            attempts,
            base,
            max,
            lock_timeout,
        }
    }

    /// Delay to wait after the failed attempt `attempt`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1_u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max)
    }

    /// Runs `op` until it yields `Some`, sleeping the calling thread between
    /// attempts. Returns `None` once the attempt budget is spent.
    ///
    /// Only for blocking contexts (refill runs on the blocking pool).
    pub fn retry_blocking<T>(&self, mut op: impl FnMut() -> Option<T>) -> Option<T> {
        for attempt in 0..self.attempts.max(1) {
            if let Some(out) = op() {
                return Some(out);
            }
            if attempt + 1 < self.attempts {
                std::thread::sleep(self.delay(attempt));
            }
        }
        None
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(
            8,
            Duration::from_micros(100),
            Duration::from_millis(20),
            Duration::from_millis(50),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_doubles_until_capped() {
        let backoff = Backoff::new(
            10,
            Duration::from_millis(1),
            Duration::from_millis(5),
            Duration::ZERO,
        );
        assert_eq!(backoff.delay(0), Duration::from_millis(1));
        assert_eq!(backoff.delay(1), Duration::from_millis(2));
        assert_eq!(backoff.delay(2), Duration::from_millis(4));
        assert_eq!(backoff.delay(3), Duration::from_millis(5));
        assert_eq!(backoff.delay(40), Duration::from_millis(5));
    }

    #[test]
    fn retry_blocking_stops_at_budget() {
        let backoff = Backoff::new(3, Duration::ZERO, Duration::ZERO, Duration::ZERO);
        let mut calls = 0;
        let out: Option<()> = backoff.retry_blocking(|| {
            calls += 1;
            None
        });
        assert!(out.is_none());
        assert_eq!(calls, 3);
    }

    #[test]
    fn retry_blocking_returns_first_success() {
        let backoff = Backoff::new(5, Duration::ZERO, Duration::ZERO, Duration::ZERO);
        let mut calls = 0;
        let out = backoff.retry_blocking(|| {
            calls += 1;
            (calls == 2).then_some(calls)
        });
        assert_eq!(out, Some(2));
    }
}
