use core::time::Duration;

/// When partitions are refilled. Exactly one policy applies per allocator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RefillPolicy {
    /// Refill a partition only once a pop finds it empty.
    #[default]
    Reactive,
    /// Additionally, after every `every` successful pops, take the next
    /// partition in round-robin order out of rotation and top it up.
    Threshold { every: u64 },
}

/// Tunables of the background refill path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RefillSettings {
    /// Values requested per background refill.
    pub batch: usize,
    /// Wall-clock cap per refill, if any.
    pub deadline: Option<Duration>,
}

impl Default for RefillSettings {
    fn default() -> Self {
        Self {
            batch: 1000,
            deadline: None,
        }
    }
}
