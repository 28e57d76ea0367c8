use crate::{Kind, PartitionId};
use core::fmt;
use rand::seq::IteratorRandom;
use serde::Serialize;
use std::collections::BTreeMap;

/// Lifecycle of a partition inside an allocator:
/// `Active -> Draining -> Exhausted -> Refilling -> Active`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PartitionState {
    /// Eligible for selection.
    Active,
    /// Active with pops in flight. Reported only; never stored.
    Draining,
    /// Taken out of rotation, refill not yet started.
    Exhausted,
    /// A refill is running.
    Refilling,
}

impl fmt::Display for PartitionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Active => "active",
            Self::Draining => "draining",
            Self::Exhausted => "exhausted",
            Self::Refilling => "refilling",
        })
    }
}

#[derive(Debug)]
struct Entry {
    kind: Kind,
    state: PartitionState,
}

/// Activation bookkeeping for every partition of one allocator.
///
/// Lives behind a mutex that guards this set only; no storage call is ever
/// made while it is held.
#[derive(Debug, Default)]
pub(crate) struct ActiveSet {
    entries: BTreeMap<PartitionId, Entry>,
}

impl ActiveSet {
    pub(crate) fn insert(&mut self, partition: PartitionId, kind: Kind) {
        self.entries.insert(
            partition,
            Entry {
                kind,
                state: PartitionState::Active,
            },
        );
    }

    /// Picks a uniformly random active partition, optionally of one kind.
    pub(crate) fn choose(&self, kind: Option<Kind>) -> Option<PartitionId> {
        self.entries
            .iter()
            .filter(|(_, e)| e.state == PartitionState::Active)
            .filter(|(_, e)| kind.is_none_or(|k| e.kind == k))
            .map(|(&id, _)| id)
            .choose(&mut rand::rng())
    }

    pub(crate) fn state(&self, partition: PartitionId) -> Option<PartitionState> {
        self.entries.get(&partition).map(|e| e.state)
    }

    /// Moves an `Active` partition to `next`. Returns `false`, leaving the
    /// state alone, if the partition is not active.
    pub(crate) fn deactivate(&mut self, partition: PartitionId, next: PartitionState) -> bool {
        match self.entries.get_mut(&partition) {
            Some(entry) if entry.state == PartitionState::Active => {
                entry.state = next;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn set(&mut self, partition: PartitionId, state: PartitionState) {
        if let Some(entry) = self.entries.get_mut(&partition) {
            entry.state = state;
        }
    }

    pub(crate) fn active_count(&self) -> usize {
        self.entries
            .values()
            .filter(|e| e.state == PartitionState::Active)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn choose_respects_kind_and_state() {
        let mut set = ActiveSet::default();
        set.insert(0, Kind::Int);
        set.insert(1, Kind::Int);
        set.insert(2, Kind::Float);

        assert_eq!(set.choose(Some(Kind::Float)), Some(2));
        assert!(set.deactivate(2, PartitionState::Exhausted));
        assert_eq!(set.choose(Some(Kind::Float)), None);
        assert!(matches!(set.choose(None), Some(0 | 1)));
        assert_eq!(set.active_count(), 2);
    }

    #[test]
    fn deactivate_only_moves_active_partitions() {
        let mut set = ActiveSet::default();
        set.insert(0, Kind::Int);
        assert!(set.deactivate(0, PartitionState::Exhausted));
        assert!(!set.deactivate(0, PartitionState::Refilling));
        assert_eq!(set.state(0), Some(PartitionState::Exhausted));
        assert!(!set.deactivate(9, PartitionState::Exhausted));

        set.set(0, PartitionState::Active);
        assert_eq!(set.choose(None), Some(0));
    }
}
