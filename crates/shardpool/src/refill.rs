use crate::{CandidateSource, Error, Kind, PartitionId, Result, UniquenessRegistry, Value, ValueStore};
use std::collections::HashSet;
use std::time::Instant;

/// Attempts allowed per requested value before a refill gives up.
pub const DEFAULT_ATTEMPT_FACTOR: usize = 10;

/// Accepted values buffered before they are written to the partition.
pub const DEFAULT_COMMIT_EVERY: usize = 256;

/// How a refill ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefillOutcome {
    /// Every requested value was accepted and inserted.
    Complete,
    /// The attempt budget ran out first; the keyspace for the kind is getting
    /// crowded.
    Shortfall,
    /// The caller's deadline passed first.
    DeadlineElapsed,
}

/// Structured result of a refill. A shortfall is reported here, never raised.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RefillReport {
    pub partition: PartitionId,
    pub kind: Kind,
    pub requested: usize,
    /// Values newly reserved in the registry.
    pub accepted: usize,
    /// Rows actually added to the partition.
    pub inserted: usize,
    /// Candidates drawn.
    pub attempts: usize,
    pub outcome: RefillOutcome,
}

impl RefillReport {
    pub const fn shortfall(&self) -> usize {
        self.requested.saturating_sub(self.accepted)
    }

    pub const fn is_complete(&self) -> bool {
        matches!(self.outcome, RefillOutcome::Complete)
    }
}

/// Generates fresh, globally unique values into a partition.
///
/// Candidates are drawn from a [`CandidateSource`] and kept only if
/// [`UniquenessRegistry::reserve`] accepts them. Accepted values are committed
/// to the partition every `commit_every` acceptances and again at the end, so
/// an error or deadline never discards values that were already reserved.
///
/// Termination is guaranteed by an attempt budget of
/// `target * attempt_factor` draws.
pub struct PartitionRefiller<R, C> {
    registry: R,
    source: C,
    attempt_factor: usize,
    commit_every: usize,
}

impl<R, C> PartitionRefiller<R, C>
where
    R: UniquenessRegistry,
    C: CandidateSource,
{
    pub const fn new(registry: R, source: C) -> Self {
        Self {
            registry,
            source,
            attempt_factor: DEFAULT_ATTEMPT_FACTOR,
            commit_every: DEFAULT_COMMIT_EVERY,
        }
    }

    #[must_use]
    pub const fn with_attempt_factor(mut self, attempt_factor: usize) -> Self {
        self.attempt_factor = attempt_factor;
        self
    }

    #[must_use]
    pub const fn with_commit_every(mut self, commit_every: usize) -> Self {
        self.commit_every = if commit_every == 0 { 1 } else { commit_every };
        self
    }

    pub const fn registry(&self) -> &R {
        &self.registry
    }

    pub const fn source(&self) -> &C {
        &self.source
    }

    /// Adds up to `target` new values to `store`.
    ///
    /// Runs synchronously and may wait on storage locks; call it from a
    /// blocking context.
    ///
    /// # Errors
    ///
    /// Storage faults from the registry or the store. Values accepted before
    /// the fault are still committed on a best-effort basis.
    #[tracing::instrument(skip_all, fields(partition = store.partition(), kind = %store.kind(), target))]
    pub fn refill(
        &self,
        store: &dyn ValueStore,
        target: usize,
        deadline: Option<Instant>,
    ) -> Result<RefillReport> {
        let kind = store.kind();
        let budget = target.saturating_mul(self.attempt_factor);
        let mut pending = Vec::with_capacity(self.commit_every.min(target));
        let mut drawn = HashSet::new();
        let mut report = RefillReport {
            partition: store.partition(),
            kind,
            requested: target,
            accepted: 0,
            inserted: 0,
            attempts: 0,
            outcome: RefillOutcome::Complete,
        };

        let mut candidates = self.source.candidates(kind);
        report.outcome = loop {
            if report.accepted >= target {
                break RefillOutcome::Complete;
            }
            if report.attempts >= budget {
                break RefillOutcome::Shortfall;
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                break RefillOutcome::DeadlineElapsed;
            }
            let Some(candidate) = candidates.next() else {
                break RefillOutcome::Shortfall;
            };
            report.attempts += 1;

            // A repeat within this batch was already settled by the registry.
            if !drawn.insert(candidate) {
                continue;
            }
            if let Err(e) = self.accept(store, &mut pending, &mut report, candidate) {
                self.salvage(store, &mut pending, &mut report);
                return Err(e);
            }
        };

        report.inserted += self.commit(store, &mut pending)?;

        match report.outcome {
            RefillOutcome::Complete => tracing::debug!(
                accepted = report.accepted,
                attempts = report.attempts,
                "refill complete"
            ),
            RefillOutcome::Shortfall => tracing::warn!(
                accepted = report.accepted,
                shortfall = report.shortfall(),
                attempts = report.attempts,
                "refill attempt budget exhausted"
            ),
            RefillOutcome::DeadlineElapsed => tracing::warn!(
                accepted = report.accepted,
                shortfall = report.shortfall(),
                "refill deadline elapsed"
            ),
        }
        Ok(report)
    }

    fn accept(
        &self,
        store: &dyn ValueStore,
        pending: &mut Vec<Value>,
        report: &mut RefillReport,
        candidate: Value,
    ) -> Result<()> {
        if candidate.kind() != report.kind {
            return Err(Error::KindMismatch {
                expected: report.kind,
                found: candidate.kind(),
            });
        }
        if !self.registry.reserve(&candidate)? {
            tracing::trace!(%candidate, "candidate already reserved");
            return Ok(());
        }
        report.accepted += 1;
        pending.push(candidate);
        if pending.len() >= self.commit_every {
            report.inserted += self.commit(store, pending)?;
        }
        Ok(())
    }

    fn commit(&self, store: &dyn ValueStore, pending: &mut Vec<Value>) -> Result<usize> {
        if pending.is_empty() {
            return Ok(0);
        }
        let inserted = store.bulk_insert(pending)?;
        pending.clear();
        Ok(inserted)
    }

    fn salvage(&self, store: &dyn ValueStore, pending: &mut Vec<Value>, report: &mut RefillReport) {
        match self.commit(store, pending) {
            Ok(inserted) => report.inserted += inserted,
            Err(e) => tracing::error!(
                lost = pending.len(),
                error = %e,
                "failed to commit reserved values after refill fault"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Fixed, MemoryRegistry, MemoryStore, ScriptedSource, ThreadRandom, ValueSpace};
    use core::time::Duration;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Counts upwards, stalling for `stall` on every draw after the first
    /// `quick` ones.
    struct StallingSource {
        drawn: AtomicU64,
        quick: u64,
        stall: Duration,
    }

    impl CandidateSource for StallingSource {
        fn next(&self, _kind: Kind) -> Value {
            let n = self.drawn.fetch_add(1, Ordering::SeqCst);
            if n >= self.quick {
                std::thread::sleep(self.stall);
            }
            Value::Int(n)
        }
    }

    fn ints(keys: impl IntoIterator<Item = u64>) -> Vec<Value> {
        keys.into_iter().map(Value::Int).collect()
    }

    #[test]
    fn fills_to_target_with_fresh_values() {
        let space = ValueSpace::default();
        let refiller = PartitionRefiller::new(MemoryRegistry::in_memory(&space), ThreadRandom::new(space))
            .with_commit_every(7);
        let store = MemoryStore::in_memory(0, Kind::Int, &space);

        let report = refiller.refill(&store, 100, None).unwrap();
        assert!(report.is_complete());
        assert_eq!(report.accepted, 100);
        assert_eq!(report.inserted, 100);
        assert_eq!(store.count_unconsumed().unwrap(), 100);
        assert_eq!(refiller.registry().count(Kind::Int).unwrap(), 100);
    }

    #[test]
    fn rejects_values_owned_by_other_partitions() {
        let space = ValueSpace::default();
        let registry = MemoryRegistry::in_memory(&space);
        registry.reserve(&Value::Int(7)).unwrap();
        let refiller = PartitionRefiller::new(registry, ScriptedSource::new(ints([7, 101])));
        let store = MemoryStore::in_memory(0, Kind::Int, &space);

        let report = refiller.refill(&store, 2, None).unwrap();
        assert_eq!(report.outcome, RefillOutcome::Shortfall);
        assert_eq!(report.accepted, 1);
        assert_eq!(report.shortfall(), 1);
        assert_eq!(store.pop_random().unwrap(), Some(Value::Int(101)));
        assert_eq!(store.pop_random().unwrap(), None);
    }

    #[test]
    fn saturated_keyspace_terminates_with_empty_shortfall() {
        // Two-bit integers: the whole keyspace is {0, 1, 2, 3}.
        let space = ValueSpace::new(2, 1.0, 0);
        let registry = MemoryRegistry::in_memory(&space);
        for v in 0..4 {
            registry.reserve(&Value::Int(v)).unwrap();
        }
        let refiller = PartitionRefiller::new(registry, ThreadRandom::new(space));
        let store = MemoryStore::in_memory(0, Kind::Int, &space);

        let report = refiller.refill(&store, 5, None).unwrap();
        assert_eq!(report.outcome, RefillOutcome::Shortfall);
        assert_eq!(report.accepted, 0);
        assert_eq!(report.attempts, 5 * DEFAULT_ATTEMPT_FACTOR);
        assert_eq!(store.count_total().unwrap(), 0);
    }

    #[test]
    fn partially_saturated_keyspace_keeps_what_it_found() {
        let space = ValueSpace::new(2, 1.0, 0);
        let registry = MemoryRegistry::in_memory(&space);
        for v in 0..3 {
            registry.reserve(&Value::Int(v)).unwrap();
        }
        let refiller = PartitionRefiller::new(registry, ScriptedSource::new(ints([0, 1, 3, 2])));
        let store = MemoryStore::in_memory(1, Kind::Int, &space);

        let report = refiller.refill(&store, 3, None).unwrap();
        assert_eq!(report.accepted, 1);
        assert_eq!(report.inserted, 1);
        assert_eq!(store.pop_random().unwrap(), Some(Value::Int(3)));
    }

    #[test]
    fn elapsed_deadline_commits_nothing_new_but_succeeds() {
        let space = ValueSpace::default();
        let refiller = PartitionRefiller::new(MemoryRegistry::in_memory(&space), ThreadRandom::new(space));
        let store = MemoryStore::in_memory(0, Kind::Float, &space);
        let report = refiller.refill(&store, 10, Some(Instant::now())).unwrap();
        assert_eq!(report.outcome, RefillOutcome::DeadlineElapsed);
        assert_eq!(report.inserted, 0);
    }

    #[test]
    fn deadline_mid_refill_keeps_committed_chunks() {
        let space = ValueSpace::default();
        let source = StallingSource {
            drawn: AtomicU64::new(0),
            quick: 4,
            stall: Duration::from_millis(300),
        };
        let refiller = PartitionRefiller::new(MemoryRegistry::in_memory(&space), source)
            .with_commit_every(2);
        let store = MemoryStore::in_memory(0, Kind::Int, &space);

        let deadline = Instant::now() + Duration::from_millis(150);
        let report = refiller.refill(&store, 1000, Some(deadline)).unwrap();
        assert_eq!(report.outcome, RefillOutcome::DeadlineElapsed);
        assert!(report.inserted >= 4, "{report:?}");
        assert_eq!(report.inserted, report.accepted);
        assert_eq!(store.count_unconsumed().unwrap(), report.inserted);
        assert_eq!(refiller.registry().count(Kind::Int).unwrap(), report.accepted);
    }

    #[test]
    fn wrong_kind_candidate_is_a_fault_after_salvage() {
        let space = ValueSpace::default();
        let script = [
            Value::Float(Fixed::from_units(1, 4)),
            Value::Float(Fixed::from_units(2, 4)),
            Value::Int(3),
        ];
        let refiller = PartitionRefiller::new(MemoryRegistry::in_memory(&space), ScriptedSource::new(script))
            .with_commit_every(100);
        let store = MemoryStore::in_memory(2, Kind::Float, &space);

        let err = refiller.refill(&store, 3, None).unwrap_err();
        assert!(matches!(err, Error::KindMismatch { .. }));
        assert_eq!(store.count_total().unwrap(), 2);
    }

    #[test]
    fn zero_target_is_a_no_op() {
        let space = ValueSpace::default();
        let refiller = PartitionRefiller::new(MemoryRegistry::in_memory(&space), ThreadRandom::new(space));
        let store = MemoryStore::in_memory(0, Kind::Int, &space);
        let report = refiller.refill(&store, 0, None).unwrap();
        assert!(report.is_complete());
        assert_eq!(report.attempts, 0);
    }
}
