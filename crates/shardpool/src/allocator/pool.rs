use crate::{
    Allocation, Backoff, CandidateSource, Error, Kind, PartitionId, PartitionRefiller, PartitionState,
    RefillPolicy, RefillReport, RefillSettings, Result, SleepProvider, UniquenessRegistry,
    Unavailable, Value, ValueStore, ValueStoreAsyncExt, allocator::state::ActiveSet,
};
use core::time::Duration;
use parking_lot::Mutex;
use portable_atomic::{AtomicU64, Ordering};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize};
use std::time::Instant;
use tokio_util::task::TaskTracker;

/// Callback run after every background refill, e.g. to record metrics.
pub type RefillHook = Arc<dyn Fn(&RefillReport) + Send + Sync>;

struct Slot {
    store: Arc<dyn ValueStore>,
    inflight: AtomicUsize,
}

struct Inner<R, C> {
    slots: BTreeMap<PartitionId, Slot>,
    order: Vec<PartitionId>,
    refiller: PartitionRefiller<R, C>,
    active: Mutex<ActiveSet>,
    policy: RefillPolicy,
    settings: RefillSettings,
    backoff: Backoff,
    pops: AtomicU64,
    next_threshold: AtomicUsize,
    tracker: TaskTracker,
    shutting_down: AtomicBool,
    on_refill: Option<RefillHook>,
}

/// Serves unique values from a set of partitions and keeps them topped up.
///
/// Pops pick a uniformly random active partition and never wait on a refill:
/// a partition found empty is taken out of rotation, a background refill is
/// dispatched on the blocking pool, and the caller gets
/// [`Allocation::Unavailable`] straight away.
///
/// Cloning is cheap; clones share the same partitions and state.
pub struct PoolAllocator<R, C> {
    inner: Arc<Inner<R, C>>,
}

impl<R, C> Clone for PoolAllocator<R, C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Per-partition view returned by [`PoolAllocator::snapshot`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PartitionStats {
    pub partition: PartitionId,
    pub kind: Kind,
    pub state: PartitionState,
    /// `None` if the partition stayed locked.
    pub unconsumed: Option<usize>,
    pub total: Option<usize>,
}

/// Registry size for one kind.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    pub kind: Kind,
    pub reserved: Option<usize>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PoolSnapshot {
    pub partitions: Vec<PartitionStats>,
    pub registry: Vec<RegistryStats>,
}

/// Builder for [`PoolAllocator`].
pub struct PoolAllocatorBuilder<R, C> {
    refiller: PartitionRefiller<R, C>,
    stores: Vec<Arc<dyn ValueStore>>,
    policy: RefillPolicy,
    settings: RefillSettings,
    backoff: Backoff,
    on_refill: Option<RefillHook>,
}

impl<R, C> PoolAllocatorBuilder<R, C>
where
    R: UniquenessRegistry + 'static,
    C: CandidateSource + 'static,
{
    /// Adds a partition.
    #[must_use]
    pub fn partition(mut self, store: impl ValueStore + 'static) -> Self {
        self.stores.push(Arc::new(store));
        self
    }

    #[must_use]
    pub const fn policy(mut self, policy: RefillPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub const fn refill_settings(mut self, settings: RefillSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Backoff for the async pop path.
    #[must_use]
    pub const fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    #[must_use]
    pub fn on_refill(mut self, hook: impl Fn(&RefillReport) + Send + Sync + 'static) -> Self {
        self.on_refill = Some(Arc::new(hook));
        self
    }

    /// Validates the partition set and activates every partition.
    ///
    /// # Errors
    ///
    /// [`Error::ConfigurationFault`] if there are no partitions, two share an
    /// id, any backing store is missing, or the threshold is zero.
    pub fn build(self) -> Result<PoolAllocator<R, C>> {
        if self.stores.is_empty() {
            return Err(Error::ConfigurationFault {
                reason: "an allocator needs at least one partition".to_string(),
            });
        }
        if let RefillPolicy::Threshold { every: 0 } = self.policy {
            return Err(Error::ConfigurationFault {
                reason: "refill threshold must be at least 1".to_string(),
            });
        }

        let mut slots = BTreeMap::new();
        let mut active = ActiveSet::default();
        for store in self.stores {
            let partition = store.partition();
            if !store.exists() {
                return Err(Error::ConfigurationFault {
                    reason: format!("partition {partition} has no backing store"),
                });
            }
            active.insert(partition, store.kind());
            let slot = Slot {
                store,
                inflight: AtomicUsize::new(0),
            };
            if slots.insert(partition, slot).is_some() {
                return Err(Error::ConfigurationFault {
                    reason: format!("partition {partition} is configured twice"),
                });
            }
        }
        let order = slots.keys().copied().collect();

        tracing::info!(
            partitions = slots.len(),
            policy = ?self.policy,
            batch = self.settings.batch,
            "allocator ready"
        );

        Ok(PoolAllocator {
            inner: Arc::new(Inner {
                slots,
                order,
                refiller: self.refiller,
                active: Mutex::new(active),
                policy: self.policy,
                settings: self.settings,
                backoff: self.backoff,
                pops: AtomicU64::new(0),
                next_threshold: AtomicUsize::new(0),
                tracker: TaskTracker::new(),
                shutting_down: AtomicBool::new(false),
                on_refill: self.on_refill,
            }),
        })
    }
}

async fn pop_on_blocking_pool(store: &Arc<dyn ValueStore>) -> Result<Option<Value>> {
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || store.pop_random())
        .await
        .unwrap_or_else(|e| {
            Err(Error::Io {
                context: format!("pop task failed: {e}"),
            })
        })
}

struct InflightGuard<'a>(&'a AtomicUsize);

impl<'a> InflightGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self(counter)
    }
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl<R, C> PoolAllocator<R, C>
where
    R: UniquenessRegistry + 'static,
    C: CandidateSource + 'static,
{
    pub fn builder(refiller: PartitionRefiller<R, C>) -> PoolAllocatorBuilder<R, C> {
        PoolAllocatorBuilder {
            refiller,
            stores: Vec::new(),
            policy: RefillPolicy::default(),
            settings: RefillSettings::default(),
            backoff: Backoff::default(),
            on_refill: None,
        }
    }

    pub fn refiller(&self) -> &PartitionRefiller<R, C> {
        &self.inner.refiller
    }

    pub fn policy(&self) -> RefillPolicy {
        self.inner.policy
    }

    /// Current state of `partition`, or `None` if unknown.
    pub fn state(&self, partition: PartitionId) -> Option<PartitionState> {
        let stored = self.inner.active.lock().state(partition)?;
        let inflight = self.inner.slots.get(&partition)?.inflight.load(Ordering::Acquire);
        Some(match stored {
            PartitionState::Active if inflight > 0 => PartitionState::Draining,
            other => other,
        })
    }

    /// Serves one value of `kind` (any kind if `None`).
    ///
    /// Must be called from within a Tokio runtime: an exhausted partition
    /// schedules its refill on the runtime's blocking pool. Lock contention
    /// is absorbed with `S`-driven backoff; the pop itself is never retried
    /// against another partition.
    ///
    /// Pops from journaled partitions run on the blocking pool, so a slow
    /// append or fsync never stalls an executor thread. Dropping the future
    /// does not cancel such a pop; its value is consumed and never served.
    #[tracing::instrument(level = "debug", skip(self), fields(partition = tracing::field::Empty))]
    pub async fn pop<S: SleepProvider>(&self, kind: Option<Kind>) -> Allocation {
        let chosen = self.inner.active.lock().choose(kind);
        let Some((partition, slot)) = chosen.and_then(|id| Some((id, self.inner.slots.get(&id)?)))
        else {
            tracing::debug!(?kind, "no active partition");
            return Allocation::Unavailable {
                reason: Unavailable::NoActivePartition { kind },
            };
        };
        tracing::Span::current().record("partition", partition);

        let popped = {
            let _inflight = InflightGuard::enter(&slot.inflight);
            if slot.store.blocks_on_io() {
                pop_on_blocking_pool(&slot.store).await
            } else {
                slot.store.pop_random_async::<S>(&self.inner.backoff).await
            }
        };

        let reason = match popped {
            Ok(Some(value)) => {
                self.count_pop();
                return Allocation::Ready { partition, value };
            }
            Ok(None) => {
                tracing::info!(partition, "partition exhausted");
                self.begin_refill(partition, PartitionState::Exhausted);
                Unavailable::PartitionExhausted { partition }
            }
            Err(Error::StorageContention { context }) => {
                tracing::warn!(partition, %context, "pop gave up on a busy partition");
                Unavailable::StorageBusy { partition }
            }
            Err(e) => {
                tracing::error!(partition, error = %e, "pop failed");
                Unavailable::StorageFault { partition }
            }
        };
        Allocation::Unavailable { reason }
    }

    /// Threshold bookkeeping after a successful pop.
    fn count_pop(&self) {
        let RefillPolicy::Threshold { every } = self.inner.policy else {
            return;
        };
        if self.inner.pops.fetch_add(1, Ordering::AcqRel) + 1 < every {
            return;
        }

        let target = {
            let mut active = self.inner.active.lock();
            // Another pop may have crossed the threshold first.
            if self.inner.pops.load(Ordering::Acquire) < every {
                return;
            }
            self.inner.pops.store(0, Ordering::Release);
            let n = self.inner.next_threshold.fetch_add(1, Ordering::Relaxed);
            let partition = self.inner.order[n % self.inner.order.len()];
            active
                .deactivate(partition, PartitionState::Refilling)
                .then_some(partition)
        };
        match target {
            Some(partition) => {
                tracing::info!(partition, every, "pop threshold reached, topping up");
                self.spawn_refill(partition);
            }
            None => tracing::debug!("pop threshold reached, round-robin partition already out of rotation"),
        }
    }

    /// The one path that takes a partition out of rotation for a refill.
    /// Does nothing unless the partition is currently active.
    fn begin_refill(&self, partition: PartitionId, next: PartitionState) {
        if self.inner.active.lock().deactivate(partition, next) {
            self.spawn_refill(partition);
        }
    }

    fn spawn_refill(&self, partition: PartitionId) {
        if self.inner.shutting_down.load(Ordering::Acquire) {
            tracing::warn!(partition, "shutting down, refill not scheduled");
            return;
        }
        let this = self.clone();
        let span = tracing::info_span!("background_refill", partition);
        self.inner
            .tracker
            .spawn_blocking(move || span.in_scope(|| this.run_background_refill(partition)));
    }

    fn run_background_refill(&self, partition: PartitionId) {
        self.inner
            .active
            .lock()
            .set(partition, PartitionState::Refilling);

        match self.refill_partition(partition, self.inner.settings.batch) {
            Ok(report) => {
                tracing::info!(
                    accepted = report.accepted,
                    inserted = report.inserted,
                    attempts = report.attempts,
                    outcome = ?report.outcome,
                    "background refill finished"
                );
                if let Some(hook) = &self.inner.on_refill {
                    hook(&report);
                }
            }
            Err(e) => tracing::error!(error = %e, "background refill failed"),
        }

        // Back into rotation regardless: a shortfall or fault still leaves
        // whatever was committed servable, and an empty partition simply
        // triggers another attempt on its next pop.
        self.inner.active.lock().set(partition, PartitionState::Active);
    }

    /// Synchronously refills `partition` with up to `target` values, applying
    /// the configured deadline. Does not change the partition's state.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownPartition`], or any storage fault from the refill.
    pub fn refill_partition(&self, partition: PartitionId, target: usize) -> Result<RefillReport> {
        let slot = self
            .inner
            .slots
            .get(&partition)
            .ok_or(Error::UnknownPartition(partition))?;
        let deadline = self
            .inner
            .settings
            .deadline
            .and_then(|d| Instant::now().checked_add(d));
        self.inner
            .refiller
            .refill(slot.store.as_ref(), target, deadline)
    }

    /// One-shot fill of every partition, in id order, before serving.
    ///
    /// # Errors
    ///
    /// The first storage fault; partitions already filled stay filled.
    pub fn prefill(&self, target: usize) -> Result<Vec<RefillReport>> {
        let mut reports = Vec::with_capacity(self.inner.slots.len());
        for (&partition, slot) in &self.inner.slots {
            slot.store.create_schema()?;
            let report = self.refill_partition(partition, target)?;
            tracing::info!(
                partition,
                kind = %report.kind,
                accepted = report.accepted,
                shortfall = report.shortfall(),
                "partition prefilled"
            );
            reports.push(report);
        }
        Ok(reports)
    }

    /// Waits until no background refill is running.
    pub async fn wait_for_refills(&self) {
        self.inner.tracker.close();
        self.inner.tracker.wait().await;
        self.inner.tracker.reopen();
    }

    /// Stops scheduling refills and waits up to `timeout` for running ones.
    /// Returns `false` if some were still running at the deadline.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        self.inner.shutting_down.store(true, Ordering::Release);
        self.inner.tracker.close();
        let pending = self.inner.tracker.len();
        if pending > 0 {
            tracing::info!(pending, "waiting for background refills");
        }
        if tokio::time::timeout(timeout, self.inner.tracker.wait()).await.is_err() {
            tracing::warn!(
                pending = self.inner.tracker.len(),
                ?timeout,
                "background refills still running at shutdown"
            );
            return false;
        }
        true
    }

    /// Number of partitions currently eligible for selection.
    pub fn active_count(&self) -> usize {
        self.inner.active.lock().active_count()
    }

    /// Point-in-time statistics. Touches every store; call from a blocking
    /// context.
    pub fn snapshot(&self) -> PoolSnapshot {
        let partitions = self
            .inner
            .slots
            .iter()
            .map(|(&partition, slot)| PartitionStats {
                partition,
                kind: slot.store.kind(),
                state: self.state(partition).unwrap_or(PartitionState::Active),
                unconsumed: slot.store.count_unconsumed().ok(),
                total: slot.store.count_total().ok(),
            })
            .collect();
        let registry = Kind::ALL
            .into_iter()
            .map(|kind| RegistryStats {
                kind,
                reserved: self.inner.refiller.registry().count(kind).ok(),
            })
            .collect();
        PoolSnapshot {
            partitions,
            registry,
        }
    }
}
