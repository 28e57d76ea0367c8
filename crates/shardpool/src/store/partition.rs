use crate::{
    Backoff, Error, FileJournal, Journal, Kind, NullJournal, PartitionId, PopStatus, Record,
    Result, Value, ValueSpace,
    store::{Table, ValueStore},
};
use parking_lot::{Mutex, MutexGuard};
use std::collections::HashSet;
use std::path::Path;

/// In-memory partition table.
pub type MemoryStore = PartitionStore<NullJournal>;

/// Partition table persisted to an append-only journal file.
pub type FileStore = PartitionStore<FileJournal>;

pub(super) struct Inner<J> {
    pub(super) table: Table,
    pub(super) journal: J,
}

/// A [`ValueStore`] that keeps its rows in memory behind a per-partition lock
/// and writes every mutation ahead to a [`Journal`].
///
/// The lock is the partition's transaction: a pop picks, journals and flips a
/// row while holding it, so two concurrent pops can never observe the same
/// unconsumed row.
pub struct PartitionStore<J> {
    partition: PartitionId,
    kind: Kind,
    scale: u8,
    backoff: Backoff,
    pub(super) inner: Mutex<Inner<J>>,
}

impl MemoryStore {
    /// Creates an empty in-memory partition.
    pub fn in_memory(partition: PartitionId, kind: Kind, space: &ValueSpace) -> Self {
        Self::from_parts(partition, kind, space.scale_for(kind), Table::default(), NullJournal)
    }
}

impl FileStore {
    /// Opens the journal at `path`, creating it when absent, and replays it.
    ///
    /// # Errors
    ///
    /// See [`FileJournal::create`].
    pub fn create(
        path: &Path,
        partition: PartitionId,
        kind: Kind,
        space: &ValueSpace,
        fsync: bool,
    ) -> Result<Self> {
        let header = Self::header(partition, kind, space);
        let (journal, replay) = FileJournal::create(path, &header, fsync)?;
        Self::restore(partition, kind, space, journal, replay)
    }

    /// Opens and replays an existing journal at `path`.
    ///
    /// # Errors
    ///
    /// [`Error::ConfigurationFault`] if the journal is missing or belongs to a
    /// different partition, kind or scale. See also [`FileJournal::open`].
    pub fn open(
        path: &Path,
        partition: PartitionId,
        kind: Kind,
        space: &ValueSpace,
        fsync: bool,
    ) -> Result<Self> {
        let header = Self::header(partition, kind, space);
        let (journal, replay) = FileJournal::open(path, &header, fsync)?;
        Self::restore(partition, kind, space, journal, replay)
    }

    fn restore(
        partition: PartitionId,
        kind: Kind,
        space: &ValueSpace,
        journal: FileJournal,
        replay: Vec<Record>,
    ) -> Result<Self> {
        let mut table = Table::default();
        for record in replay {
            match record {
                Record::Insert { key } => {
                    table.insert(key);
                }
                Record::Consume { key } => {
                    table.consume(key);
                }
                other => {
                    tracing::warn!(partition, ?other, "ignoring foreign record in partition journal");
                }
            }
        }
        tracing::debug!(
            partition,
            %kind,
            total = table.count_total(),
            unconsumed = table.count_unconsumed(),
            "partition journal replayed"
        );
        Ok(Self::from_parts(
            partition,
            kind,
            space.scale_for(kind),
            table,
            journal,
        ))
    }
}

impl<J: Journal> PartitionStore<J> {
    fn from_parts(partition: PartitionId, kind: Kind, scale: u8, table: Table, journal: J) -> Self {
        Self {
            partition,
            kind,
            scale,
            backoff: Backoff::default(),
            inner: Mutex::new(Inner { table, journal }),
        }
    }

    /// Replaces the default contention backoff.
    #[must_use]
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn header(partition: PartitionId, kind: Kind, space: &ValueSpace) -> Record {
        Record::Partition {
            partition,
            kind,
            scale: space.scale_for(kind),
        }
    }

    fn snapshot(&self, table: &Table) -> Vec<Record> {
        let mut records = Vec::with_capacity(table.count_total() * 2 + 1);
        records.push(Record::Partition {
            partition: self.partition,
            kind: self.kind,
            scale: self.scale,
        });
        records.extend(table.rows().map(|(key, _)| Record::Insert { key }));
        records.extend(
            table
                .rows()
                .filter(|&(_, consumed)| consumed)
                .map(|(key, _)| Record::Consume { key }),
        );
        records
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner<J>>> {
        self.backoff
            .retry_blocking(|| self.inner.try_lock_for(self.backoff.lock_timeout))
            .ok_or_else(|| Error::StorageContention {
                context: format!("partition {} is locked", self.partition),
            })
    }

    fn pop_locked(&self, inner: &mut Inner<J>) -> Result<Option<Value>> {
        let Some(key) = inner.table.pick(&mut rand::rng()) else {
            return Ok(None);
        };
        inner.journal.append(&[Record::Consume { key }])?;
        inner.table.consume(key);
        Ok(Some(Value::from_key(self.kind, key, self.scale)))
    }
}

impl<J: Journal> ValueStore for PartitionStore<J> {
    fn partition(&self) -> PartitionId {
        self.partition
    }

    fn kind(&self) -> Kind {
        self.kind
    }

    fn create_schema(&self) -> Result<()> {
        let mut inner = self.lock()?;
        if inner.journal.exists() {
            return Ok(());
        }
        tracing::warn!(partition = self.partition, "partition journal missing, rewriting");
        let snapshot = self.snapshot(&inner.table);
        inner.journal.rewrite(&snapshot)
    }

    fn exists(&self) -> bool {
        self.inner.lock().journal.exists()
    }

    fn blocks_on_io(&self) -> bool {
        J::DURABLE
    }

    fn bulk_insert(&self, values: &[Value]) -> Result<usize> {
        if let Some(wrong) = values.iter().find(|v| v.kind() != self.kind) {
            return Err(Error::KindMismatch {
                expected: self.kind,
                found: wrong.kind(),
            });
        }

        let mut inner = self.lock()?;
        let mut batch = HashSet::with_capacity(values.len());
        let fresh: Vec<u64> = values
            .iter()
            .map(Value::key)
            .filter(|&key| !inner.table.contains(key) && batch.insert(key))
            .collect();
        if fresh.is_empty() {
            return Ok(0);
        }

        let records: Vec<Record> = fresh.iter().map(|&key| Record::Insert { key }).collect();
        inner.journal.append(&records)?;
        for &key in &fresh {
            inner.table.insert(key);
        }
        Ok(fresh.len())
    }

    fn pop_random(&self) -> Result<Option<Value>> {
        let mut inner = self.lock()?;
        self.pop_locked(&mut inner)
    }

    fn try_pop_random(&self) -> Result<PopStatus> {
        let Some(mut inner) = self.inner.try_lock() else {
            return Ok(PopStatus::Pending {
                yield_for: self.backoff.base,
            });
        };
        Ok(match self.pop_locked(&mut inner)? {
            Some(value) => PopStatus::Ready { value },
            None => PopStatus::Empty,
        })
    }

    fn count_unconsumed(&self) -> Result<usize> {
        Ok(self.lock()?.table.count_unconsumed())
    }

    fn count_total(&self) -> Result<usize> {
        Ok(self.lock()?.table.count_total())
    }
}
