use crate::{
    Backoff, Error, FileJournal, Journal, Kind, NullJournal, Record, Result, Value, ValueSpace,
    registry::UniquenessRegistry,
};
use parking_lot::{Mutex, MutexGuard};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// In-memory uniqueness registry.
pub type MemoryRegistry = Registry<NullJournal>;

/// Uniqueness registry persisted as one journal file per kind.
pub type FileRegistry = Registry<FileJournal>;

pub(super) struct KindSet<J> {
    pub(super) keys: HashSet<u64>,
    pub(super) journal: J,
}

/// A [`UniquenessRegistry`] holding one key set per [`Kind`], each behind its
/// own lock so integer and float refills never contend.
///
/// `reserve` checks, journals and inserts while holding the kind's lock; a
/// separate check followed by an insert would let two refills both claim the
/// same value.
pub struct Registry<J> {
    space: ValueSpace,
    backoff: Backoff,
    pub(super) int: Mutex<KindSet<J>>,
    pub(super) float: Mutex<KindSet<J>>,
}

impl MemoryRegistry {
    pub fn in_memory(space: &ValueSpace) -> Self {
        Self::from_parts(
            *space,
            KindSet {
                keys: HashSet::new(),
                journal: NullJournal,
            },
            KindSet {
                keys: HashSet::new(),
                journal: NullJournal,
            },
        )
    }
}

impl FileRegistry {
    /// Journal location for `kind` under `dir`.
    pub fn path_for(dir: &Path, kind: Kind) -> PathBuf {
        dir.join(format!("used_{kind}.jsonl"))
    }

    /// Opens both kind journals under `dir`, creating them when absent.
    ///
    /// # Errors
    ///
    /// See [`FileJournal::create`].
    pub fn create(dir: &Path, space: &ValueSpace, fsync: bool) -> Result<Self> {
        Self::load(dir, space, |path, header| {
            FileJournal::create(path, header, fsync)
        })
    }

    /// Opens both existing kind journals under `dir`.
    ///
    /// # Errors
    ///
    /// [`Error::ConfigurationFault`] if either journal is missing or was
    /// written for a different float scale.
    pub fn open(dir: &Path, space: &ValueSpace, fsync: bool) -> Result<Self> {
        Self::load(dir, space, |path, header| {
            FileJournal::open(path, header, fsync)
        })
    }

    fn load(
        dir: &Path,
        space: &ValueSpace,
        mut open: impl FnMut(&Path, &Record) -> Result<(FileJournal, Vec<Record>)>,
    ) -> Result<Self> {
        let int = Self::load_kind(dir, Kind::Int, space, &mut open)?;
        let float = Self::load_kind(dir, Kind::Float, space, &mut open)?;
        Ok(Self::from_parts(*space, int, float))
    }

    fn load_kind(
        dir: &Path,
        kind: Kind,
        space: &ValueSpace,
        open: &mut impl FnMut(&Path, &Record) -> Result<(FileJournal, Vec<Record>)>,
    ) -> Result<KindSet<FileJournal>> {
        let (journal, replay) = open(&Self::path_for(dir, kind), &Self::header(kind, space))?;
        let mut keys = HashSet::with_capacity(replay.len());
        for record in replay {
            match record {
                Record::Reserve { key } => {
                    keys.insert(key);
                }
                other => {
                    tracing::warn!(%kind, ?other, "ignoring foreign record in registry journal");
                }
            }
        }
        tracing::debug!(%kind, reserved = keys.len(), "registry journal replayed");
        Ok(KindSet { keys, journal })
    }
}

impl<J: Journal> Registry<J> {
    fn from_parts(space: ValueSpace, int: KindSet<J>, float: KindSet<J>) -> Self {
        Self {
            space,
            backoff: Backoff::default(),
            int: Mutex::new(int),
            float: Mutex::new(float),
        }
    }

    /// Replaces the default contention backoff.
    #[must_use]
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn header(kind: Kind, space: &ValueSpace) -> Record {
        Record::Registry {
            kind,
            scale: space.scale_for(kind),
        }
    }

    fn lock(&self, kind: Kind) -> Result<MutexGuard<'_, KindSet<J>>> {
        let set = match kind {
            Kind::Int => &self.int,
            Kind::Float => &self.float,
        };
        self.backoff
            .retry_blocking(|| set.try_lock_for(self.backoff.lock_timeout))
            .ok_or_else(|| Error::StorageContention {
                context: format!("{kind} registry is locked"),
            })
    }
}

impl<J: Journal> UniquenessRegistry for Registry<J> {
    fn create_schema(&self, kind: Kind) -> Result<()> {
        let mut set = self.lock(kind)?;
        if set.journal.exists() {
            return Ok(());
        }
        tracing::warn!(%kind, "registry journal missing, rewriting");
        let mut records = Vec::with_capacity(set.keys.len() + 1);
        records.push(Self::header(kind, &self.space));
        records.extend(set.keys.iter().map(|&key| Record::Reserve { key }));
        set.journal.rewrite(&records)
    }

    fn contains(&self, value: &Value) -> Result<bool> {
        Ok(self.lock(value.kind())?.keys.contains(&value.key()))
    }

    fn reserve(&self, value: &Value) -> Result<bool> {
        let key = value.key();
        let mut set = self.lock(value.kind())?;
        if set.keys.contains(&key) {
            return Ok(false);
        }
        set.journal.append(&[Record::Reserve { key }])?;
        set.keys.insert(key);
        Ok(true)
    }

    fn all_values(&self, kind: Kind) -> Result<HashSet<Value>> {
        let scale = self.space.scale_for(kind);
        Ok(self
            .lock(kind)?
            .keys
            .iter()
            .map(|&key| Value::from_key(kind, key, scale))
            .collect())
    }

    fn count(&self, kind: Kind) -> Result<usize> {
        Ok(self.lock(kind)?.keys.len())
    }
}
