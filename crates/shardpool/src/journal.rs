//! Append-only JSON-lines journals backing the durable stores.
//!
//! Every mutation is written ahead of the in-memory change it describes, so a
//! crash can only ever leave the disk *ahead* of memory: a value recorded as
//! consumed or reserved that the process never handed out. Replaying such a
//! journal loses at most a few values; it never resurrects a served one.

use crate::{Error, Kind, PartitionId, Result};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// A single journal line.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Record {
    /// Header of a partition journal.
    Partition {
        partition: PartitionId,
        kind: Kind,
        scale: u8,
    },
    /// Header of a registry journal.
    Registry { kind: Kind, scale: u8 },
    Insert { key: u64 },
    Consume { key: u64 },
    Reserve { key: u64 },
}

/// Sink for write-ahead records.
pub trait Journal: Send {
    /// Whether appends touch a disk. Callers on an async executor move
    /// durable appends onto the blocking pool.
    const DURABLE: bool = false;

    /// Durably appends `records` as one write. On error the caller must not
    /// apply the corresponding in-memory change.
    fn append(&mut self, records: &[Record]) -> Result<()>;

    /// Whether the backing medium is still present.
    fn exists(&self) -> bool {
        true
    }

    /// Atomically replaces the whole journal with `records` (header first).
    fn rewrite(&mut self, _records: &[Record]) -> Result<()> {
        Ok(())
    }
}

/// Journal that discards everything; backs the in-memory engine.
#[derive(Default, Debug, Clone, Copy)]
pub struct NullJournal;

impl Journal for NullJournal {
    fn append(&mut self, _records: &[Record]) -> Result<()> {
        Ok(())
    }
}

/// Journal persisted to a local file, one JSON record per line.
#[derive(Debug)]
pub struct FileJournal {
    path: PathBuf,
    file: File,
    fsync: bool,
    /// Length of the journal up to its last complete append.
    len: u64,
}

impl FileJournal {
    /// Opens the journal at `path`, creating it (and its parent directories)
    /// with `header` when absent. Returns the journal and the records that
    /// follow the header.
    ///
    /// # Errors
    ///
    /// - [`Error::ConfigurationFault`] if an existing header differs.
    /// - [`Error::CorruptJournal`] if an interior line cannot be decoded.
    /// - [`Error::Io`] on filesystem failures.
    pub fn create(path: &Path, header: &Record, fsync: bool) -> Result<(Self, Vec<Record>)> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        OpenOptions::new().create(true).append(true).open(path)?;
        Self::load(path, header, fsync)
    }

    /// Opens an existing journal at `path`.
    ///
    /// # Errors
    ///
    /// Same as [`FileJournal::create`], plus [`Error::ConfigurationFault`] if
    /// the file does not exist.
    pub fn open(path: &Path, header: &Record, fsync: bool) -> Result<(Self, Vec<Record>)> {
        if !path.is_file() {
            return Err(Error::ConfigurationFault {
                reason: format!("journal {} does not exist", path.display()),
            });
        }
        Self::load(path, header, fsync)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(path: &Path, header: &Record, fsync: bool) -> Result<(Self, Vec<Record>)> {
        let file = OpenOptions::new().read(true).append(true).open(path)?;
        let shown = path.display().to_string();

        let mut records = Vec::new();
        let mut good_len = 0_u64;
        let mut torn = false;
        {
            let mut reader = BufReader::new(&file);
            let mut line = String::new();
            let mut line_no = 0;
            loop {
                line.clear();
                let n = reader.read_line(&mut line)?;
                if n == 0 {
                    break;
                }
                line_no += 1;
                // Every append ends in a newline; anything else is a write
                // that was cut short.
                if !line.ends_with('\n') {
                    torn = true;
                    break;
                }
                good_len += n as u64;
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let record = serde_json::from_str::<Record>(trimmed).map_err(|e| {
                    Error::CorruptJournal {
                        path: shown.clone(),
                        line: line_no,
                        reason: e.to_string(),
                    }
                })?;
                records.push(record);
            }
        }

        if torn {
            tracing::warn!(journal = %shown, len = good_len, "truncating torn trailing record");
            file.set_len(good_len)?;
        }

        let mut journal = Self {
            path: path.to_path_buf(),
            file,
            fsync,
            len: good_len,
        };

        if records.is_empty() {
            journal.append(core::slice::from_ref(header))?;
            return Ok((journal, records));
        }

        let found = records.remove(0);
        if &found != header {
            return Err(Error::ConfigurationFault {
                reason: format!("journal {shown} has header {found:?}, expected {header:?}"),
            });
        }
        Ok((journal, records))
    }
}

impl FileJournal {
    /// Cuts the file back to the end of the last complete append, dropping
    /// whatever a failed or interrupted write left behind.
    fn restore_len(&mut self) -> Result<()> {
        let on_disk = self.file.metadata()?.len();
        if on_disk == self.len {
            return Ok(());
        }
        if on_disk < self.len {
            return Err(Error::Io {
                context: format!(
                    "journal {} shrank from {} to {on_disk} bytes",
                    self.path.display(),
                    self.len
                ),
            });
        }
        tracing::warn!(
            journal = %self.path.display(),
            len = self.len,
            stray = on_disk - self.len,
            "discarding partial append"
        );
        self.file.set_len(self.len)?;
        Ok(())
    }

    fn write_durably(&mut self, buf: &[u8]) -> Result<()> {
        self.file.write_all(buf)?;
        if self.fsync {
            self.file.sync_data()?;
        }
        Ok(())
    }
}

impl Journal for FileJournal {
    const DURABLE: bool = true;

    /// Appends `records` as one write. A write that fails part-way is cut
    /// back before the error is returned, so the journal never keeps a
    /// half-written line in front of later records.
    fn append(&mut self, records: &[Record]) -> Result<()> {
        let buf = encode(records, &self.path)?;
        self.restore_len()?;
        if let Err(e) = self.write_durably(&buf) {
            if let Err(undo) = self.file.set_len(self.len) {
                tracing::error!(
                    journal = %self.path.display(),
                    error = %undo,
                    "failed to discard partial append"
                );
            }
            return Err(e);
        }
        self.len += buf.len() as u64;
        Ok(())
    }

    fn exists(&self) -> bool {
        self.path.is_file()
    }

    fn rewrite(&mut self, records: &[Record]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("jsonl.tmp");
        let buf = encode(records, &tmp)?;
        {
            let mut staged = File::create(&tmp)?;
            staged.write_all(&buf)?;
            staged.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        self.file = OpenOptions::new().read(true).append(true).open(&self.path)?;
        self.len = buf.len() as u64;
        Ok(())
    }
}

fn encode(records: &[Record], path: &Path) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(records.len() * 32);
    for record in records {
        serde_json::to_writer(&mut buf, record).map_err(|e| Error::Io {
            context: format!("encoding record for {}: {e}", path.display()),
        })?;
        buf.push(b'\n');
    }
    Ok(buf)
}
