use std::{
    fs::{File, OpenOptions, create_dir_all, rename},
    io::{BufRead, BufReader, Write},
    path::{Path, PathBuf},
};

use schema::Contact;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::StoreError;

const SNAPSHOT_HEADER: &str = "SNAP\t1";
const WAL_HEADER: &str = "WAL";

/// One store mutation as persisted in the log, one JSON object per line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum WalRecord {
    Insert { contact: Contact },
    ReplaceNumber { id: String, number: String },
    Delete { id: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WalReplayStats {
    pub snapshot_records: usize,
    pub wal_records: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalCheckpointStats {
    pub snapshot_records: usize,
    pub truncated_wal_records: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CheckpointPolicy {
    pub max_wal_records: Option<usize>,
}

impl CheckpointPolicy {
    pub fn is_due(&self, wal_records: usize) -> bool {
        self.max_wal_records
            .is_some_and(|limit| limit > 0 && wal_records >= limit)
    }
}

/// Append-only JSON-lines log plus its snapshot file.
///
/// The log opens with a `WAL\t<generation>` header and the snapshot with
/// `SNAP\t1\t<generation>`. A checkpoint writes the snapshot under the next
/// generation before it resets the log, so a log whose generation is behind
/// the snapshot's is already folded into it and is discarded on open.
pub struct FileWal {
    path: PathBuf,
    file: File,
    generation: u64,
    wal_records: usize,
    poisoned: bool,
}

impl FileWal {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let mut wal = Self {
            path,
            file,
            generation: 0,
            wal_records: 0,
            poisoned: false,
        };

        let snapshot_generation = wal.read_snapshot()?.map(|(generation, _)| generation);
        let log = read_log(&wal.path)?;
        match (snapshot_generation, log.generation) {
            (Some(snapshot), Some(log_generation)) if log_generation > snapshot => {
                return Err(StoreError::Parse(format!(
                    "log generation {log_generation} is ahead of snapshot generation {snapshot}"
                )));
            }
            (Some(snapshot), log_generation) if log_generation != Some(snapshot) => {
                if log.records.is_empty() {
                    debug!(generation = snapshot, "stamping empty log");
                } else {
                    warn!(
                        path = %wal.path.display(),
                        stale_records = log.records.len(),
                        generation = snapshot,
                        "discarding log already covered by snapshot"
                    );
                }
                wal.reset_log(snapshot)?;
            }
            (None, None) if log.records.is_empty() => wal.reset_log(0)?,
            (_, log_generation) => {
                wal.generation = log_generation.unwrap_or(0);
                wal.wal_records = log.records.len();
            }
        }
        Ok(wal)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn snapshot_path(&self) -> PathBuf {
        let mut path = self.path.clone().into_os_string();
        path.push(".snapshot");
        PathBuf::from(path)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn wal_record_count(&self) -> usize {
        self.wal_records
    }

    /// Appends and syncs one record. On any failure the file is cut back to
    /// its previous length so the log never holds a record the caller did
    /// not apply; if even that fails, every later append is refused.
    pub fn append(&mut self, record: &WalRecord) -> Result<(), StoreError> {
        if self.poisoned {
            return Err(StoreError::Io(format!(
                "log '{}' is unusable after a failed rollback or reset",
                self.path.display()
            )));
        }
        let line = serde_json::to_string(record)?;
        let offset = std::fs::metadata(&self.path)?.len();
        let written = writeln!(self.file, "{line}")
            .and_then(|()| self.file.flush())
            .and_then(|()| self.file.sync_data());
        if let Err(err) = written {
            if let Err(rollback) = self.rollback_to(offset) {
                warn!(
                    path = %self.path.display(),
                    error = %rollback,
                    "log rollback failed, refusing further appends"
                );
                self.poisoned = true;
            }
            return Err(err.into());
        }
        self.wal_records += 1;
        Ok(())
    }

    /// Snapshot records first, then the log tail written since the snapshot.
    pub fn replay(&self) -> Result<(Vec<WalRecord>, WalReplayStats), StoreError> {
        let snapshot_records = self
            .read_snapshot()?
            .map(|(_, records)| records)
            .unwrap_or_default();
        let wal_records = read_log(&self.path)?.records;
        let stats = WalReplayStats {
            snapshot_records: snapshot_records.len(),
            wal_records: wal_records.len(),
        };
        let mut out = snapshot_records;
        out.extend(wal_records);
        Ok((out, stats))
    }

    /// Replaces the snapshot with `snapshot_records` and empties the log.
    pub fn compact_with_snapshot(
        &mut self,
        snapshot_records: &[WalRecord],
    ) -> Result<WalCheckpointStats, StoreError> {
        let truncated_wal_records = self.wal_records;
        let next_generation = self.generation + 1;
        self.write_snapshot_records(next_generation, snapshot_records)?;
        if let Err(err) = self.reset_log(next_generation) {
            // Anything appended now would sit behind the new snapshot and be
            // discarded on the next open.
            self.poisoned = true;
            return Err(err);
        }
        Ok(WalCheckpointStats {
            snapshot_records: snapshot_records.len(),
            truncated_wal_records,
        })
    }

    fn read_snapshot(&self) -> Result<Option<(u64, Vec<WalRecord>)>, StoreError> {
        let snapshot_path = self.snapshot_path();
        if !snapshot_path.exists() {
            return Ok(None);
        }
        let file = OpenOptions::new().read(true).open(snapshot_path)?;
        let mut lines = BufReader::new(file).lines();
        let header = loop {
            match lines.next() {
                Some(line) => {
                    let line = line?;
                    if line.trim().is_empty() {
                        continue;
                    }
                    break line;
                }
                None => return Err(StoreError::Parse("snapshot file is empty".to_string())),
            }
        };
        let generation = header
            .strip_prefix(SNAPSHOT_HEADER)
            .and_then(|rest| rest.strip_prefix('\t'))
            .and_then(|generation| generation.parse::<u64>().ok())
            .ok_or_else(|| StoreError::Parse("snapshot file has invalid header".to_string()))?;

        let mut out = Vec::new();
        for line in lines {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            out.push(serde_json::from_str(&line)?);
        }
        Ok(Some((generation, out)))
    }

    fn write_snapshot_records(
        &self,
        generation: u64,
        records: &[WalRecord],
    ) -> Result<(), StoreError> {
        let snapshot_path = self.snapshot_path();
        let mut tmp_path = snapshot_path.clone().into_os_string();
        tmp_path.push(".tmp");
        let tmp_path = PathBuf::from(tmp_path);

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)?;
        writeln!(file, "{SNAPSHOT_HEADER}\t{generation}")?;
        for record in records {
            writeln!(file, "{}", serde_json::to_string(record)?)?;
        }
        file.sync_all()?;
        rename(tmp_path, snapshot_path)?;
        Ok(())
    }

    fn reset_log(&mut self, generation: u64) -> Result<(), StoreError> {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)?;
        writeln!(file, "{WAL_HEADER}\t{generation}")?;
        file.sync_all()?;
        self.file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        self.generation = generation;
        self.wal_records = 0;
        self.poisoned = false;
        Ok(())
    }

    fn rollback_to(&mut self, offset: u64) -> std::io::Result<()> {
        let file = OpenOptions::new().write(true).open(&self.path)?;
        file.set_len(offset)?;
        file.sync_all()
    }
}

struct LogContents {
    generation: Option<u64>,
    records: Vec<WalRecord>,
}

/// Reads the log body. A log written before generations existed has no
/// header and is treated as generation 0 content.
fn read_log(path: &Path) -> Result<LogContents, StoreError> {
    let file = OpenOptions::new().read(true).open(path)?;
    let mut generation = None;
    let mut records = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(rest) = line.strip_prefix(WAL_HEADER) {
            if generation.is_some() || !records.is_empty() {
                return Err(StoreError::Parse("log header is not the first line".to_string()));
            }
            let parsed = rest
                .trim_start_matches('\t')
                .parse::<u64>()
                .map_err(|_| StoreError::Parse("log file has invalid header".to_string()))?;
            generation = Some(parsed);
            continue;
        }
        records.push(serde_json::from_str(line)?);
    }
    Ok(LogContents {
        generation,
        records,
    })
}
